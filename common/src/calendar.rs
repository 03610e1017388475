// Business-day gate and holiday calendars
//
// The gate decides whether a run should happen on a date. Holiday lookups go
// through the HolidayCalendar trait so markets can be swapped without touching
// the gate logic.

use crate::errors::GateError;
use chrono::{Datelike, Duration, Local, NaiveDate, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{error, info, instrument, warn};

/// Weekdays on which no run ever happens
pub const NON_BUSINESS_WEEKDAYS: [Weekday; 2] = [Weekday::Sat, Weekday::Sun];

/// HolidayCalendar is the injected market-holiday capability
pub trait HolidayCalendar: Send + Sync {
    /// Calendar name used in logs
    fn name(&self) -> &str;

    /// Holiday name for `date`, or None on a regular day
    fn holiday_name(&self, date: NaiveDate) -> Result<Option<String>, GateError>;

    fn contains(&self, date: NaiveDate) -> Result<bool, GateError> {
        Ok(self.holiday_name(date)?.is_some())
    }
}

/// What the gate does when the holiday calendar cannot be consulted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalendarErrorPolicy {
    /// Skip the run and report the error
    #[default]
    FailClosed,
    /// Treat the date as a business day and log a warning
    FailOpen,
}

/// Result of evaluating a date against the gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Run,
    Weekend(Weekday),
    Holiday(String),
    CalendarUnavailable(GateError),
}

impl GateDecision {
    pub fn is_run(&self) -> bool {
        matches!(self, GateDecision::Run)
    }

    /// Human-readable reason for skipping, None when the run proceeds
    pub fn skip_reason(&self) -> Option<String> {
        match self {
            GateDecision::Run => None,
            GateDecision::Weekend(day) => Some(format!("weekend ({})", day)),
            GateDecision::Holiday(name) => Some(format!("holiday ({})", name)),
            GateDecision::CalendarUnavailable(e) => Some(format!("calendar unavailable: {}", e)),
        }
    }
}

/// CalendarGate decides whether a date is a valid run day
pub struct CalendarGate {
    calendar: Box<dyn HolidayCalendar>,
    policy: CalendarErrorPolicy,
}

impl CalendarGate {
    pub fn new(calendar: Box<dyn HolidayCalendar>, policy: CalendarErrorPolicy) -> Self {
        Self { calendar, policy }
    }

    #[instrument(skip(self), fields(calendar = %self.calendar.name()))]
    pub fn evaluate(&self, date: NaiveDate) -> GateDecision {
        let weekday = date.weekday();
        if NON_BUSINESS_WEEKDAYS.contains(&weekday) {
            info!(date = %date, weekday = %weekday, "Today is a weekend");
            return GateDecision::Weekend(weekday);
        }

        match self.calendar.holiday_name(date) {
            Ok(Some(name)) => {
                info!(date = %date, holiday = %name, "Today is a market holiday");
                GateDecision::Holiday(name)
            }
            Ok(None) => GateDecision::Run,
            Err(e) => match self.policy {
                CalendarErrorPolicy::FailOpen => {
                    warn!(error = %e, date = %date, "Error checking holiday status, treating as business day");
                    GateDecision::Run
                }
                CalendarErrorPolicy::FailClosed => {
                    error!(error = %e, date = %date, "Error checking holiday status, skipping run");
                    GateDecision::CalendarUnavailable(e)
                }
            },
        }
    }

    pub fn should_run(&self, date: NaiveDate) -> bool {
        self.evaluate(date).is_run()
    }
}

/// Current date in `timezone`, or the local date when none is configured
pub fn today(timezone: Option<Tz>) -> NaiveDate {
    match timezone {
        Some(tz) => Utc::now().with_timezone(&tz).date_naive(),
        None => Local::now().date_naive(),
    }
}

// ============================================================================
// Date rules
// ============================================================================

fn fixed(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day)
}

fn nth_weekday(year: i32, month: u32, weekday: Weekday, n: u8) -> Option<NaiveDate> {
    NaiveDate::from_weekday_of_month_opt(year, month, weekday, n)
}

fn last_weekday(year: i32, month: u32, weekday: Weekday) -> Option<NaiveDate> {
    let first_of_next = if month == 12 {
        fixed(year + 1, 1, 1)?
    } else {
        fixed(year, month + 1, 1)?
    };
    let mut date = first_of_next.pred_opt()?;
    while date.weekday() != weekday {
        date = date.pred_opt()?;
    }
    Some(date)
}

/// Saturday holidays move to Friday, Sunday holidays to Monday
fn observed(date: NaiveDate) -> NaiveDate {
    match date.weekday() {
        Weekday::Sat => date - Duration::days(1),
        Weekday::Sun => date + Duration::days(1),
        _ => date,
    }
}

/// Gregorian Easter Sunday (anonymous algorithm)
fn easter_sunday(year: i32) -> Option<NaiveDate> {
    let a = year % 19;
    let b = year / 100;
    let c = year % 100;
    let d = b / 4;
    let e = b % 4;
    let f = (b + 8) / 25;
    let g = (b - f + 1) / 3;
    let h = (19 * a + b - d - g + 15) % 30;
    let i = c / 4;
    let k = c % 4;
    let l = (32 + 2 * e + 2 * i - h - k) % 7;
    let m = (a + 11 * h + 22 * l) / 451;
    let month = (h + l - 7 * m + 114) / 31;
    let day = (h + l - 7 * m + 114) % 31 + 1;
    fixed(year, month as u32, day as u32)
}

type HolidayList = Vec<(NaiveDate, &'static str)>;

/// Push a fixed-date holiday plus its observed day when it differs
fn push_with_observed(list: &mut HolidayList, date: Option<NaiveDate>, name: &'static str) {
    if let Some(date) = date {
        list.push((date, name));
        let obs = observed(date);
        if obs != date {
            list.push((obs, name));
        }
    }
}

fn push(list: &mut HolidayList, date: Option<NaiveDate>, name: &'static str) {
    if let Some(date) = date {
        list.push((date, name));
    }
}

fn lookup(date: NaiveDate, rules: fn(i32) -> HolidayList) -> Option<String> {
    // Observed dates can cross a year boundary (Jan 1 on a Saturday)
    [date.year(), date.year() + 1]
        .into_iter()
        .flat_map(rules)
        .find(|(d, _)| *d == date)
        .map(|(_, name)| name.to_string())
}

// ============================================================================
// Calendars
// ============================================================================

/// US federal holidays with observed days
#[derive(Debug, Default, Clone, Copy)]
pub struct UsFederalCalendar;

impl UsFederalCalendar {
    pub fn holidays(year: i32) -> Vec<(NaiveDate, &'static str)> {
        let mut list = Vec::with_capacity(16);
        push_with_observed(&mut list, fixed(year, 1, 1), "New Year's Day");
        if year >= 1986 {
            push(
                &mut list,
                nth_weekday(year, 1, Weekday::Mon, 3),
                "Martin Luther King Jr. Day",
            );
        }
        push(
            &mut list,
            nth_weekday(year, 2, Weekday::Mon, 3),
            "Washington's Birthday",
        );
        push(&mut list, last_weekday(year, 5, Weekday::Mon), "Memorial Day");
        if year >= 2021 {
            push_with_observed(
                &mut list,
                fixed(year, 6, 19),
                "Juneteenth National Independence Day",
            );
        }
        push_with_observed(&mut list, fixed(year, 7, 4), "Independence Day");
        push(&mut list, nth_weekday(year, 9, Weekday::Mon, 1), "Labor Day");
        push(&mut list, nth_weekday(year, 10, Weekday::Mon, 2), "Columbus Day");
        push_with_observed(&mut list, fixed(year, 11, 11), "Veterans Day");
        push(&mut list, nth_weekday(year, 11, Weekday::Thu, 4), "Thanksgiving");
        push_with_observed(&mut list, fixed(year, 12, 25), "Christmas Day");
        list
    }
}

impl HolidayCalendar for UsFederalCalendar {
    fn name(&self) -> &str {
        "us_federal"
    }

    fn holiday_name(&self, date: NaiveDate) -> Result<Option<String>, GateError> {
        Ok(lookup(date, Self::holidays))
    }
}

/// NYSE full-day market closures
#[derive(Debug, Default, Clone, Copy)]
pub struct NyseCalendar;

impl NyseCalendar {
    pub fn holidays(year: i32) -> Vec<(NaiveDate, &'static str)> {
        let mut list = Vec::with_capacity(14);

        // A Saturday New Year's Day is not made up on the Friday before
        if let Some(new_year) = fixed(year, 1, 1) {
            list.push((new_year, "New Year's Day"));
            if new_year.weekday() == Weekday::Sun {
                list.push((observed(new_year), "New Year's Day"));
            }
        }
        if year >= 1998 {
            push(
                &mut list,
                nth_weekday(year, 1, Weekday::Mon, 3),
                "Martin Luther King Jr. Day",
            );
        }
        push(
            &mut list,
            nth_weekday(year, 2, Weekday::Mon, 3),
            "Washington's Birthday",
        );
        push(
            &mut list,
            easter_sunday(year).map(|easter| easter - Duration::days(2)),
            "Good Friday",
        );
        push(&mut list, last_weekday(year, 5, Weekday::Mon), "Memorial Day");
        if year >= 2022 {
            push_with_observed(&mut list, fixed(year, 6, 19), "Juneteenth");
        }
        push_with_observed(&mut list, fixed(year, 7, 4), "Independence Day");
        push(&mut list, nth_weekday(year, 9, Weekday::Mon, 1), "Labor Day");
        push(&mut list, nth_weekday(year, 11, Weekday::Thu, 4), "Thanksgiving Day");
        push_with_observed(&mut list, fixed(year, 12, 25), "Christmas Day");
        list
    }
}

impl HolidayCalendar for NyseCalendar {
    fn name(&self) -> &str {
        "nyse"
    }

    fn holiday_name(&self, date: NaiveDate) -> Result<Option<String>, GateError> {
        Ok(lookup(date, Self::holidays))
    }
}

/// Holidays listed in a text file, one `YYYY-MM-DD[,name]` per line.
///
/// The file is read on every lookup so an operator can edit it between runs.
/// Blank lines and lines starting with `#` are ignored.
#[derive(Debug, Clone)]
pub struct HolidayFileCalendar {
    path: PathBuf,
    name: String,
}

impl HolidayFileCalendar {
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let name = format!("file:{}", path.display());
        Self { path, name }
    }

    fn parse_line(&self, line: &str) -> Result<Option<(NaiveDate, String)>, GateError> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }
        let (date_part, label) = match line.split_once(',') {
            Some((d, n)) => (d.trim(), n.trim().to_string()),
            None => (line, "Holiday".to_string()),
        };
        let date = NaiveDate::parse_from_str(date_part, "%Y-%m-%d").map_err(|e| {
            GateError::MalformedEntry {
                calendar: self.name.clone(),
                entry: line.to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok(Some((date, label)))
    }
}

impl HolidayCalendar for HolidayFileCalendar {
    fn name(&self) -> &str {
        &self.name
    }

    fn holiday_name(&self, date: NaiveDate) -> Result<Option<String>, GateError> {
        let contents =
            std::fs::read_to_string(&self.path).map_err(|e| GateError::CalendarUnavailable {
                calendar: self.name.clone(),
                reason: e.to_string(),
            })?;

        for line in contents.lines() {
            if let Some((d, label)) = self.parse_line(line)? {
                if d == date {
                    return Ok(Some(label));
                }
            }
        }
        Ok(None)
    }
}

// Bootstrap utilities for binary initialization
// Turns loaded Settings into the components of one run.

use crate::calendar::{
    CalendarGate, HolidayCalendar, HolidayFileCalendar, NyseCalendar, UsFederalCalendar,
};
use crate::catalog::RemoteCatalog;
use crate::config::{CalendarConfig, CalendarKind, Settings};
use crate::fetch::{FetchExecutor, SystemClock};
use crate::orchestrator::Orchestrator;
use crate::sftp::{ConnectionManager, SftpConnector};
use anyhow::{Context, Result};
use tracing::info;

/// Select the holiday calendar named in configuration
pub fn build_calendar(config: &CalendarConfig) -> Result<Box<dyn HolidayCalendar>> {
    let calendar: Box<dyn HolidayCalendar> = match config.kind {
        CalendarKind::UsFederal => Box::new(UsFederalCalendar),
        CalendarKind::Nyse => Box::new(NyseCalendar),
        CalendarKind::File => {
            let path = config
                .holiday_file
                .as_ref()
                .context("calendar.holiday_file is required for the file calendar")?;
            Box::new(HolidayFileCalendar::new(path))
        }
    };
    Ok(calendar)
}

/// Wire the production orchestrator: SFTP connector, system clock, configured calendar
#[tracing::instrument(skip(settings))]
pub fn build_orchestrator(settings: &Settings) -> Result<Orchestrator> {
    let calendar = build_calendar(&settings.calendar)?;
    info!(
        calendar = %calendar.name(),
        on_error = ?settings.calendar.on_error,
        "Calendar gate configured"
    );

    let endpoints = settings.endpoints();
    info!(
        endpoints = ?endpoints.iter().map(|e| e.name.as_str()).collect::<Vec<_>>(),
        "Endpoints configured in failover order"
    );

    Ok(Orchestrator::new(
        CalendarGate::new(calendar, settings.calendar.on_error),
        ConnectionManager::new(Box::new(SftpConnector::new(settings.sftp.timeout_seconds))),
        RemoteCatalog::new(settings.sftp.extension.clone()),
        FetchExecutor::new(settings.storage.local_dir.clone(), Box::new(SystemClock)),
        endpoints,
        settings.ledger_path(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::CalendarErrorPolicy;
    use std::path::PathBuf;

    fn calendar_config(kind: CalendarKind, holiday_file: Option<PathBuf>) -> CalendarConfig {
        CalendarConfig {
            kind,
            holiday_file,
            on_error: CalendarErrorPolicy::FailClosed,
            timezone: None,
        }
    }

    #[test]
    fn test_build_calendar_by_kind() {
        let nyse = build_calendar(&calendar_config(CalendarKind::Nyse, None)).unwrap();
        assert_eq!(nyse.name(), "nyse");

        let federal = build_calendar(&calendar_config(CalendarKind::UsFederal, None)).unwrap();
        assert_eq!(federal.name(), "us_federal");

        let file = build_calendar(&calendar_config(
            CalendarKind::File,
            Some(PathBuf::from("holidays.txt")),
        ))
        .unwrap();
        assert!(file.name().starts_with("file:"));
    }

    #[test]
    fn test_file_calendar_without_path_is_an_error() {
        assert!(build_calendar(&calendar_config(CalendarKind::File, None)).is_err());
    }
}

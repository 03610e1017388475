// Configuration management with layered configuration (defaults, file, env)

use crate::calendar::CalendarErrorPolicy;
use crate::catalog::DEFAULT_EXTENSION;
use crate::errors::SettingsError;
use crate::models::{EndpointAuth, EndpointConfig};
use chrono_tz::Tz;
use config::{Config, ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Environment prefix for layered settings, e.g. `PULL__SFTP__PRIMARY__HOST`
pub const ENV_PREFIX: &str = "PULL";

/// Ledger filename used when `storage.ledger_file` is unset
pub const DEFAULT_LEDGER_FILE: &str = "processed_files.txt";

/// Flat variable names understood for compatibility with existing deployments
const LEGACY_VARS: [(&str, &str); 5] = [
    ("SFTP_PRIMARY_HOST", "sftp.primary.host"),
    ("SFTP_PRIMARY_PORT", "sftp.primary.port"),
    ("SFTP_USERNAME", "sftp.username"),
    ("SFTP_PASSWORD", "sftp.password"),
    ("SFTP_PATH", "sftp.remote_dir"),
];

/// Main settings structure containing all configuration options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub sftp: SftpSettings,
    pub storage: StorageConfig,
    pub calendar: CalendarConfig,
    pub observability: ObservabilityConfig,
}

/// Shared SFTP settings plus the primary and optional backup endpoints.
/// Per-endpoint values override the shared ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SftpSettings {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub private_key_path: Option<String>,
    #[serde(default)]
    pub private_key_passphrase: Option<String>,
    pub remote_dir: String,
    pub timeout_seconds: u64,
    pub extension: String,
    #[serde(default)]
    pub primary: EndpointSettings,
    #[serde(default)]
    pub backup: Option<EndpointSettings>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndpointSettings {
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub private_key_path: Option<String>,
    #[serde(default)]
    pub remote_dir: Option<String>,
    #[serde(default)]
    pub host_key_sha256: Option<String>,
}

fn default_port() -> u16 {
    22
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub local_dir: PathBuf,
    pub log_dir: PathBuf,
    #[serde(default)]
    pub ledger_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalendarKind {
    UsFederal,
    Nyse,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarConfig {
    pub kind: CalendarKind,
    #[serde(default)]
    pub holiday_file: Option<PathBuf>,
    #[serde(default)]
    pub on_error: CalendarErrorPolicy,
    /// IANA zone used to decide "today"; the local date is used when unset
    #[serde(default)]
    pub timezone: Option<Tz>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
    #[serde(default)]
    pub json: bool,
}

impl Settings {
    /// Load configuration with layered precedence: defaults → file → env,
    /// reading variables from the process environment
    pub fn load_from_path<P: AsRef<Path>>(config_dir: P) -> Result<Self, SettingsError> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::load_with_env(config_dir, vars)
    }

    /// Load configuration from a specific path and an explicit variable map
    pub fn load_with_env<P: AsRef<Path>>(
        config_dir: P,
        vars: HashMap<String, String>,
    ) -> Result<Self, SettingsError> {
        let config_dir = config_dir.as_ref();

        let builder = legacy_defaults(base_defaults(Config::builder())?, &vars)?
            // Start with file configuration
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Add local configuration (not committed to git)
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            // Add environment configuration
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .source(Some(vars.into_iter().collect())),
            );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.sftp.primary.host.is_empty() {
            return Err(SettingsError::MissingField("sftp.primary.host".to_string()));
        }
        if self.sftp.primary.port == 0 {
            return Err(invalid("sftp.primary.port", "port must be greater than 0"));
        }
        if let Some(backup) = &self.sftp.backup {
            if backup.host.is_empty() {
                return Err(SettingsError::MissingField("sftp.backup.host".to_string()));
            }
            if backup.port == 0 {
                return Err(invalid("sftp.backup.port", "port must be greater than 0"));
            }
        }
        if self.sftp.timeout_seconds == 0 {
            return Err(invalid("sftp.timeout_seconds", "timeout must be greater than 0"));
        }
        if self.sftp.extension.is_empty() {
            return Err(invalid("sftp.extension", "extension cannot be empty"));
        }
        if self.calendar.kind == CalendarKind::File && self.calendar.holiday_file.is_none() {
            return Err(SettingsError::MissingField(
                "calendar.holiday_file".to_string(),
            ));
        }
        Ok(())
    }

    /// Endpoint configs in failover order: primary, then backup when configured
    pub fn endpoints(&self) -> Vec<EndpointConfig> {
        let mut endpoints = vec![self.resolve_endpoint("primary", &self.sftp.primary)];
        if let Some(backup) = &self.sftp.backup {
            endpoints.push(self.resolve_endpoint("backup", backup));
        }
        endpoints
    }

    fn resolve_endpoint(&self, name: &str, endpoint: &EndpointSettings) -> EndpointConfig {
        let shared = &self.sftp;
        let username = endpoint
            .username
            .clone()
            .or_else(|| shared.username.clone())
            .unwrap_or_default();

        let key_path = endpoint
            .private_key_path
            .clone()
            .or_else(|| shared.private_key_path.clone());

        let auth = match key_path {
            Some(private_key_path) => EndpointAuth::SshKey {
                username,
                private_key_path,
                passphrase: shared.private_key_passphrase.clone(),
            },
            None => EndpointAuth::Password {
                username,
                password: endpoint
                    .password
                    .clone()
                    .or_else(|| shared.password.clone())
                    .unwrap_or_default(),
            },
        };

        EndpointConfig {
            name: name.to_string(),
            host: endpoint.host.clone(),
            port: endpoint.port,
            auth,
            remote_dir: endpoint
                .remote_dir
                .clone()
                .unwrap_or_else(|| shared.remote_dir.clone()),
            host_key_sha256: endpoint.host_key_sha256.clone(),
        }
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.storage
            .ledger_file
            .clone()
            .unwrap_or_else(|| self.storage.log_dir.join(DEFAULT_LEDGER_FILE))
    }
}

fn invalid(field: &str, reason: &str) -> SettingsError {
    SettingsError::InvalidFieldValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

type Builder = ConfigBuilder<config::builder::DefaultState>;

fn base_defaults(builder: Builder) -> Result<Builder, SettingsError> {
    Ok(builder
        .set_default("sftp.remote_dir", ".")?
        .set_default("sftp.timeout_seconds", 30_i64)?
        .set_default("sftp.extension", DEFAULT_EXTENSION)?
        .set_default("sftp.primary.port", 22_i64)?
        .set_default("storage.local_dir", "downloads")?
        .set_default("storage.log_dir", "logs")?
        .set_default("calendar.kind", "us_federal")?
        .set_default("calendar.on_error", "fail_closed")?
        .set_default("observability.log_level", "info")?
        .set_default("observability.json", false)?)
}

/// Map the flat `SFTP_*` variables onto defaults so files and `PULL__*` still win
fn legacy_defaults(
    mut builder: Builder,
    vars: &HashMap<String, String>,
) -> Result<Builder, SettingsError> {
    for (var, key) in LEGACY_VARS {
        if let Some(value) = vars.get(var).filter(|v| !v.is_empty()) {
            builder = builder.set_default(key, value.as_str())?;
        }
    }

    if let Some(host) = vars.get("SFTP_BACKUP_HOST").filter(|v| !v.is_empty()) {
        builder = builder.set_default("sftp.backup.host", host.as_str())?;
        let port = vars
            .get("SFTP_BACKUP_PORT")
            .map(String::as_str)
            .unwrap_or("22");
        builder = builder.set_default("sftp.backup.port", port)?;
    }

    Ok(builder)
}

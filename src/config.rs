use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_TARGET_DIR_PATH: &str = "/mnt/harman";
pub const DEFAULT_MINUTE_CYCLE: u64 = 1;
/// One year. Longer cycles are treated as invalid.
pub const MAX_MINUTE_CYCLE: u64 = 525_600;
pub const DEFAULT_STORE_PATH: &str = "file_sentinel_store";
const DEFAULT_REPORTER_IDENTITY: &str = "unknown-node";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Error,
}

impl LogLevel {
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Postgres,
    RocksDb,
    Memory,
}

impl FromStr for Backend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Backend::Postgres),
            "rocksdb" | "rocks" => Ok(Backend::RocksDb),
            "memory" => Ok(Backend::Memory),
            other => Err(ConfigError::Message(format!(
                "unknown REPOSITORY_BACKEND '{}' (expected postgres, rocksdb or memory)",
                other
            ))),
        }
    }
}

/// Values as they arrive from `Config.toml` and the environment, before
/// defaults and fallbacks are applied.
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    target_dir_path: Option<String>,
    minute_cycle: Option<String>,
    log_level: Option<String>,
    log_file_path: Option<String>,
    my_node_name: Option<String>,
    hostname: Option<String>,
    repository_backend: Option<String>,
    database_url: Option<String>,
    db_host: Option<String>,
    db_port: Option<String>,
    db_user: Option<String>,
    db_password: Option<String>,
    db_name: Option<String>,
    store_path: Option<String>,
}

/// Immutable agent configuration, resolved once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub target_dir: PathBuf,
    pub minute_cycle: u64,
    pub log_level: LogLevel,
    pub log_file_path: Option<String>,
    pub reporter_identity: String,
    pub backend: Backend,
    pub database_url: Option<String>,
    pub db_host: String,
    pub db_port: u16,
    pub db_user: String,
    pub db_password: String,
    pub db_name: String,
    pub store_path: String,
    /// Fallbacks applied while resolving; logged once tracing is up.
    pub warnings: Vec<String>,
}

/// Read `Config.toml` (optional) and the process environment.
pub fn load_configuration() -> Result<AppConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name("Config").required(false))
        .add_source(Environment::default())
        .build()?;
    let raw = builder.try_deserialize::<RawConfig>()?;
    AppConfig::from_raw(raw)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn parse_minute_cycle(value: Option<&str>) -> (u64, Option<String>) {
    let Some(value) = value else {
        return (DEFAULT_MINUTE_CYCLE, None);
    };
    match value.trim().parse::<i64>() {
        Ok(cycle) if (1..=MAX_MINUTE_CYCLE as i64).contains(&cycle) => (cycle as u64, None),
        _ => (
            DEFAULT_MINUTE_CYCLE,
            Some(format!(
                "Invalid MINUTE_CYCLE value: {}. Using default value {}.",
                value, DEFAULT_MINUTE_CYCLE
            )),
        ),
    }
}

pub fn parse_log_level(value: Option<&str>) -> (LogLevel, Option<String>) {
    let Some(value) = value else {
        return (LogLevel::Info, None);
    };
    match value.trim().to_uppercase().as_str() {
        "DEBUG" => (LogLevel::Debug, None),
        "INFO" => (LogLevel::Info, None),
        "ERROR" => (LogLevel::Error, None),
        _ => (
            LogLevel::Info,
            Some(format!(
                "Invalid LOG_LEVEL value: {}. Using default INFO level.",
                value
            )),
        ),
    }
}

impl AppConfig {
    fn from_raw(raw: RawConfig) -> Result<AppConfig, ConfigError> {
        let mut warnings = Vec::new();

        let (minute_cycle, warning) = parse_minute_cycle(non_empty(raw.minute_cycle).as_deref());
        warnings.extend(warning);
        let (log_level, warning) = parse_log_level(non_empty(raw.log_level).as_deref());
        warnings.extend(warning);

        let backend = match non_empty(raw.repository_backend) {
            Some(name) => name.parse::<Backend>()?,
            None => Backend::Memory,
        };

        let db_port = match non_empty(raw.db_port) {
            Some(port) => port.parse::<u16>().map_err(|e| {
                ConfigError::Message(format!("invalid DB_PORT '{}': {}", port, e))
            })?,
            None => 5432,
        };

        let reporter_identity = non_empty(raw.my_node_name)
            .or_else(|| non_empty(raw.hostname))
            .unwrap_or_else(|| {
                warnings.push(format!(
                    "MY_NODE_NAME is not set. Reporting as '{}'.",
                    DEFAULT_REPORTER_IDENTITY
                ));
                DEFAULT_REPORTER_IDENTITY.to_string()
            });

        Ok(AppConfig {
            target_dir: PathBuf::from(
                non_empty(raw.target_dir_path)
                    .unwrap_or_else(|| DEFAULT_TARGET_DIR_PATH.to_string()),
            ),
            minute_cycle,
            log_level,
            log_file_path: non_empty(raw.log_file_path),
            reporter_identity,
            backend,
            database_url: non_empty(raw.database_url),
            db_host: non_empty(raw.db_host).unwrap_or_else(|| "localhost".to_string()),
            db_port,
            db_user: non_empty(raw.db_user).unwrap_or_else(|| "postgres".to_string()),
            db_password: raw.db_password.unwrap_or_default(),
            db_name: non_empty(raw.db_name).unwrap_or_else(|| "file_sentinel".to_string()),
            store_path: non_empty(raw.store_path)
                .unwrap_or_else(|| DEFAULT_STORE_PATH.to_string()),
            warnings,
        })
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.minute_cycle.saturating_mul(60))
    }

    /// `DATABASE_URL` when given, otherwise built from the `DB_*` parts.
    pub fn database_url(&self) -> String {
        match &self.database_url {
            Some(url) => url.clone(),
            None if self.db_password.is_empty() => format!(
                "postgres://{}@{}:{}/{}",
                self.db_user, self.db_host, self.db_port, self.db_name
            ),
            None => format!(
                "postgres://{}:{}@{}:{}/{}",
                self.db_user, self.db_password, self.db_host, self.db_port, self.db_name
            ),
        }
    }
}

impl fmt::Display for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "target_dir:        {}", self.target_dir.display())?;
        writeln!(f, "minute_cycle:      {}", self.minute_cycle)?;
        writeln!(f, "log_level:         {:?}", self.log_level)?;
        writeln!(
            f,
            "log_file_path:     {}",
            self.log_file_path.as_deref().unwrap_or("-")
        )?;
        writeln!(f, "reporter_identity: {}", self.reporter_identity)?;
        writeln!(f, "backend:           {:?}", self.backend)?;
        match self.backend {
            Backend::Postgres => writeln!(
                f,
                "database:          {}@{}:{}/{}",
                self.db_user, self.db_host, self.db_port, self.db_name
            ),
            Backend::RocksDb => writeln!(f, "store_path:        {}", self.store_path),
            Backend::Memory => Ok(()),
        }
    }
}

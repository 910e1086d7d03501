//! Application configuration module
//!
//! Loads the INI configuration file: a `[wechat]` section for the webhook, a
//! `[monitor]` section of global settings, and one `[database:<name>]`
//! section per monitored instance. Errors in an instance section reject only
//! that instance; errors in the file itself or in the global sections are
//! fatal.

use crate::connector::{ConnectionParams, Dialect};
use config::{Config, File, FileFormat, Map, Source, Value, ValueKind};
use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

const INSTANCE_PREFIX: &str = "database:";
const TABLES_PREFIX: &str = "tables.";
// size-based rotation keys; log files are appended to and rotated by the host
const ROTATION_KEYS: [&str; 2] = ["max_log_size", "backup_count"];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Instance '{instance}' is missing required field '{field}'")]
    MissingField { instance: String, field: String },

    #[error("Instance '{instance}' has unsupported database type '{dialect}'")]
    UnsupportedDialect { instance: String, dialect: String },

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

/// Settings shared by every instance
#[derive(Debug, Clone)]
pub struct GlobalSettings {
    /// Empty disables delivery
    pub webhook: String,
    pub check_interval: Duration,
    pub ignore_tables: Vec<String>,
    pub ignore_change_types: Vec<String>,
    pub worker_slots: usize,
    pub error_cooldown: Duration,
    pub log_level: String,
    pub log_format: LogFormat,
    /// Also append logs to this file. Stdout only when unset.
    pub log_file: Option<PathBuf>,
    /// `[monitor]` keys that were recognized but are not honored
    pub unapplied_keys: Vec<String>,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            webhook: String::new(),
            check_interval: Duration::from_secs(3600),
            ignore_tables: Vec::new(),
            ignore_change_types: Vec::new(),
            worker_slots: 10,
            error_cooldown: Duration::from_secs(300),
            log_level: "info".to_string(),
            log_format: LogFormat::Compact,
            log_file: None,
            unapplied_keys: Vec::new(),
        }
    }
}

/// One monitored database instance
#[derive(Debug, Clone)]
pub struct InstanceConfig {
    pub name: String,
    pub dialect: Dialect,
    pub params: ConnectionParams,
    /// Schema -> table allow-list, in file order. Empty list means all tables.
    pub targets: IndexMap<String, Vec<String>>,
}

/// Complete application settings
#[derive(Debug)]
pub struct Settings {
    pub global: GlobalSettings,
    pub instances: Vec<InstanceConfig>,
    /// Instances skipped because their section was invalid
    pub rejected: Vec<(String, ConfigError)>,
}

impl Settings {
    /// Load `.env`, then the INI file named by `SCHEMAWATCH_CONFIG` (default `config.ini`)
    pub fn load_from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists (ignore errors if file not found)
        let _ = dotenvy::dotenv();

        let path = std::env::var("SCHEMAWATCH_CONFIG").unwrap_or_else(|_| "config.ini".to_string());
        Self::load(Path::new(&path))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let source = File::from(path).format(FileFormat::Ini).required(true);
        Self::from_config(Config::builder().add_source(source).build()?)
    }

    #[cfg(test)]
    pub fn from_ini_str(text: &str) -> Result<Self, ConfigError> {
        let source = File::from_str(text, FileFormat::Ini);
        Self::from_config(Config::builder().add_source(source).build()?)
    }

    fn from_config(config: Config) -> Result<Self, ConfigError> {
        let mut sections = Map::new();
        for (name, value) in config.collect()? {
            // keys outside any section carry no meaning here
            if let ValueKind::Table(table) = value.kind {
                sections.insert(name, table);
            }
        }

        let mut global = GlobalSettings::default();
        if let Some(wechat) = section(&sections, "wechat") {
            if let Some(webhook) = string(wechat, "webhook")? {
                global.webhook = webhook.trim().to_string();
            }
        }
        if !global.webhook.is_empty() {
            url::Url::parse(&global.webhook)
                .map_err(|e| ConfigError::InvalidValue(format!("wechat.webhook: {}", e)))?;
        }
        if let Some(monitor) = section(&sections, "monitor") {
            apply_monitor_section(&mut global, monitor)?;
        }

        let mut instances = Vec::new();
        let mut rejected = Vec::new();
        for (section_name, table) in &sections {
            let Some(name) = strip_prefix_ignore_case(section_name, INSTANCE_PREFIX) else {
                continue;
            };
            match parse_instance(name, table) {
                Ok(instance) => instances.push(instance),
                Err(e) => rejected.push((name.to_string(), e)),
            }
        }

        Ok(Self {
            global,
            instances,
            rejected,
        })
    }
}

fn apply_monitor_section(global: &mut GlobalSettings, monitor: &Map<String, Value>) -> Result<(), ConfigError> {
    if let Some(secs) = number::<u64>(monitor, "check_interval")? {
        if secs == 0 {
            return Err(ConfigError::InvalidValue("monitor.check_interval must be positive".into()));
        }
        global.check_interval = Duration::from_secs(secs);
    }
    if let Some(slots) = number::<usize>(monitor, "worker_slots")? {
        if slots == 0 {
            return Err(ConfigError::InvalidValue("monitor.worker_slots must be positive".into()));
        }
        global.worker_slots = slots;
    }
    if let Some(secs) = number::<u64>(monitor, "error_cooldown")? {
        global.error_cooldown = Duration::from_secs(secs);
    }
    if let Some(raw) = string(monitor, "ignore_tables")? {
        global.ignore_tables = string_list("monitor.ignore_tables", &raw);
    }
    if let Some(raw) = string(monitor, "ignore_change_types")? {
        global.ignore_change_types = string_list("monitor.ignore_change_types", &raw);
    }
    if let Some(level) = string(monitor, "log_level")? {
        global.log_level = level.trim().to_string();
    }
    if let Some(format) = string(monitor, "log_format")? {
        global.log_format = match format.trim().to_ascii_lowercase().as_str() {
            "compact" | "" => LogFormat::Compact,
            "json" => LogFormat::Json,
            other => {
                return Err(ConfigError::InvalidValue(format!(
                    "monitor.log_format must be compact or json, got '{}'",
                    other
                )))
            }
        };
    }
    if let Some(path) = string(monitor, "log_file")? {
        let path = path.trim();
        global.log_file = (!path.is_empty()).then(|| PathBuf::from(path));
    }
    for key in ROTATION_KEYS {
        if lookup(monitor, key).is_some() {
            global.unapplied_keys.push(format!("monitor.{}", key));
        }
    }
    Ok(())
}

fn parse_instance(name: &str, table: &Map<String, Value>) -> Result<InstanceConfig, ConfigError> {
    let missing = |field: &str| ConfigError::MissingField {
        instance: name.to_string(),
        field: field.to_string(),
    };

    let tag = string(table, "type")?.ok_or_else(|| missing("type"))?;
    let dialect: Dialect = tag.parse().map_err(|dialect| ConfigError::UnsupportedDialect {
        instance: name.to_string(),
        dialect,
    })?;

    let port = string(table, "port")?
        .map(|raw| {
            raw.trim().parse::<u16>().map_err(|_| {
                ConfigError::InvalidValue(format!("{}: port '{}' is not a valid port", name, raw))
            })
        })
        .transpose()?;

    let params = ConnectionParams {
        host: string(table, "host")?,
        port,
        user: string(table, "user")?,
        password: string(table, "password")?,
        database: string(table, "database")?,
        dsn: string(table, "dsn")?,
        service_name: string(table, "service_name")?,
    };
    params.validate(dialect).map_err(missing)?;

    let schemas = match string(table, "schemas")? {
        Some(raw) => string_list(&format!("{}.schemas", name), &raw),
        None => Vec::new(),
    };
    if schemas.is_empty() {
        warn!(instance = %name, "no schemas configured, nothing will be monitored");
    }

    let mut targets = IndexMap::new();
    for schema in schemas {
        let key = format!("{}{}", TABLES_PREFIX, schema);
        let tables = match string(table, &key)? {
            Some(raw) => string_list(&format!("{}.{}", name, key), &raw),
            None => Vec::new(),
        };
        targets.insert(schema, tables);
    }

    Ok(InstanceConfig {
        name: name.to_string(),
        dialect,
        params,
        targets,
    })
}

/// Parse a JSON string list; single quotes are accepted. Unparsable lists become empty.
fn string_list(key: &str, raw: &str) -> Vec<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Vec::new();
    }
    match serde_json::from_str::<Vec<String>>(&raw.replace('\'', "\"")) {
        Ok(list) => list,
        Err(e) => {
            warn!(key = %key, error = %e, "ignoring unparsable list value");
            Vec::new()
        }
    }
}

// INI sources may lowercase keys, so every lookup is case-insensitive
fn lookup<'a, V>(map: &'a Map<String, V>, key: &str) -> Option<&'a V> {
    map.iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v)
}

fn section<'a>(sections: &'a Map<String, Map<String, Value>>, name: &str) -> Option<&'a Map<String, Value>> {
    lookup(sections, name)
}

fn string(table: &Map<String, Value>, key: &str) -> Result<Option<String>, ConfigError> {
    Ok(lookup(table, key).cloned().map(Value::into_string).transpose()?)
}

fn number<T: std::str::FromStr>(table: &Map<String, Value>, key: &str) -> Result<Option<T>, ConfigError> {
    string(table, key)?
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|_| ConfigError::InvalidValue(format!("{}: '{}' is not a valid number", key, raw)))
        })
        .transpose()
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    match s.get(..prefix.len()) {
        Some(head) if head.eq_ignore_ascii_case(prefix) => Some(&s[prefix.len()..]),
        _ => None,
    }
}

//! Backend Connectors
//!
//! One capability trait, one implementation per SQL dialect. Each operation
//! opens its own connection, does a single catalog query and closes the
//! connection before returning, whichever way it returns.
//!
//! Failures never reach the diff layer as errors: they are logged and turned
//! into an empty result, which callers cannot tell apart from a schema that
//! really has no tables.

pub mod mysql;
pub mod oracle;
pub mod postgres;

use crate::error::MonitorResult;
use crate::snapshot::SchemaSnapshot;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use tracing::{error, Span};

pub use self::mysql::MySqlConnector;
pub use self::oracle::OracleConnector;
pub use self::postgres::PostgresConnector;

/// Supported SQL dialects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    MySql,
    Oracle,
}

impl FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgresql" | "postgres" => Ok(Dialect::Postgres),
            "mysql" => Ok(Dialect::MySql),
            "oracle" => Ok(Dialect::Oracle),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Dialect::Postgres => "postgresql",
            Dialect::MySql => "mysql",
            Dialect::Oracle => "oracle",
        })
    }
}

/// Raw connection parameters of one instance. Which fields are required
/// depends on the dialect; see [`ConnectionParams::validate`].
#[derive(Debug, Clone, Default)]
pub struct ConnectionParams {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
    pub dsn: Option<String>,
    pub service_name: Option<String>,
}

impl ConnectionParams {
    /// Name of the first required field missing for `dialect`
    pub fn validate(&self, dialect: Dialect) -> Result<(), &'static str> {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.is_empty());

        let mut required: Vec<(&'static str, bool)> = vec![
            ("user", present(&self.user)),
            // an empty password is allowed, an absent one is not
            ("password", self.password.is_some()),
        ];
        match dialect {
            Dialect::Postgres => {
                required.insert(0, ("host", present(&self.host)));
                required.push(("database", present(&self.database)));
            }
            Dialect::MySql => required.insert(0, ("host", present(&self.host))),
            Dialect::Oracle => {
                if !present(&self.dsn) {
                    required.insert(0, ("host", present(&self.host)));
                    required.push(("service_name", present(&self.service_name)));
                }
            }
        }

        match required.into_iter().find(|(_, ok)| !ok) {
            Some((field, _)) => Err(field),
            None => Ok(()),
        }
    }

    pub(crate) fn host(&self) -> &str {
        self.host.as_deref().unwrap_or("localhost")
    }

    pub(crate) fn user(&self) -> &str {
        self.user.as_deref().unwrap_or_default()
    }

    pub(crate) fn password(&self) -> &str {
        self.password.as_deref().unwrap_or_default()
    }

    /// Host/port part for log lines; never includes credentials
    pub fn to_display_string(&self, dialect: Dialect) -> String {
        match (&self.dsn, dialect) {
            (Some(dsn), Dialect::Oracle) => format!("oracle://{}@{}", self.user(), dsn),
            _ => format!(
                "{}://{}:****@{}:{}",
                dialect,
                self.user(),
                self.host(),
                self.port.unwrap_or_else(|| default_port(dialect))
            ),
        }
    }
}

pub fn default_port(dialect: Dialect) -> u16 {
    match dialect {
        Dialect::Postgres => 5432,
        Dialect::MySql => 3306,
        Dialect::Oracle => 1521,
    }
}

/// Catalog access for one database instance
#[async_trait]
pub trait BackendConnector: Send + Sync {
    fn dialect(&self) -> Dialect;

    /// Table names in `schema`; empty on any failure
    async fn list_tables(&self, schema: &str) -> BTreeSet<String>;

    /// Columns of every table in `schema`, restricted to `table_filter` when it
    /// is non-empty; empty on any failure
    async fn describe_schema(&self, schema: &str, table_filter: &[String]) -> SchemaSnapshot;
}

/// Build the connector for a dialect. `span` is the instance's logging context.
pub fn build_connector(
    dialect: Dialect,
    params: ConnectionParams,
    span: Span,
) -> Box<dyn BackendConnector> {
    match dialect {
        Dialect::Postgres => Box::new(PostgresConnector::new(params, span)),
        Dialect::MySql => Box::new(MySqlConnector::new(params, span)),
        Dialect::Oracle => Box::new(OracleConnector::new(params, span)),
    }
}

/// Log a failed catalog read inside the instance span and fall back to `empty()`
pub(crate) fn degrade<T>(
    span: &Span,
    what: &str,
    schema: &str,
    result: MonitorResult<T>,
    empty: impl FnOnce() -> T,
) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            span.in_scope(|| error!(schema = %schema, error = %e, "failed to {}", what));
            empty()
        }
    }
}

/// `IN (...)` placeholder list, numbered from `first` for dialects with positional binds
pub(crate) fn placeholders(count: usize, first: usize, style: fn(usize) -> String) -> String {
    (first..first + count).map(style).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dialect_tags() {
        assert_eq!("postgresql".parse::<Dialect>(), Ok(Dialect::Postgres));
        assert_eq!("MySQL".parse::<Dialect>(), Ok(Dialect::MySql));
        assert_eq!(" oracle ".parse::<Dialect>(), Ok(Dialect::Oracle));
        assert_eq!("sqlite".parse::<Dialect>(), Err("sqlite".to_string()));
    }

    #[test]
    fn test_validate_postgres_requires_database() {
        let params = ConnectionParams {
            host: Some("db".into()),
            user: Some("monitor".into()),
            password: Some("secret".into()),
            ..Default::default()
        };
        assert_eq!(params.validate(Dialect::Postgres), Err("database"));
        assert_eq!(params.validate(Dialect::MySql), Ok(()));
    }

    #[test]
    fn test_validate_oracle_dsn_replaces_host_and_service() {
        let mut params = ConnectionParams {
            user: Some("scott".into()),
            password: Some("tiger".into()),
            ..Default::default()
        };
        assert_eq!(params.validate(Dialect::Oracle), Err("host"));

        params.dsn = Some("db:1521/ORCL".into());
        assert_eq!(params.validate(Dialect::Oracle), Ok(()));
    }

    #[test]
    fn test_display_string_masks_password() {
        let params = ConnectionParams {
            host: Some("db".into()),
            user: Some("monitor".into()),
            password: Some("secret".into()),
            ..Default::default()
        };
        let shown = params.to_display_string(Dialect::MySql);
        assert_eq!(shown, "mysql://monitor:****@db:3306");
        assert!(!shown.contains("secret"));
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(placeholders(3, 2, |i| format!("${}", i)), "$2, $3, $4");
        assert_eq!(placeholders(2, 0, |i| format!(":t{}", i)), ":t0, :t1");
    }
}

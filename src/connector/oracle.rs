//! Oracle catalog reader over `all_tables` / `all_tab_columns`.
//!
//! The `oracle` driver is blocking, so every read runs on the blocking pool.
//! Oracle is the only dialect that reports `data_length` separately from the
//! type name, and it spells nullability `Y`/`N`.

use super::{default_port, degrade, placeholders, BackendConnector, ConnectionParams, Dialect};
use crate::error::MonitorResult;
use crate::snapshot::{ColumnDescriptor, SchemaSnapshot};
use async_trait::async_trait;
use oracle::sql_type::ToSql;
use oracle::Connection;
use std::collections::BTreeSet;
use tracing::{debug, warn, Span};

const TABLES_SQL: &str = r#"
    SELECT table_name
    FROM all_tables
    WHERE owner = UPPER(:1)
"#;

const COLUMNS_SQL: &str = r#"
    SELECT
        table_name,
        column_name,
        data_type,
        data_length,
        nullable,
        data_default
    FROM all_tab_columns
    WHERE owner = UPPER(:1)
"#;

/// Oracle connector: one short-lived session per catalog read
pub struct OracleConnector {
    params: ConnectionParams,
    span: Span,
}

impl OracleConnector {
    pub fn new(params: ConnectionParams, span: Span) -> Self {
        Self { params, span }
    }

    /// Explicit `dsn` wins; otherwise `host:port/service_name`
    fn connect_string(&self) -> String {
        match &self.params.dsn {
            Some(dsn) if !dsn.is_empty() => dsn.clone(),
            _ => format!(
                "{}:{}/{}",
                self.params.host(),
                self.params.port.unwrap_or_else(|| default_port(Dialect::Oracle)),
                self.params.service_name.as_deref().unwrap_or_default()
            ),
        }
    }

    /// Run `read` on a fresh session on the blocking pool, closing the session on every path
    async fn with_session<T, F>(&self, read: F) -> MonitorResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> MonitorResult<T> + Send + 'static,
    {
        let user = self.params.user().to_string();
        let password = self.params.password().to_string();
        let connect_string = self.connect_string();
        let span = self.span.clone();

        tokio::task::spawn_blocking(move || {
            let _entered = span.enter();
            let conn = Connection::connect(&user, &password, &connect_string)
                .map_err(|e| crate::error::connection_error(e.to_string()))?;
            let result = read(&conn);
            if let Err(e) = conn.close() {
                warn!(error = %e, "oracle session close failed");
            }
            result
        })
        .await?
    }

    async fn fetch_tables(&self, schema: &str) -> MonitorResult<BTreeSet<String>> {
        let schema = schema.to_string();
        self.with_session(move |conn| {
            let mut tables = BTreeSet::new();
            for row in conn.query(TABLES_SQL, &[&schema])? {
                tables.insert(row?.get::<_, String>(0)?);
            }
            Ok(tables)
        })
        .await
    }

    async fn fetch_columns(&self, schema: &str, table_filter: &[String]) -> MonitorResult<SchemaSnapshot> {
        let owned_schema = schema.to_string();
        let filter = table_filter.to_vec();
        let sql = columns_statement(filter.len());

        let columns = self
            .with_session(move |conn| {
                let mut binds: Vec<&dyn ToSql> = vec![&owned_schema];
                binds.extend(filter.iter().map(|t| t as &dyn ToSql));

                let mut columns = Vec::new();
                for row in conn.query(&sql, &binds)? {
                    let row = row?;
                    let table: String = row.get(0)?;
                    columns.push((
                        table,
                        ColumnDescriptor {
                            name: row.get(1)?,
                            data_type: row.get(2)?,
                            length: row.get(3)?,
                            nullable: row.get(4)?,
                            default: row.get(5)?,
                        },
                    ));
                }
                Ok(columns)
            })
            .await?;

        debug!(schema = %schema, columns = columns.len(), "oracle columns loaded");
        Ok(SchemaSnapshot::from_rows(schema, columns))
    }
}

/// Column query for an allow-list of `filter_len` tables; binds start at `:2`
fn columns_statement(filter_len: usize) -> String {
    let mut sql = COLUMNS_SQL.to_string();
    if filter_len > 0 {
        sql.push_str(&format!(
            "      AND table_name IN ({})\n",
            placeholders(filter_len, 2, |i| format!(":{}", i))
        ));
    }
    sql.push_str("    ORDER BY table_name, column_id\n");
    sql
}

#[async_trait]
impl BackendConnector for OracleConnector {
    fn dialect(&self) -> Dialect {
        Dialect::Oracle
    }

    async fn list_tables(&self, schema: &str) -> BTreeSet<String> {
        let result = self.fetch_tables(schema).await;
        degrade(&self.span, "list tables", schema, result, BTreeSet::new)
    }

    async fn describe_schema(&self, schema: &str, table_filter: &[String]) -> SchemaSnapshot {
        let result = self.fetch_columns(schema, table_filter).await;
        degrade(&self.span, "describe schema", schema, result, || {
            SchemaSnapshot::empty(schema)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connector(params: ConnectionParams) -> OracleConnector {
        OracleConnector::new(params, Span::none())
    }

    #[test]
    fn test_connect_string_from_host_and_service() {
        let c = connector(ConnectionParams {
            host: Some("ora.internal".into()),
            service_name: Some("ORCLPDB1".into()),
            ..Default::default()
        });
        assert_eq!(c.connect_string(), "ora.internal:1521/ORCLPDB1");
    }

    #[test]
    fn test_explicit_dsn_wins() {
        let c = connector(ConnectionParams {
            host: Some("ignored".into()),
            dsn: Some("(DESCRIPTION=(ADDRESS=(HOST=x)(PORT=1522)))".into()),
            ..Default::default()
        });
        assert_eq!(c.connect_string(), "(DESCRIPTION=(ADDRESS=(HOST=x)(PORT=1522)))");
    }

    #[test]
    fn test_columns_statement_numbers_binds_after_schema() {
        let sql = columns_statement(2);
        assert!(sql.contains("AND table_name IN (:2, :3)"));
        assert!(sql.trim_end().ends_with("ORDER BY table_name, column_id"));

        assert!(!columns_statement(0).contains(" IN ("));
    }
}

//! MySQL catalog reader over `information_schema`.
//!
//! `COLUMN_TYPE` is used as the data type so that display widths and enum
//! members (`varchar(255)`, `enum('a','b')`) take part in the comparison.

use super::{default_port, degrade, placeholders, BackendConnector, ConnectionParams, Dialect};
use crate::error::{MonitorError, MonitorResult};
use crate::snapshot::{ColumnDescriptor, SchemaSnapshot};
use async_trait::async_trait;
use mysql_async::prelude::Queryable;
use mysql_async::{Conn, Opts, OptsBuilder, Row, Value};
use std::collections::BTreeSet;
use tracing::{debug, warn, Instrument, Span};

const TABLES_SQL: &str = r#"
    SELECT TABLE_NAME
    FROM information_schema.TABLES
    WHERE TABLE_SCHEMA = ?
"#;

const COLUMNS_SQL: &str = r#"
    SELECT
        TABLE_NAME,
        COLUMN_NAME,
        COLUMN_TYPE,
        IS_NULLABLE,
        COLUMN_DEFAULT
    FROM information_schema.COLUMNS
    WHERE TABLE_SCHEMA = ?
"#;

/// MySQL connector: one short-lived connection per catalog read
pub struct MySqlConnector {
    params: ConnectionParams,
    span: Span,
}

impl MySqlConnector {
    pub fn new(params: ConnectionParams, span: Span) -> Self {
        Self { params, span }
    }

    fn opts(&self) -> Opts {
        OptsBuilder::default()
            .ip_or_hostname(self.params.host())
            .tcp_port(self.params.port.unwrap_or_else(|| default_port(Dialect::MySql)))
            .user(Some(self.params.user()))
            .pass(Some(self.params.password()))
            .db_name(self.params.database.clone())
            .into()
    }

    /// Run one statement on a fresh connection, disconnecting on every path
    async fn query_once(&self, sql: String, binds: Vec<Value>) -> MonitorResult<Vec<Row>> {
        let mut conn = Conn::new(self.opts())
            .await
            .map_err(|e| MonitorError::Connection(e.to_string()))?;

        let result = conn.exec::<Row, _, _>(sql, binds).await;
        if let Err(e) = conn.disconnect().await {
            warn!(error = %e, "mysql disconnect failed");
        }
        Ok(result?)
    }

    async fn fetch_tables(&self, schema: &str) -> MonitorResult<BTreeSet<String>> {
        let rows = self
            .query_once(TABLES_SQL.to_string(), vec![schema.into()])
            .await?;
        rows.into_iter().map(|row| text(&row, 0)).collect()
    }

    async fn fetch_columns(&self, schema: &str, table_filter: &[String]) -> MonitorResult<SchemaSnapshot> {
        let (sql, binds) = columns_statement(schema, table_filter);
        let rows = self.query_once(sql, binds).await?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in &rows {
            columns.push((
                text(row, 0)?,
                ColumnDescriptor {
                    name: text(row, 1)?,
                    data_type: text(row, 2)?,
                    length: None,
                    nullable: opt_text(row, 3)?,
                    default: opt_text(row, 4)?,
                },
            ));
        }

        debug!(schema = %schema, columns = columns.len(), "mysql columns loaded");
        Ok(SchemaSnapshot::from_rows(schema, columns))
    }
}

/// Column query plus its positional binds, with an `IN (...)` clause for allow-lists
fn columns_statement(schema: &str, table_filter: &[String]) -> (String, Vec<Value>) {
    let mut sql = COLUMNS_SQL.to_string();
    let mut binds: Vec<Value> = vec![schema.into()];

    if !table_filter.is_empty() {
        sql.push_str(&format!(
            "      AND TABLE_NAME IN ({})\n",
            placeholders(table_filter.len(), 0, |_| "?".to_string())
        ));
        binds.extend(table_filter.iter().map(|t| Value::from(t.as_str())));
    }
    sql.push_str("    ORDER BY TABLE_NAME, ORDINAL_POSITION\n");
    (sql, binds)
}

fn opt_text(row: &Row, idx: usize) -> MonitorResult<Option<String>> {
    match row.get_opt::<Option<String>, _>(idx) {
        Some(Ok(value)) => Ok(value),
        Some(Err(e)) => Err(MonitorError::Query(format!("column {}: {:?}", idx, e))),
        None => Err(MonitorError::Query(format!("column {} missing from row", idx))),
    }
}

fn text(row: &Row, idx: usize) -> MonitorResult<String> {
    opt_text(row, idx)?.ok_or_else(|| MonitorError::Query(format!("column {} is NULL", idx)))
}

#[async_trait]
impl BackendConnector for MySqlConnector {
    fn dialect(&self) -> Dialect {
        Dialect::MySql
    }

    async fn list_tables(&self, schema: &str) -> BTreeSet<String> {
        let result = self.fetch_tables(schema).instrument(self.span.clone()).await;
        degrade(&self.span, "list tables", schema, result, BTreeSet::new)
    }

    async fn describe_schema(&self, schema: &str, table_filter: &[String]) -> SchemaSnapshot {
        let result = self
            .fetch_columns(schema, table_filter)
            .instrument(self.span.clone())
            .await;
        degrade(&self.span, "describe schema", schema, result, || {
            SchemaSnapshot::empty(schema)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_columns_statement_without_filter() {
        let (sql, binds) = columns_statement("shop", &[]);
        assert!(!sql.contains(" IN ("));
        assert!(sql.trim_end().ends_with("ORDER BY TABLE_NAME, ORDINAL_POSITION"));
        assert_eq!(binds, vec![Value::from("shop")]);
    }

    #[test]
    fn test_columns_statement_with_allow_list() {
        let filter = vec!["orders".to_string(), "users".to_string()];
        let (sql, binds) = columns_statement("shop", &filter);

        assert!(sql.contains("AND TABLE_NAME IN (?, ?)"));
        assert_eq!(
            binds,
            vec![Value::from("shop"), Value::from("orders"), Value::from("users")]
        );
    }

    #[test]
    fn test_opts_default_port() {
        let connector = MySqlConnector::new(
            ConnectionParams {
                host: Some("db".into()),
                user: Some("monitor".into()),
                password: Some(String::new()),
                ..Default::default()
            },
            Span::none(),
        );
        let opts = connector.opts();
        assert_eq!(opts.tcp_port(), 3306);
        assert_eq!(opts.user(), Some("monitor"));
    }
}

//! PostgreSQL catalog reader over `information_schema`

use super::{default_port, degrade, BackendConnector, ConnectionParams, Dialect};
use crate::error::{MonitorError, MonitorResult};
use crate::snapshot::{ColumnDescriptor, SchemaSnapshot};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_postgres::{Client, NoTls};
use tracing::{debug, warn, Instrument, Span};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

const TABLES_SQL: &str = r#"
    SELECT table_name::text
    FROM information_schema.tables
    WHERE table_schema = $1
"#;

// information_schema uses domain types; cast so they decode as plain text
const COLUMNS_SQL: &str = r#"
    SELECT
        table_name::text,
        column_name::text,
        data_type::text,
        is_nullable::text,
        column_default::text
    FROM information_schema.columns
    WHERE table_schema = $1
    ORDER BY table_name, ordinal_position
"#;

const COLUMNS_FILTERED_SQL: &str = r#"
    SELECT
        table_name::text,
        column_name::text,
        data_type::text,
        is_nullable::text,
        column_default::text
    FROM information_schema.columns
    WHERE table_schema = $1
      AND table_name::text = ANY($2)
    ORDER BY table_name, ordinal_position
"#;

/// PostgreSQL connector: one short-lived connection per catalog read
pub struct PostgresConnector {
    params: ConnectionParams,
    span: Span,
}

impl PostgresConnector {
    pub fn new(params: ConnectionParams, span: Span) -> Self {
        Self { params, span }
    }

    fn config(&self) -> tokio_postgres::Config {
        let mut cfg = tokio_postgres::Config::new();
        cfg.host(self.params.host())
            .port(self.params.port.unwrap_or_else(|| default_port(Dialect::Postgres)))
            .user(self.params.user())
            .password(self.params.password())
            .connect_timeout(CONNECT_TIMEOUT);
        if let Some(db) = &self.params.database {
            cfg.dbname(db);
        }
        cfg
    }

    /// Open a connection and drive it on a background task. The task ends once
    /// the returned client is dropped.
    async fn connect(&self) -> MonitorResult<(Client, JoinHandle<()>)> {
        let (client, connection) = self
            .config()
            .connect(NoTls)
            .await
            .map_err(|e| MonitorError::Connection(e.to_string()))?;

        let handle = tokio::spawn(
            async move {
                if let Err(e) = connection.await {
                    warn!(error = %e, "postgres connection closed with error");
                }
            }
            .instrument(self.span.clone()),
        );
        Ok((client, handle))
    }

    async fn fetch_tables(&self, schema: &str) -> MonitorResult<BTreeSet<String>> {
        let (client, connection) = self.connect().await?;
        let result = client.query(TABLES_SQL, &[&schema]).await;
        drop(client);
        let _ = connection.await;

        let rows = result?;
        rows.iter()
            .map(|row| row.try_get::<_, String>(0).map_err(MonitorError::from))
            .collect()
    }

    async fn fetch_columns(&self, schema: &str, table_filter: &[String]) -> MonitorResult<SchemaSnapshot> {
        let (client, connection) = self.connect().await?;
        let result = if table_filter.is_empty() {
            client.query(COLUMNS_SQL, &[&schema]).await
        } else {
            client.query(COLUMNS_FILTERED_SQL, &[&schema, &table_filter]).await
        };
        drop(client);
        let _ = connection.await;

        let rows = result?;
        let mut columns = Vec::with_capacity(rows.len());
        for row in &rows {
            let table: String = row.try_get(0)?;
            columns.push((
                table,
                ColumnDescriptor {
                    name: row.try_get(1)?,
                    data_type: row.try_get(2)?,
                    length: None,
                    nullable: row.try_get(3)?,
                    default: row.try_get(4)?,
                },
            ));
        }

        debug!(schema = %schema, columns = columns.len(), "postgres columns loaded");
        Ok(SchemaSnapshot::from_rows(schema, columns))
    }
}

#[async_trait]
impl BackendConnector for PostgresConnector {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
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
    fn test_config_uses_defaults() {
        let connector = PostgresConnector::new(
            ConnectionParams {
                host: Some("db.internal".into()),
                user: Some("monitor".into()),
                password: Some("secret".into()),
                database: Some("app".into()),
                ..Default::default()
            },
            Span::none(),
        );
        let cfg = connector.config();

        assert_eq!(cfg.get_ports(), &[5432]);
        assert_eq!(cfg.get_user(), Some("monitor"));
        assert_eq!(cfg.get_dbname(), Some("app"));
        assert_eq!(cfg.get_connect_timeout(), Some(&CONNECT_TIMEOUT));
    }

    #[tokio::test]
    async fn test_unreachable_server_degrades_to_empty() {
        let connector = PostgresConnector::new(
            ConnectionParams {
                host: Some("127.0.0.1".into()),
                port: Some(1),
                user: Some("monitor".into()),
                password: Some("secret".into()),
                database: Some("app".into()),
                ..Default::default()
            },
            Span::none(),
        );

        assert!(connector.list_tables("public").await.is_empty());
        let snapshot = connector.describe_schema("public", &[]).await;
        assert_eq!(snapshot.schema, "public");
        assert!(snapshot.is_empty());
    }
}

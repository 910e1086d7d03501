//! Instance Monitor
//!
//! Runs one check cycle for one database instance: pull every configured
//! schema, diff it against the held baseline, drop ignored events, and send
//! whatever is left as a single alert.
//!
//! The baseline is replaced after every diff, whether or not the alert went
//! out. A connector failure shows up as an empty snapshot and is diffed like
//! any other.

use crate::alert::{AlertFormatter, AlertSink, ChangesBySchema};
use crate::config::InstanceConfig;
use crate::connector::{build_connector, BackendConnector};
use crate::error::MonitorResult;
use crate::snapshot::{BaselineStore, DiffEngine, IgnorePolicy};
use indexmap::IndexMap;
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

/// Outcome of one check cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CycleReport {
    pub schemas_checked: usize,
    /// Events left after the ignore policy, across all schemas
    pub events: usize,
    /// `None` when there was nothing to send
    pub delivered: Option<bool>,
}

pub struct InstanceMonitor {
    name: String,
    connector: Box<dyn BackendConnector>,
    targets: IndexMap<String, Vec<String>>,
    baselines: BaselineStore,
    policy: Arc<IgnorePolicy>,
    sink: Arc<dyn AlertSink>,
    formatter: AlertFormatter,
    span: Span,
}

impl InstanceMonitor {
    pub fn new(
        name: impl Into<String>,
        connector: Box<dyn BackendConnector>,
        targets: IndexMap<String, Vec<String>>,
        policy: Arc<IgnorePolicy>,
        sink: Arc<dyn AlertSink>,
        span: Span,
    ) -> Self {
        let name = name.into();
        Self {
            formatter: AlertFormatter::new(name.clone()),
            name,
            connector,
            targets,
            baselines: BaselineStore::new(),
            policy,
            sink,
            span,
        }
    }

    /// Build a monitor, its logging span and its dialect connector from config
    pub fn from_config(config: InstanceConfig, policy: Arc<IgnorePolicy>, sink: Arc<dyn AlertSink>) -> Self {
        let span = info_span!("instance", name = %config.name);
        span.in_scope(|| {
            info!(
                dialect = %config.dialect,
                target = %config.params.to_display_string(config.dialect),
                schemas = config.targets.len(),
                "instance registered"
            )
        });
        let connector = build_connector(config.dialect, config.params, span.clone());
        Self::new(config.name, connector, config.targets, policy, sink, span)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    #[cfg(test)]
    pub fn baselines(&self) -> &BaselineStore {
        &self.baselines
    }

    /// Connectivity check: count visible tables per schema. Baselines are untouched.
    pub async fn probe(&self) {
        async {
            debug!(dialect = %self.connector.dialect(), "probing schemas");
            for schema in self.targets.keys() {
                let tables = self.connector.list_tables(schema).await;
                if tables.is_empty() {
                    warn!(schema = %schema, "no tables visible");
                } else {
                    info!(schema = %schema, tables = tables.len(), "schema reachable");
                }
            }
        }
        .instrument(self.span.clone())
        .await
    }

    pub async fn check(&mut self) -> MonitorResult<CycleReport> {
        let span = self.span.clone();
        self.run_cycle().instrument(span).await
    }

    async fn run_cycle(&mut self) -> MonitorResult<CycleReport> {
        if self.baselines.is_empty() {
            info!(schemas = self.targets.len(), "capturing initial baselines");
        } else {
            debug!("check cycle started");
        }
        let mut report = CycleReport::default();
        let mut changes = ChangesBySchema::new();

        for (schema, table_filter) in &self.targets {
            let snapshot = self.connector.describe_schema(schema, table_filter).await;
            report.schemas_checked += 1;
            if snapshot.is_empty() {
                warn!(schema = %schema, "no tables returned, treating schema as empty");
            }

            let Some(baseline) = self.baselines.get(schema) else {
                info!(
                    schema = %schema,
                    tables = snapshot.tables.len(),
                    columns = snapshot.column_count(),
                    "initial baseline captured"
                );
                self.baselines.replace(snapshot);
                continue;
            };

            let events = if *baseline == snapshot {
                Vec::new()
            } else {
                self.policy.filter(DiffEngine::diff(baseline, &snapshot))
            };
            self.baselines.replace(snapshot);

            if events.is_empty() {
                debug!(schema = %schema, "no changes");
                continue;
            }
            info!(schema = %schema, events = events.len(), "schema changes detected");
            match serde_json::to_string(&events) {
                Ok(json) => debug!(schema = %schema, detail = %json, "change events"),
                Err(e) => warn!(schema = %schema, error = %e, "could not serialize change events"),
            }
            report.events += events.len();
            changes.insert(schema.clone(), events);
        }

        if !changes.is_empty() {
            let content = self.formatter.render(&changes);
            let delivered = self.sink.deliver(&content).await;
            if delivered {
                info!(events = report.events, "alert sent");
            } else {
                error!(events = report.events, "alert not delivered, changes will not be reported again");
            }
            report.delivered = Some(delivered);
        }

        debug!(
            schemas = report.schemas_checked,
            events = report.events,
            baselines = self.baselines.len(),
            "check cycle finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::Dialect;
    use crate::snapshot::model::TableSnapshot;
    use crate::snapshot::{ColumnDescriptor, SchemaSnapshot};
    use async_trait::async_trait;
    use std::collections::{BTreeSet, HashMap};
    use std::sync::Mutex;

    /// Serves whatever snapshot the test last put in for a schema
    #[derive(Clone, Default)]
    struct FakeConnector {
        pub snapshots: Arc<Mutex<HashMap<String, SchemaSnapshot>>>,
        pub filters: Arc<Mutex<Vec<(String, Vec<String>)>>>,
    }

    impl FakeConnector {
        pub fn set(&self, snapshot: SchemaSnapshot) {
            self.snapshots
                .lock()
                .unwrap()
                .insert(snapshot.schema.clone(), snapshot);
        }
    }

    #[async_trait]
    impl BackendConnector for FakeConnector {
        fn dialect(&self) -> Dialect {
            Dialect::Postgres
        }

        async fn list_tables(&self, schema: &str) -> BTreeSet<String> {
            self.snapshots
                .lock()
                .unwrap()
                .get(schema)
                .map(|s| s.tables.keys().cloned().collect())
                .unwrap_or_default()
        }

        async fn describe_schema(&self, schema: &str, table_filter: &[String]) -> SchemaSnapshot {
            self.filters
                .lock()
                .unwrap()
                .push((schema.to_string(), table_filter.to_vec()));
            self.snapshots
                .lock()
                .unwrap()
                .get(schema)
                .cloned()
                .unwrap_or_else(|| SchemaSnapshot::empty(schema))
        }
    }

    struct RecordingSink {
        pub sent: Mutex<Vec<String>>,
        pub accept: bool,
    }

    impl RecordingSink {
        pub fn new(accept: bool) -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
                accept,
            })
        }
    }

    #[async_trait]
    impl AlertSink for RecordingSink {
        async fn deliver(&self, content: &str) -> bool {
            self.sent.lock().unwrap().push(content.to_string());
            self.accept
        }
    }

    fn schema(name: &str, tables: &[(&str, Vec<ColumnDescriptor>)]) -> SchemaSnapshot {
        let mut s = SchemaSnapshot::empty(name);
        for (t, cols) in tables {
            s.tables.insert(t.to_string(), TableSnapshot::new(*t, cols.clone()));
        }
        s
    }

    fn monitor(
        connector: &FakeConnector,
        targets: &[(&str, &[&str])],
        policy: IgnorePolicy,
        sink: Arc<RecordingSink>,
    ) -> InstanceMonitor {
        let targets = targets
            .iter()
            .map(|(s, t)| (s.to_string(), t.iter().map(|x| x.to_string()).collect()))
            .collect();
        InstanceMonitor::new(
            "test-db",
            Box::new(connector.clone()),
            targets,
            Arc::new(policy),
            sink,
            Span::none(),
        )
    }

    fn users_varchar() -> SchemaSnapshot {
        schema(
            "public",
            &[
                ("users", vec![ColumnDescriptor::new("id", "int"), ColumnDescriptor::new("name", "varchar")]),
                ("legacy", vec![ColumnDescriptor::new("id", "int")]),
            ],
        )
    }

    #[tokio::test]
    async fn test_first_pull_sets_baseline_without_events() {
        let connector = FakeConnector::default();
        connector.set(users_varchar());
        let sink = RecordingSink::new(true);
        let mut m = monitor(&connector, &[("public", &[])], IgnorePolicy::default(), sink.clone());

        let report = m.check().await.unwrap();
        assert_eq!(report, CycleReport { schemas_checked: 1, events: 0, delivered: None });
        assert_eq!(m.baselines().get("public"), Some(&users_varchar()));

        let report = m.check().await.unwrap();
        assert_eq!(report.events, 0);
        assert!(sink.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_detects_changes_and_sends_one_alert() {
        let connector = FakeConnector::default();
        connector.set(users_varchar());
        let sink = RecordingSink::new(true);
        let mut m = monitor(&connector, &[("public", &[])], IgnorePolicy::default(), sink.clone());
        m.check().await.unwrap();

        connector.set(schema(
            "public",
            &[
                ("users", vec![ColumnDescriptor::new("id", "int"), ColumnDescriptor::new("name", "text")]),
                ("legacy", vec![ColumnDescriptor::new("id", "int")]),
                ("orders", vec![ColumnDescriptor::new("id", "int")]),
            ],
        ));
        let report = m.check().await.unwrap();

        assert_eq!(report.events, 2);
        assert_eq!(report.delivered, Some(true));
        let sent = sink.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("🆕 Added table: orders"));
        assert!(sent[0].contains("🔄 Modified column type: users.name"));
    }

    #[tokio::test]
    async fn test_ignored_table_never_reaches_alert() {
        let connector = FakeConnector::default();
        connector.set(users_varchar());
        let sink = RecordingSink::new(true);
        let policy = IgnorePolicy::new(vec!["legacy".into()], vec![]);
        let mut m = monitor(&connector, &[("public", &[])], policy, sink.clone());
        m.check().await.unwrap();

        connector.set(schema(
            "public",
            &[("users", vec![ColumnDescriptor::new("id", "int"), ColumnDescriptor::new("name", "varchar")])],
        ));
        let report = m.check().await.unwrap();

        assert_eq!(report.events, 0);
        assert_eq!(report.delivered, None);
        assert!(sink.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_delivery_still_replaces_baseline() {
        let connector = FakeConnector::default();
        connector.set(users_varchar());
        let sink = RecordingSink::new(false);
        let mut m = monitor(&connector, &[("public", &[])], IgnorePolicy::default(), sink.clone());
        m.check().await.unwrap();

        connector.set(schema("public", &[("users", vec![ColumnDescriptor::new("id", "int")])]));
        let report = m.check().await.unwrap();
        assert_eq!(report.delivered, Some(false));

        let report = m.check().await.unwrap();
        assert_eq!(report.events, 0);
        assert_eq!(sink.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_schemas_grouped_in_config_order_and_filters_passed() {
        let connector = FakeConnector::default();
        let sink = RecordingSink::new(true);
        let mut m = monitor(
            &connector,
            &[("zeta", &[]), ("alpha", &["invoices"])],
            IgnorePolicy::default(),
            sink.clone(),
        );
        m.check().await.unwrap();

        connector.set(schema("zeta", &[("a", vec![])]));
        connector.set(schema("alpha", &[("invoices", vec![])]));
        let report = m.check().await.unwrap();
        assert_eq!(report.schemas_checked, 2);

        let sent = sink.sent.lock().unwrap();
        let zeta = sent[0].find("### Schema: `zeta`").unwrap();
        let alpha = sent[0].find("### Schema: `alpha`").unwrap();
        assert!(zeta < alpha);

        let filters = connector.filters.lock().unwrap();
        assert_eq!(filters[1], ("alpha".to_string(), vec!["invoices".to_string()]));
    }

    #[tokio::test]
    async fn test_probe_does_not_touch_baselines() {
        let connector = FakeConnector::default();
        connector.set(users_varchar());
        let m = monitor(&connector, &[("public", &[])], IgnorePolicy::default(), RecordingSink::new(true));

        m.probe().await;
        assert!(m.baselines().is_empty());
    }
}

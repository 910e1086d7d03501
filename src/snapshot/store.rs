//! Baseline Store
//!
//! Holds the last accepted snapshot per schema for one instance. A schema with
//! no entry is UNSET; the first snapshot stored for it becomes its baseline.
//! Baselines are replaced wholesale and live only as long as the process.

use crate::snapshot::model::SchemaSnapshot;
use std::collections::HashMap;

/// Per-instance baseline state, keyed by schema name
#[derive(Debug, Default)]
pub struct BaselineStore {
    baselines: HashMap<String, SchemaSnapshot>,
}

impl BaselineStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Baseline for a schema, or `None` while it is still UNSET
    pub fn get(&self, schema: &str) -> Option<&SchemaSnapshot> {
        self.baselines.get(schema)
    }

    /// Replace the baseline for `snapshot.schema`, returning the previous one
    pub fn replace(&mut self, snapshot: SchemaSnapshot) -> Option<SchemaSnapshot> {
        tracing::debug!(
            schema = %snapshot.schema,
            tables = snapshot.tables.len(),
            fingerprint = %snapshot.fingerprint(),
            "baseline replaced"
        );
        self.baselines.insert(snapshot.schema.clone(), snapshot)
    }

    pub fn len(&self) -> usize {
        self.baselines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.baselines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::model::{ColumnDescriptor, TableSnapshot};

    #[test]
    fn test_unset_until_first_replace() {
        let mut store = BaselineStore::new();
        assert!(store.get("public").is_none());

        let previous = store.replace(SchemaSnapshot::empty("public"));
        assert!(previous.is_none());
        assert!(store.get("public").is_some());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_replace_returns_previous_and_keeps_schemas_apart() {
        let mut store = BaselineStore::new();
        store.replace(SchemaSnapshot::empty("public"));
        store.replace(SchemaSnapshot::empty("billing"));

        let mut next = SchemaSnapshot::empty("public");
        next.tables.insert(
            "users".into(),
            TableSnapshot::new("users", vec![ColumnDescriptor::new("id", "int")]),
        );
        let previous = store.replace(next.clone()).expect("previous baseline");

        assert!(previous.is_empty());
        assert_eq!(store.get("public"), Some(&next));
        assert!(store.get("billing").is_some_and(|b| b.is_empty()));
    }
}

//! Ignore Policy
//!
//! Suppresses change events by matching against their rendered description,
//! not against structured fields. Matching is plain substring search:
//!
//! - an ignored table name matches case-sensitively anywhere in the text, so
//!   ignoring `log` also hides events for `catalog` or columns named `login`;
//! - an ignored change-type token matches case-insensitively, so `dropped`
//!   hides both table and column drops.
//!
//! Operators may rely on this looseness, so it is kept as is.

use crate::snapshot::diff::ChangeEvent;

/// Read-only suppression rules, shared by every instance
#[derive(Debug, Clone, Default)]
pub struct IgnorePolicy {
    tables: Vec<String>,
    change_types: Vec<String>,
}

impl IgnorePolicy {
    pub fn new(tables: Vec<String>, change_types: Vec<String>) -> Self {
        Self {
            tables: tables.into_iter().filter(|t| !t.is_empty()).collect(),
            change_types: change_types
                .into_iter()
                .filter(|t| !t.is_empty())
                .map(|t| t.to_lowercase())
                .collect(),
        }
    }

    /// Whether a rendered description is suppressed
    pub fn is_ignored(&self, description: &str) -> bool {
        if self.tables.iter().any(|t| description.contains(t.as_str())) {
            return true;
        }

        let lowered = description.to_lowercase();
        self.change_types
            .iter()
            .any(|token| lowered.contains(token.as_str()))
    }

    /// Drop suppressed events, keeping the order of the rest
    pub fn filter(&self, events: Vec<ChangeEvent>) -> Vec<ChangeEvent> {
        if self.is_empty() {
            return events;
        }
        events
            .into_iter()
            .filter(|e| !self.is_ignored(&e.description))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty() && self.change_types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::diff::DiffEngine;
    use crate::snapshot::model::{ColumnDescriptor, SchemaSnapshot, TableSnapshot};

    fn policy(tables: &[&str], types: &[&str]) -> IgnorePolicy {
        IgnorePolicy::new(
            tables.iter().map(|s| s.to_string()).collect(),
            types.iter().map(|s| s.to_string()).collect(),
        )
    }

    fn with_tables(names: &[&str]) -> SchemaSnapshot {
        let mut s = SchemaSnapshot::empty("public");
        for name in names {
            s.tables.insert(
                name.to_string(),
                TableSnapshot::new(*name, vec![ColumnDescriptor::new("id", "int")]),
            );
        }
        s
    }

    #[test]
    fn test_ignored_table_removes_every_event_mentioning_it() {
        let old = with_tables(&["legacy", "users"]);
        let mut new = with_tables(&["users", "legacy_archive"]);
        new.tables.get_mut("users").unwrap().columns.push(
            ColumnDescriptor::new("legacy_flag", "bool"),
        );

        let events = DiffEngine::diff(&old, &new);
        assert_eq!(events.len(), 3);

        let kept = policy(&["legacy"], &[]).filter(events);
        assert!(kept.is_empty(), "kept: {:?}", kept);
    }

    #[test]
    fn test_table_match_is_case_sensitive() {
        let p = policy(&["Legacy"], &[]);
        assert!(!p.is_ignored("❌ Dropped table: legacy"));
        assert!(p.is_ignored("❌ Dropped table: Legacy"));
    }

    #[test]
    fn test_change_type_match_is_case_insensitive() {
        let p = policy(&[], &["DEFAULT VALUE"]);
        assert!(p.is_ignored("⚙️ Modified default value: t.c\n  old: NULL\n  new: 0"));
        assert!(!p.is_ignored("🆕 Added table: t"));
    }

    #[test]
    fn test_substring_over_match_is_preserved() {
        let p = policy(&["log"], &[]);
        assert!(p.is_ignored("🆕 Added table: catalog"));
    }

    #[test]
    fn test_change_type_vocabulary() {
        let mut old = with_tables(&["users", "legacy"]);
        old.tables.insert(
            "users".into(),
            TableSnapshot::new(
                "users",
                vec![
                    ColumnDescriptor::new("id", "int"),
                    ColumnDescriptor::new("name", "varchar").with_length(10).with_nullable("YES"),
                    ColumnDescriptor::new("gone", "int"),
                ],
            ),
        );
        let mut new = with_tables(&["users", "orders"]);
        new.tables.insert(
            "users".into(),
            TableSnapshot::new(
                "users",
                vec![
                    ColumnDescriptor::new("id", "int"),
                    ColumnDescriptor::new("name", "text")
                        .with_length(20)
                        .with_nullable("NO")
                        .with_default("'x'"),
                    ColumnDescriptor::new("extra", "int"),
                ],
            ),
        );
        let events = DiffEngine::diff(&old, &new);
        assert_eq!(events.len(), 8);

        let cases: &[(&str, usize)] = &[
            ("added table", 1),
            ("dropped table", 1),
            ("added column", 1),
            ("dropped column", 1),
            ("column type", 1),
            ("column length", 1),
            ("nullability", 1),
            ("default value", 1),
            ("added", 2),
            ("dropped", 2),
            ("modified", 4),
        ];
        for (token, suppressed) in cases {
            let kept = policy(&[], &[token]).filter(events.clone());
            assert_eq!(events.len() - kept.len(), *suppressed, "token {:?}", token);
        }
    }

    #[test]
    fn test_empty_policy_keeps_everything() {
        let p = policy(&[""], &[""]);
        assert!(p.is_empty());
        assert!(!p.is_ignored("❌ Dropped table: users"));
    }
}

//! Schema Diff Engine
//!
//! Turns a baseline snapshot and a fresh snapshot of the same schema into a
//! flat list of change events. Every event carries its rendered description,
//! which is what the ignore policy matches against and what the alert prints.
//!
//! Output order is canonical: table adds, table drops (both by name), then for
//! each common table by name: column adds, column drops, column modifies in the
//! new table's ordinal order with attributes in {type, length, nullable, default}
//! order.

use crate::snapshot::model::{ColumnDescriptor, SchemaSnapshot, TableSnapshot};
use serde::Serialize;

/// What kind of object changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Table,
    Column,
}

/// What happened to it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Add,
    Drop,
    Modify,
}

/// Column attribute touched by a modify event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
    DataType,
    Length,
    Nullable,
    Default,
}

impl Attribute {
    fn label(self) -> &'static str {
        match self {
            Attribute::DataType => "🔄 Modified column type",
            Attribute::Length => "📏 Modified column length",
            Attribute::Nullable => "🔘 Modified nullability",
            Attribute::Default => "⚙️ Modified default value",
        }
    }
}

/// One discrete structural difference
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub operation: Operation,
    pub table: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute: Option<Attribute>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_value: Option<String>,
    /// Human-readable line used for filtering and alerting
    pub description: String,
}

impl ChangeEvent {
    fn table_added(table: &str) -> Self {
        Self {
            kind: ChangeKind::Table,
            operation: Operation::Add,
            table: table.to_string(),
            column: None,
            attribute: None,
            old_value: None,
            new_value: None,
            description: format!("🆕 Added table: {}", table),
        }
    }

    fn table_dropped(table: &str) -> Self {
        Self {
            kind: ChangeKind::Table,
            operation: Operation::Drop,
            table: table.to_string(),
            column: None,
            attribute: None,
            old_value: None,
            new_value: None,
            description: format!("❌ Dropped table: {}", table),
        }
    }

    fn column_added(table: &str, col: &ColumnDescriptor) -> Self {
        Self {
            kind: ChangeKind::Column,
            operation: Operation::Add,
            table: table.to_string(),
            column: Some(col.name.clone()),
            attribute: None,
            old_value: None,
            new_value: Some(col.data_type.clone()),
            description: format!("🆕 Added column: {}.{} ({})", table, col.name, col.data_type),
        }
    }

    fn column_dropped(table: &str, col: &ColumnDescriptor) -> Self {
        Self {
            kind: ChangeKind::Column,
            operation: Operation::Drop,
            table: table.to_string(),
            column: Some(col.name.clone()),
            attribute: None,
            old_value: Some(col.data_type.clone()),
            new_value: None,
            description: format!("❌ Dropped column: {}.{}", table, col.name),
        }
    }

    fn column_modified(
        table: &str,
        column: &str,
        attribute: Attribute,
        old_value: Option<String>,
        new_value: Option<String>,
        old_display: String,
        new_display: String,
    ) -> Self {
        Self {
            kind: ChangeKind::Column,
            operation: Operation::Modify,
            table: table.to_string(),
            column: Some(column.to_string()),
            attribute: Some(attribute),
            old_value,
            new_value,
            description: format!(
                "{}: {}.{}\n  old: {}\n  new: {}",
                attribute.label(),
                table,
                column,
                old_display,
                new_display
            ),
        }
    }

    pub fn is_drop(&self) -> bool {
        self.operation == Operation::Drop
    }
}

/// Nullability as shown to operators, independent of dialect spelling
fn nullability_display(flag: Option<&str>) -> String {
    match flag {
        Some(f) if f.eq_ignore_ascii_case("YES") || f.eq_ignore_ascii_case("Y") => "NULL",
        _ => "NOT NULL",
    }
    .to_string()
}

fn default_display(default: Option<&str>) -> String {
    default.unwrap_or("NULL").to_string()
}

fn length_display(length: Option<i64>) -> String {
    length
        .map(|l| l.to_string())
        .unwrap_or_else(|| "N/A".to_string())
}

/// The diff engine that compares schema snapshots
pub struct DiffEngine;

impl DiffEngine {
    /// Compare a baseline against a fresh snapshot of the same schema
    pub fn diff(old: &SchemaSnapshot, new: &SchemaSnapshot) -> Vec<ChangeEvent> {
        let mut changes = Vec::new();

        Self::diff_tables(old, new, &mut changes);

        for (name, new_table) in &new.tables {
            if let Some(old_table) = old.tables.get(name) {
                Self::diff_columns(old_table, new_table, &mut changes);
            }
        }

        changes
    }

    fn diff_tables(old: &SchemaSnapshot, new: &SchemaSnapshot, changes: &mut Vec<ChangeEvent>) {
        let old_names = old.table_names();
        let new_names = new.table_names();

        for table in new_names.difference(&old_names) {
            changes.push(ChangeEvent::table_added(table));
        }

        for table in old_names.difference(&new_names) {
            changes.push(ChangeEvent::table_dropped(table));
        }
    }

    fn diff_columns(old: &TableSnapshot, new: &TableSnapshot, changes: &mut Vec<ChangeEvent>) {
        let table = new.name.as_str();
        let old_names = old.column_names();
        let new_names = new.column_names();

        for name in new_names.difference(&old_names) {
            if let Some(col) = new.column(name) {
                changes.push(ChangeEvent::column_added(table, col));
            }
        }

        for name in old_names.difference(&new_names) {
            if let Some(col) = old.column(name) {
                changes.push(ChangeEvent::column_dropped(table, col));
            }
        }

        for new_col in &new.columns {
            if let Some(old_col) = old.column(&new_col.name) {
                Self::compare_columns(table, old_col, new_col, changes);
            }
        }
    }

    fn compare_columns(
        table: &str,
        old: &ColumnDescriptor,
        new: &ColumnDescriptor,
        changes: &mut Vec<ChangeEvent>,
    ) {
        let column = new.name.as_str();

        if old.data_type != new.data_type {
            changes.push(ChangeEvent::column_modified(
                table,
                column,
                Attribute::DataType,
                Some(old.data_type.clone()),
                Some(new.data_type.clone()),
                old.data_type.clone(),
                new.data_type.clone(),
            ));
        }

        // Only dialects that report a length take part; an unknown old length counts as changed
        if new.length.is_some() && new.length != old.length {
            changes.push(ChangeEvent::column_modified(
                table,
                column,
                Attribute::Length,
                old.length.map(|l| l.to_string()),
                new.length.map(|l| l.to_string()),
                length_display(old.length),
                length_display(new.length),
            ));
        }

        let new_nullable = new.nullable.as_deref().filter(|n| !n.is_empty());
        if let Some(flag) = new_nullable {
            if old.nullable.as_deref() != Some(flag) {
                changes.push(ChangeEvent::column_modified(
                    table,
                    column,
                    Attribute::Nullable,
                    old.nullable.clone(),
                    new.nullable.clone(),
                    nullability_display(old.nullable.as_deref()),
                    nullability_display(Some(flag)),
                ));
            }
        }

        // Raw comparison: None and the literal "NULL" are different defaults
        if old.default != new.default {
            changes.push(ChangeEvent::column_modified(
                table,
                column,
                Attribute::Default,
                old.default.clone(),
                new.default.clone(),
                default_display(old.default.as_deref()),
                default_display(new.default.as_deref()),
            ));
        }
    }
}

//! Schema Snapshot Model
//!
//! Backend-agnostic, point-in-time capture of one schema's tables and columns.
//! Values are kept in their dialect-native spelling; snapshots are only ever
//! compared against snapshots taken from the same instance.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

/// One column as reported by the backend catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub name: String,
    /// Native type name (`varchar`, `VARCHAR2`, `varchar(255)`, ...)
    pub data_type: String,
    /// Declared byte length. Only reported by dialects that expose it separately.
    pub length: Option<i64>,
    /// Native nullability flag (`YES`/`NO`, `Y`/`N`)
    pub nullable: Option<String>,
    /// Raw default expression as stored in the catalog
    pub default: Option<String>,
}

// Builders for hand-made fixtures; connectors fill the fields from catalog rows
#[cfg(test)]
impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            length: None,
            nullable: None,
            default: None,
        }
    }

    pub fn with_length(mut self, length: i64) -> Self {
        self.length = Some(length);
        self
    }

    pub fn with_nullable(mut self, nullable: impl Into<String>) -> Self {
        self.nullable = Some(nullable.into());
        self
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }
}

/// Columns of one table in native ordinal order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSnapshot {
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
}

impl TableSnapshot {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDescriptor>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> BTreeSet<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

/// Structural capture of one schema
#[derive(Debug, Clone)]
pub struct SchemaSnapshot {
    pub schema: String,
    pub captured_at: DateTime<Utc>,
    /// Ordered by table name so every traversal is deterministic
    pub tables: BTreeMap<String, TableSnapshot>,
}

impl SchemaSnapshot {
    pub fn new(schema: impl Into<String>, tables: BTreeMap<String, TableSnapshot>) -> Self {
        Self {
            schema: schema.into(),
            captured_at: Utc::now(),
            tables,
        }
    }

    /// Snapshot with no tables. This is also what a failed pull looks like.
    pub fn empty(schema: impl Into<String>) -> Self {
        Self::new(schema, BTreeMap::new())
    }

    /// Build a snapshot from `(table, column)` rows already in ordinal order.
    pub fn from_rows<I>(schema: impl Into<String>, rows: I) -> Self
    where
        I: IntoIterator<Item = (String, ColumnDescriptor)>,
    {
        let mut tables: BTreeMap<String, TableSnapshot> = BTreeMap::new();
        for (table, column) in rows {
            tables
                .entry(table.clone())
                .or_insert_with(|| TableSnapshot::new(table, Vec::new()))
                .columns
                .push(column);
        }
        Self::new(schema, tables)
    }

    pub fn table_names(&self) -> BTreeSet<&str> {
        self.tables.keys().map(String::as_str).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn column_count(&self) -> usize {
        self.tables.values().map(|t| t.columns.len()).sum()
    }

    /// Content hash over tables and column attributes. Capture time is excluded.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for table in self.tables.values() {
            hasher.update(table.name.as_bytes());
            hasher.update([0u8]);
            for col in &table.columns {
                hasher.update(
                    format!(
                        "{}:{}:{:?}:{:?}:{:?}",
                        col.name, col.data_type, col.length, col.nullable, col.default
                    )
                    .as_bytes(),
                );
                hasher.update([1u8]);
            }
        }
        format!("{:x}", hasher.finalize())
    }
}

/// Two snapshots are structurally equal when their tables match; capture time is ignored.
impl PartialEq for SchemaSnapshot {
    fn eq(&self, other: &Self) -> bool {
        self.schema == other.schema && self.tables == other.tables
    }
}

impl Eq for SchemaSnapshot {}

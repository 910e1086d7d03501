//! Schema Snapshot Module
//!
//! Everything between "a connector returned some rows" and "here is what changed":
//! - Schema snapshots (point-in-time captures)
//! - Schema diff engine (baseline vs. fresh snapshot)
//! - Ignore policy (textual suppression of change events)
//! - Baseline store (last accepted snapshot per schema)

pub mod diff;
pub mod ignore;
pub mod model;
pub mod store;

pub use diff::{ChangeEvent, ChangeKind, DiffEngine};
pub use ignore::IgnorePolicy;
pub use model::{ColumnDescriptor, SchemaSnapshot};
pub use store::BaselineStore;

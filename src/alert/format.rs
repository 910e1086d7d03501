//! Alert Formatter
//!
//! Renders one cycle's filtered events into the markdown body sent to the
//! webhook. Lines are the events' own descriptions; the formatter only adds
//! grouping, a header and a risk marker.

use crate::snapshot::{ChangeEvent, ChangeKind};
use chrono::{DateTime, Local};
use indexmap::IndexMap;

/// Filtered events of one cycle, keyed by schema in processing order
pub type ChangesBySchema = IndexMap<String, Vec<ChangeEvent>>;

/// More than this many events without a drop still gets a review marker
const MODERATE_THRESHOLD: usize = 5;

/// Overall risk of one alert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskMarker {
    /// At least one table or column was dropped
    High,
    /// No drops, but more than five changes
    Moderate,
    None,
}

impl RiskMarker {
    pub fn assess(changes: &ChangesBySchema) -> Self {
        let total = total_events(changes);
        if changes.values().flatten().any(ChangeEvent::is_drop) {
            RiskMarker::High
        } else if total > MODERATE_THRESHOLD {
            RiskMarker::Moderate
        } else {
            RiskMarker::None
        }
    }

    fn line(self) -> Option<&'static str> {
        match self {
            RiskMarker::High => Some("⚠️ **High risk:** table/column drop detected!"),
            RiskMarker::Moderate => {
                Some("⚠️ **Attention:** multiple changes detected, please review promptly!")
            }
            RiskMarker::None => None,
        }
    }
}

pub fn total_events(changes: &ChangesBySchema) -> usize {
    changes.values().map(Vec::len).sum()
}

/// Builds the markdown alert body for one instance
pub struct AlertFormatter {
    instance: String,
}

impl AlertFormatter {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn render(&self, changes: &ChangesBySchema) -> String {
        self.render_at(changes, Local::now())
    }

    pub fn render_at(&self, changes: &ChangesBySchema, detected_at: DateTime<Local>) -> String {
        let mut out = format!("## 🚨 Database schema change alert ({})\n\n", self.instance);
        out.push_str(&format!(
            "**▷ Detected at:** {}\n",
            detected_at.format("%Y-%m-%d %H:%M:%S")
        ));
        out.push_str(&format!("**▷ Total changes:** {}\n\n", total_events(changes)));

        for (schema, events) in changes {
            out.push_str(&format!("### Schema: `{}`\n", schema));

            let mut by_table: IndexMap<&str, Vec<&ChangeEvent>> = IndexMap::new();
            for event in events {
                by_table.entry(event.table.as_str()).or_default().push(event);
            }

            for (table, table_events) in by_table {
                out.push_str(&format!("#### Table: `{}`\n", table));
                Self::section(&mut out, "**Table changes:**", ChangeKind::Table, &table_events);
                Self::section(&mut out, "**Column changes:**", ChangeKind::Column, &table_events);
            }
        }

        if let Some(line) = RiskMarker::assess(changes).line() {
            out.push('\n');
            out.push_str(line);
        }

        out
    }

    fn section(out: &mut String, title: &str, kind: ChangeKind, events: &[&ChangeEvent]) {
        let mut lines = events.iter().filter(|e| e.kind == kind).peekable();
        if lines.peek().is_none() {
            return;
        }
        out.push_str(title);
        out.push('\n');
        for event in lines {
            out.push_str(&format!(" {}\n", event.description));
        }
        out.push('\n');
    }
}

//! Checkpoint comparison.
//!
//! Compares the row counts recorded in a checkpoint against another set of
//! counts (usually the live database) and reports per-table changes:
//! grew, shrank, new, gone, plus the net change in rows.

use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffType {
    Grew,
    Shrank,
    New,
    Gone,
}

#[derive(Debug, Clone)]
pub struct DiffEntry {
    pub table: String,
    pub old_count: i64,
    pub new_count: i64,
    pub delta: i64,
    pub diff_type: DiffType,
}

pub struct DiffResult {
    pub checkpoint_id: String,
    pub entries: Vec<DiffEntry>,
    pub net_change: i64,
    pub from_schema: i64,
    pub to_schema: i64,
}

/// Compare `from` counts (the checkpoint) with `to` counts.
///
/// A table that has rows on one side only is `New` or `Gone`; a table at zero
/// rows on both sides or unchanged is not reported.
pub fn compare_counts(
    checkpoint_id: &str,
    from: &BTreeMap<String, i64>,
    to: &BTreeMap<String, i64>,
    from_schema: i64,
    to_schema: i64,
) -> DiffResult {
    let tables: BTreeSet<&String> = from.keys().chain(to.keys()).collect();

    let mut entries = Vec::new();
    let mut net_change: i64 = 0;

    for table in tables {
        let old_count = from.get(table).copied().unwrap_or(0);
        let new_count = to.get(table).copied().unwrap_or(0);
        let delta = new_count.saturating_sub(old_count);

        if delta == 0 {
            continue;
        }

        let diff_type = if old_count == 0 {
            DiffType::New
        } else if new_count == 0 {
            DiffType::Gone
        } else if delta > 0 {
            DiffType::Grew
        } else {
            DiffType::Shrank
        };

        net_change = net_change.saturating_add(delta);
        entries.push(DiffEntry {
            table: table.clone(),
            old_count,
            new_count,
            delta,
            diff_type,
        });
    }

    DiffResult {
        checkpoint_id: checkpoint_id.to_string(),
        entries,
        net_change,
        from_schema,
        to_schema,
    }
}

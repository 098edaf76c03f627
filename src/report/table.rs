//! Text rendering for checkpoint listings, details and diffs.

use crate::checkpoint::diff::{DiffResult, DiffType};
use crate::checkpoint::Checkpoint;
use crate::util::{format_bytes, format_timestamp};

pub fn render_list(checkpoints: &[Checkpoint]) -> String {
    if checkpoints.is_empty() {
        return String::from("No checkpoints found.\n");
    }

    let mut output = String::new();
    output.push_str(&format!(
        "{:<40} {:<20} {:>10} {:<5} {}\n",
        "ID", "Created", "Size", "Auto", "Description"
    ));
    output.push_str(&"-".repeat(100));
    output.push('\n');

    for checkpoint in checkpoints {
        output.push_str(&format!(
            "{:<40} {:<20} {:>10} {:<5} {}\n",
            truncate(&checkpoint.id, 40),
            format_timestamp(&checkpoint.created_at),
            format_bytes(checkpoint.file_size.max(0) as u64),
            if checkpoint.is_auto { "yes" } else { "no" },
            checkpoint.description
        ));
    }

    output
}

pub fn render_info(checkpoint: &Checkpoint) -> String {
    let mut output = String::new();

    output.push_str(&format!("id:             {}\n", checkpoint.id));
    output.push_str(&format!("created:        {}\n", format_timestamp(&checkpoint.created_at)));
    output.push_str(&format!("description:    {}\n", checkpoint.description));
    output.push_str(&format!("size:           {}\n", format_bytes(checkpoint.file_size.max(0) as u64)));
    output.push_str(&format!("schema version: {}\n", checkpoint.schema_version));
    output.push_str(&format!("automatic:      {}\n", if checkpoint.is_auto { "yes" } else { "no" }));
    if let Some(parent) = &checkpoint.parent_checkpoint {
        output.push_str(&format!("parent:         {parent}\n"));
    }

    output.push_str("\nrows:\n");
    for (table, count) in &checkpoint.row_counts {
        output.push_str(&format!("  {table:<20} {count:>10}\n"));
    }

    output
}

pub fn render_diff(result: &DiffResult) -> String {
    let mut output = format!("Comparing checkpoint {} with current database\n", result.checkpoint_id);

    if result.from_schema != result.to_schema {
        output.push_str(&format!(
            "schema version: {} -> {}\n",
            result.from_schema, result.to_schema
        ));
    }
    output.push('\n');

    if result.entries.is_empty() {
        output.push_str("No changes detected.\n");
        return output;
    }

    for entry in &result.entries {
        let line = match entry.diff_type {
            DiffType::Grew => format!(
                "  [+] {} grew {} -> {} (+{})",
                entry.table, entry.old_count, entry.new_count, entry.delta
            ),
            DiffType::Shrank => format!(
                "  [-] {} shrank {} -> {} ({})",
                entry.table, entry.old_count, entry.new_count, entry.delta
            ),
            DiffType::New => format!("  [new] {} now has {} rows", entry.table, entry.new_count),
            DiffType::Gone => format!("  [gone] {} emptied (was {} rows)", entry.table, entry.old_count),
        };
        output.push_str(&line);
        output.push('\n');
    }

    output.push_str(&format!("\nNet change: {:+} rows\n", result.net_change));
    output
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{truncated}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::diff::compare_counts;
    use std::collections::BTreeMap;

    fn checkpoint(id: &str, is_auto: bool) -> Checkpoint {
        Checkpoint {
            id: id.to_string(),
            created_at: chrono::Utc::now(),
            description: "before import".to_string(),
            file_size: 2048,
            row_counts: BTreeMap::from([("transactions".to_string(), 3)]),
            schema_version: 1,
            is_auto,
            parent_checkpoint: None,
        }
    }

    #[test]
    fn empty_list_has_message() {
        assert_eq!(render_list(&[]), "No checkpoints found.\n");
    }

    #[test]
    fn list_shows_each_checkpoint() {
        let output = render_list(&[checkpoint("c2", true), checkpoint("c1", false)]);
        assert!(output.contains("c2"));
        assert!(output.contains("c1"));
        assert!(output.contains("2.0 KB"));
        assert_eq!(output.lines().count(), 4);
    }

    #[test]
    fn info_includes_row_counts() {
        let output = render_info(&checkpoint("c1", false));
        assert!(output.contains("schema version: 1"));
        assert!(output.contains("transactions"));
    }

    #[test]
    fn diff_reports_net_change() {
        let from = BTreeMap::from([("transactions".to_string(), 3)]);
        let to = BTreeMap::from([("transactions".to_string(), 2)]);
        let output = render_diff(&compare_counts("c1", &from, &to, 1, 1));
        assert!(output.contains("[-] transactions shrank 3 -> 2 (-1)"));
        assert!(output.contains("Net change: -1 rows"));
    }

    #[test]
    fn long_ids_are_truncated() {
        assert_eq!(truncate("abcdefghij", 6), "abc...");
        assert_eq!(truncate("abc", 6), "abc");
    }
}

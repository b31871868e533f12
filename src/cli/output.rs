//! CLI output: error mapping and report formatting.

use crate::clone::CloneReport;
use crate::error::PipelineError;
use crate::push::{format_fee, PushReport, SentKind};
use comfy_table::Table;

/// Map pipeline errors to a string for CLI output.
pub fn map_error(e: &PipelineError) -> String {
    match e {
        PipelineError::ConfigurationMissing { paths } => {
            let mut out = String::from("Cannot find required file(s):\n");
            for path in paths {
                out.push_str(&format!("  {}\n", path.display()));
            }
            out.push_str("Create them before pushing.");
            out
        }
        other => other.to_string(),
    }
}

fn kind_label(kind: SentKind) -> String {
    match kind {
        SentKind::Directory => "directory".to_string(),
        SentKind::File => "file".to_string(),
        SentKind::ChunkedFile => "chunked file".to_string(),
        SentKind::ChunkPart(i) => format!("chunk {}", i + 1),
    }
}

/// Table of sent transactions, then totals and the viewer link.
pub fn format_push_report(report: &PushReport, viewer_link: &str) -> String {
    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.set_header(vec!["Kind", "Name", "Key Path", "Transaction"]);
    table.add_row(vec![
        "root".to_string(),
        String::new(),
        String::new(),
        report.root_tx_id.to_string(),
    ]);
    for tx in &report.sent {
        table.add_row(vec![
            kind_label(tx.kind),
            tx.name.clone(),
            tx.key_path.as_str().to_string(),
            tx.tx_id.to_string(),
        ]);
    }

    format!(
        "{}\nStaged: {} directories, {} files ({} chunked), {} removed\nTransactions: {}\nTotal fee: {}\nFunding transaction: {}\n{}",
        table,
        report.staged.directories,
        report.staged.files,
        report.staged.chunked_files,
        report.staged.removed,
        report.fees.transactions,
        format_fee(report.fees.total()),
        report.funding_tx_id,
        viewer_link
    )
}

pub fn format_clone_report(report: &CloneReport) -> String {
    let mut out = match &report.root_path {
        Some(path) => format!("Cloned into {}\n", path.display()),
        None => String::new(),
    };
    out.push_str(&format!(
        "{} directories, {} files, {} bytes",
        report.directories, report.files, report.bytes_written
    ));
    if !report.failures.is_empty() {
        let mut table = Table::new();
        table.load_preset(comfy_table::presets::UTF8_FULL);
        table.set_header(vec!["Name", "Transaction", "Reason"]);
        for failure in &report.failures {
            table.add_row(vec![
                failure.name.clone(),
                failure.tx_id.to_string(),
                failure.reason.clone(),
            ]);
        }
        out.push_str(&format!(
            "\n{} node(s) could not be cloned:\n{}",
            report.failures.len(),
            table
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clone::NodeFailure;
    use crate::types::ConfirmedId;
    use std::path::PathBuf;

    #[test]
    fn test_missing_paths_listed_one_per_line() {
        let err = PipelineError::ConfigurationMissing {
            paths: vec![PathBuf::from("/a/cache.json"), PathBuf::from("/b/key.json")],
        };
        let text = map_error(&err);
        assert!(text.contains("\n  /a/cache.json\n"));
        assert!(text.contains("\n  /b/key.json\n"));
        assert!(text.ends_with("Create them before pushing."));
    }

    #[test]
    fn test_clone_report_lists_failures() {
        let report = CloneReport {
            root_path: Some(PathBuf::from("/out/repo")),
            directories: 2,
            files: 3,
            bytes_written: 10,
            failures: vec![NodeFailure {
                tx_id: ConfirmedId::parse(&"cd".repeat(32)).unwrap(),
                name: "bad.txt".to_string(),
                reason: "digest mismatch".to_string(),
            }],
        };
        let text = format_clone_report(&report);
        assert!(text.starts_with("Cloned into /out/repo"));
        assert!(text.contains("2 directories, 3 files, 10 bytes"));
        assert!(text.contains("bad.txt"));
        assert!(text.contains("1 node(s) could not be cloned"));
    }
}

//! Stage: reconcile the cached tree with the local directory.

use crate::error::PipelineError;
use crate::tree::{Entry, Node, NodeKind, Staging, Walker};
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

/// Counts from one staging walk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageSummary {
    pub directories: usize,
    pub files: usize,
    pub chunked_files: usize,
    pub created: usize,
    pub restored: usize,
    pub removed: usize,
}

/// Walk `dir` pre-order and bring `root` in line with it.
///
/// Existing names reuse their node; new names get the next sibling index.
/// Tracked children that are gone or now ignored are marked removed, and
/// removed children that reappear are restored under their old index.
pub fn stage_tree(
    root: &mut Node,
    dir: &Path,
    walker: &Walker<'_>,
    max_file_size: usize,
) -> Result<StageSummary, PipelineError> {
    let mut summary = StageSummary::default();
    root.restore();
    root.kind = NodeKind::Directory;
    root.staging = Some(Staging {
        source: dir.to_path_buf(),
        ..Staging::default()
    });
    summary.directories += 1;
    stage_children(root, dir, walker, max_file_size, &mut summary)?;
    Ok(summary)
}

fn stage_children(
    node: &mut Node,
    dir: &Path,
    walker: &Walker<'_>,
    max_file_size: usize,
    summary: &mut StageSummary,
) -> Result<(), PipelineError> {
    let listing = walker.list(dir)?;

    let present: HashSet<&str> = listing.entries.iter().map(Entry::name).collect();
    for (name, child) in node.children.iter_mut() {
        if !child.removed && !present.contains(name.as_str()) {
            debug!(key_path = %child.key_path, name = %name, "Marking missing child removed");
            child.remove();
            summary.removed += 1;
        }
    }

    for entry in &listing.entries {
        let is_new = !node.child_exists(entry.name());
        let child = node.create_child(entry.name());
        if is_new {
            summary.created += 1;
        } else if child.removed {
            child.restore();
            summary.restored += 1;
        }
        child.staging = Some(Staging {
            source: entry.path().to_path_buf(),
            ..Staging::default()
        });

        match entry {
            Entry::Directory { path, .. } => {
                child.kind = NodeKind::Directory;
                summary.directories += 1;
                stage_children(child, path, walker, max_file_size, summary)?;
            }
            Entry::File { size, .. } => {
                if *size > max_file_size as u64 {
                    child.kind = NodeKind::ChunkedFile;
                    summary.chunked_files += 1;
                } else {
                    child.kind = NodeKind::File;
                    summary.files += 1;
                }
            }
        }
    }

    Ok(())
}

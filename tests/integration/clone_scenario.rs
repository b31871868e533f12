//! Clone scenarios: a pushed tree comes back byte-for-byte.

use super::test_utils::{noise, TestWorkspace};
use metapush::clone::ClonePipeline;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn clone_pipeline(ws: &TestWorkspace) -> ClonePipeline {
    ClonePipeline::new(ws.ledger.clone(), ws.ledger.clone())
}

#[tokio::test]
async fn test_push_then_clone_is_identical() {
    let ws = TestWorkspace::new("demo", 1_000_000);
    let big = noise(200_000, 42);
    let text = "line\n".repeat(500);
    ws.write("a.txt", b"hello");
    ws.write("sub/b.txt", &big);
    ws.write("sub/deeper/c.md", text.as_bytes());
    let report = ws.push().await;

    let dest = TempDir::new().unwrap();
    let cloned = clone_pipeline(&ws)
        .run(&report.root_tx_id, dest.path())
        .await
        .unwrap();

    assert!(cloned.is_complete());
    assert_eq!(cloned.directories, 3);
    assert_eq!(cloned.files, 3);
    let root = dest.path().join("demo");
    assert_eq!(cloned.root_path.as_deref(), Some(root.as_path()));
    assert_eq!(fs::read(root.join("a.txt")).unwrap(), b"hello");
    assert_eq!(fs::read(root.join("sub").join("b.txt")).unwrap(), big);
    assert_eq!(
        fs::read_to_string(root.join("sub").join("deeper").join("c.md")).unwrap(),
        text
    );
    assert!(!root.join("metapush.json").exists());
    assert!(!root.join(".metapush").exists());
}

#[tokio::test]
async fn test_clone_from_subdirectory_node() {
    let ws = TestWorkspace::new("demo", 1_000_000);
    ws.write("a.txt", b"hello");
    ws.write("sub/b.txt", b"inner");
    let report = ws.push().await;
    let sub = report.sent.iter().find(|t| t.name == "sub").unwrap();

    let dest = TempDir::new().unwrap();
    let cloned = clone_pipeline(&ws).run(&sub.tx_id, dest.path()).await.unwrap();

    assert_eq!(cloned.files, 1);
    assert_eq!(fs::read(dest.path().join("sub").join("b.txt")).unwrap(), b"inner");
    assert!(!dest.path().join("a.txt").exists());
}

#[tokio::test]
async fn test_clone_of_latest_push_omits_removed_files() {
    let ws = TestWorkspace::new("demo", 1_000_000);
    ws.write("keep.txt", b"keep");
    ws.write("gone.txt", b"gone");
    ws.push().await;
    fs::remove_file(ws.root().join("gone.txt")).unwrap();
    let latest = ws.push().await;

    let dest = TempDir::new().unwrap();
    clone_pipeline(&ws)
        .run(&latest.root_tx_id, dest.path())
        .await
        .unwrap();

    let root = dest.path().join("demo");
    assert!(root.join("keep.txt").exists());
    assert!(!root.join("gone.txt").exists());
    assert_eq!(list(&root), vec!["keep.txt".to_string()]);
}

#[tokio::test]
async fn test_clone_twice_into_same_destination() {
    let ws = TestWorkspace::new("demo", 1_000_000);
    ws.write("dir/x.txt", b"x");
    let report = ws.push().await;

    let dest = TempDir::new().unwrap();
    clone_pipeline(&ws).run(&report.root_tx_id, dest.path()).await.unwrap();
    let again = clone_pipeline(&ws).run(&report.root_tx_id, dest.path()).await.unwrap();

    assert!(again.is_complete());
    assert_eq!(fs::read(dest.path().join("demo").join("dir").join("x.txt")).unwrap(), b"x");
}

fn list(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

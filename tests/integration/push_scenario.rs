//! Push scenarios: full tree with a chunked file, and a second push after
//! the workspace changed.

use super::test_utils::{noise, TestWorkspace};
use metapush::chain::MemoryLedger;
use metapush::codec::{decode_node, Content, ProtocolType};
use metapush::error::PipelineError;
use metapush::push::SentKind;
use metapush::tree::NodeKind;
use metapush::types::{ConfirmedId, TxRef};
use std::fs;

fn decode(ledger: &MemoryLedger, tx_id: &ConfirmedId, vout: usize) -> metapush::codec::DecodedNode {
    let tx = ledger.transaction(tx_id).unwrap();
    decode_node(&tx.outputs[vout].script).unwrap()
}

#[tokio::test]
async fn test_push_tree_with_chunked_file() {
    let ws = TestWorkspace::new("demo", 1_000_000);
    ws.write("a.txt", b"hello");
    ws.write("sub/b.txt", &noise(200_000, 7));

    let report = ws.push().await;

    assert_eq!(report.root_tx_id, report.funding_tx_id);
    let kinds: Vec<(String, SentKind)> = report
        .sent
        .iter()
        .map(|t| (t.name.clone(), t.kind))
        .collect();
    assert_eq!(
        kinds,
        vec![
            ("a.txt".to_string(), SentKind::File),
            ("sub".to_string(), SentKind::Directory),
            ("b.txt".to_string(), SentKind::ChunkPart(0)),
            ("b.txt".to_string(), SentKind::ChunkPart(1)),
            ("b.txt".to_string(), SentKind::ChunkPart(2)),
            ("b.txt".to_string(), SentKind::ChunkedFile),
        ]
    );
    assert_eq!(report.fees.transactions, 6);
    assert_eq!(ws.ledger.broadcasts().len(), 7);

    // Root rides in funding output 0 with a NULL parent.
    let root = decode(&ws.ledger, &report.funding_tx_id, 0);
    assert_eq!(root.name, "demo");
    assert_eq!(root.parent, None);

    let a = decode(&ws.ledger, &report.sent[0].tx_id, 0);
    assert_eq!(a.parent.as_deref(), Some(report.root_tx_id.as_str()));
    assert_eq!(a.content, Content::Inline(b"hello".to_vec()));

    let sub_id = &report.sent[1].tx_id;
    let header = decode(&ws.ledger, &report.sent[5].tx_id, 0);
    assert_eq!(header.protocol, ProtocolType::ChunkedFile);
    assert_eq!(header.parent.as_deref(), Some(sub_id.as_str()));
    let part_ids: Vec<ConfirmedId> = report.sent[2..5].iter().map(|t| t.tx_id.clone()).collect();
    assert_eq!(header.content, Content::Chunks(part_ids));

    let cache = ws.cache();
    assert_eq!(cache.root.tx_id, Some(TxRef::Confirmed(report.root_tx_id.clone())));
    let sub = cache.root.child("sub").unwrap();
    assert_eq!(sub.key_path.as_str(), "m/0/1");
    let b = sub.child("b.txt").unwrap();
    assert_eq!(b.kind, NodeKind::ChunkedFile);
    assert_eq!(b.key_path.as_str(), "m/0/1/0");
    assert_eq!(b.tx_id, Some(TxRef::Confirmed(report.sent[5].tx_id.clone())));
    assert!(b.staging.is_none());
}

#[tokio::test]
async fn test_second_push_tracks_removal_and_keeps_indices() {
    let ws = TestWorkspace::new("demo", 1_000_000);
    ws.write("a.txt", b"hello");
    ws.write("sub/b.txt", b"small");
    let first = ws.push().await;

    fs::remove_file(ws.root().join("a.txt")).unwrap();
    ws.write("c.txt", b"new");
    let second = ws.push().await;

    assert_ne!(first.root_tx_id, second.root_tx_id);
    assert_eq!(second.staged.removed, 1);
    let names: Vec<&str> = second.sent.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["c.txt", "sub", "b.txt"]);

    let cache = ws.cache();
    let a = cache.root.child("a.txt").unwrap();
    assert!(a.removed);
    assert_eq!(a.key_path.as_str(), "m/0/0");
    assert_eq!(cache.root.child("c.txt").unwrap().key_path.as_str(), "m/0/2");
    assert_eq!(cache.root.child("sub").unwrap().key_path.as_str(), "m/0/1");
}

#[tokio::test]
async fn test_missing_funding_key_fails_preflight() {
    let ws = TestWorkspace::new("demo", 1_000_000);
    let paths = ws.paths();
    fs::remove_file(paths.funding_key_file()).unwrap();

    let err = match metapush::push::PushWorkspace::load(paths.clone()) {
        Err(e) => e,
        Ok(_) => panic!("preflight passed without a funding key"),
    };
    match err {
        PipelineError::ConfigurationMissing { paths: missing } => {
            assert_eq!(missing, vec![paths.funding_key_file()]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_broadcast_rejection_mid_tree_keeps_old_cache() {
    let ws = TestWorkspace::new("demo", 1_000_000);
    ws.write("a.txt", b"hello");
    ws.write("b.txt", b"world");
    let before = fs::read_to_string(ws.paths().cache_file()).unwrap();

    // Funding and a.txt go out, b.txt is refused.
    ws.ledger.reject_broadcast_after(2, "too-long-mempool-chain");
    let mut workspace = ws.load();
    let outcome = ws.pipeline().run(&mut workspace).await;

    assert!(matches!(
        outcome,
        Err(PipelineError::BroadcastRejected { ref reason, .. }) if reason == "too-long-mempool-chain"
    ));
    assert_eq!(ws.ledger.broadcasts().len(), 2);
    assert_eq!(fs::read_to_string(ws.paths().cache_file()).unwrap(), before);

    // A rerun sends the whole tree again from fresh funding.
    let report = ws.push().await;
    let names: Vec<&str> = report.sent.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["a.txt", "b.txt"]);
}

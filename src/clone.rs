//! Clone pipeline
//!
//! Rebuilds a pushed tree from the ledger alone. Starting at a transaction
//! id, directory nodes become directories and are descended into through
//! the index's children-by-parent query; file nodes are fetched, decoded,
//! checked against their digest and written out.
//!
//! A node that fails to decode is recorded in the report and skipped, and
//! its siblings still clone. Network errors end the run.

use crate::chain::{ChainClient, ChainIndexClient, IndexedNode};
use crate::codec::{decode_chunk_part, decode_node, Content, Integrity, HASH_ALGORITHM};
use crate::error::PipelineError;
use crate::hash::sha512_hex;
use crate::types::ConfirmedId;
use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// A node that could not be materialized
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeFailure {
    pub tx_id: ConfirmedId,
    pub name: String,
    pub reason: String,
}

/// What a clone wrote
#[derive(Debug, Clone, Default)]
pub struct CloneReport {
    /// Path of the cloned root, `None` if the root itself failed
    pub root_path: Option<PathBuf>,
    pub directories: usize,
    pub files: usize,
    pub bytes_written: u64,
    pub failures: Vec<NodeFailure>,
}

impl CloneReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

type CloneFuture<'a> = Pin<Box<dyn Future<Output = Result<(), PipelineError>> + Send + 'a>>;

pub struct ClonePipeline {
    chain: Arc<dyn ChainClient>,
    index: Arc<dyn ChainIndexClient>,
    cancel: CancellationToken,
}

impl ClonePipeline {
    pub fn new(chain: Arc<dyn ChainClient>, index: Arc<dyn ChainIndexClient>) -> Self {
        Self {
            chain,
            index,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Clone the tree rooted at `tx_id` into `destination/<root name>`.
    #[instrument(skip(self, destination), fields(destination = %destination.display()))]
    pub async fn run(
        &self,
        tx_id: &ConfirmedId,
        destination: &Path,
    ) -> Result<CloneReport, PipelineError> {
        let root = self.index.node_by_tx(tx_id).await?.ok_or_else(|| {
            PipelineError::Format(format!("{} is not a known metanet node", tx_id))
        })?;
        info!(name = %root.name, "Cloning");

        fs::create_dir_all(destination)?;
        let mut report = CloneReport::default();
        if validate_name(&root.name).is_ok() {
            report.root_path = Some(destination.join(&root.name));
        }
        self.clone_node(root, destination, &mut report).await?;
        Ok(report)
    }

    fn clone_node<'a>(
        &'a self,
        node: IndexedNode,
        dir: &'a Path,
        report: &'a mut CloneReport,
    ) -> CloneFuture<'a> {
        Box::pin(async move {
            if self.cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            if let Err(reason) = validate_name(&node.name) {
                record(report, &node, reason);
                return Ok(());
            }
            let path = dir.join(&node.name);

            if node.protocol.is_file() {
                match self.fetch_file(&node.tx_id).await {
                    Ok(content) => {
                        fs::write(&path, &content)?;
                        debug!(path = %path.display(), bytes = content.len(), "Wrote file");
                        report.files += 1;
                        report.bytes_written += content.len() as u64;
                    }
                    Err(PipelineError::Format(reason)) => record(report, &node, reason),
                    Err(err) => return Err(err),
                }
                return Ok(());
            }

            fs::create_dir_all(&path)?;
            report.directories += 1;
            debug!(path = %path.display(), "Created directory");

            let mut children = self.index.children_by_parent(&node.tx_id).await?;
            children.sort_by(|a, b| a.name.cmp(&b.name));
            for child in children {
                self.clone_node(child, &path, report).await?;
            }
            Ok(())
        })
    }

    /// Fetch, decode and verify a file node's content.
    async fn fetch_file(&self, tx_id: &ConfirmedId) -> Result<Vec<u8>, PipelineError> {
        let script = self.fetch_data_script(tx_id).await?;
        let decoded = decode_node(&script)?;

        let content = match decoded.content {
            Content::Inline(bytes) => bytes,
            Content::Chunks(ids) => {
                if ids.is_empty() {
                    return Err(PipelineError::Format(format!(
                        "{} lists no chunks",
                        decoded.name
                    )));
                }
                let mut content = Vec::new();
                for id in &ids {
                    let part = self.fetch_data_script(id).await?;
                    content.extend(decode_chunk_part(&part)?);
                }
                content
            }
            Content::None => {
                return Err(PipelineError::Format(format!(
                    "{} carries no content",
                    decoded.name
                )))
            }
        };

        if let Some(integrity) = &decoded.integrity {
            verify_integrity(integrity, &content, &decoded.name)?;
        }
        Ok(content)
    }

    async fn fetch_data_script(&self, tx_id: &ConfirmedId) -> Result<Vec<u8>, PipelineError> {
        let tx = self
            .chain
            .fetch_transaction(tx_id)
            .await?
            .ok_or_else(|| PipelineError::Format(format!("transaction {} not found", tx_id)))?;
        tx.data_script()
            .map(<[u8]>::to_vec)
            .ok_or_else(|| PipelineError::Format(format!("transaction {} has no data output", tx_id)))
    }
}

fn record(report: &mut CloneReport, node: &IndexedNode, reason: String) {
    warn!(tx_id = %node.tx_id, name = %node.name, %reason, "Skipping node");
    report.failures.push(NodeFailure {
        tx_id: node.tx_id.clone(),
        name: node.name.clone(),
        reason,
    });
}

/// A name must be a single path component.
pub fn validate_name(name: &str) -> Result<(), String> {
    if name.is_empty() || name == "." || name == ".." {
        return Err(format!("unsafe name {:?}", name));
    }
    if name.contains(['/', '\\', '\0']) {
        return Err(format!("name {:?} contains a path separator", name));
    }
    Ok(())
}

fn verify_integrity(integrity: &Integrity, content: &[u8], name: &str) -> Result<(), PipelineError> {
    if integrity.algorithm != HASH_ALGORITHM {
        warn!(algorithm = %integrity.algorithm, node = name, "Unsupported digest algorithm, not verified");
        return Ok(());
    }
    let actual = sha512_hex(content);
    if !actual.eq_ignore_ascii_case(integrity.digest.trim()) {
        return Err(PipelineError::Format(format!(
            "{} digest mismatch: expected {}, got {}",
            name, integrity.digest, actual
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{FileBody, NodeHeader, Payload};
    use crate::keys::{Address, ExtendedPrivateKey, Network};
    use crate::chain::MemoryLedger;
    use crate::tx::{sign_input, Transaction, TxOut};
    use crate::types::TxRef;
    use tempfile::TempDir;

    struct Pusher {
        ledger: Arc<MemoryLedger>,
        key: ExtendedPrivateKey,
    }

    impl Pusher {
        fn new() -> Self {
            Self {
                ledger: Arc::new(MemoryLedger::new()),
                key: ExtendedPrivateKey::from_seed(Network::Mainnet, &[21u8; 32]).unwrap(),
            }
        }

        fn address(&self) -> Address {
            self.key.address()
        }

        /// Broadcast `script` as a data output funded straight from a faucet.
        async fn put(&self, script: Vec<u8>) -> ConfirmedId {
            self.ledger.fund(&self.address(), 1_000);
            let utxo = self
                .ledger
                .unspent_outputs(&self.address())
                .await
                .unwrap()
                .remove(0)
                .to_utxo(&self.address());
            let mut tx = Transaction::default();
            tx.add_input(&utxo);
            tx.add_output(TxOut::data(script));
            sign_input(&mut tx, 0, &utxo, &self.key).unwrap();
            self.ledger.broadcast(&tx.to_hex()).await.unwrap()
        }

        fn header(&self, parent: Option<&ConfirmedId>) -> NodeHeader {
            NodeHeader {
                address: self.address(),
                parent: parent.map(|p| TxRef::Confirmed(p.clone())),
            }
        }

        fn pipeline(&self) -> ClonePipeline {
            ClonePipeline::new(self.ledger.clone(), self.ledger.clone())
        }
    }

    #[tokio::test]
    async fn test_clone_directory_with_file() {
        let p = Pusher::new();
        let root = p
            .put(Payload::directory(p.header(None), "repo").seal(100_000).unwrap().into_bytes())
            .await;
        let body = FileBody::new("a.txt", b"hello", 1000).unwrap();
        p.put(Payload::file(p.header(Some(&root)), body).seal(100_000).unwrap().into_bytes())
            .await;

        let dest = TempDir::new().unwrap();
        let report = p.pipeline().run(&root, dest.path()).await.unwrap();

        assert!(report.is_complete());
        assert_eq!(report.directories, 1);
        assert_eq!(report.files, 1);
        assert_eq!(report.root_path, Some(dest.path().join("repo")));
        assert_eq!(fs::read(dest.path().join("repo").join("a.txt")).unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_bad_digest_and_unsafe_name_do_not_stop_siblings() {
        let p = Pusher::new();
        let root = p
            .put(Payload::directory(p.header(None), "repo").seal(100_000).unwrap().into_bytes())
            .await;

        let mut tampered = FileBody::new("bad.txt", b"content", 1000).unwrap();
        tampered.digest = sha512_hex(b"other");
        p.put(Payload::file(p.header(Some(&root)), tampered).seal(100_000).unwrap().into_bytes())
            .await;
        let escape = FileBody::new("..", b"x", 1000).unwrap();
        p.put(Payload::file(p.header(Some(&root)), escape).seal(100_000).unwrap().into_bytes())
            .await;
        let good = FileBody::new("good.txt", b"fine", 1000).unwrap();
        p.put(Payload::file(p.header(Some(&root)), good).seal(100_000).unwrap().into_bytes())
            .await;

        let dest = TempDir::new().unwrap();
        let report = p.pipeline().run(&root, dest.path()).await.unwrap();

        assert_eq!(report.files, 1);
        assert_eq!(report.failures.len(), 2);
        assert!(report.failures.iter().any(|f| f.reason.contains("digest mismatch")));
        assert!(dest.path().join("repo").join("good.txt").exists());
        assert!(!dest.path().join("repo").join("bad.txt").exists());
    }

    #[tokio::test]
    async fn test_unknown_root_is_error() {
        let p = Pusher::new();
        let dest = TempDir::new().unwrap();
        let missing = ConfirmedId::parse(&"ab".repeat(32)).unwrap();
        let err = p.pipeline().run(&missing, dest.path()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Format(_)));
    }

    #[tokio::test]
    async fn test_cancelled_clone_stops() {
        let p = Pusher::new();
        let root = p
            .put(Payload::directory(p.header(None), "repo").seal(100_000).unwrap().into_bytes())
            .await;
        let token = CancellationToken::new();
        token.cancel();
        let dest = TempDir::new().unwrap();
        let err = p
            .pipeline()
            .with_cancellation(token)
            .run(&root, dest.path())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled));
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("a.txt").is_ok());
        assert!(validate_name(".hidden").is_ok());
        assert!(validate_name("..").is_err());
        assert!(validate_name("a/b").is_err());
        assert!(validate_name("a\\b").is_err());
        assert!(validate_name("").is_err());
    }
}

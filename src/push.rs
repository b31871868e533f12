//! Push pipeline
//!
//! Mirrors the workspace onto the ledger in one pass:
//!
//! `Stage → Estimate → Confirm → BroadcastFunding → AwaitPropagation →
//! AwaitMempoolHeadroom → SendTree → PersistCache → Done`
//!
//! Nothing is written locally unless every transaction went out. A failed
//! run may leave transactions on chain; the next run re-estimates the whole
//! tree and sends it again under the same key paths.

pub mod confirm;
pub mod estimate;
pub mod stage;

pub use confirm::{format_fee, AutoConfirm, Confirm, Decline, FeeSummary};
pub use estimate::{FeePlan, PayloadLimits, TreeEstimator};
pub use stage::{stage_tree, StageSummary};

use crate::chain::{ChainClient, ChainIndexClient};
use crate::codec::SealedScript;
use crate::config::PushSettings;
use crate::error::PipelineError;
use crate::fee::FeeEstimator;
use crate::funding::{FundingTx, FundingTxBuilder};
use crate::ignore::IgnoreList;
use crate::keys::{Address, ExtendedPrivateKey, KeyPath};
use crate::poll::Poller;
use crate::store::{CacheStore, FundingKeyFile, JsonCacheStore, MetanetCache, PackageInfo, WorkspacePaths};
use crate::tree::{Node, NodeKind, Walker};
use crate::tx::{sign_input, Transaction, TxOut, Utxo};
use crate::types::{ConfirmedId, TxRef};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Pipeline states, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushPhase {
    Stage,
    Estimate,
    Confirm,
    BroadcastFunding,
    AwaitPropagation,
    AwaitMempoolHeadroom,
    SendTree,
    PersistCache,
    Done,
}

impl fmt::Display for PushPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PushPhase::Stage => "stage",
            PushPhase::Estimate => "estimate",
            PushPhase::Confirm => "confirm",
            PushPhase::BroadcastFunding => "broadcast funding",
            PushPhase::AwaitPropagation => "await propagation",
            PushPhase::AwaitMempoolHeadroom => "await mempool headroom",
            PushPhase::SendTree => "send tree",
            PushPhase::PersistCache => "persist cache",
            PushPhase::Done => "done",
        };
        f.write_str(name)
    }
}

/// What a sent transaction carried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SentKind {
    Directory,
    File,
    ChunkedFile,
    /// Zero-based position of the part within its file
    ChunkPart(usize),
}

impl From<NodeKind> for SentKind {
    fn from(kind: NodeKind) -> Self {
        match kind {
            NodeKind::Directory => SentKind::Directory,
            NodeKind::File => SentKind::File,
            NodeKind::ChunkedFile => SentKind::ChunkedFile,
        }
    }
}

/// One broadcast node or chunk transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentTransaction {
    pub key_path: KeyPath,
    pub name: String,
    pub kind: SentKind,
    pub tx_id: ConfirmedId,
}

/// Result of a completed push
#[derive(Debug, Clone)]
pub struct PushReport {
    pub funding_tx_id: ConfirmedId,
    /// Same transaction as the funding one: the root rides in output 0.
    pub root_tx_id: ConfirmedId,
    pub sent: Vec<SentTransaction>,
    pub fees: FeeSummary,
    pub staged: StageSummary,
}

#[derive(Debug, Clone)]
pub enum PushOutcome {
    Completed(PushReport),
    /// The operator declined; nothing was broadcast or written.
    Aborted(FeeSummary),
}

/// Progress callbacks for front-ends. Every method defaults to a no-op.
pub trait PushObserver: Send + Sync {
    fn phase(&self, _phase: PushPhase) {}
    fn sent(&self, _tx: &SentTransaction) {}
}

struct SilentObserver;

impl PushObserver for SilentObserver {}

/// Everything a push reads from disk, loaded after preflight
pub struct PushWorkspace {
    pub paths: WorkspacePaths,
    pub cache: MetanetCache,
    pub funding_key: ExtendedPrivateKey,
    pub ignore: IgnoreList,
    pub root_name: String,
    store: JsonCacheStore,
}

impl PushWorkspace {
    /// Check every required path, then load the cache, keys and ignore list.
    pub fn load(paths: WorkspacePaths) -> Result<Self, PipelineError> {
        paths.preflight()?;
        let store = JsonCacheStore::new(paths.cache_file());
        let cache = store.load()?;
        let funding_key = FundingKeyFile::load(&paths.funding_key_file())?.funding_key()?;
        let ignore = IgnoreList::load(&paths.workspace_root)?;
        let root_name = PackageInfo::load(&paths.package_file())?.root_name(&paths.workspace_root);
        Ok(Self {
            paths,
            cache,
            funding_key,
            ignore,
            root_name,
            store,
        })
    }

    pub fn funding_address(&self) -> Address {
        self.funding_key.address()
    }
}

/// Per-run references threaded through SendTree
struct SendContext<'a> {
    master_key: &'a ExtendedPrivateKey,
    funding: &'a FundingTx,
    funding_id: &'a ConfirmedId,
}

type SendFuture<'a> = Pin<Box<dyn Future<Output = Result<(), PipelineError>> + Send + 'a>>;

pub struct PushPipeline {
    settings: PushSettings,
    chain: Arc<dyn ChainClient>,
    index: Arc<dyn ChainIndexClient>,
    poller: Poller,
    confirm: Box<dyn Confirm>,
    observer: Box<dyn PushObserver>,
}

impl PushPipeline {
    pub fn new(
        settings: PushSettings,
        chain: Arc<dyn ChainClient>,
        index: Arc<dyn ChainIndexClient>,
        poller: Poller,
    ) -> Self {
        Self {
            settings,
            chain,
            index,
            poller,
            confirm: Box::new(AutoConfirm),
            observer: Box::new(SilentObserver),
        }
    }

    pub fn with_confirm(mut self, confirm: Box<dyn Confirm>) -> Self {
        self.confirm = confirm;
        self
    }

    pub fn with_observer(mut self, observer: Box<dyn PushObserver>) -> Self {
        self.observer = observer;
        self
    }

    fn enter(&self, phase: PushPhase) {
        info!(%phase, "Push phase");
        self.observer.phase(phase);
    }

    /// Run every phase against `workspace`.
    #[instrument(skip_all, fields(workspace = %workspace.paths.workspace_root.display()))]
    pub async fn run(&self, workspace: &mut PushWorkspace) -> Result<PushOutcome, PipelineError> {
        let PushWorkspace {
            paths,
            cache,
            funding_key,
            ignore,
            root_name,
            store,
        } = workspace;
        let master_key = &cache.master_key;
        let root = &mut cache.root;

        self.enter(PushPhase::Stage);
        root.name = root_name.clone();
        let walker = Walker::new(ignore);
        let staged = stage_tree(root, &paths.workspace_root, &walker, self.settings.max_file_size)?;
        debug!(?staged, "Staged workspace");

        self.enter(PushPhase::Estimate);
        let estimator = TreeEstimator::new(
            master_key,
            FeeEstimator::new(
                self.settings.fee_rate_per_byte,
                self.settings.minimum_output_value,
                self.settings.max_script_size,
            ),
            PayloadLimits {
                max_file_size: self.settings.max_file_size,
                gzip_threshold: self.settings.gzip_threshold,
            },
        );
        let plan = estimator.estimate(root)?;
        let root_script = self.seal_root(root)?;
        let funding = self
            .build_funding(master_key, funding_key, &plan, &root_script)
            .await?;

        self.enter(PushPhase::Confirm);
        let fees = FeeSummary {
            node_fees: plan.node_fees(),
            transactions: plan.entries.len(),
            funding_fee: funding
                .fee
                .max(self.settings.minimum_output_value),
        };
        if !self.confirm.confirm(&fees)? {
            info!("Push declined by operator");
            root.clear_staging();
            return Ok(PushOutcome::Aborted(fees));
        }
        self.poller.check_cancelled()?;

        self.enter(PushPhase::BroadcastFunding);
        let funding_id = self.chain.broadcast(&funding.tx.to_hex()).await?;
        info!(tx_id = %funding_id, "Funding transaction accepted");
        root.tx_id = Some(TxRef::Confirmed(funding_id.clone()));

        self.enter(PushPhase::AwaitPropagation);
        self.await_visible(&funding_id).await?;

        self.enter(PushPhase::AwaitMempoolHeadroom);
        self.await_headroom(&funding_key.address()).await?;

        self.enter(PushPhase::SendTree);
        let ctx = SendContext {
            master_key,
            funding: &funding,
            funding_id: &funding_id,
        };
        let mut sent = Vec::new();
        self.send_children(&ctx, root, &mut sent).await?;

        self.enter(PushPhase::PersistCache);
        root.clear_staging();
        store.save(cache)?;

        self.enter(PushPhase::Done);
        Ok(PushOutcome::Completed(PushReport {
            root_tx_id: funding_id.clone(),
            funding_tx_id: funding_id,
            sent,
            fees,
            staged,
        }))
    }

    fn seal_root(&self, root: &Node) -> Result<SealedScript, PipelineError> {
        let payload = root
            .staging
            .as_ref()
            .and_then(|s| s.payload.as_ref())
            .ok_or_else(|| PipelineError::Format("root was not estimated".to_string()))?;
        Ok(payload.seal(self.settings.max_script_size)?)
    }

    async fn build_funding(
        &self,
        master_key: &ExtendedPrivateKey,
        funding_key: &ExtendedPrivateKey,
        plan: &FeePlan,
        root_script: &SealedScript,
    ) -> Result<FundingTx, PipelineError> {
        let funding_address = funding_key.address();
        let utxos: Vec<Utxo> = self
            .chain
            .unspent_outputs(&funding_address)
            .await?
            .iter()
            .map(|u| u.to_utxo(&funding_address))
            .collect();
        debug!(address = %funding_address, utxos = utxos.len(), "Funding outputs");

        FundingTxBuilder::new(
            master_key,
            funding_key,
            self.settings.fee_rate_per_byte,
            self.settings.minimum_output_value,
        )
        .build(&plan.entries, Some(root_script), &utxos)
    }

    async fn await_visible(&self, tx_id: &ConfirmedId) -> Result<(), PipelineError> {
        let index = &self.index;
        self.poller
            .until("funding transaction to appear", || async move {
                Ok::<_, PipelineError>(index.is_visible(tx_id).await?.then_some(()))
            })
            .await
    }

    async fn await_headroom(&self, funding_address: &Address) -> Result<(), PipelineError> {
        let index = &self.index;
        let limit = self.settings.ancestor_limit;
        self.poller
            .until("unconfirmed ancestors to drain", || async move {
                let unconfirmed = index.unconfirmed_outputs(funding_address).await?;
                debug!(unconfirmed, limit, "Unconfirmed outputs from funding address");
                Ok::<_, PipelineError>((unconfirmed < limit).then_some(()))
            })
            .await
    }

    async fn await_funding_output(
        &self,
        address: &Address,
        funding_id: &ConfirmedId,
        vout: u32,
    ) -> Result<Utxo, PipelineError> {
        let chain = &self.chain;
        let what = format!("funding output {}:{}", funding_id, vout);
        self.poller
            .until(&what, || async move {
                let unspent = chain.unspent_outputs(address).await?;
                Ok::<_, PipelineError>(unspent
                    .into_iter()
                    .find(|u| &u.tx_id == funding_id && u.vout == vout)
                    .map(|u| u.to_utxo(address)))
            })
            .await
    }

    /// Pre-order over unremoved children. Only directories are descended into.
    fn send_children<'a>(
        &'a self,
        ctx: &'a SendContext<'a>,
        parent: &'a mut Node,
        sent: &'a mut Vec<SentTransaction>,
    ) -> SendFuture<'a> {
        Box::pin(async move {
            let parent_key_path = parent.key_path.clone();
            let parent_id = parent
                .tx_id
                .as_ref()
                .and_then(TxRef::confirmed)
                .cloned()
                .ok_or_else(|| {
                    PipelineError::UnsealedPayload(format!(
                        "{} has no confirmed transaction id",
                        parent_key_path
                    ))
                })?;

            for name in parent.unremoved_child_names() {
                self.poller.check_cancelled()?;
                let Some(child) = parent.child_mut(&name) else {
                    continue;
                };
                self.send_node(ctx, &parent_key_path, &parent_id, child, sent)
                    .await?;
                if child.kind == NodeKind::Directory {
                    self.send_children(ctx, child, sent).await?;
                }
            }
            Ok(())
        })
    }

    /// Send one node, its chunk parts first.
    async fn send_node(
        &self,
        ctx: &SendContext<'_>,
        parent_key_path: &KeyPath,
        parent_id: &ConfirmedId,
        node: &mut Node,
        sent: &mut Vec<SentTransaction>,
    ) -> Result<(), PipelineError> {
        let parent_key = ctx.master_key.derive_path(parent_key_path)?;
        let parent_address = parent_key.address();
        let max_script_size = self.settings.max_script_size;

        let staging = node
            .staging
            .as_mut()
            .ok_or_else(|| PipelineError::Format(format!("{} was not staged", node.key_path)))?;
        let slot = staging
            .slot
            .ok_or_else(|| PipelineError::Format(format!("{} has no funding slot", node.key_path)))?;
        let mut payload = staging
            .payload
            .take()
            .ok_or_else(|| PipelineError::Format(format!("{} was not estimated", node.key_path)))?;

        if node.kind == NodeKind::ChunkedFile {
            let mut chunk_ids = Vec::with_capacity(staging.parts.len());
            for (position, part) in staging.parts.iter_mut().enumerate() {
                let script = part.payload.seal(max_script_size)?;
                let vout = ctx.funding.vout_for_slot(part.slot);
                let tx_id = self
                    .send_data(ctx, &parent_key, &parent_address, vout, script)
                    .await?;
                debug!(key_path = %node.key_path, part = position, %tx_id, "Sent chunk part");
                part.tx_id = Some(tx_id.clone());
                let record = SentTransaction {
                    key_path: node.key_path.clone(),
                    name: node.name.clone(),
                    kind: SentKind::ChunkPart(position),
                    tx_id: tx_id.clone(),
                };
                self.observer.sent(&record);
                sent.push(record);
                chunk_ids.push(tx_id);
            }
            payload.set_chunk_ids(chunk_ids)?;
        }

        payload.set_parent(TxRef::Confirmed(parent_id.clone()));
        let script = payload.seal(max_script_size)?;
        let vout = ctx.funding.vout_for_slot(slot);
        let tx_id = self
            .send_data(ctx, &parent_key, &parent_address, vout, script)
            .await?;
        staging.payload = Some(payload);
        info!(key_path = %node.key_path, name = %node.name, %tx_id, "Sent node");

        node.tx_id = Some(TxRef::Confirmed(tx_id.clone()));
        let record = SentTransaction {
            key_path: node.key_path.clone(),
            name: node.name.clone(),
            kind: node.kind.into(),
            tx_id,
        };
        self.observer.sent(&record);
        sent.push(record);
        Ok(())
    }

    /// Spend the funding output at `vout` into a single data output.
    async fn send_data(
        &self,
        ctx: &SendContext<'_>,
        key: &ExtendedPrivateKey,
        address: &Address,
        vout: u32,
        script: SealedScript,
    ) -> Result<ConfirmedId, PipelineError> {
        let utxo = self.await_funding_output(address, ctx.funding_id, vout).await?;
        let mut tx = Transaction::default();
        tx.add_input(&utxo);
        tx.add_output(TxOut::data(script.into_bytes()));
        sign_input(&mut tx, 0, &utxo, key)?;
        self.chain.broadcast(&tx.to_hex()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MemoryLedger;
    use crate::keys::Network;
    use crate::poll::InstantClock;
    use crate::types::Satoshis;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    struct Fixture {
        _workspace: TempDir,
        _home: TempDir,
        ledger: Arc<MemoryLedger>,
        workspace: PushWorkspace,
    }

    fn fixture(funds: Satoshis) -> Fixture {
        let workspace_dir = TempDir::new().unwrap();
        let home_dir = TempDir::new().unwrap();
        let paths = WorkspacePaths::new(
            workspace_dir.path().to_path_buf(),
            home_dir.path().to_path_buf(),
        );

        let master = ExtendedPrivateKey::from_seed(Network::Mainnet, &[11u8; 32]).unwrap();
        let funding_root = ExtendedPrivateKey::from_seed(Network::Mainnet, &[12u8; 32]).unwrap();
        fs::create_dir_all(paths.home_dir()).unwrap();
        fs::write(
            paths.funding_key_file(),
            format!(
                r#"{{"xprv":"{}","derivationPath":"m/0/0"}}"#,
                funding_root.to_extended_string()
            ),
        )
        .unwrap();
        JsonCacheStore::new(paths.cache_file())
            .save(&MetanetCache::new(master, Node::root("")))
            .unwrap();
        fs::write(paths.ignore_file(), ".metapushignore\nmetapush.json\n").unwrap();
        fs::write(paths.package_file(), r#"{"name":"demo"}"#).unwrap();
        fs::write(workspace_dir.path().join("a.txt"), "hello").unwrap();

        let workspace = PushWorkspace::load(paths).unwrap();
        let ledger = Arc::new(MemoryLedger::new());
        if funds > 0 {
            ledger.fund(&workspace.funding_address(), funds);
        }
        Fixture {
            _workspace: workspace_dir,
            _home: home_dir,
            ledger,
            workspace,
        }
    }

    fn pipeline(ledger: &Arc<MemoryLedger>, clock: Arc<InstantClock>) -> PushPipeline {
        pipeline_with_attempts(ledger, clock, 50)
    }

    fn pipeline_with_attempts(
        ledger: &Arc<MemoryLedger>,
        clock: Arc<InstantClock>,
        max_attempts: u32,
    ) -> PushPipeline {
        PushPipeline::new(
            PushSettings::default(),
            ledger.clone(),
            ledger.clone(),
            Poller::new(
                clock,
                Duration::from_secs(1),
                Some(max_attempts),
                CancellationToken::new(),
            ),
        )
    }

    /// Address of the root key, which every top-level fee slot pays.
    fn root_key_address(workspace: &PushWorkspace) -> Address {
        workspace
            .cache
            .master_key
            .derive_path(&KeyPath::root())
            .unwrap()
            .address()
    }

    #[tokio::test]
    async fn test_push_single_file() {
        let mut f = fixture(100_000);
        let outcome = pipeline(&f.ledger, Arc::new(InstantClock::new()))
            .run(&mut f.workspace)
            .await
            .unwrap();

        let PushOutcome::Completed(report) = outcome else {
            panic!("push was not completed");
        };
        assert_eq!(report.sent.len(), 1);
        assert_eq!(report.sent[0].name, "a.txt");
        assert_eq!(f.ledger.broadcasts().len(), 2);
        assert_eq!(f.ledger.broadcasts()[0], report.funding_tx_id);

        let saved = JsonCacheStore::new(f.workspace.paths.cache_file()).load().unwrap();
        assert_eq!(saved.root.name, "demo");
        assert_eq!(
            saved.root.tx_id,
            Some(TxRef::Confirmed(report.root_tx_id.clone()))
        );
        assert_eq!(
            saved.root.child("a.txt").unwrap().tx_id,
            Some(TxRef::Confirmed(report.sent[0].tx_id.clone()))
        );
    }

    #[tokio::test]
    async fn test_declined_push_writes_nothing() {
        let mut f = fixture(100_000);
        let before = fs::read_to_string(f.workspace.paths.cache_file()).unwrap();
        let outcome = pipeline(&f.ledger, Arc::new(InstantClock::new()))
            .with_confirm(Box::new(Decline))
            .run(&mut f.workspace)
            .await
            .unwrap();

        assert!(matches!(outcome, PushOutcome::Aborted(summary) if summary.transactions == 1));
        assert!(f.ledger.broadcasts().is_empty());
        assert_eq!(fs::read_to_string(f.workspace.paths.cache_file()).unwrap(), before);
    }

    #[tokio::test]
    async fn test_no_funds_is_insufficient() {
        let mut f = fixture(0);
        let err = pipeline(&f.ledger, Arc::new(InstantClock::new()))
            .run(&mut f.workspace)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::InsufficientFunds { .. }));
    }

    #[tokio::test]
    async fn test_rejected_funding_halts_before_persist() {
        let mut f = fixture(100_000);
        let before = fs::read_to_string(f.workspace.paths.cache_file()).unwrap();
        f.ledger.reject_next_broadcast("dust");
        let err = pipeline(&f.ledger, Arc::new(InstantClock::new()))
            .run(&mut f.workspace)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::BroadcastRejected { ref reason, .. } if reason == "dust"));
        assert_eq!(fs::read_to_string(f.workspace.paths.cache_file()).unwrap(), before);
    }

    #[tokio::test]
    async fn test_waits_are_polled() {
        let mut f = fixture(100_000);
        f.ledger.delay_visibility(2);
        f.ledger.script_unconfirmed_counts([30, 26, 3]);
        let clock = Arc::new(InstantClock::new());
        let outcome = pipeline(&f.ledger, clock.clone())
            .run(&mut f.workspace)
            .await
            .unwrap();
        assert!(matches!(outcome, PushOutcome::Completed(_)));
        assert_eq!(clock.sleeps(), 4);
    }

    #[tokio::test]
    async fn test_late_fee_slot_is_polled_until_visible() {
        let mut f = fixture(100_000);
        f.ledger.delay_unspent_for(&root_key_address(&f.workspace), 3);
        let clock = Arc::new(InstantClock::new());
        let outcome = pipeline(&f.ledger, clock.clone())
            .run(&mut f.workspace)
            .await
            .unwrap();

        let PushOutcome::Completed(report) = outcome else {
            panic!("push was not completed");
        };
        assert_eq!(report.sent.len(), 1);
        assert_eq!(clock.sleeps(), 3);
    }

    #[tokio::test]
    async fn test_fee_slot_that_never_appears_exhausts_and_keeps_cache() {
        let mut f = fixture(100_000);
        let before = fs::read_to_string(f.workspace.paths.cache_file()).unwrap();
        f.ledger.delay_unspent_for(&root_key_address(&f.workspace), 3);
        let err = pipeline_with_attempts(&f.ledger, Arc::new(InstantClock::new()), 2)
            .run(&mut f.workspace)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::PollExhausted { attempts: 2, .. }));
        assert_eq!(f.ledger.broadcasts().len(), 1);
        assert_eq!(fs::read_to_string(f.workspace.paths.cache_file()).unwrap(), before);
    }

    #[test]
    fn test_preflight_runs_before_loading() {
        let workspace = TempDir::new().unwrap();
        let home = TempDir::new().unwrap();
        let paths = WorkspacePaths::new(workspace.path().to_path_buf(), home.path().to_path_buf());
        assert!(matches!(
            PushWorkspace::load(paths),
            Err(PipelineError::ConfigurationMissing { .. })
        ));
    }
}

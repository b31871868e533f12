//! Shared fixtures: a workspace with cache, keys and ignore list, a funded
//! in-memory ledger, and a pipeline that never really sleeps.

use metapush::chain::MemoryLedger;
use metapush::config::PushSettings;
use metapush::keys::{ExtendedPrivateKey, Network};
use metapush::poll::{InstantClock, Poller};
use metapush::push::{PushOutcome, PushPipeline, PushReport, PushWorkspace};
use metapush::store::{CacheStore, JsonCacheStore, MetanetCache, WorkspacePaths};
use metapush::tree::Node;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

pub struct TestWorkspace {
    pub workspace_dir: TempDir,
    pub home_dir: TempDir,
    pub ledger: Arc<MemoryLedger>,
}

impl TestWorkspace {
    /// Empty workspace named `name` with a funded key.
    pub fn new(name: &str, funds: u64) -> Self {
        let workspace_dir = TempDir::new().unwrap();
        let home_dir = TempDir::new().unwrap();
        let paths = WorkspacePaths::new(
            workspace_dir.path().to_path_buf(),
            home_dir.path().to_path_buf(),
        );

        let master = ExtendedPrivateKey::from_seed(Network::Mainnet, &[31u8; 32]).unwrap();
        let funding_root = ExtendedPrivateKey::from_seed(Network::Mainnet, &[32u8; 32]).unwrap();
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
        fs::write(paths.package_file(), format!(r#"{{"name":"{}"}}"#, name)).unwrap();

        let ledger = Arc::new(MemoryLedger::new());
        let workspace = Self {
            workspace_dir,
            home_dir,
            ledger,
        };
        let address = workspace.load().funding_address();
        workspace.ledger.fund(&address, funds);
        workspace
    }

    pub fn root(&self) -> &Path {
        self.workspace_dir.path()
    }

    pub fn paths(&self) -> WorkspacePaths {
        WorkspacePaths::new(
            self.workspace_dir.path().to_path_buf(),
            self.home_dir.path().to_path_buf(),
        )
    }

    pub fn load(&self) -> PushWorkspace {
        PushWorkspace::load(self.paths()).unwrap()
    }

    pub fn write(&self, relative: &str, contents: &[u8]) {
        let path = self.root().join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    pub fn cache(&self) -> MetanetCache {
        JsonCacheStore::new(self.paths().cache_file()).load().unwrap()
    }

    pub fn pipeline(&self) -> PushPipeline {
        PushPipeline::new(
            PushSettings::default(),
            self.ledger.clone(),
            self.ledger.clone(),
            Poller::new(
                Arc::new(InstantClock::new()),
                Duration::from_secs(1),
                Some(100),
                CancellationToken::new(),
            ),
        )
    }

    /// Push with auto-confirm and return the report.
    pub async fn push(&self) -> PushReport {
        let mut workspace = self.load();
        match self.pipeline().run(&mut workspace).await.unwrap() {
            PushOutcome::Completed(report) => report,
            PushOutcome::Aborted(_) => panic!("push was aborted"),
        }
    }
}

/// Deterministic incompressible bytes.
pub fn noise(len: usize, seed: u64) -> Vec<u8> {
    let mut state = seed | 1;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state >> 24) as u8
        })
        .collect()
}

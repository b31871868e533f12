//! CLI route: run context and the command table. Builds clients, runs a
//! pipeline on a tokio runtime, and formats its result.

use crate::chain::{ChainClient, ChainIndexClient, HttpChainClient, HttpIndexClient};
use crate::cli::output::{format_clone_report, format_push_report};
use crate::cli::parse::Commands;
use crate::clone::ClonePipeline;
use crate::config::{ConfigLoader, MetapushConfig};
use crate::error::PipelineError;
use crate::poll::{Poller, TokioClock};
use crate::push::{
    format_fee, AutoConfirm, Confirm, FeeSummary, PushObserver, PushOutcome, PushPhase,
    PushPipeline, PushWorkspace, SentKind, SentTransaction,
};
use crate::store::WorkspacePaths;
use crate::types::ConfirmedId;
use owo_colors::OwoColorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Runtime context for CLI execution: workspace root and loaded config.
pub struct RunContext {
    workspace_root: PathBuf,
    config: MetapushConfig,
}

impl RunContext {
    /// Load and validate configuration for `workspace_root`.
    pub fn new(workspace_root: PathBuf, config_path: Option<PathBuf>) -> Result<Self, PipelineError> {
        let config = match config_path {
            Some(ref path) => ConfigLoader::load_from_file(path)?,
            None => ConfigLoader::load(&workspace_root)?,
        };
        config
            .validate()
            .map_err(|errors| PipelineError::Config(errors.join("; ")))?;
        Ok(Self {
            workspace_root,
            config,
        })
    }

    pub fn config(&self) -> &MetapushConfig {
        &self.config
    }

    /// Execute a CLI command.
    pub fn execute(&self, command: &Commands) -> Result<String, PipelineError> {
        let started = Instant::now();
        let runtime = tokio::runtime::Runtime::new()?;
        let result = runtime.block_on(async {
            let cancel = cancel_on_ctrl_c();
            match command {
                Commands::Push { yes } => self.push(*yes, cancel).await,
                Commands::Clone { tx_id, dest } => self.clone_tree(tx_id, dest, cancel).await,
            }
        });
        info!(
            command = command.name(),
            ok = result.is_ok(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Command finished"
        );
        result
    }

    async fn push(&self, yes: bool, cancel: CancellationToken) -> Result<String, PipelineError> {
        let paths = WorkspacePaths::for_current_user(self.workspace_root.clone())?;
        let mut workspace = PushWorkspace::load(paths)?;
        println!("Funding address: {}", workspace.funding_address());

        let settings = self.config.push.clone();
        let (chain, index) = self.clients()?;
        let poller = Poller::new(
            Arc::new(TokioClock),
            settings.poll_interval(),
            settings.poll_max_attempts,
            cancel,
        );
        let confirm: Box<dyn Confirm> = if yes {
            Box::new(AutoConfirm)
        } else {
            Box::new(PromptConfirm)
        };
        let pipeline = PushPipeline::new(settings, chain, index, poller)
            .with_confirm(confirm)
            .with_observer(Box::new(ConsoleObserver));

        match pipeline.run(&mut workspace).await? {
            PushOutcome::Completed(report) => {
                let link = self.config.chain.viewer_link(report.funding_tx_id.as_str());
                Ok(format_push_report(&report, &link))
            }
            PushOutcome::Aborted(summary) => Ok(format!(
                "Push cancelled, nothing was sent (fee would have been {})",
                format_fee(summary.total())
            )),
        }
    }

    async fn clone_tree(
        &self,
        tx_id: &str,
        dest: &Path,
        cancel: CancellationToken,
    ) -> Result<String, PipelineError> {
        let tx_id = ConfirmedId::parse(tx_id.trim())?;
        let (chain, index) = self.clients()?;
        let report = ClonePipeline::new(chain, index)
            .with_cancellation(cancel)
            .run(&tx_id, dest)
            .await?;
        if !report.is_complete() {
            warn!(failures = report.failures.len(), "Clone finished with failures");
        }
        Ok(format_clone_report(&report))
    }

    fn clients(&self) -> Result<(Arc<dyn ChainClient>, Arc<dyn ChainIndexClient>), PipelineError> {
        let chain = HttpChainClient::from_settings(&self.config.chain)?;
        let index = HttpIndexClient::from_settings(&self.config.chain)?;
        Ok((Arc::new(chain), Arc::new(index)))
    }
}

/// Token cancelled on the first Ctrl-C; polling loops and tree walks stop at
/// their next check.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupted, stopping");
            token.cancel();
        }
    });
    cancel
}

/// Interactive fee approval
struct PromptConfirm;

impl Confirm for PromptConfirm {
    fn confirm(&self, summary: &FeeSummary) -> Result<bool, PipelineError> {
        use dialoguer::Confirm as Prompt;
        println!(
            "{} transaction(s), funding fee {}",
            summary.transactions,
            format_fee(summary.funding_fee)
        );
        Prompt::new()
            .with_prompt(format!("Total fee {}. Continue?", format_fee(summary.total())))
            .default(false)
            .interact()
            .map_err(|e| PipelineError::Config(format!("Failed to get user input: {}", e)))
    }
}

/// Prints phases and sent transactions as they happen.
struct ConsoleObserver;

impl PushObserver for ConsoleObserver {
    fn phase(&self, phase: PushPhase) {
        match phase {
            PushPhase::Confirm | PushPhase::Done => {}
            PushPhase::AwaitPropagation => {
                println!("{} waiting for the funding transaction to propagate", "…".cyan())
            }
            PushPhase::AwaitMempoolHeadroom => {
                println!("{} waiting for mempool headroom", "…".cyan())
            }
            other => println!("{} {}", "→".cyan(), other),
        }
    }

    fn sent(&self, tx: &SentTransaction) {
        let what = match tx.kind {
            SentKind::ChunkPart(i) => format!("{} (chunk {})", tx.name, i + 1),
            _ => tx.name.clone(),
        };
        println!("  {} {} {}", "✓".green(), what, tx.tx_id.to_string().dimmed());
    }
}

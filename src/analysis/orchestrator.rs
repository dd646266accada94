//! Parallel palace analysis with disconnect cancellation.
//!
//! Every palace gets its own task that composes a prompt and awaits the LLM.
//! A watcher polls the disconnect probe alongside them; when the consumer
//! leaves, a shared cancellation token stops every task still waiting on
//! its LLM call and the whole batch reports [`AnalysisError::ClientGone`].

use super::probe::DisconnectProbe;
use crate::llm::{ChatClient, ChatMessage};
use crate::models::{Chart, Palace, PalaceReport};
use crate::prompt::AnalysisPromptComposer;
use indicatif::ProgressBar;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Default interval between disconnect checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Reply text used when the model answers with nothing.
pub const EMPTY_REPLY: &str = "Analysis generation failed.";

/// Batch-level failures. Per-palace LLM failures never show up here.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// The consumer went away before every palace finished.
    #[error("client closed request")]
    ClientGone,

    #[error("palace analysis task failed: {0}")]
    TaskFailed(String),
}

/// Runs one analysis per palace concurrently.
pub struct AnalysisOrchestrator {
    llm: Arc<dyn ChatClient>,
    composer: AnalysisPromptComposer,
    poll_interval: Duration,
    progress: Option<ProgressBar>,
}

impl AnalysisOrchestrator {
    pub fn new(llm: Arc<dyn ChatClient>, composer: AnalysisPromptComposer) -> Self {
        Self {
            llm,
            composer,
            poll_interval: DEFAULT_POLL_INTERVAL,
            progress: None,
        }
    }

    /// Set how often the disconnect probe is polled.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Tick a progress bar as palaces complete.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Analyse every palace of the chart.
    ///
    /// Returns one report per palace in chart order, or
    /// [`AnalysisError::ClientGone`] if the probe fired before all of them
    /// finished. No task outlives this call.
    pub async fn analyze_all(
        &self,
        chart: &Chart,
        context: &str,
        probe: Arc<dyn DisconnectProbe>,
    ) -> Result<Vec<PalaceReport>, AnalysisError> {
        let palaces: Arc<[Palace]> = chart.palaces().into();
        info!("Analysing {} palaces", palaces.len());
        if palaces.is_empty() {
            return Ok(Vec::new());
        }

        let context: Arc<str> = context.into();
        let token = CancellationToken::new();

        let mut tasks = JoinSet::new();
        for index in 0..palaces.len() {
            let task = PalaceTask {
                index,
                palaces: Arc::clone(&palaces),
                context: Arc::clone(&context),
                composer: self.composer.clone(),
                llm: Arc::clone(&self.llm),
            };
            tasks.spawn(task.run_until_cancelled(token.clone()));
        }

        let mut watcher = JoinSet::new();
        watcher.spawn(watch_disconnect(probe, self.poll_interval, token.clone()));

        let mut slots: Vec<Option<PalaceReport>> = vec![None; palaces.len()];
        let mut failure = None;

        // Drain every task, so cancelled ones have fully stopped before we return.
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, Some(report))) => {
                    if let Some(ref pb) = self.progress {
                        pb.inc(1);
                    }
                    slots[index] = Some(report);
                }
                Ok((index, None)) => debug!("[Palace {}] Task stopped by cancellation", index),
                Err(e) => {
                    error!("Palace task failed: {}", e);
                    token.cancel();
                    failure.get_or_insert(AnalysisError::TaskFailed(e.to_string()));
                }
            }
        }

        watcher.shutdown().await;

        if let Some(e) = failure {
            return Err(e);
        }

        match slots.into_iter().collect::<Option<Vec<_>>>() {
            Some(reports) => {
                info!("Completed {} palace reports", reports.len());
                Ok(reports)
            }
            None => {
                info!("Analysis cancelled due to client disconnect");
                Err(AnalysisError::ClientGone)
            }
        }
    }
}

/// Poll the probe until it reports a disconnect, then cancel the token.
async fn watch_disconnect(
    probe: Arc<dyn DisconnectProbe>,
    interval: Duration,
    token: CancellationToken,
) {
    loop {
        if probe.is_disconnected().await {
            info!("Client disconnected, cancelling palace tasks");
            token.cancel();
            return;
        }
        tokio::time::sleep(interval).await;
    }
}

/// Work item for a single palace.
struct PalaceTask {
    index: usize,
    palaces: Arc<[Palace]>,
    context: Arc<str>,
    composer: AnalysisPromptComposer,
    llm: Arc<dyn ChatClient>,
}

impl PalaceTask {
    /// Run the analysis unless the token fires first; `None` means cancelled.
    async fn run_until_cancelled(
        self,
        token: CancellationToken,
    ) -> (usize, Option<PalaceReport>) {
        let index = self.index;
        tokio::select! {
            report = self.run() => (index, Some(report)),
            _ = token.cancelled() => (index, None),
        }
    }

    async fn run(&self) -> PalaceReport {
        let name = self.palaces[self.index].display_name(self.index);
        let prompt = self
            .composer
            .compose(self.index, &self.palaces, &self.context);

        info!("[Palace {}] Calling LLM for {}...", self.index, name);
        match self.llm.chat(vec![ChatMessage::user(prompt)]).await {
            Ok(text) if text.trim().is_empty() => {
                info!("[Palace {}] Empty LLM reply for {}", self.index, name);
                PalaceReport::new(name, self.index, EMPTY_REPLY.to_string())
            }
            Ok(text) => {
                info!(
                    "[Palace {}] LLM response received, length: {}",
                    self.index,
                    text.chars().count()
                );
                PalaceReport::new(name, self.index, text)
            }
            Err(e) => {
                error!(
                    "[Palace {}] LLM analysis failed for {}: {}",
                    self.index, name, e
                );
                PalaceReport::failed(name, self.index, e.to_string())
            }
        }
    }
}

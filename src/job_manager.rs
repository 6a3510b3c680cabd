//! Drives a [`Harvest`] over a work domain: `Enumerate`, then `RetryNulls`,
//! then `Cleanup`.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use log::{error, info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::delay_manager;
use crate::error::Result;
use crate::fetcher::FetchFailure;
use crate::hooks::{HookQueue, SaveHook};
use crate::progress::{Mark, ProgressReporter, ProgressSettings, Tally};
use crate::resume_manager::CheckpointStore;
use crate::work::WorkItem;

/// Which attempt an item is getting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    Enumerate,
    RetryNulls,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Enumerate,
    RetryNulls,
    Cleanup,
}

/// What one fetch + validate produced.
#[derive(Debug)]
pub enum Resolution<R> {
    Resolved(R),
    /// Fetched, but nothing acceptable came back.
    Rejected(String),
    Failed(FetchFailure),
}

/// One kind of harvesting job: how to turn a work item into a record.
#[async_trait]
pub trait Harvest: Send + Sync {
    type Item: WorkItem;
    type Record: Serialize + DeserializeOwned + Send;

    /// Name used in progress lines and commit messages.
    fn label(&self) -> &str;

    async fn harvest(&self, item: &Self::Item, pass: Pass) -> Resolution<Self::Record>;

    /// Detail shown on the status line of a resolved item.
    fn describe_record(&self, _record: &Self::Record) -> String {
        "resolved".to_string()
    }

    /// Called once for every attempt that leaves the item unresolved.
    fn on_unresolved(&self, _item: &Self::Item) {}
}

#[derive(Debug, Clone)]
pub struct RunSettings {
    pub concurrency: usize,
    pub max_items_per_run: Option<usize>,
    pub null_retry_budget: usize,
    pub progress: ProgressSettings,
    pub dispatch_pause_min: Duration,
    pub dispatch_pause_max: Duration,
}

impl Default for RunSettings {
    fn default() -> Self {
        RunSettings {
            concurrency: 4,
            max_items_per_run: None,
            null_retry_budget: 2000,
            progress: ProgressSettings::default(),
            dispatch_pause_min: Duration::from_millis(50),
            dispatch_pause_max: Duration::from_millis(300),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub phase: Phase,
    pub attempted: usize,
    pub resolved: usize,
    pub rejected: usize,
    pub failed: usize,
    pub retried: usize,
    pub retry_resolved: usize,
    pub purged: usize,
    pub capped: bool,
    pub interrupted: bool,
    pub elapsed: Duration,
}

impl RunSummary {
    fn absorb(&mut self, tally: Tally) {
        self.attempted += tally.done();
        self.resolved += tally.resolved;
        self.rejected += tally.rejected;
        self.failed += tally.failed;
    }
}

pub struct Scheduler<H: Harvest> {
    harvest: H,
    settings: RunSettings,
    hooks: Vec<Arc<dyn SaveHook>>,
}

impl<H: Harvest> Scheduler<H> {
    pub fn new(harvest: H, settings: RunSettings) -> Self {
        Scheduler {
            harvest,
            settings,
            hooks: Vec::new(),
        }
    }

    pub fn with_hook(mut self, hook: Arc<dyn SaveHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn harvest(&self) -> &H {
        &self.harvest
    }

    /// Runs all phases. `shutdown` resolving stops dispatching, drops work in
    /// flight and saves whatever has been applied so far.
    ///
    /// Save hooks run in the background; every queued hook has finished by
    /// the time this returns.
    pub async fn run<S>(
        &self,
        domain: &[H::Item],
        store: &mut CheckpointStore<H::Record>,
        shutdown: S,
    ) -> Result<RunSummary>
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let hooks = HookQueue::start(self.hooks.clone());
        let outcome = self.run_phases(domain, store, &mut shutdown, &hooks).await;
        hooks.finish().await;
        outcome
    }

    async fn run_phases<S>(
        &self,
        domain: &[H::Item],
        store: &mut CheckpointStore<H::Record>,
        shutdown: &mut Pin<&mut S>,
        hooks: &HookQueue,
    ) -> Result<RunSummary>
    where
        S: Future<Output = ()>,
    {
        let started = Instant::now();
        let mut summary = RunSummary::default();

        let pending: Vec<&H::Item> = domain.iter().filter(|i| !store.contains(&i.key())).collect();
        let deferred = domain.iter().filter(|i| store.is_unresolved(&i.key())).count();
        info!(
            "{}: {} in domain, {} already stored ({} unresolved, deferred to retry pass), {} new.",
            self.harvest.label(),
            domain.len(),
            domain.len() - pending.len(),
            deferred,
            pending.len()
        );

        let cap = self.settings.max_items_per_run.unwrap_or(usize::MAX);
        summary.capped = pending.len() > cap;
        let batch: Vec<&H::Item> = pending.into_iter().take(cap).collect();

        let (tally, interrupted) = self
            .drive(batch, Pass::Enumerate, store, shutdown, hooks)
            .await;
        summary.absorb(tally);
        if interrupted {
            return self.interrupted(store, summary, started, hooks);
        }

        // Unresolved keys stay on disk so the next run moves past them; they
        // are retried once the whole domain has been attempted.
        if summary.capped {
            info!(
                "Reached limit of {} items for this run; {} unresolved kept for the retry pass.",
                cap,
                store.unresolved_count()
            );
            self.checkpoint(
                store,
                &format!("{}: run limit reached ({} processed)", self.harvest.label(), summary.attempted),
                hooks,
            )?;
            summary.elapsed = started.elapsed();
            return Ok(summary);
        }

        if domain.iter().all(|i| store.contains(&i.key())) {
            summary.phase = Phase::RetryNulls;
            let retry: Vec<&H::Item> = domain
                .iter()
                .filter(|i| store.is_unresolved(&i.key()))
                .take(self.settings.null_retry_budget)
                .collect();
            if !retry.is_empty() {
                info!(
                    "Retrying {} of {} unresolved entries.",
                    retry.len(),
                    store.unresolved_count()
                );
                let (tally, interrupted) = self
                    .drive(retry, Pass::RetryNulls, store, shutdown, hooks)
                    .await;
                summary.retried = tally.done();
                summary.retry_resolved = tally.resolved;
                summary.absorb(tally);
                if interrupted {
                    return self.interrupted(store, summary, started, hooks);
                }
            }
        } else {
            warn!("Domain not fully attempted yet; retry pass deferred.");
        }

        summary.phase = Phase::Cleanup;
        summary.purged = store.purge_unresolved();
        self.checkpoint(
            store,
            &format!(
                "{}: final save, {} new, {} unresolved removed",
                self.harvest.label(),
                summary.resolved,
                summary.purged
            ),
            hooks,
        )?;
        store.verify_resolved_only()?;

        summary.elapsed = started.elapsed();
        info!(
            "{} done in {:.1}s: {} attempted, {} resolved, {} rejected, {} failed, {} removed, {} stored.",
            self.harvest.label(),
            summary.elapsed.as_secs_f64(),
            summary.attempted,
            summary.resolved,
            summary.rejected,
            summary.failed,
            summary.purged,
            store.len()
        );
        Ok(summary)
    }

    async fn drive<S>(
        &self,
        items: Vec<&H::Item>,
        pass: Pass,
        store: &mut CheckpointStore<H::Record>,
        shutdown: &mut Pin<&mut S>,
        hooks: &HookQueue,
    ) -> (Tally, bool)
    where
        S: Future<Output = ()>,
    {
        if items.is_empty() {
            return (Tally::default(), false);
        }

        let label = match pass {
            Pass::Enumerate => "Progress",
            Pass::RetryNulls => "Retry",
        };
        let mut reporter = ProgressReporter::new(label, items.len(), self.settings.progress.clone());

        let harvest = &self.harvest;
        let (pause_min, pause_max) = (self.settings.dispatch_pause_min, self.settings.dispatch_pause_max);
        let mut results = stream::iter(items)
            .map(|item| async move {
                delay_manager::dispatch_pause(pause_min, pause_max).await;
                let resolution = harvest.harvest(item, pass).await;
                (item, resolution)
            })
            .buffer_unordered(self.settings.concurrency.max(1));

        let mut interrupted = false;
        loop {
            tokio::select! {
                biased;
                _ = shutdown.as_mut() => {
                    warn!("Interrupted; stopping dispatch.");
                    interrupted = true;
                    break;
                }
                next = results.next() => match next {
                    Some((item, resolution)) => self.apply(item, resolution, store, &mut reporter),
                    None => break,
                },
            }

            let now = Instant::now();
            if reporter.checkpoint_due(now) {
                let message = format!(
                    "{}: checkpoint, {} resolved so far",
                    self.harvest.label(),
                    reporter.tally().resolved
                );
                if let Err(e) = self.checkpoint(store, &message, hooks) {
                    error!("Periodic checkpoint failed: {}", e);
                }
                reporter.checkpoint_taken(now);
            }
        }

        info!("{}", reporter.summary_line(Instant::now()));
        (reporter.tally(), interrupted)
    }

    fn apply(
        &self,
        item: &H::Item,
        resolution: Resolution<H::Record>,
        store: &mut CheckpointStore<H::Record>,
        reporter: &mut ProgressReporter,
    ) {
        let key = item.key();
        match resolution {
            Resolution::Resolved(record) => {
                let detail = self.harvest.describe_record(&record);
                store.mark_resolved(key.clone(), record);
                reporter.record(&key, Mark::Resolved, &detail);
            }
            Resolution::Rejected(reason) => {
                store.mark_unresolved(key.clone());
                self.harvest.on_unresolved(item);
                reporter.record(&key, Mark::Rejected, &format!("{} ({})", item.describe(), reason));
            }
            Resolution::Failed(failure) => {
                store.mark_unresolved(key.clone());
                self.harvest.on_unresolved(item);
                let mark = if failure.is_not_found() {
                    Mark::Rejected
                } else {
                    Mark::Failed
                };
                reporter.record(&key, mark, &format!("{} ({})", item.describe(), failure));
            }
        }
    }

    fn checkpoint(&self, store: &CheckpointStore<H::Record>, message: &str, hooks: &HookQueue) -> Result<()> {
        store.save()?;
        info!("[SAVED] {} entries to {:?}", store.len(), store.path());
        hooks.notify(store.path(), message);
        Ok(())
    }

    fn interrupted(
        &self,
        store: &CheckpointStore<H::Record>,
        mut summary: RunSummary,
        started: Instant,
        hooks: &HookQueue,
    ) -> Result<RunSummary> {
        summary.interrupted = true;
        summary.elapsed = started.elapsed();
        self.checkpoint(
            store,
            &format!("{}: interrupted run save", self.harvest.label()),
            hooks,
        )?;
        info!(
            "Interrupted after {} items; {} entries saved.",
            summary.attempted,
            store.len()
        );
        Ok(summary)
    }
}

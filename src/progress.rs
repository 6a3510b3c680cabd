use log::info;
use std::time::{Duration, Instant};

use crate::work::WorkKey;

/// How a finished item is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mark {
    Resolved,
    /// Fetched fine but nothing acceptable, or the remote said not found.
    Rejected,
    Failed,
}

impl Mark {
    fn symbol(self) -> &'static str {
        match self {
            Mark::Resolved => "✓",
            Mark::Rejected => "✗",
            Mark::Failed => "⚠",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub resolved: usize,
    pub rejected: usize,
    pub failed: usize,
}

impl Tally {
    pub fn done(&self) -> usize {
        self.resolved + self.rejected + self.failed
    }
}

#[derive(Debug, Clone)]
pub struct ProgressSettings {
    pub summary_every: usize,
    pub checkpoint_every_items: Option<usize>,
    pub checkpoint_every: Duration,
}

impl Default for ProgressSettings {
    fn default() -> Self {
        ProgressSettings {
            summary_every: 10,
            checkpoint_every_items: None,
            checkpoint_every: Duration::from_secs(15),
        }
    }
}

/// Throughput, ETA and checkpoint cadence for one pass.
#[derive(Debug)]
pub struct ProgressReporter {
    label: String,
    total: usize,
    started: Instant,
    tally: Tally,
    settings: ProgressSettings,
    last_checkpoint: Instant,
    since_checkpoint: usize,
}

impl ProgressReporter {
    pub fn new(label: impl Into<String>, total: usize, settings: ProgressSettings) -> Self {
        Self::starting_at(label, total, settings, Instant::now())
    }

    pub fn starting_at(
        label: impl Into<String>,
        total: usize,
        settings: ProgressSettings,
        now: Instant,
    ) -> Self {
        ProgressReporter {
            label: label.into(),
            total,
            started: now,
            tally: Tally::default(),
            settings,
            last_checkpoint: now,
            since_checkpoint: 0,
        }
    }

    pub fn tally(&self) -> Tally {
        self.tally
    }

    /// Counts one finished item and logs its status line, plus the periodic
    /// summary when due.
    pub fn record(&mut self, key: &WorkKey, mark: Mark, detail: &str) {
        match mark {
            Mark::Resolved => self.tally.resolved += 1,
            Mark::Rejected => self.tally.rejected += 1,
            Mark::Failed => self.tally.failed += 1,
        }
        self.since_checkpoint += 1;

        let done = self.tally.done();
        info!(
            "{} [{}/{}] {}: {}",
            mark.symbol(),
            done,
            self.total,
            key,
            detail
        );

        if self.settings.summary_every > 0 && done % self.settings.summary_every == 0 {
            info!("{}", self.summary_line(Instant::now()));
        }
    }

    /// Items per second since the pass started.
    pub fn rate(&self, now: Instant) -> f64 {
        let elapsed = now.duration_since(self.started).as_secs_f64();
        if elapsed <= 0.0 {
            return 0.0;
        }
        self.tally.done() as f64 / elapsed
    }

    /// Estimated time to finish, `None` until a rate is known.
    pub fn eta(&self, now: Instant) -> Option<Duration> {
        let rate = self.rate(now);
        if rate <= 0.0 {
            return None;
        }
        let remaining = self.total.saturating_sub(self.tally.done());
        Some(Duration::from_secs_f64(remaining as f64 / rate))
    }

    pub fn summary_line(&self, now: Instant) -> String {
        let eta = self
            .eta(now)
            .map(|d| format!("{:.0}s", d.as_secs_f64()))
            .unwrap_or_else(|| "?".to_string());
        format!(
            "[{}] {}/{} | Rate: {:.1}/s | ETA: {} | ✓{} ✗{} ⚠{}",
            self.label,
            self.tally.done(),
            self.total,
            self.rate(now),
            eta,
            self.tally.resolved,
            self.tally.rejected,
            self.tally.failed
        )
    }

    /// True when either the time or the item interval since the last
    /// checkpoint has been reached.
    pub fn checkpoint_due(&self, now: Instant) -> bool {
        if self.since_checkpoint == 0 {
            return false;
        }
        if let Some(every) = self.settings.checkpoint_every_items {
            if every > 0 && self.since_checkpoint >= every {
                return true;
            }
        }
        now.duration_since(self.last_checkpoint) >= self.settings.checkpoint_every
    }

    pub fn checkpoint_taken(&mut self, now: Instant) {
        self.last_checkpoint = now;
        self.since_checkpoint = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reporter(total: usize, settings: ProgressSettings, start: Instant) -> ProgressReporter {
        ProgressReporter::starting_at("Progress", total, settings, start)
    }

    #[test]
    fn rate_and_eta() {
        let start = Instant::now();
        let mut r = reporter(100, ProgressSettings { summary_every: 0, ..Default::default() }, start);
        for i in 0..20 {
            r.record(&WorkKey::from(i), Mark::Resolved, "ok");
        }
        let later = start + Duration::from_secs(10);
        assert!((r.rate(later) - 2.0).abs() < 1e-9);
        assert_eq!(r.eta(later), Some(Duration::from_secs(40)));
        assert!(r.summary_line(later).starts_with("[Progress] 20/100 | Rate: 2.0/s | ETA: 40s"));
    }

    #[test]
    fn eta_unknown_before_any_progress() {
        let start = Instant::now();
        let r = reporter(5, ProgressSettings::default(), start);
        assert_eq!(r.eta(start + Duration::from_secs(3)), None);
    }

    #[test]
    fn tally_counts_each_mark() {
        let mut r = reporter(3, ProgressSettings::default(), Instant::now());
        r.record(&WorkKey::from(1), Mark::Resolved, "a");
        r.record(&WorkKey::from(2), Mark::Rejected, "b");
        r.record(&WorkKey::from(3), Mark::Failed, "c");
        assert_eq!(r.tally(), Tally { resolved: 1, rejected: 1, failed: 1 });
    }

    #[test]
    fn checkpoint_due_by_time() {
        let start = Instant::now();
        let mut r = reporter(10, ProgressSettings::default(), start);
        assert!(!r.checkpoint_due(start + Duration::from_secs(60)), "nothing new to save");

        r.record(&WorkKey::from(1), Mark::Resolved, "a");
        assert!(!r.checkpoint_due(start + Duration::from_secs(5)));
        assert!(r.checkpoint_due(start + Duration::from_secs(15)));

        r.checkpoint_taken(start + Duration::from_secs(15));
        r.record(&WorkKey::from(2), Mark::Resolved, "b");
        assert!(!r.checkpoint_due(start + Duration::from_secs(20)));
    }

    #[test]
    fn checkpoint_due_by_item_count() {
        let start = Instant::now();
        let settings = ProgressSettings {
            checkpoint_every_items: Some(3),
            checkpoint_every: Duration::from_secs(3600),
            ..Default::default()
        };
        let mut r = reporter(10, settings, start);
        r.record(&WorkKey::from(1), Mark::Resolved, "a");
        r.record(&WorkKey::from(2), Mark::Rejected, "b");
        assert!(!r.checkpoint_due(start));
        r.record(&WorkKey::from(3), Mark::Failed, "c");
        assert!(r.checkpoint_due(start));
    }
}

//! Run configuration, read from an optional TOML file and then overridden
//! by command-line flags.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::artists::ArtistLimits;
use crate::confidence::ConfidenceRules;
use crate::error::{HarvestError, Result};
use crate::fetcher::RetryPolicy;
use crate::job_manager::RunSettings;
use crate::links::ResultWindows;
use crate::progress::ProgressSettings;
use crate::validator::MatchRules;
use crate::work::{WorkKey, ID_PLACEHOLDER};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    pub run: RunConfig,
    pub retry: RetryConfig,
    pub search: SearchConfig,
    pub collections: CollectionsConfig,
    pub artists: ArtistsConfig,
    pub git: GitConfig,
}

/// Pool size, per-run limits and checkpoint cadence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub concurrency: usize,
    pub max_items_per_run: Option<usize>,
    pub null_retry_budget: usize,
    pub checkpoint_every_secs: u64,
    pub checkpoint_every_items: Option<usize>,
    pub summary_every: usize,
    pub dispatch_pause_min_ms: u64,
    pub dispatch_pause_max_ms: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            concurrency: 4,
            max_items_per_run: None,
            null_retry_budget: 2000,
            checkpoint_every_secs: 15,
            checkpoint_every_items: None,
            summary_every: 10,
            dispatch_pause_min_ms: 50,
            dispatch_pause_max_ms: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub max_jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            timeout_secs: 20,
            max_attempts: 3,
            backoff_base_ms: 500,
            max_jitter_ms: 250,
        }
    }
}

/// Video search used by the `links` harvest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub ytdlp_binary: PathBuf,
    /// Result window on the first attempt.
    pub results: usize,
    /// Result window on the retry pass.
    pub widened_results: usize,
    /// `artist|track` keys whose first search result is taken unvalidated.
    pub overrides: Vec<String>,
    pub missing_log: PathBuf,
    pub rules: MatchRules,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            ytdlp_binary: PathBuf::from("yt-dlp"),
            results: 5,
            widened_results: 10,
            overrides: Vec::new(),
            missing_log: PathBuf::from("missing_tracks.txt"),
            rules: MatchRules::default(),
        }
    }
}

impl SearchConfig {
    pub fn override_keys(&self) -> HashSet<WorkKey> {
        self.overrides.iter().map(|k| WorkKey::new(k.as_str())).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionsConfig {
    pub url_template: String,
    pub user_agent: String,
    pub download_art: bool,
    pub art_dir: PathBuf,
    pub art_timeout_secs: u64,
    /// CSV export written next to the store after every run, when set.
    pub csv: Option<PathBuf>,
}

impl Default for CollectionsConfig {
    fn default() -> Self {
        CollectionsConfig {
            url_template: "https://24six.app/app/music/collection/{id}".to_string(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                .to_string(),
            download_art: false,
            art_dir: PathBuf::from("album_art"),
            art_timeout_secs: 30,
            csv: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtistsConfig {
    pub search_limit: usize,
    /// Channel search window on the retry pass.
    pub retry_search_limit: usize,
    pub uploads_limit: usize,
    /// `{"artists": [{"id", "name"}]}` export, when set.
    pub simple_output: Option<PathBuf>,
    pub rules: ConfidenceRules,
}

impl Default for ArtistsConfig {
    fn default() -> Self {
        ArtistsConfig {
            search_limit: 5,
            retry_search_limit: 10,
            uploads_limit: 50,
            simple_output: None,
            rules: ConfidenceRules::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GitConfig {
    pub enabled: bool,
    pub push: bool,
    pub repo: PathBuf,
}

impl Default for GitConfig {
    fn default() -> Self {
        GitConfig {
            enabled: false,
            push: false,
            repo: PathBuf::from("."),
        }
    }
}

impl HarvestConfig {
    /// Defaults when `path` is `None`; a named file must exist and parse.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(HarvestConfig::default());
        };
        let content = fs::read_to_string(path).map_err(|source| HarvestError::Input {
            path: path.to_path_buf(),
            source,
        })?;
        let config: HarvestConfig = toml::from_str(&content)
            .map_err(|e| HarvestError::Config(format!("{}: {}", path.display(), e)))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.run.concurrency == 0 {
            return Err(HarvestError::Config("concurrency must be at least 1".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(HarvestError::Config("max_attempts must be at least 1".into()));
        }
        if self.retry.timeout_secs == 0 {
            return Err(HarvestError::Config("timeout_secs must be at least 1".into()));
        }
        if self.run.dispatch_pause_min_ms > self.run.dispatch_pause_max_ms {
            return Err(HarvestError::Config(
                "dispatch_pause_min_ms is greater than dispatch_pause_max_ms".into(),
            ));
        }
        if self.search.results == 0 || self.search.widened_results < self.search.results {
            return Err(HarvestError::Config(
                "search results must be at least 1 and widened_results at least results".into(),
            ));
        }
        if !self.collections.url_template.contains(ID_PLACEHOLDER) {
            return Err(HarvestError::Config(format!(
                "collections.url_template must contain {}",
                ID_PLACEHOLDER
            )));
        }
        if let Some(bad) = self.search.overrides.iter().find(|k| !k.contains('|')) {
            return Err(HarvestError::Config(format!(
                "override {:?} is not of the form artist|track",
                bad
            )));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_secs(self.retry.timeout_secs),
            max_attempts: self.retry.max_attempts,
            backoff_base: Duration::from_millis(self.retry.backoff_base_ms),
            max_jitter: Duration::from_millis(self.retry.max_jitter_ms),
        }
    }

    /// Policy for album-art downloads: same budget, longer timeout.
    pub fn art_policy(&self) -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_secs(self.collections.art_timeout_secs),
            ..self.retry_policy()
        }
    }

    pub fn run_settings(&self) -> RunSettings {
        RunSettings {
            concurrency: self.run.concurrency,
            max_items_per_run: self.run.max_items_per_run,
            null_retry_budget: self.run.null_retry_budget,
            progress: ProgressSettings {
                summary_every: self.run.summary_every,
                checkpoint_every_items: self.run.checkpoint_every_items,
                checkpoint_every: Duration::from_secs(self.run.checkpoint_every_secs),
            },
            dispatch_pause_min: Duration::from_millis(self.run.dispatch_pause_min_ms),
            dispatch_pause_max: Duration::from_millis(self.run.dispatch_pause_max_ms),
        }
    }

    pub fn link_windows(&self) -> ResultWindows {
        ResultWindows {
            first: self.search.results,
            retry: self.search.widened_results,
        }
    }

    pub fn artist_limits(&self) -> ArtistLimits {
        ArtistLimits {
            search: self.artists.search_limit,
            retry_search: self.artists.retry_search_limit,
            uploads: self.artists.uploads_limit,
        }
    }
}

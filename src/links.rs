use async_trait::async_trait;
use log::error;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use crate::fetcher::{fetch_with_retry, RetryPolicy};
use crate::job_manager::{Harvest, Pass, Resolution};
use crate::search_engine::VideoSearch;
use crate::validator::Validator;
use crate::work::{TrackItem, WorkItem, WorkKey};

const WATCH_URL: &str = "https://www.youtube.com/watch?v=";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackLink {
    pub artist: String,
    pub track: String,
    pub album: String,
    pub video_id: String,
    pub url: String,
}

impl TrackLink {
    pub fn new(item: &TrackItem, video_id: &str) -> Self {
        TrackLink {
            artist: item.artist.clone(),
            track: item.track.clone(),
            album: item.album.clone(),
            video_id: video_id.to_string(),
            url: format!("{}{}", WATCH_URL, video_id),
        }
    }
}

pub fn search_query(item: &TrackItem) -> String {
    format!("{} {} official audio", item.artist, item.track)
}

/// Result windows per pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultWindows {
    pub first: usize,
    pub retry: usize,
}

impl Default for ResultWindows {
    fn default() -> Self {
        ResultWindows { first: 5, retry: 10 }
    }
}

impl ResultWindows {
    fn for_pass(&self, pass: Pass) -> usize {
        match pass {
            Pass::Enumerate => self.first,
            Pass::RetryNulls => self.retry,
        }
    }
}

pub struct LinkHarvest<S> {
    search: S,
    validator: Validator,
    policy: RetryPolicy,
    windows: ResultWindows,
    overrides: HashSet<WorkKey>,
    missing_log: Option<PathBuf>,
}

impl<S: VideoSearch> LinkHarvest<S> {
    pub fn new(search: S, validator: Validator, policy: RetryPolicy) -> Self {
        LinkHarvest {
            search,
            validator,
            policy,
            windows: ResultWindows::default(),
            overrides: HashSet::new(),
            missing_log: None,
        }
    }

    pub fn with_windows(mut self, windows: ResultWindows) -> Self {
        self.windows = windows;
        self
    }

    /// Keys whose first search result is accepted without validation.
    pub fn with_overrides(mut self, overrides: HashSet<WorkKey>) -> Self {
        self.overrides = overrides;
        self
    }

    /// Appends `artist - track` to `path` for every unresolved attempt.
    pub fn with_missing_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.missing_log = Some(path.into());
        self
    }
}

#[async_trait]
impl<S: VideoSearch> Harvest for LinkHarvest<S> {
    type Item = TrackItem;
    type Record = TrackLink;

    fn label(&self) -> &str {
        "links"
    }

    async fn harvest(&self, item: &TrackItem, pass: Pass) -> Resolution<TrackLink> {
        let query = search_query(item);
        let forced = self.overrides.contains(&item.key());
        let limit = if forced { 1 } else { self.windows.for_pass(pass) };

        let candidates = match fetch_with_retry(&self.policy, |_| self.search.search(&query, limit)).await {
            Ok(fetched) => fetched.value,
            Err(failure) => return Resolution::Failed(failure),
        };

        if forced {
            return match candidates.iter().find(|c| !c.id.trim().is_empty()) {
                Some(first) => Resolution::Resolved(TrackLink::new(item, &first.id)),
                None => Resolution::Rejected("override search returned nothing".to_string()),
            };
        }

        match self
            .validator
            .select_candidate(&item.artist, &item.track, &candidates)
        {
            Some(video) => Resolution::Resolved(TrackLink::new(item, &video.id)),
            None => Resolution::Rejected(format!(
                "no acceptable match among {} result(s)",
                candidates.len()
            )),
        }
    }

    fn describe_record(&self, record: &TrackLink) -> String {
        format!("{} - {} -> {}", record.artist, record.track, record.video_id)
    }

    fn on_unresolved(&self, item: &TrackItem) {
        let Some(path) = &self.missing_log else {
            return;
        };
        let appended = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut file| writeln!(file, "{} - {}", item.artist, item.track));
        if let Err(e) = appended {
            error!("Could not append to {:?}: {}", path, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::{FetchError, FetchOutcome};
    use crate::search_engine::VideoCandidate;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::tempdir;

    #[derive(Default)]
    struct FakeSearch {
        results: Vec<VideoCandidate>,
        fail: Option<FetchError>,
        calls: Mutex<Vec<(String, usize)>>,
    }

    #[async_trait]
    impl VideoSearch for FakeSearch {
        async fn search(&self, query: &str, limit: usize) -> FetchOutcome<Vec<VideoCandidate>> {
            self.calls.lock().unwrap().push((query.to_string(), limit));
            if let Some(err) = &self.fail {
                return Err(err.clone());
            }
            Ok(self.results.iter().take(limit).cloned().collect())
        }
    }

    fn video(id: &str, title: &str, channel: &str) -> VideoCandidate {
        VideoCandidate {
            id: id.into(),
            title: title.into(),
            channel: channel.into(),
            channel_id: None,
        }
    }

    fn item(artist: &str, track: &str) -> TrackItem {
        TrackItem {
            artist: artist.into(),
            track: track.into(),
            album: "25".into(),
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_secs(5),
            max_attempts: 2,
            backoff_base: Duration::ZERO,
            max_jitter: Duration::ZERO,
        }
    }

    fn harvest(search: FakeSearch) -> LinkHarvest<FakeSearch> {
        LinkHarvest::new(search, Validator::default(), policy())
    }

    #[tokio::test]
    async fn picks_first_valid_candidate() {
        let search = FakeSearch {
            results: vec![
                video("k1", "Hello (Karaoke Version)", "Sing King"),
                video("a1", "Adele - Hello (Official Audio)", "Adele"),
            ],
            ..Default::default()
        };
        let h = harvest(search);
        let Resolution::Resolved(link) = h.harvest(&item("Adele", "Hello"), Pass::Enumerate).await else {
            panic!("expected a link");
        };
        assert_eq!(link.video_id, "a1");
        assert_eq!(link.url, "https://www.youtube.com/watch?v=a1");
        assert_eq!(link.album, "25");
        assert_eq!(
            h.search.calls.lock().unwrap().clone(),
            vec![("Adele Hello official audio".to_string(), 5)]
        );
    }

    #[tokio::test]
    async fn retry_pass_widens_the_window() {
        let mut results: Vec<VideoCandidate> = (0..7)
            .map(|i| video(&format!("x{}", i), "Unrelated upload", "Someone"))
            .collect();
        results.push(video("late", "Adele - Hello", "Adele"));
        let h = harvest(FakeSearch { results, ..Default::default() });

        let first = h.harvest(&item("Adele", "Hello"), Pass::Enumerate).await;
        assert!(matches!(first, Resolution::Rejected(_)));

        let Resolution::Resolved(link) = h.harvest(&item("Adele", "Hello"), Pass::RetryNulls).await else {
            panic!("expected a link on the wider window");
        };
        assert_eq!(link.video_id, "late");
        let limits: Vec<usize> = h.search.calls.lock().unwrap().iter().map(|(_, l)| *l).collect();
        assert_eq!(limits, vec![5, 10]);
    }

    #[tokio::test]
    async fn override_takes_first_result_unvalidated() {
        let search = FakeSearch {
            results: vec![video("ov", "Totally different title", "Unknown")],
            ..Default::default()
        };
        let overrides = [WorkKey::pair("Simcha Leiner", "Harbei Nachat")].into_iter().collect();
        let h = harvest(search).with_overrides(overrides);

        let Resolution::Resolved(link) = h
            .harvest(&item("Simcha Leiner", "Harbei Nachat"), Pass::Enumerate)
            .await
        else {
            panic!("override should resolve");
        };
        assert_eq!(link.video_id, "ov");
        assert_eq!(h.search.calls.lock().unwrap()[0].1, 1);
    }

    #[tokio::test]
    async fn search_failure_is_reported() {
        let h = harvest(FakeSearch {
            fail: Some(FetchError::TransientProtocol("HTTP Error 429".into())),
            ..Default::default()
        });
        match h.harvest(&item("Adele", "Hello"), Pass::Enumerate).await {
            Resolution::Failed(failure) => {
                assert!(failure.exhausted);
                assert_eq!(failure.attempts, 2);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn unresolved_tracks_are_logged() {
        let dir = tempdir().unwrap();
        let log = dir.path().join("missing_tracks.txt");
        let h = harvest(FakeSearch::default()).with_missing_log(&log);

        h.on_unresolved(&item("Adele", "Hello"));
        h.on_unresolved(&item("Beirut", "Nantes"));

        assert_eq!(
            std::fs::read_to_string(&log).unwrap(),
            "Adele - Hello\nBeirut - Nantes\n"
        );
    }
}

//! Decides whether a search result actually answers an (artist, track) query.

use log::trace;
use serde::{Deserialize, Serialize};

use crate::normalize::{normalize, strip_feature_suffix, tokens};
use crate::search_engine::VideoCandidate;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchRules {
    /// Title words that mark a derivative upload. Ignored when the
    /// expected track itself contains the word.
    pub disallowed_markers: Vec<String>,
    pub min_artist_hits: usize,
    pub min_track_hits: usize,
    /// Fraction of expected artist tokens that is enough on its own.
    pub artist_coverage: f64,
}

impl Default for MatchRules {
    fn default() -> Self {
        MatchRules {
            disallowed_markers: ["karaoke", "cover", "remix", "medley", "compilation", "instrumental"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            min_artist_hits: 1,
            min_track_hits: 1,
            artist_coverage: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    ArtistAndTrack,
    TrackOnly,
    ArtistChannel,
    FullTrackTitle,
    ArtistCoverage,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accepted {
        rule: Rule,
        artist_hits: usize,
        track_hits: usize,
    },
    Rejected(String),
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted { .. })
    }
}

#[derive(Debug, Clone, Default)]
pub struct Validator {
    rules: MatchRules,
}

impl Validator {
    pub fn new(rules: MatchRules) -> Self {
        Validator { rules }
    }

    pub fn validate(&self, artist: &str, track: &str, candidate: &VideoCandidate) -> bool {
        self.evaluate(artist, track, &candidate.title, &candidate.channel)
            .is_accepted()
    }

    /// First acceptable candidate, in backend ranking order.
    pub fn select_candidate<'a>(
        &self,
        artist: &str,
        track: &str,
        candidates: &'a [VideoCandidate],
    ) -> Option<&'a VideoCandidate> {
        candidates.iter().find(|candidate| {
            if candidate.id.trim().is_empty() {
                return false;
            }
            let verdict = self.evaluate(artist, track, &candidate.title, &candidate.channel);
            trace!("{:?} for {:?} / {:?}", verdict, candidate.title, candidate.channel);
            verdict.is_accepted()
        })
    }

    pub fn evaluate(&self, artist: &str, track: &str, title: &str, channel: &str) -> Verdict {
        let title_n = normalize(title);
        if title_n.is_empty() {
            return Verdict::Rejected("candidate has no title".to_string());
        }
        let channel_n = normalize(channel);
        let artist_n = normalize(artist);
        let full_track_n = normalize(track);
        let track_n = strip_feature_suffix(&full_track_n);

        let artist_tokens = tokens(&artist_n);
        let track_tokens = tokens(&track_n);

        let expected_words: Vec<&str> = full_track_n.split_whitespace().collect();
        if let Some(marker) = title_n.split_whitespace().find(|word| {
            self.rules.disallowed_markers.iter().any(|m| m == word) && !expected_words.contains(word)
        }) {
            return Verdict::Rejected(format!("title contains {:?}", marker));
        }

        let combined = format!("{} {}", title_n, channel_n);

        // Token sets can be empty for one-letter names; fall back to the raw string.
        let (artist_hits, artist_total) = if artist_tokens.is_empty() {
            if artist_n.is_empty() {
                (0, 0)
            } else {
                (usize::from(combined.contains(&artist_n)), 1)
            }
        } else {
            let hits = artist_tokens.iter().filter(|t| combined.contains(t.as_str())).count();
            (hits, artist_tokens.len())
        };

        let track_hits = if track_tokens.is_empty() {
            usize::from(!track_n.is_empty() && title_n.contains(&track_n))
        } else {
            track_tokens.iter().filter(|t| title_n.contains(t.as_str())).count()
        };

        let channel_hit = if artist_tokens.is_empty() {
            !artist_n.is_empty() && channel_n.contains(&artist_n)
        } else {
            artist_tokens.iter().any(|t| channel_n.contains(t.as_str()))
        };

        let rule = if artist_hits >= self.rules.min_artist_hits
            && track_hits >= self.rules.min_track_hits
        {
            Some(Rule::ArtistAndTrack)
        } else if track_hits >= self.rules.min_track_hits {
            Some(Rule::TrackOnly)
        } else if channel_hit {
            Some(Rule::ArtistChannel)
        } else if !track_n.is_empty() && title_n.contains(&track_n) {
            Some(Rule::FullTrackTitle)
        } else if artist_total > 0
            && artist_hits as f64 >= artist_total as f64 * self.rules.artist_coverage
        {
            Some(Rule::ArtistCoverage)
        } else {
            None
        };

        match rule {
            Some(rule) => Verdict::Accepted {
                rule,
                artist_hits,
                track_hits,
            },
            None => Verdict::Rejected(format!(
                "no overlap (artist hits {}/{}, track hits {})",
                artist_hits, artist_total, track_hits
            )),
        }
    }
}

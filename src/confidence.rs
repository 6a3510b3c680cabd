//! 0–100 score for "is this channel really this artist".

use serde::{Deserialize, Serialize};
use strsim::normalized_levenshtein;

use crate::normalize::normalize;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceRules {
    pub name_weight: f64,
    pub discography_weight: f64,
    pub album_threshold: f64,
    pub track_threshold: f64,
    /// Weight of a matched track relative to a matched album.
    pub track_weight: f64,
    pub max_tracks_checked: usize,
    pub max_tracks_counted: usize,
    pub strong_name: f64,
    pub strong_matches: usize,
    pub strong_bonus: f64,
    pub good_name: f64,
    pub good_matches: usize,
    pub good_bonus: f64,
    pub min_confidence: f64,
}

impl Default for ConfidenceRules {
    fn default() -> Self {
        ConfidenceRules {
            name_weight: 60.0,
            discography_weight: 40.0,
            album_threshold: 0.75,
            track_threshold: 0.80,
            track_weight: 0.3,
            max_tracks_checked: 20,
            max_tracks_counted: 10,
            strong_name: 0.95,
            strong_matches: 2,
            strong_bonus: 15.0,
            good_name: 0.90,
            good_matches: 3,
            good_bonus: 10.0,
            min_confidence: 70.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DiscographyMatch {
    /// 0–100.
    pub percentage: f64,
    /// Albums plus tracks found among the candidate's uploads.
    pub matches: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Confidence {
    pub total: f64,
    pub name_similarity: f64,
    pub discography_match: f64,
}

/// Similarity ratio in `[0, 1]` of two strings after normalization.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = normalize(a);
    let b = normalize(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    normalized_levenshtein(&a, &b)
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[derive(Debug, Clone, Default)]
pub struct ConfidenceScorer {
    rules: ConfidenceRules,
}

impl ConfidenceScorer {
    pub fn new(rules: ConfidenceRules) -> Self {
        ConfidenceScorer { rules }
    }

    pub fn rules(&self) -> &ConfidenceRules {
        &self.rules
    }

    pub fn discography_match(
        &self,
        uploads: &[String],
        known_albums: &[String],
        known_tracks: &[String],
    ) -> DiscographyMatch {
        if known_albums.is_empty() && known_tracks.is_empty() {
            return DiscographyMatch::default();
        }

        let found = |known: &String, threshold: f64| {
            uploads.iter().any(|upload| similarity(known, upload) >= threshold)
        };

        let matched_albums = known_albums
            .iter()
            .filter(|album| found(album, self.rules.album_threshold))
            .count();
        let matched_tracks = known_tracks
            .iter()
            .take(self.rules.max_tracks_checked)
            .filter(|track| found(track, self.rules.track_threshold))
            .count();

        let known = known_albums.len() as f64
            + known_tracks.len().min(self.rules.max_tracks_counted) as f64 * self.rules.track_weight;
        let matched = matched_albums as f64 + matched_tracks as f64 * self.rules.track_weight;

        DiscographyMatch {
            percentage: (matched / known * 100.0).min(100.0),
            matches: matched_albums + matched_tracks,
        }
    }

    pub fn score(&self, expected_name: &str, candidate_name: &str, disco: &DiscographyMatch) -> Confidence {
        let r = &self.rules;
        let name_sim = similarity(expected_name, candidate_name);

        let mut total = name_sim * r.name_weight + disco.percentage / 100.0 * r.discography_weight;
        if name_sim >= r.strong_name && disco.matches >= r.strong_matches {
            total += r.strong_bonus;
        } else if name_sim >= r.good_name && disco.matches >= r.good_matches {
            total += r.good_bonus;
        }

        Confidence {
            total: round1(total.clamp(0.0, 100.0)),
            name_similarity: round1(name_sim * 100.0),
            discography_match: round1(disco.percentage),
        }
    }

    pub fn accepts(&self, confidence: &Confidence) -> bool {
        confidence.total >= self.rules.min_confidence
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn similarity_ignores_case_and_punctuation() {
        assert_eq!(similarity("Shlomo Artzi", "shlomo-artzi!"), 1.0);
        assert_eq!(similarity("", "anything"), 0.0);
        assert!(similarity("Adele", "Coldplay") < 0.5);
    }

    #[test]
    fn discography_percentage_weights_tracks_lower() {
        let scorer = ConfidenceScorer::default();
        let uploads = strings(&["Album One", "Some Single"]);

        let m = scorer.discography_match(&uploads, &strings(&["Album One", "Album Two"]), &[]);
        assert_eq!(m.matches, 1);
        assert!((m.percentage - 50.0).abs() < 1e-9);

        let m = scorer.discography_match(&uploads, &strings(&["Album Two"]), &strings(&["Some Single"]));
        assert_eq!(m.matches, 1);
        // 0.3 matched out of 1.3 known.
        assert!((m.percentage - 0.3 / 1.3 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn empty_discography_scores_zero() {
        let scorer = ConfidenceScorer::default();
        let m = scorer.discography_match(&strings(&["x"]), &[], &[]);
        assert_eq!(m, DiscographyMatch::default());
    }

    #[test]
    fn strong_name_with_corroboration_gets_bonus() {
        let scorer = ConfidenceScorer::default();
        let disco = DiscographyMatch { percentage: 50.0, matches: 2 };
        let c = scorer.score("Adele", "Adele", &disco);
        assert_eq!(c.total, 95.0);
        assert_eq!(c.name_similarity, 100.0);
        assert!(scorer.accepts(&c));
    }

    #[test]
    fn good_name_needs_three_matches_for_smaller_bonus() {
        let scorer = ConfidenceScorer::default();
        // One substitution in twelve characters: 0.9167.
        let with_three = scorer.score(
            "Shlomo Artzi",
            "Shlomo Artzy",
            &DiscographyMatch { percentage: 0.0, matches: 3 },
        );
        let with_two = scorer.score(
            "Shlomo Artzi",
            "Shlomo Artzy",
            &DiscographyMatch { percentage: 0.0, matches: 2 },
        );
        assert!((with_three.total - with_two.total - 10.0).abs() < 0.11);
    }

    #[test]
    fn total_is_capped() {
        let scorer = ConfidenceScorer::default();
        let c = scorer.score("Adele", "Adele", &DiscographyMatch { percentage: 100.0, matches: 9 });
        assert_eq!(c.total, 100.0);
    }

    #[test]
    fn weak_name_without_discography_is_rejected() {
        let scorer = ConfidenceScorer::default();
        let c = scorer.score("Adele", "Adele Fan Club Covers", &DiscographyMatch::default());
        assert!(c.total < 70.0);
        assert!(!scorer.accepts(&c));
    }
}

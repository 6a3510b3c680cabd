//! Resolves artist names to channel ids, corroborated by the artist's known
//! discography.

use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::confidence::{Confidence, ConfidenceScorer};
use crate::fetcher::{fetch_with_retry, FetchFailure, RetryPolicy};
use crate::job_manager::{Harvest, Pass, Resolution};
use crate::search_engine::{ChannelCandidate, ChannelDirectory};
use crate::work::ArtistItem;

const CHANNEL_URL: &str = "https://www.youtube.com/channel/";
const TOPIC_SUFFIX: &str = " - Topic";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtistMatch {
    /// Channel id.
    pub id: String,
    pub name: String,
    pub matched_channel_name: String,
    pub confidence: f64,
    pub validation_details: Confidence,
    pub url: String,
}

/// Channel display name without the auto-generated " - Topic" suffix.
pub fn channel_display_name(name: &str) -> &str {
    name.strip_suffix(TOPIC_SUFFIX).unwrap_or(name).trim()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArtistLimits {
    pub search: usize,
    pub retry_search: usize,
    pub uploads: usize,
}

impl Default for ArtistLimits {
    fn default() -> Self {
        ArtistLimits {
            search: 5,
            retry_search: 10,
            uploads: 50,
        }
    }
}

pub struct ArtistHarvest<D> {
    directory: D,
    scorer: ConfidenceScorer,
    policy: RetryPolicy,
    limits: ArtistLimits,
}

struct Scored {
    channel: ChannelCandidate,
    confidence: Confidence,
}

impl<D: ChannelDirectory> ArtistHarvest<D> {
    pub fn new(directory: D, scorer: ConfidenceScorer, policy: RetryPolicy) -> Self {
        ArtistHarvest {
            directory,
            scorer,
            policy,
            limits: ArtistLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: ArtistLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Channels found by searching the plain name, then the topic-channel
    /// name, deduplicated in that order.
    async fn candidates(&self, name: &str, limit: usize) -> Result<Vec<ChannelCandidate>, FetchFailure> {
        let mut found: Vec<ChannelCandidate> = Vec::new();
        let mut last_failure = None;

        for query in [name.to_string(), format!("{}{}", name, TOPIC_SUFFIX)] {
            match fetch_with_retry(&self.policy, |_| self.directory.search_channels(&query, limit)).await {
                Ok(fetched) => {
                    for channel in fetched.value {
                        if !found.iter().any(|c| c.channel_id == channel.channel_id) {
                            found.push(channel);
                        }
                    }
                }
                Err(failure) => {
                    warn!("Channel search {:?} failed: {}", query, failure);
                    last_failure = Some(failure);
                }
            }
        }

        match last_failure {
            Some(failure) if found.is_empty() => Err(failure),
            _ => Ok(found),
        }
    }
}

#[async_trait]
impl<D: ChannelDirectory> Harvest for ArtistHarvest<D> {
    type Item = ArtistItem;
    type Record = ArtistMatch;

    fn label(&self) -> &str {
        "artists"
    }

    async fn harvest(&self, item: &ArtistItem, pass: Pass) -> Resolution<ArtistMatch> {
        let limit = match pass {
            Pass::Enumerate => self.limits.search,
            Pass::RetryNulls => self.limits.retry_search,
        };
        let candidates = match self.candidates(&item.name, limit).await {
            Ok(c) if c.is_empty() => return Resolution::Rejected("no channels found".to_string()),
            Ok(c) => c,
            Err(failure) => return Resolution::Failed(failure),
        };

        let mut best: Option<Scored> = None;
        let mut upload_failure = None;
        for channel in candidates {
            let uploads = match fetch_with_retry(&self.policy, |_| {
                self.directory.channel_uploads(&channel.channel_id, self.limits.uploads)
            })
            .await
            {
                Ok(fetched) if fetched.value.is_empty() => continue,
                Ok(fetched) => fetched.value,
                Err(failure) => {
                    debug!("Uploads of {} unavailable: {}", channel.channel_id, failure);
                    upload_failure = Some(failure);
                    continue;
                }
            };

            let disco = self.scorer.discography_match(&uploads, &item.albums, &item.tracks);
            let confidence = self
                .scorer
                .score(&item.name, channel_display_name(&channel.name), &disco);
            debug!(
                "{} vs {:?}: {:.1} (name {:.1}, disco {:.1}, {} matches)",
                item.name, channel.name, confidence.total, confidence.name_similarity,
                confidence.discography_match, disco.matches
            );

            if best.as_ref().map_or(true, |b| confidence.total > b.confidence.total) {
                best = Some(Scored { channel, confidence });
            }
        }

        let Some(Scored { channel, confidence }) = best else {
            return match upload_failure {
                Some(failure) => Resolution::Failed(failure),
                None => Resolution::Rejected("no candidate channel has uploads".to_string()),
            };
        };

        if !self.scorer.accepts(&confidence) {
            return Resolution::Rejected(format!(
                "low confidence {:.1}% for {:?}",
                confidence.total, channel.name
            ));
        }

        Resolution::Resolved(ArtistMatch {
            url: format!("{}{}", CHANNEL_URL, channel.channel_id),
            id: channel.channel_id,
            name: item.name.clone(),
            matched_channel_name: channel.name,
            confidence: confidence.total,
            validation_details: confidence,
        })
    }

    fn describe_record(&self, record: &ArtistMatch) -> String {
        format!(
            "{} ({}, {:.1}%)",
            record.matched_channel_name, record.id, record.confidence
        )
    }
}

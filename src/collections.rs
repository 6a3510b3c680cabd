use async_trait::async_trait;
use log::warn;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::artwork::ArtworkStore;
use crate::extractor::{Extractor, PageMetadata, TrackEntry};
use crate::fetcher::{fetch_with_retry, RetryPolicy};
use crate::job_manager::{Harvest, Pass, Resolution};
use crate::scraper::PageSource;
use crate::work::CollectionItem;

/// Metadata of one collection page, as stored and exported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionRecord {
    pub collection_id: u64,
    pub url: String,
    pub status: String,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub publication_date: Option<String>,
    pub duration: Option<String>,
    pub image_url: Option<String>,
    #[serde(default)]
    pub tracks: Vec<TrackEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album_art_file: Option<String>,
    /// Extra attempts the page needed, when more than one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
}

impl CollectionRecord {
    pub fn from_page(item: &CollectionItem, page: PageMetadata, attempts: u32) -> Self {
        CollectionRecord {
            collection_id: item.id,
            url: item.url.clone(),
            status: "success".to_string(),
            title: page.title,
            artist: page.artist,
            publication_date: page.publication_date,
            duration: page.duration,
            image_url: page.image_url,
            tracks: page.tracks,
            album_art_file: None,
            retries: (attempts > 1).then(|| attempts - 1),
        }
    }
}

/// Optional album-art step run after a page resolves.
pub struct ArtDownload {
    pub store: ArtworkStore,
    pub policy: RetryPolicy,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArtTally {
    pub saved: usize,
    pub failed: usize,
}

pub struct CollectionHarvest<S> {
    source: S,
    extractor: Extractor,
    policy: RetryPolicy,
    art: Option<ArtDownload>,
    art_saved: AtomicUsize,
    art_failed: AtomicUsize,
}

impl<S: PageSource> CollectionHarvest<S> {
    pub fn new(source: S, extractor: Extractor, policy: RetryPolicy) -> Self {
        CollectionHarvest {
            source,
            extractor,
            policy,
            art: None,
            art_saved: AtomicUsize::new(0),
            art_failed: AtomicUsize::new(0),
        }
    }

    pub fn with_art(mut self, art: ArtDownload) -> Self {
        self.art = Some(art);
        self
    }

    pub fn art_tally(&self) -> ArtTally {
        ArtTally {
            saved: self.art_saved.load(Ordering::Relaxed),
            failed: self.art_failed.load(Ordering::Relaxed),
        }
    }

    async fn attach_art(&self, record: &mut CollectionRecord) {
        let (Some(art), Some(image_url)) = (&self.art, record.image_url.as_deref()) else {
            return;
        };
        match art
            .store
            .download(
                &self.source,
                &art.policy,
                record.artist.as_deref(),
                record.title.as_deref(),
                image_url,
            )
            .await
        {
            Ok(relative) => {
                self.art_saved.fetch_add(1, Ordering::Relaxed);
                record.album_art_file = Some(relative);
            }
            Err(e) => {
                self.art_failed.fetch_add(1, Ordering::Relaxed);
                warn!("Album art for collection {}: {}", record.collection_id, e);
            }
        }
    }
}

#[async_trait]
impl<S: PageSource> Harvest for CollectionHarvest<S> {
    type Item = CollectionItem;
    type Record = CollectionRecord;

    fn label(&self) -> &str {
        "collections"
    }

    async fn harvest(&self, item: &CollectionItem, _pass: Pass) -> Resolution<CollectionRecord> {
        let fetched = match fetch_with_retry(&self.policy, |_| self.source.fetch_page(&item.url)).await {
            Ok(fetched) => fetched,
            Err(failure) => return Resolution::Failed(failure),
        };

        let page = self.extractor.extract(&fetched.value);
        let mut record = CollectionRecord::from_page(item, page, fetched.attempts);
        self.attach_art(&mut record).await;
        Resolution::Resolved(record)
    }

    fn describe_record(&self, record: &CollectionRecord) -> String {
        record.title.clone().unwrap_or_else(|| "Unknown".to_string())
    }
}

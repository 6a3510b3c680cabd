use log::{info, warn};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use crate::error::{HarvestError, Result};
use crate::extractor::TrackEntry;
use crate::work::{dedup_by_key, ArtistItem, TrackItem, WorkKey};

/// One album as found in a metadata document. Unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AlbumMetadata {
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub tracks: Option<Vec<TrackEntry>>,
    #[serde(default)]
    pub status: Option<String>,
}

impl AlbumMetadata {
    /// Albums without a status count as successfully scraped.
    pub fn is_success(&self) -> bool {
        self.status.as_deref().map_or(true, |s| s == "success")
    }

    fn track_names(&self) -> impl Iterator<Item = &str> {
        self.tracks
            .iter()
            .flatten()
            .filter_map(|t| t.name.as_deref())
            .filter(|name| !name.is_empty())
    }
}

/// Either a plain list of albums or the keyed store written by the
/// `collections` harvest.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MetadataDocument {
    List(Vec<Option<AlbumMetadata>>),
    Keyed(BTreeMap<WorkKey, Option<AlbumMetadata>>),
}

/// Loads a metadata document. A missing or unparsable file is fatal.
pub fn load_albums<P: AsRef<Path>>(path: P) -> Result<Vec<AlbumMetadata>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| HarvestError::Input {
        path: path.to_path_buf(),
        source,
    })?;
    let document: MetadataDocument =
        serde_json::from_str(&content).map_err(|source| HarvestError::InputFormat {
            path: path.to_path_buf(),
            source,
        })?;

    let albums: Vec<AlbumMetadata> = match document {
        MetadataDocument::List(albums) => albums.into_iter().flatten().collect(),
        MetadataDocument::Keyed(albums) => albums.into_values().flatten().collect(),
    };
    info!("Loaded {} albums from {:?}", albums.len(), path);
    Ok(albums)
}

/// Every (artist, track) pair in document order, first occurrence wins.
pub fn track_items(albums: &[AlbumMetadata]) -> Vec<TrackItem> {
    let mut items = Vec::new();
    for album in albums {
        let Some(artist) = album.artist.as_deref().filter(|a| !a.is_empty()) else {
            continue;
        };
        let title = album.title.clone().unwrap_or_default();
        for name in album.track_names() {
            items.push(TrackItem {
                artist: artist.to_string(),
                track: name.to_string(),
                album: title.clone(),
            });
        }
    }

    let before = items.len();
    let items = dedup_by_key(items);
    if before != items.len() {
        info!("Dropped {} duplicate (artist, track) pairs.", before - items.len());
    }
    items
}

/// One item per artist, with the distinct album titles and track names of
/// their successfully scraped albums, sorted by artist name.
pub fn artist_items(albums: &[AlbumMetadata]) -> Vec<ArtistItem> {
    let mut by_artist: BTreeMap<String, (BTreeSet<String>, BTreeSet<String>)> = BTreeMap::new();
    let mut skipped = 0;

    for album in albums {
        if !album.is_success() {
            skipped += 1;
            continue;
        }
        let Some(artist) = album.artist.as_deref().map(str::trim).filter(|a| !a.is_empty()) else {
            continue;
        };

        let (titles, tracks) = by_artist.entry(artist.to_string()).or_default();
        if let Some(title) = album.title.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            titles.insert(title.to_string());
        }
        for name in album.track_names() {
            let name = name.trim();
            if !name.is_empty() {
                tracks.insert(name.to_string());
            }
        }
    }

    if skipped > 0 {
        warn!("Skipped {} albums that were not scraped successfully.", skipped);
    }
    info!("Extracted discography for {} artists", by_artist.len());

    by_artist
        .into_iter()
        .map(|(name, (albums, tracks))| ArtistItem {
            name,
            albums: albums.into_iter().collect(),
            tracks: tracks.into_iter().collect(),
        })
        .collect()
}

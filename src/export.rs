use log::info;
use serde::Serialize;
use std::path::Path;

use crate::artists::ArtistMatch;
use crate::collections::CollectionRecord;
use crate::error::{HarvestError, Result};
use crate::resume_manager::write_atomic;

#[derive(Serialize)]
struct CollectionRow<'a> {
    collection_id: u64,
    url: &'a str,
    title: Option<&'a str>,
    artist: Option<&'a str>,
    publication_date: Option<&'a str>,
    duration: Option<&'a str>,
    image_url: Option<&'a str>,
    album_art_file: Option<&'a str>,
}

impl<'a> From<&'a CollectionRecord> for CollectionRow<'a> {
    fn from(r: &'a CollectionRecord) -> Self {
        CollectionRow {
            collection_id: r.collection_id,
            url: &r.url,
            title: r.title.as_deref(),
            artist: r.artist.as_deref(),
            publication_date: r.publication_date.as_deref(),
            duration: r.duration.as_deref(),
            image_url: r.image_url.as_deref(),
            album_art_file: r.album_art_file.as_deref(),
        }
    }
}

/// Writes one CSV row per collection, in the order given. Nothing is written
/// when there are no records. Returns the number of rows.
pub fn write_collections_csv<'a, I>(path: &Path, records: I) -> Result<usize>
where
    I: IntoIterator<Item = &'a CollectionRecord>,
{
    let mut writer = csv::Writer::from_writer(Vec::new());
    let mut rows = 0;
    for record in records {
        writer.serialize(CollectionRow::from(record))?;
        rows += 1;
    }
    if rows == 0 {
        return Ok(0);
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| HarvestError::Io(e.into_error()))?;
    write_atomic(path, &bytes)?;
    info!("Exported {} collections to {:?}", rows, path);
    Ok(rows)
}

#[derive(Serialize)]
struct SimpleArtist<'a> {
    id: &'a str,
    name: &'a str,
}

#[derive(Serialize)]
struct SimpleArtistList<'a> {
    artists: Vec<SimpleArtist<'a>>,
}

/// Writes `{"artists": [{"id", "name"}, ...]}`.
pub fn write_artist_list<'a, I>(path: &Path, matches: I) -> Result<usize>
where
    I: IntoIterator<Item = &'a ArtistMatch>,
{
    let list = SimpleArtistList {
        artists: matches
            .into_iter()
            .map(|m| SimpleArtist { id: &m.id, name: &m.name })
            .collect(),
    };
    let mut json = serde_json::to_string_pretty(&list)?;
    json.push('\n');
    write_atomic(path, json.as_bytes())?;
    info!("Exported {} artists to {:?}", list.artists.len(), path);
    Ok(list.artists.len())
}

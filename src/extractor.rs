use log::debug;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{HarvestError, Result};

const LD_JSON: &str = r#"script[type="application/ld+json"]"#;
const HEADING: &str = "h1";
const ARTIST_LINK: &str = r#"a[href*="/music/artist/"]"#;
const ENGLISH_SPAN: &str = r#"span[lang="en"]"#;

const RECORD_TYPES: &[&str] = &["MusicAlbum", "MusicRecording"];

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrackEntry {
    pub name: Option<String>,
    pub duration: Option<String>,
}

/// Fields pulled out of one collection page. Every field is optional; a page
/// with none of them is still a successful fetch.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PageMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub publication_date: Option<String>,
    pub duration: Option<String>,
    pub image_url: Option<String>,
    pub tracks: Vec<TrackEntry>,
}

/// Reads structured data (JSON-LD) first and falls back to visible markup
/// for the title and artist.
pub struct Extractor {
    ld_json: Selector,
    heading: Selector,
    artist_link: Selector,
    english_span: Selector,
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| HarvestError::Config(format!("bad selector {:?}: {}", css, e)))
}

fn visible_text(element: ElementRef<'_>) -> Option<String> {
    let text = element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    (!text.is_empty()).then_some(text)
}

fn string_field(data: &Value, key: &str) -> Option<String> {
    data.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// `image` may be a URL, a list of URLs, or an ImageObject.
fn image_field(data: &Value) -> Option<String> {
    match data.get("image")? {
        Value::String(url) => Some(url.clone()),
        Value::Array(items) => items.iter().find_map(|item| match item {
            Value::String(url) => Some(url.clone()),
            other => string_field(other, "url"),
        }),
        other => string_field(other, "url"),
    }
}

fn artist_field(data: &Value) -> Option<String> {
    match data.get("byArtist")? {
        Value::Array(artists) => artists.first().and_then(|a| string_field(a, "name")),
        artist => string_field(artist, "name"),
    }
}

fn track_entries(data: &Value) -> Vec<TrackEntry> {
    let to_entry = |t: &Value| TrackEntry {
        name: string_field(t, "name"),
        duration: string_field(t, "duration"),
    };
    match data.get("track") {
        Some(Value::Array(tracks)) => tracks.iter().filter(|t| t.is_object()).map(to_entry).collect(),
        Some(track) if track.is_object() => vec![to_entry(track)],
        _ => Vec::new(),
    }
}

fn is_record_type(data: &Value) -> bool {
    match data.get("@type") {
        Some(Value::String(t)) => RECORD_TYPES.contains(&t.as_str()),
        Some(Value::Array(types)) => types
            .iter()
            .filter_map(Value::as_str)
            .any(|t| RECORD_TYPES.contains(&t)),
        _ => false,
    }
}

impl Extractor {
    pub fn new() -> Result<Self> {
        Ok(Extractor {
            ld_json: selector(LD_JSON)?,
            heading: selector(HEADING)?,
            artist_link: selector(ARTIST_LINK)?,
            english_span: selector(ENGLISH_SPAN)?,
        })
    }

    pub fn extract(&self, html: &str) -> PageMetadata {
        let document = Html::parse_document(html);
        let mut meta = PageMetadata::default();

        if let Some(data) = self.structured_data(&document) {
            meta.title = string_field(&data, "name");
            meta.image_url = image_field(&data);
            meta.publication_date = string_field(&data, "datePublished");
            meta.duration = string_field(&data, "duration");
            meta.artist = artist_field(&data);
            meta.tracks = track_entries(&data);
        }

        if meta.title.is_none() {
            meta.title = document.select(&self.heading).next().and_then(visible_text);
        }

        if meta.artist.is_none() {
            meta.artist = document.select(&self.artist_link).next().and_then(|link| {
                // Names are often given in several scripts; prefer the English one.
                link.select(&self.english_span)
                    .next()
                    .and_then(visible_text)
                    .or_else(|| visible_text(link))
            });
        }

        meta
    }

    /// The first JSON-LD block, if it describes an album or recording.
    fn structured_data(&self, document: &Html) -> Option<Value> {
        let script = document.select(&self.ld_json).next()?;
        let raw: String = script.text().collect();
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        let data: Value = match serde_json::from_str(raw) {
            Ok(data) => data,
            Err(e) => {
                debug!("Unparsable JSON-LD, falling back to markup: {}", e);
                return None;
            }
        };

        match data {
            Value::Array(items) => items.into_iter().find(is_record_type),
            data if is_record_type(&data) => Some(data),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(head: &str, body: &str) -> String {
        format!("<html><head>{}</head><body>{}</body></html>", head, body)
    }

    fn ld(json: &str) -> String {
        format!(r#"<script type="application/ld+json">{}</script>"#, json)
    }

    #[test]
    fn reads_album_from_json_ld() {
        let html = page(
            &ld(r#"{
                "@context": "https://schema.org",
                "@type": "MusicAlbum",
                "name": "Shalom",
                "image": "https://cdn.example/art/12.jpg",
                "datePublished": "2021-03-04",
                "duration": "PT41M",
                "byArtist": {"@type": "MusicGroup", "name": "Simcha Leiner"},
                "track": [
                    {"@type": "MusicRecording", "name": "Harbei Nachat", "duration": "PT3M20S"},
                    {"@type": "MusicRecording", "name": "Kol Hakavod"}
                ]
            }"#),
            "<h1>Ignored heading</h1>",
        );
        let meta = Extractor::new().unwrap().extract(&html);

        assert_eq!(meta.title.as_deref(), Some("Shalom"));
        assert_eq!(meta.artist.as_deref(), Some("Simcha Leiner"));
        assert_eq!(meta.image_url.as_deref(), Some("https://cdn.example/art/12.jpg"));
        assert_eq!(meta.publication_date.as_deref(), Some("2021-03-04"));
        assert_eq!(meta.duration.as_deref(), Some("PT41M"));
        assert_eq!(meta.tracks.len(), 2);
        assert_eq!(meta.tracks[0].duration.as_deref(), Some("PT3M20S"));
        assert_eq!(meta.tracks[1].name.as_deref(), Some("Kol Hakavod"));
        assert_eq!(meta.tracks[1].duration, None);
    }

    #[test]
    fn artist_list_and_single_track() {
        let html = page(
            &ld(r#"{
                "@type": "MusicRecording",
                "name": "Single",
                "byArtist": [{"name": "First"}, {"name": "Second"}],
                "image": {"@type": "ImageObject", "url": "https://cdn.example/a.png"},
                "track": {"name": "Only"}
            }"#),
            "",
        );
        let meta = Extractor::new().unwrap().extract(&html);
        assert_eq!(meta.artist.as_deref(), Some("First"));
        assert_eq!(meta.image_url.as_deref(), Some("https://cdn.example/a.png"));
        assert_eq!(meta.tracks, vec![TrackEntry { name: Some("Only".into()), duration: None }]);
    }

    #[test]
    fn broken_json_ld_falls_back_to_markup() {
        let html = page(
            &ld(r#"{"@type": "MusicAlbum", "name": "#),
            r#"<h1>  Live in Jerusalem </h1>
               <a href="/app/music/artist/55"><span lang="he">אברהם פריד</span><span lang="en">Avraham Fried</span></a>"#,
        );
        let meta = Extractor::new().unwrap().extract(&html);
        assert_eq!(meta.title.as_deref(), Some("Live in Jerusalem"));
        assert_eq!(meta.artist.as_deref(), Some("Avraham Fried"));
        assert!(meta.tracks.is_empty());
    }

    #[test]
    fn artist_link_without_language_tags() {
        let html = page("", r#"<a href="https://x/music/artist/9">Benny Friedman</a>"#);
        let meta = Extractor::new().unwrap().extract(&html);
        assert_eq!(meta.artist.as_deref(), Some("Benny Friedman"));
        assert_eq!(meta.title, None);
    }

    #[test]
    fn other_schema_types_are_ignored() {
        let html = page(&ld(r#"{"@type": "WebSite", "name": "24six"}"#), "<h1>Album</h1>");
        let meta = Extractor::new().unwrap().extract(&html);
        assert_eq!(meta.title.as_deref(), Some("Album"));
    }

    #[test]
    fn empty_page_yields_nothing() {
        assert_eq!(Extractor::new().unwrap().extract(""), PageMetadata::default());
    }
}

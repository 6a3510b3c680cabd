//! Album-art downloads, stored as `<art_dir>/<Artist>/<Artist> - <Title>.<ext>`.

use log::debug;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

use crate::error::{HarvestError, Result};
use crate::fetcher::{fetch_with_retry, FetchFailure, RetryPolicy};
use crate::scraper::PageSource;

const MAX_NAME_CHARS: usize = 200;
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif"];
const DEFAULT_EXTENSION: &str = "jpg";

#[derive(Debug, Error)]
pub enum ArtError {
    #[error("no image url")]
    NoUrl,
    #[error("download failed: {0}")]
    Fetch(FetchFailure),
    #[error("could not write {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Where one image goes: the absolute path and the path relative to the art
/// directory that is recorded alongside the collection.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtTarget {
    pub path: PathBuf,
    pub relative: String,
}

pub struct ArtworkStore {
    art_dir: PathBuf,
    invalid_chars: Regex,
    separators: Regex,
}

impl ArtworkStore {
    pub fn new(art_dir: impl Into<PathBuf>) -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| HarvestError::Config(format!("bad pattern {:?}: {}", pattern, e)))
        };
        Ok(ArtworkStore {
            art_dir: art_dir.into(),
            invalid_chars: compile(r#"[<>:"/\\|?*]"#)?,
            separators: compile(r"[_\s]+")?,
        })
    }

    pub fn art_dir(&self) -> &Path {
        &self.art_dir
    }

    /// Makes `name` safe as a single path component on common filesystems.
    pub fn sanitize_filename(&self, name: &str) -> String {
        let replaced = self.invalid_chars.replace_all(name, "_");
        let trimmed: String = replaced
            .trim_matches(|c| c == '.' || c == ' ')
            .chars()
            .take(MAX_NAME_CHARS)
            .collect();
        let collapsed = self.separators.replace_all(&trimmed, " ");
        let cleaned = collapsed.trim();
        if cleaned.is_empty() {
            "unknown".to_string()
        } else {
            cleaned.to_string()
        }
    }

    pub fn target(&self, artist: Option<&str>, title: Option<&str>, image_url: &str) -> ArtTarget {
        let name_or = |value: Option<&str>, fallback: &str| match value.filter(|v| !v.trim().is_empty()) {
            Some(v) => self.sanitize_filename(v),
            None => fallback.to_string(),
        };
        let artist = name_or(artist, "Unknown Artist");
        let title = name_or(title, "Unknown Title");
        let file_name = format!("{} - {}.{}", artist, title, image_extension(image_url));

        ArtTarget {
            path: self.art_dir.join(&artist).join(&file_name),
            relative: format!("{}/{}", artist, file_name),
        }
    }

    /// Downloads the image with the retry policy and writes it to its target.
    /// Returns the relative path on success.
    pub async fn download<S>(
        &self,
        source: &S,
        policy: &RetryPolicy,
        artist: Option<&str>,
        title: Option<&str>,
        image_url: &str,
    ) -> std::result::Result<String, ArtError>
    where
        S: PageSource + ?Sized,
    {
        if image_url.trim().is_empty() {
            return Err(ArtError::NoUrl);
        }
        let target = self.target(artist, title, image_url);

        let fetched = fetch_with_retry(policy, |_| source.fetch_bytes(image_url))
            .await
            .map_err(ArtError::Fetch)?;

        let write = |path: &Path| -> std::io::Result<()> {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, &fetched.value)
        };
        write(&target.path).map_err(|source| ArtError::Write {
            path: target.path.clone(),
            source,
        })?;

        debug!("Saved {} bytes of art to {:?}", fetched.value.len(), target.path);
        Ok(target.relative)
    }
}

/// Lower-cased image extension of the URL path, `jpg` when absent or odd.
pub fn image_extension(image_url: &str) -> String {
    Url::parse(image_url)
        .ok()
        .and_then(|url| {
            let last = url.path_segments()?.last()?.to_string();
            let (_, ext) = last.rsplit_once('.')?;
            Some(ext.to_lowercase())
        })
        .filter(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

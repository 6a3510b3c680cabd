use async_trait::async_trait;
use log::debug;
use serde_json::Value;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

use crate::fetcher::{classify_backend_error, FetchError, FetchOutcome};

/// One video returned by a search.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VideoCandidate {
    pub id: String,
    pub title: String,
    /// Uploader or channel display name.
    pub channel: String,
    pub channel_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelCandidate {
    pub channel_id: String,
    pub name: String,
}

/// Search-style lookup returning ranked video candidates.
#[async_trait]
pub trait VideoSearch: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> FetchOutcome<Vec<VideoCandidate>>;
}

/// Channel lookup used to resolve artists to channels.
#[async_trait]
pub trait ChannelDirectory: Send + Sync {
    async fn search_channels(&self, query: &str, limit: usize) -> FetchOutcome<Vec<ChannelCandidate>>;

    /// Titles of the channel's most recent uploads.
    async fn channel_uploads(&self, channel_id: &str, limit: usize) -> FetchOutcome<Vec<String>>;
}

/// Drives the `yt-dlp` executable in flat-playlist mode. Nothing is downloaded.
pub struct YtDlp {
    binary: PathBuf,
    user_agent: String,
}

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64)";

impl YtDlp {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        YtDlp {
            binary: binary.into(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }

    async fn run_json(&self, target: &str, extra: &[String]) -> FetchOutcome<Value> {
        debug!("yt-dlp {}", target);
        let output = Command::new(&self.binary)
            .args([
                "--flat-playlist",
                "--dump-single-json",
                "--skip-download",
                "--no-warnings",
                "--geo-bypass",
                "--user-agent",
                self.user_agent.as_str(),
            ])
            .args(extra)
            .arg(target)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    FetchError::ClientError(format!("{:?} not found on PATH", self.binary))
                } else {
                    FetchError::TransientProtocol(e.to_string())
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_backend_error(&stderr));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| FetchError::ServerError(format!("unparsable yt-dlp output: {}", e)))
    }
}

#[async_trait]
impl VideoSearch for YtDlp {
    async fn search(&self, query: &str, limit: usize) -> FetchOutcome<Vec<VideoCandidate>> {
        let target = format!("ytsearch{}:{}", limit.max(1), query);
        let value = self.run_json(&target, &[]).await?;
        Ok(parse_video_entries(&value))
    }
}

#[async_trait]
impl ChannelDirectory for YtDlp {
    async fn search_channels(&self, query: &str, limit: usize) -> FetchOutcome<Vec<ChannelCandidate>> {
        let target = format!("ytsearch{}:{}", limit.max(1), query);
        let value = self.run_json(&target, &[]).await?;
        Ok(parse_channel_entries(&value))
    }

    async fn channel_uploads(&self, channel_id: &str, limit: usize) -> FetchOutcome<Vec<String>> {
        let target = format!("https://www.youtube.com/channel/{}/videos", channel_id);
        let extra = vec!["--playlist-end".to_string(), limit.max(1).to_string()];
        let value = self.run_json(&target, &extra).await?;
        Ok(parse_upload_titles(&value))
    }
}

fn entries(value: &Value) -> impl Iterator<Item = &Value> {
    value
        .get("entries")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter(|entry| entry.is_object())
}

fn text_field<'a>(entry: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|key| entry.get(*key).and_then(Value::as_str))
        .find(|s| !s.trim().is_empty())
}

pub fn parse_video_entries(value: &Value) -> Vec<VideoCandidate> {
    entries(value)
        .filter_map(|entry| {
            let id = text_field(entry, &["id"])?;
            Some(VideoCandidate {
                id: id.to_string(),
                title: text_field(entry, &["title"]).unwrap_or_default().to_string(),
                channel: text_field(entry, &["uploader", "channel"])
                    .unwrap_or_default()
                    .to_string(),
                channel_id: text_field(entry, &["channel_id", "uploader_id"]).map(str::to_string),
            })
        })
        .collect()
}

/// Distinct channels behind the results, in ranking order. Only canonical
/// `UC…` channel ids are kept.
pub fn parse_channel_entries(value: &Value) -> Vec<ChannelCandidate> {
    let mut channels: Vec<ChannelCandidate> = Vec::new();
    for entry in entries(value) {
        let Some(channel_id) = text_field(entry, &["channel_id"]) else {
            continue;
        };
        if !channel_id.starts_with("UC") || channels.iter().any(|c| c.channel_id == channel_id) {
            continue;
        }
        let name = text_field(entry, &["channel", "uploader"]).unwrap_or_default();
        channels.push(ChannelCandidate {
            channel_id: channel_id.to_string(),
            name: name.to_string(),
        });
    }
    channels
}

pub fn parse_upload_titles(value: &Value) -> Vec<String> {
    entries(value)
        .filter_map(|entry| text_field(entry, &["title"]).map(str::to_string))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_search_results() {
        let value = json!({
            "entries": [
                {"id": "v1", "title": "Adele - Hello", "uploader": "AdeleVEVO", "channel_id": "UCabc"},
                null,
                {"title": "no id"},
                {"id": "v2", "title": "Hello", "channel": "Adele - Topic"}
            ]
        });
        let videos = parse_video_entries(&value);
        assert_eq!(videos.len(), 2);
        assert_eq!(videos[0].channel, "AdeleVEVO");
        assert_eq!(videos[0].channel_id.as_deref(), Some("UCabc"));
        assert_eq!(videos[1].channel, "Adele - Topic");
        assert_eq!(videos[1].channel_id, None);
    }

    #[test]
    fn missing_entries_yield_nothing() {
        assert!(parse_video_entries(&json!({})).is_empty());
        assert!(parse_video_entries(&json!({"entries": "nope"})).is_empty());
    }

    #[test]
    fn channels_are_deduplicated_and_canonical() {
        let value = json!({
            "entries": [
                {"id": "a", "channel_id": "UC1", "channel": "Adele"},
                {"id": "b", "channel_id": "UC1", "channel": "Adele"},
                {"id": "c", "channel_id": "HCxyz", "channel": "Mix"},
                {"id": "d", "channel_id": "UC2", "uploader": "Adele - Topic"}
            ]
        });
        let channels = parse_channel_entries(&value);
        assert_eq!(
            channels,
            vec![
                ChannelCandidate { channel_id: "UC1".into(), name: "Adele".into() },
                ChannelCandidate { channel_id: "UC2".into(), name: "Adele - Topic".into() },
            ]
        );
    }

    #[test]
    fn upload_titles() {
        let value = json!({"entries": [{"title": "25"}, {"title": ""}, {"id": "x"}, {"title": "21"}]});
        assert_eq!(parse_upload_titles(&value), vec!["25".to_string(), "21".to_string()]);
    }
}

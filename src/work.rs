use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;

use crate::error::{HarvestError, Result};

/// Stable identifier of one unit of work, and the key it is stored under.
///
/// Plain-integer keys sort numerically (`1, 2, 10` rather than `1, 10, 2`)
/// and always before every other key, which sort lexically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkKey(String);

impl WorkKey {
    pub fn new(key: impl Into<String>) -> Self {
        WorkKey(key.into())
    }

    /// Composite key for an (artist, track) pair.
    pub fn pair(artist: &str, track: &str) -> Self {
        WorkKey(format!("{}|{}", artist, track))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<u64> for WorkKey {
    fn from(id: u64) -> Self {
        WorkKey(id.to_string())
    }
}

impl From<&str> for WorkKey {
    fn from(key: &str) -> Self {
        WorkKey(key.to_string())
    }
}

impl fmt::Display for WorkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Ord for WorkKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.0.parse::<u64>(), other.0.parse::<u64>()) {
            (Ok(a), Ok(b)) => a.cmp(&b).then_with(|| self.0.cmp(&other.0)),
            (Ok(_), Err(_)) => Ordering::Less,
            (Err(_), Ok(_)) => Ordering::Greater,
            (Err(_), Err(_)) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for WorkKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// One unit of work plus whatever context its harvest needs.
pub trait WorkItem: Clone + Send + Sync {
    fn key(&self) -> WorkKey;

    /// Short human label for status lines.
    fn describe(&self) -> String;
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectionItem {
    pub id: u64,
    pub url: String,
}

impl WorkItem for CollectionItem {
    fn key(&self) -> WorkKey {
        WorkKey::from(self.id)
    }

    fn describe(&self) -> String {
        format!("collection {}", self.id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackItem {
    pub artist: String,
    pub track: String,
    pub album: String,
}

impl WorkItem for TrackItem {
    fn key(&self) -> WorkKey {
        WorkKey::pair(&self.artist, &self.track)
    }

    fn describe(&self) -> String {
        format!("{} - {}", self.artist, self.track)
    }
}

/// An artist to resolve, with the discography used to corroborate candidates.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ArtistItem {
    pub name: String,
    pub albums: Vec<String>,
    pub tracks: Vec<String>,
}

impl WorkItem for ArtistItem {
    fn key(&self) -> WorkKey {
        WorkKey::new(self.name.clone())
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

pub const ID_PLACEHOLDER: &str = "{id}";

/// Contiguous `[start, end]` range of collection ids, in ascending order.
pub fn id_range(start: u64, end: u64, url_template: &str) -> Result<Vec<CollectionItem>> {
    if start > end {
        return Err(HarvestError::InvalidRange { start, end });
    }
    if !url_template.contains(ID_PLACEHOLDER) {
        return Err(HarvestError::Config(format!(
            "url template {:?} has no {} placeholder",
            url_template, ID_PLACEHOLDER
        )));
    }

    Ok((start..=end)
        .map(|id| CollectionItem {
            id,
            url: url_template.replace(ID_PLACEHOLDER, &id.to_string()),
        })
        .collect())
}

/// Drops later items whose key was already produced, keeping input order.
pub fn dedup_by_key<I: WorkItem>(items: Vec<I>) -> Vec<I> {
    let mut seen = HashSet::new();
    items.into_iter().filter(|item| seen.insert(item.key())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_keys_sort_numerically() {
        let mut keys: Vec<WorkKey> = vec!["10".into(), "2".into(), "1".into()];
        keys.sort();
        let sorted: Vec<&str> = keys.iter().map(|k| k.as_str()).collect();
        assert_eq!(sorted, vec!["1", "2", "10"]);
    }

    #[test]
    fn mixed_keys_fall_back_to_lexical_order() {
        let a = WorkKey::pair("Adele", "Hello");
        let b = WorkKey::pair("Beirut", "Nantes");
        assert!(a < b);
        assert!(WorkKey::from("01") != WorkKey::from("1"));
        assert_ne!(WorkKey::from("01").cmp(&WorkKey::from("1")), Ordering::Equal);
    }

    #[test]
    fn numeric_keys_sort_before_names() {
        let mut keys: Vec<WorkKey> = vec!["2Pac".into(), "112".into(), "Adele".into(), "50".into()];
        keys.sort();
        let sorted: Vec<&str> = keys.iter().map(|k| k.as_str()).collect();
        assert_eq!(sorted, vec!["50", "112", "2Pac", "Adele"]);

        let (a, b, c) = (WorkKey::from("50"), WorkKey::from("112"), WorkKey::from("2Pac"));
        assert!(a < b && b < c && a < c);
    }

    #[test]
    fn mixed_keys_stay_unique_in_a_map() {
        let mut map = std::collections::BTreeMap::new();
        for key in ["50", "112", "2Pac", "311", "702"] {
            map.insert(WorkKey::from(key), 1);
        }
        map.insert(WorkKey::from("112"), 2);

        assert_eq!(map.len(), 5);
        for key in ["50", "112", "2Pac", "311", "702"] {
            assert!(map.contains_key(&WorkKey::from(key)), "lost {}", key);
        }
        assert_eq!(
            serde_json::to_string(&map).unwrap(),
            r#"{"50":1,"112":2,"311":1,"702":1,"2Pac":1}"#
        );
    }

    #[test]
    fn id_range_builds_urls_in_order() {
        let items = id_range(3, 5, "https://host/collection/{id}").unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].url, "https://host/collection/3");
        assert_eq!(items[2].key(), WorkKey::from(5));
    }

    #[test]
    fn id_range_rejects_inverted_bounds_and_bad_template() {
        assert!(matches!(
            id_range(5, 3, "x/{id}"),
            Err(HarvestError::InvalidRange { start: 5, end: 3 })
        ));
        assert!(matches!(id_range(1, 3, "x/"), Err(HarvestError::Config(_))));
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let item = |album: &str| TrackItem {
            artist: "Adele".to_string(),
            track: "Hello".to_string(),
            album: album.to_string(),
        };
        let items = dedup_by_key(vec![item("25"), item("Live"), item("25")]);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].album, "25");
    }
}

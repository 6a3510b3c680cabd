use log::{error, info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::error::{HarvestError, Result};
use crate::work::WorkKey;

/// Durable key → result map. `None` marks a key that was attempted but is
/// not resolved yet.
///
/// The file on disk is only ever replaced by renaming a fully written
/// sibling temp file over it, so it is always the previous complete state
/// or the new complete state.
#[derive(Debug)]
pub struct CheckpointStore<R> {
    path: PathBuf,
    entries: BTreeMap<WorkKey, Option<R>>,
}

impl<R> CheckpointStore<R>
where
    R: Serialize + DeserializeOwned,
{
    /// Loads the store at `path`. A missing or malformed file yields an empty
    /// store; this never fails.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<BTreeMap<WorkKey, Option<R>>>(&content) {
                Ok(entries) => {
                    let unresolved = entries.values().filter(|v| v.is_none()).count();
                    info!(
                        "Resumed {:?}: {} entries ({} unresolved).",
                        path,
                        entries.len(),
                        unresolved
                    );
                    entries
                }
                Err(e) => {
                    error!("Failed to parse checkpoint {:?}: {}. Starting fresh.", path, e);
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("No checkpoint at {:?}. Starting fresh.", path);
                BTreeMap::new()
            }
            Err(e) => {
                error!("Failed to read checkpoint {:?}: {}. Starting fresh.", path, e);
                BTreeMap::new()
            }
        };

        CheckpointStore { path, entries }
    }

    /// Atomically replaces the file on disk with the current state.
    pub fn save(&self) -> Result<()> {
        self.save_with_hook(|_| Ok(()))
    }

    /// `save`, with a hook that runs after the temp file is complete and
    /// before it is renamed over the target.
    pub fn save_with_hook<F>(&self, pre_rename: F) -> Result<()>
    where
        F: FnOnce(&Path) -> io::Result<()>,
    {
        let mut json = serde_json::to_string_pretty(&self.entries)?;
        json.push('\n');
        write_atomic_with_hook(&self.path, json.as_bytes(), pre_rename)
    }
}

/// Replaces `path` with `bytes` through a synced sibling temp file, so
/// readers see either the old or the new content and never a mix.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    write_atomic_with_hook(path, bytes, |_| Ok(()))
}

fn write_atomic_with_hook<F>(path: &Path, bytes: &[u8], pre_rename: F) -> Result<()>
where
    F: FnOnce(&Path) -> io::Result<()>,
{
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;

    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(bytes)?;
    temp.flush()?;
    temp.as_file_mut().sync_all()?;

    let temp_path = temp.into_temp_path();
    pre_rename(temp_path.as_ref())?;
    temp_path.persist(path).map_err(|e| HarvestError::Io(e.error))?;
    Ok(())
}

impl<R> CheckpointStore<R> {
    /// Empty in-memory store that will save to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        CheckpointStore {
            path: path.into(),
            entries: BTreeMap::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mark_resolved(&mut self, key: WorkKey, record: R) {
        self.entries.insert(key, Some(record));
    }

    /// Records an unresolved attempt. A resolved entry is never downgraded.
    pub fn mark_unresolved(&mut self, key: WorkKey) {
        self.entries.entry(key).or_insert(None);
    }

    /// Drops every unresolved entry and returns how many were removed.
    pub fn purge_unresolved(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, v| v.is_some());
        before - self.entries.len()
    }

    pub fn verify_resolved_only(&self) -> Result<()> {
        let unresolved = self.unresolved_count();
        if unresolved > 0 {
            warn!("{} unresolved entries left in {:?}", unresolved, self.path);
            return Err(HarvestError::Invariant(format!(
                "{} unresolved entries remain after cleanup",
                unresolved
            )));
        }
        Ok(())
    }

    pub fn contains(&self, key: &WorkKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn is_resolved(&self, key: &WorkKey) -> bool {
        matches!(self.entries.get(key), Some(Some(_)))
    }

    pub fn is_unresolved(&self, key: &WorkKey) -> bool {
        matches!(self.entries.get(key), Some(None))
    }

    pub fn get(&self, key: &WorkKey) -> Option<&R> {
        self.entries.get(key).and_then(Option::as_ref)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn resolved_count(&self) -> usize {
        self.entries.values().filter(|v| v.is_some()).count()
    }

    pub fn unresolved_count(&self) -> usize {
        self.entries.values().filter(|v| v.is_none()).count()
    }

    /// Resolved records in key order.
    pub fn records(&self) -> impl Iterator<Item = (&WorkKey, &R)> {
        self.entries
            .iter()
            .filter_map(|(k, v)| v.as_ref().map(|record| (k, record)))
    }
}

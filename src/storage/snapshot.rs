use crate::state::{Baselines, FeedState};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Version written into every snapshot.
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to serialize snapshot: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to write snapshot '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Snapshot writer task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Persisted form of one URL's baseline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferencePost {
    #[serde(alias = "Url")]
    pub url: String,
    #[serde(alias = "IsYoutube", default)]
    pub is_youtube: bool,
    #[serde(alias = "LastRunDate", deserialize_with = "deserialize_timestamp")]
    pub last_run_date: DateTime<Utc>,
}

/// On-disk document: `{"version": 1, "entries": [...]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSnapshot {
    #[serde(alias = "Version", default)]
    pub version: u32,
    #[serde(alias = "Entries", default)]
    pub entries: Vec<ReferencePost>,
}

/// Accepts RFC 3339 timestamps and offset-less ones, which are taken as UTC.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    if let Ok(dt) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(serde::de::Error::custom)
}

/// JSON file holding the baselines of one or more feed instances.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the stored baselines.
    ///
    /// A missing, empty or malformed file yields an empty mapping: losing
    /// baselines only means the next start re-establishes them. Blank URLs
    /// are skipped and URLs are trimmed.
    pub fn load(&self) -> Baselines {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Baselines::new(),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to read snapshot, starting fresh");
                return Baselines::new();
            }
        };

        if content.trim().is_empty() {
            return Baselines::new();
        }

        let snapshot: PersistedSnapshot = match serde_json::from_str(&content) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Malformed snapshot ignored");
                return Baselines::new();
            }
        };

        snapshot
            .entries
            .into_iter()
            .filter_map(|entry| {
                let url = entry.url.trim();
                if url.is_empty() {
                    return None;
                }
                Some((
                    url.to_string(),
                    FeedState {
                        is_youtube: entry.is_youtube,
                        last_publish_date: entry.last_run_date,
                    },
                ))
            })
            .collect()
    }

    /// [`save`](Self::save) on the blocking thread pool.
    pub async fn save_async(&self, baselines: Baselines) -> Result<(), StoreError> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.save(&baselines)).await?
    }

    /// Replaces the file with `baselines`.
    ///
    /// Writes a temporary sibling, syncs it, renames it over the target and
    /// syncs the directory, so readers see either the old document or the
    /// new one, and the rename survives a crash.
    pub fn save(&self, baselines: &Baselines) -> Result<(), StoreError> {
        let mut entries: Vec<ReferencePost> = baselines
            .iter()
            .map(|(url, state)| ReferencePost {
                url: url.clone(),
                is_youtube: state.is_youtube,
                last_run_date: state.last_publish_date,
            })
            .collect();
        entries.sort_by(|a, b| a.url.cmp(&b.url));

        let snapshot = PersistedSnapshot {
            version: SNAPSHOT_VERSION,
            entries,
        };
        let bytes = serde_json::to_vec_pretty(&snapshot)?;

        let dir = match self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => parent,
            None => Path::new("."),
        };
        std::fs::create_dir_all(dir).map_err(|source| self.io_error(source))?;

        let mut tmp_name = self.path.clone().into_os_string();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        let written = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)
            .and_then(|mut file| {
                file.write_all(&bytes)?;
                file.sync_all()
            });
        if let Err(source) = written {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(self.io_error(source));
        }

        std::fs::rename(&tmp_path, &self.path).map_err(|source| {
            let _ = std::fs::remove_file(&tmp_path);
            self.io_error(source)
        })?;
        fsync_dir(dir).map_err(|source| self.io_error(source))?;

        tracing::debug!(path = %self.path.display(), entries = snapshot.entries.len(), "Snapshot saved");
        Ok(())
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

/// Makes a completed rename in `dir` durable.
#[cfg(unix)]
fn fsync_dir(dir: &Path) -> std::io::Result<()> {
    OpenOptions::new().read(true).open(dir)?.sync_all()
}

// Directories cannot be opened for syncing here; the rename is the best we get.
#[cfg(not(unix))]
fn fsync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

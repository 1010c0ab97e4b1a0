//! On-disk cache index.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::is_valid_fingerprint;
use crate::utils::fs::{ensure_dir_all, extension_lower, file_size, io_error, remove_dir_if_exists};
use crate::{Error, Result};

const META_FILE: &str = "meta.json";

/// Metadata record written last for each entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheMeta {
    fingerprint: String,
    /// File names relative to the entry directory.
    vocals: String,
    instrumental: String,
    title: Option<String>,
    source: String,
    created_at: DateTime<Utc>,
}

/// A complete cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheEntry {
    pub fingerprint: String,
    #[serde(skip)]
    pub foreground: PathBuf,
    #[serde(skip)]
    pub background: PathBuf,
    pub title: Option<String>,
    pub source: String,
    pub created_at: DateTime<Utc>,
    /// Combined size of both tracks in bytes.
    pub size: u64,
}

/// Cache statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub count: usize,
    pub total_size: u64,
    pub entries: Vec<CacheEntry>,
}

/// Fingerprint-keyed result cache rooted at a directory.
pub struct CacheIndex {
    root: PathBuf,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl CacheIndex {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: DashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_dir(&self, fingerprint: &str) -> PathBuf {
        self.root.join(fingerprint)
    }

    fn lock_for(&self, fingerprint: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(fingerprint.to_string())
            .or_default()
            .clone()
    }

    /// Look up a complete entry. Anything partial is a miss.
    pub async fn lookup(&self, fingerprint: &str) -> Option<CacheEntry> {
        if !is_valid_fingerprint(fingerprint) {
            return None;
        }
        self.read_entry(&self.entry_dir(fingerprint)).await
    }

    async fn read_entry(&self, dir: &Path) -> Option<CacheEntry> {
        let raw = tokio::fs::read(dir.join(META_FILE)).await.ok()?;
        let meta: CacheMeta = match serde_json::from_slice(&raw) {
            Ok(meta) => meta,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Ignoring unreadable cache metadata");
                return None;
            }
        };

        let foreground = dir.join(&meta.vocals);
        let background = dir.join(&meta.instrumental);
        let fg_meta = tokio::fs::metadata(&foreground).await.ok()?;
        let bg_meta = tokio::fs::metadata(&background).await.ok()?;
        if !fg_meta.is_file() || !bg_meta.is_file() {
            return None;
        }

        Some(CacheEntry {
            fingerprint: meta.fingerprint,
            foreground,
            background,
            title: meta.title,
            source: meta.source,
            created_at: meta.created_at,
            size: fg_meta.len() + bg_meta.len(),
        })
    }

    fn release_lock(&self, fingerprint: &str, lock: Arc<Mutex<()>>) {
        // Held by the map and by `lock`: nobody else is waiting on it.
        self.locks.remove_if(fingerprint, |_, held| {
            Arc::ptr_eq(held, &lock) && Arc::strong_count(held) == 2
        });
    }

    /// Copy both tracks into the cache and publish the entry.
    ///
    /// A complete entry for the same fingerprint is kept as it is, since
    /// jobs served from it reference its files. A partial one is replaced.
    pub async fn store(
        &self,
        fingerprint: &str,
        foreground: &Path,
        background: &Path,
        title: Option<&str>,
        source: &str,
    ) -> Result<CacheEntry> {
        if !is_valid_fingerprint(fingerprint) {
            return Err(Error::validation(format!(
                "invalid cache fingerprint '{fingerprint}'"
            )));
        }

        let lock = self.lock_for(fingerprint);
        let result = {
            let _guard = lock.lock().await;
            self.store_locked(fingerprint, foreground, background, title, source)
                .await
        };
        self.release_lock(fingerprint, lock);
        result
    }

    async fn store_locked(
        &self,
        fingerprint: &str,
        foreground: &Path,
        background: &Path,
        title: Option<&str>,
        source: &str,
    ) -> Result<CacheEntry> {
        let dir = self.entry_dir(fingerprint);
        if let Some(existing) = self.read_entry(&dir).await {
            debug!(fingerprint = %fingerprint, "Cache entry already present");
            return Ok(existing);
        }

        let staging = self
            .root
            .join(format!(".staging-{fingerprint}-{}", Uuid::new_v4().simple()));
        let written =
            write_staged(&staging, fingerprint, foreground, background, title, source).await;
        if let Err(e) = written {
            if let Err(cleanup) = remove_dir_if_exists(&staging).await {
                warn!(
                    dir = %staging.display(),
                    error = %cleanup,
                    "Failed to remove cache staging directory"
                );
            }
            return Err(e);
        }

        // Whatever is left at `dir` is partial.
        remove_dir_if_exists(&dir)
            .await
            .map_err(|e| Error::CacheWrite(e.to_string()))?;
        tokio::fs::rename(&staging, &dir)
            .await
            .map_err(|e| Error::CacheWrite(io_error("renaming", &staging, e).to_string()))?;

        info!(fingerprint = %fingerprint, "Stored cache entry");
        self.read_entry(&dir)
            .await
            .ok_or_else(|| Error::CacheWrite(format!("entry {fingerprint} unreadable after write")))
    }

    /// Delete an entry. Returns `false` if it did not exist.
    pub async fn delete(&self, fingerprint: &str) -> Result<bool> {
        if !is_valid_fingerprint(fingerprint) {
            return Err(Error::validation(format!(
                "invalid cache fingerprint '{fingerprint}'"
            )));
        }

        let lock = self.lock_for(fingerprint);
        let removed = {
            let _guard = lock.lock().await;
            remove_dir_if_exists(&self.entry_dir(fingerprint)).await
        };
        self.release_lock(fingerprint, lock);
        let removed = removed?;
        if removed {
            debug!(fingerprint = %fingerprint, "Deleted cache entry");
        }
        Ok(removed)
    }

    /// Delete every entry. Returns how many were removed.
    pub async fn clear(&self) -> Result<usize> {
        let mut removed = 0;
        for fingerprint in self.fingerprints().await? {
            if self.delete(&fingerprint).await? {
                removed += 1;
            }
        }
        info!(removed, "Cleared cache");
        Ok(removed)
    }

    /// Complete entries, newest first, with their combined size.
    pub async fn stats(&self) -> Result<CacheStats> {
        let mut entries = Vec::new();
        for fingerprint in self.fingerprints().await? {
            if let Some(entry) = self.read_entry(&self.entry_dir(&fingerprint)).await {
                entries.push(entry);
            }
        }
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(CacheStats {
            count: entries.len(),
            total_size: entries.iter().map(|e| e.size).sum(),
            entries,
        })
    }

    /// Names of fingerprint-shaped directories under the root.
    async fn fingerprints(&self) -> Result<Vec<String>> {
        let mut dir = match tokio::fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error("reading cache directory", &self.root, e)),
        };

        let mut out = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| io_error("reading cache directory", &self.root, e))?
        {
            if let Some(name) = entry.file_name().to_str()
                && is_valid_fingerprint(name)
            {
                out.push(name.to_string());
            }
        }
        Ok(out)
    }
}

fn track_file_name(track: &str, source: &Path) -> String {
    match extension_lower(source) {
        Some(ext) => format!("{track}.{ext}"),
        None => track.to_string(),
    }
}

/// Write both tracks and the metadata file into a fresh directory.
async fn write_staged(
    dir: &Path,
    fingerprint: &str,
    foreground: &Path,
    background: &Path,
    title: Option<&str>,
    source: &str,
) -> Result<()> {
    ensure_dir_all(dir)
        .await
        .map_err(|e| Error::CacheWrite(e.to_string()))?;

    let vocals = track_file_name("vocals", foreground);
    let instrumental = track_file_name("instrumental", background);
    copy_into(foreground, &dir.join(&vocals)).await?;
    copy_into(background, &dir.join(&instrumental)).await?;

    let meta = CacheMeta {
        fingerprint: fingerprint.to_string(),
        vocals,
        instrumental,
        title: title.map(str::to_string),
        source: source.to_string(),
        created_at: Utc::now(),
    };
    let json = serde_json::to_vec_pretty(&meta)?;

    // The metadata file is what makes an entry visible.
    let meta_path = dir.join(META_FILE);
    let temp_path = meta_path.with_extension("tmp");
    tokio::fs::write(&temp_path, &json)
        .await
        .map_err(|e| Error::CacheWrite(io_error("writing", &temp_path, e).to_string()))?;
    tokio::fs::rename(&temp_path, &meta_path)
        .await
        .map_err(|e| Error::CacheWrite(io_error("renaming", &temp_path, e).to_string()))?;
    Ok(())
}

async fn copy_into(from: &Path, to: &Path) -> Result<()> {
    tokio::fs::copy(from, to)
        .await
        .map_err(|e| Error::CacheWrite(io_error("copying", from, e).to_string()))?;
    let bytes = file_size(to).await;
    debug!(from = %from.display(), to = %to.display(), bytes, "Copied into cache");
    Ok(())
}

//! # Watermark store
//! Persisted mapping `feed id -> dedupe key of the newest entry seen`.
//!
//! Loaded once at start, shared by every feed task behind an internal
//! reader/writer lock, saved once after all tasks have joined. The file is a
//! flat, indented JSON object and is replaced atomically on save
//! (write `<path>.tmp`, fsync, rename).

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use anyhow::{Context, Result};

#[derive(Debug, Default)]
pub struct WatermarkStore {
    inner: RwLock<BTreeMap<String, String>>,
}

impl WatermarkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from `path`. A missing or empty file is an empty store;
    /// anything that is not a JSON object of strings is an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = match fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("reading state from {}", path.display()))
            }
        };

        if content.trim().is_empty() {
            return Ok(Self::new());
        }

        let map: BTreeMap<String, String> = serde_json::from_str(&content)
            .with_context(|| format!("parsing state file {}", path.display()))?;
        Ok(Self {
            inner: RwLock::new(map),
        })
    }

    /// Stored watermark for `feed_id`. Empty strings count as absent.
    pub fn get(&self, feed_id: &str) -> Option<String> {
        let map = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        map.get(feed_id).filter(|w| !w.is_empty()).cloned()
    }

    pub fn set(&self, feed_id: impl Into<String>, watermark: impl Into<String>) {
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        map.insert(feed_id.into(), watermark.into());
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Owned copy of the whole mapping.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Persist the mapping to `path` atomically, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating state dir {}", dir.display()))?;
        }

        let json = serde_json::to_string_pretty(&self.snapshot()).context("encoding state")?;

        let tmp = tmp_path(path);
        write_synced(&tmp, json.as_bytes())
            .with_context(|| format!("writing temp state {}", tmp.display()))?;
        fs::rename(&tmp, path)
            .with_context(|| format!("replacing state file {}", path.display()))?;
        Ok(())
    }
}

/// Sibling temp file so the final rename never crosses filesystems.
fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut f = fs::File::create(path)?;
    f.write_all(bytes)?;
    f.sync_all()
}

//! JSON file cache for normalized series.
//!
//! One file per (source, subject, horizon). Files are replaced atomically by
//! writing a sibling temp file and renaming it over the target, so a reader
//! never sees a half-written series.

use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::fs;
use tracing::{debug, info, warn};

use super::Source;
use crate::error::Result;
use crate::series::Horizon;

/// Identifies one cached series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    pub source: Source,
    /// Price area or location, already rendered for a file name.
    pub subject: String,
    pub horizon: Horizon,
}

impl CacheKey {
    pub fn new(source: Source, subject: impl Into<String>, horizon: Horizon) -> Self {
        Self {
            source,
            subject: subject.into(),
            horizon,
        }
    }

    fn file_name(&self) -> String {
        format!(
            "{}_{}_{}.json",
            self.source.as_str(),
            self.subject,
            self.horizon.cache_suffix()
        )
    }
}

#[derive(Debug, Clone)]
pub struct SeriesCache {
    dir: PathBuf,
    reuse: bool,
}

impl SeriesCache {
    /// Creates a cache rooted at `dir`.
    ///
    /// With `reuse` off, series are still written but never read back.
    pub fn new(dir: impl Into<PathBuf>, reuse: bool) -> Self {
        Self {
            dir: dir.into(),
            reuse,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(key.file_name())
    }

    /// Reads a cached value.
    ///
    /// A missing file is `Ok(None)`. A file that no longer parses is logged and
    /// treated as missing so the next fetch overwrites it.
    ///
    /// # Errors
    ///
    /// Returns `Cache` for I/O failures other than "not found".
    pub async fn load<T: DeserializeOwned>(&self, key: &CacheKey) -> Result<Option<T>> {
        let path = self.path(key);
        let json = match fs::read_to_string(&path).await {
            Ok(json) => json,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str(&json) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unreadable cache file");
                Ok(None)
            }
        }
    }

    /// Writes `value` for `key`, replacing any previous file.
    ///
    /// # Errors
    ///
    /// Returns `Cache` if the directory or file cannot be written.
    pub async fn store<T: Serialize>(&self, key: &CacheKey, value: &T) -> Result<()> {
        fs::create_dir_all(&self.dir).await?;
        let path = self.path(key);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(value).map_err(std::io::Error::other)?;
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &path).await?;
        debug!(path = %path.display(), "cache written");
        Ok(())
    }

    /// Returns the cached value for `key`, or runs `fetch` and caches its result.
    ///
    /// `refresh` forces a fetch even when reuse is enabled. A failed fetch
    /// leaves the existing file untouched.
    pub async fn get_or_fetch<T, F, Fut>(&self, key: &CacheKey, refresh: bool, fetch: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if self.reuse && !refresh {
            if let Some(hit) = self.load(key).await? {
                info!(source = %key.source.as_str(), subject = %key.subject, "cache hit");
                return Ok(hit);
            }
        }
        let value = fetch().await?;
        self.store(key, &value).await?;
        Ok(value)
    }
}

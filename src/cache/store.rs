use std::{
    future::Future,
    io::{self, ErrorKind, Write},
    path::{Path, PathBuf},
    time::Instant,
};

use metrics::counter;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, warn};

use super::{
    METRIC_CACHE_HIT_TOTAL, METRIC_CACHE_MISS_TOTAL, METRIC_CACHE_WRITE_ERROR_TOTAL,
    keys::entry_file_name,
};

const SOURCE: &str = "scribe::cache::store";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache i/o failed at `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cache task failed: {0}")]
    Task(String),
}

impl CacheError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Rendered-response cache rooted at one directory.
#[derive(Debug, Clone)]
pub struct DiskCache {
    dir: PathBuf,
    enabled: bool,
}

impl DiskCache {
    pub fn new(dir: impl Into<PathBuf>, enabled: bool) -> Self {
        Self {
            dir: dir.into(),
            enabled,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(entry_file_name(key))
    }

    /// Return the cached body for `key`, or run `producer` and cache its output.
    ///
    /// `Ok(None)` from the producer means "not found" and is never stored.
    /// Producer errors pass through untouched. Cache I/O failures never fail
    /// the request: a bad read counts as a miss and a bad write only loses
    /// the memoization.
    pub async fn get_or_render<F, Fut, E>(
        &self,
        key: &str,
        producer: F,
    ) -> Result<Option<String>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<String>, E>>,
    {
        if !self.enabled {
            return producer().await;
        }

        let path = self.entry_path(key);
        match tokio::fs::read_to_string(&path).await {
            Ok(body) => {
                counter!(METRIC_CACHE_HIT_TOTAL).increment(1);
                debug!(
                    target = SOURCE,
                    key,
                    path = %path.display(),
                    body_bytes = body.len(),
                    "cache hit"
                );
                return Ok(Some(body));
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => {
                warn!(
                    target = SOURCE,
                    key,
                    path = %path.display(),
                    error = %err,
                    "cache read failed; rendering afresh"
                );
            }
        }
        counter!(METRIC_CACHE_MISS_TOTAL).increment(1);

        let started_at = Instant::now();
        let Some(body) = producer().await? else {
            return Ok(None);
        };

        match self.store(path.clone(), body.clone()).await {
            Ok(()) => debug!(
                target = SOURCE,
                key,
                path = %path.display(),
                body_bytes = body.len(),
                elapsed_ms = started_at.elapsed().as_millis() as u64,
                "cache entry written"
            ),
            Err(err) => {
                counter!(METRIC_CACHE_WRITE_ERROR_TOTAL).increment(1);
                warn!(
                    target = SOURCE,
                    key,
                    path = %path.display(),
                    error = %err,
                    "cache write failed; serving uncached body"
                );
            }
        }

        Ok(Some(body))
    }

    /// Atomically write `body` to `path` through a temp file in the same directory.
    async fn store(&self, path: PathBuf, body: String) -> Result<(), CacheError> {
        let dir = self.dir.clone();
        tokio::task::spawn_blocking(move || {
            std::fs::create_dir_all(&dir).map_err(|err| CacheError::io(&dir, err))?;
            let mut file = NamedTempFile::new_in(&dir).map_err(|err| CacheError::io(&dir, err))?;
            if let Err(err) = file.write_all(body.as_bytes()).and_then(|()| file.flush()) {
                return Err(CacheError::io(file.path(), err));
            }
            // Concurrent writers race harmlessly; the last rename wins.
            file.persist(&path)
                .map_err(|err| CacheError::io(&path, err.error))?;
            Ok(())
        })
        .await
        .map_err(|err| CacheError::Task(err.to_string()))?
    }

    /// Remove every regular file in the cache directory, returning how many were removed.
    pub async fn clear(&self) -> Result<usize, CacheError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(CacheError::io(&self.dir, err)),
        };

        let mut removed = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|err| CacheError::io(&self.dir, err))?
        {
            let path = entry.path();
            let file_type = entry
                .file_type()
                .await
                .map_err(|err| CacheError::io(&path, err))?;
            if !file_type.is_file() {
                continue;
            }
            match tokio::fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => return Err(CacheError::io(&path, err)),
            }
        }

        debug!(
            target = SOURCE,
            dir = %self.dir.display(),
            removed,
            "cache cleared"
        );
        Ok(removed)
    }
}

//! Infrastructure implementation of the `CacheStore` port.
//!
//! One YAML file per key under the cache directory, written atomically
//! (temp file + rename) so a reader never sees a partial entry.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::application::ports::CacheStore;
use crate::domain::cache::CacheEntry;
use crate::domain::error::CacheError;

/// File-backed cache store.
pub struct FileCacheStore {
    dir: PathBuf,
}

impl FileCacheStore {
    /// Cache under `$SPELL_CACHE_DIR`, or `<cache_dir>/spell`.
    ///
    /// # Errors
    ///
    /// Returns an error if no cache directory can be determined.
    pub fn new() -> Result<Self> {
        if let Ok(dir) = std::env::var("SPELL_CACHE_DIR") {
            return Ok(Self::with_dir(PathBuf::from(dir)));
        }
        let cache =
            dirs::cache_dir().ok_or_else(|| anyhow::anyhow!("cannot determine cache directory"))?;
        Ok(Self::with_dir(cache.join("spell")))
    }

    /// Cache under an explicit directory (used in tests).
    #[must_use]
    pub fn with_dir(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.yaml"))
    }
}

fn io_error(path: &Path, e: &std::io::Error) -> CacheError {
    let shown = path.display().to_string();
    match e.kind() {
        ErrorKind::NotFound => CacheError::NotFound(shown),
        ErrorKind::PermissionDenied => CacheError::PermissionDenied(shown),
        _ => CacheError::Io {
            path: shown,
            reason: e.to_string(),
        },
    }
}

impl CacheStore for FileCacheStore {
    fn load(&self, key: &str) -> Result<CacheEntry, CacheError> {
        let path = self.path(key);
        let content = std::fs::read_to_string(&path).map_err(|e| io_error(&path, &e))?;
        serde_yaml::from_str(&content).map_err(|e| CacheError::Io {
            path: path.display().to_string(),
            reason: format!("corrupt cache entry: {e}"),
        })
    }

    fn commit(&self, key: &str, entry: &CacheEntry) -> Result<(), CacheError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| io_error(&self.dir, &e))?;
        let path = self.path(key);
        let content = serde_yaml::to_string(entry).map_err(|e| CacheError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let temp_path = path.with_extension("yaml.tmp");
        std::fs::write(&temp_path, content).map_err(|e| io_error(&temp_path, &e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&temp_path, std::fs::Permissions::from_mode(0o600))
                .map_err(|e| io_error(&temp_path, &e))?;
        }

        std::fs::rename(&temp_path, &path).map_err(|e| io_error(&path, &e))
    }
}

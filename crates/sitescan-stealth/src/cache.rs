use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("failed to read user-agent cache {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to write user-agent cache {path}: {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("no home directory to place the user-agent cache in")]
    NoHome,
}

/// Single-line file holding the normalized user agent between runs.
///
/// Read if present, written once if absent; an existing entry is never
/// overwritten.
#[derive(Debug, Clone)]
pub struct UserAgentCache {
    path: PathBuf,
}

impl UserAgentCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `$SITESCAN_UA_CACHE`, else `~/.sitescan/user-agent.txt`.
    pub fn from_env() -> Result<Self, CacheError> {
        if let Ok(path) = std::env::var("SITESCAN_UA_CACHE") {
            if !path.trim().is_empty() {
                return Ok(Self::new(path.trim()));
            }
        }
        let home = home::home_dir().ok_or(CacheError::NoHome)?;
        Ok(Self::new(home.join(".sitescan").join("user-agent.txt")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<String>, CacheError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => {
                let value = contents.lines().next().unwrap_or_default().trim();
                Ok((!value.is_empty()).then(|| value.to_string()))
            }
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(CacheError::Read {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// Returns `false` when an entry already existed and was left alone.
    pub fn store(&self, user_agent: &str) -> Result<bool, CacheError> {
        if self.load()?.is_some() {
            return Ok(false);
        }

        let write_error = |source| CacheError::Write {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(write_error)?;
        }
        fs::write(&self.path, format!("{}\n", user_agent.trim())).map_err(write_error)?;
        tracing::info!(
            target: "sitescan_stealth",
            path = %self.path.display(),
            "cached user agent"
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let cache = UserAgentCache::new(dir.path().join("ua.txt"));
        assert!(cache.load().unwrap().is_none());
    }

    #[test]
    fn store_writes_once() {
        let dir = tempfile::tempdir().unwrap();
        let cache = UserAgentCache::new(dir.path().join("nested").join("ua.txt"));

        assert!(cache.store("Mozilla/5.0 Chrome/120.0.0.0").unwrap());
        assert!(!cache.store("Mozilla/5.0 Chrome/999.0.0.0").unwrap());
        assert_eq!(
            cache.load().unwrap().as_deref(),
            Some("Mozilla/5.0 Chrome/120.0.0.0")
        );
    }

    #[test]
    fn blank_file_counts_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ua.txt");
        fs::write(&path, "\n").unwrap();
        let cache = UserAgentCache::new(&path);

        assert!(cache.load().unwrap().is_none());
        assert!(cache.store("Mozilla/5.0 Chrome/120.0.0.0").unwrap());
    }
}

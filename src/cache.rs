//! Durable key/value cache for received config.
//!
//! The same mapping is kept in two on-disk forms: one aggregate JSON
//! document and one file per key for consumers that prefer direct filesystem
//! lookup. Both are rewritten on every successful delivery. Every file is
//! written to a temp path and renamed into place, so a concurrent reader
//! never observes a partial write; the aggregate rename is the point at
//! which a reader switches from one delivery to the next.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::paths;
use crate::wire::ConfigSet;

/// Handle on one cache directory.
///
/// The root is injectable so tests (and alternate deployments) can run
/// against isolated directories instead of `/var/lib/qubesdb`.
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Persist both on-disk forms of `entries`.
    ///
    /// Per-key files are written first and the aggregate last, so `load`
    /// never returns a mapping whose per-key files have not landed yet.
    pub fn save(&self, entries: &ConfigSet) -> Result<(), ConfigError> {
        let entries_dir = paths::entries_dir(&self.root);
        fs::create_dir_all(&entries_dir).map_err(|e| ConfigError::Io {
            context: format!("creating {}", entries_dir.display()),
            source: e,
        })?;

        for (key, value) in entries {
            write_atomic(&entries_dir.join(paths::safe_key(key)), value.as_bytes())?;
        }
        self.remove_stale_keys(&entries_dir, entries)?;

        let json = serde_json::to_string_pretty(entries).map_err(|e| ConfigError::Io {
            context: "encoding aggregate document".to_string(),
            source: e.into(),
        })?;
        write_atomic(&paths::aggregate_path(&self.root), json.as_bytes())?;

        tracing::info!(
            count = entries.len(),
            cache = %self.root.display(),
            "cached entries"
        );
        Ok(())
    }

    /// Read the aggregate document. A missing document is first boot before
    /// any delivery, not an error: returns an empty set.
    pub fn load(&self) -> Result<ConfigSet, ConfigError> {
        let path = paths::aggregate_path(&self.root);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ConfigSet::new()),
            Err(e) => {
                return Err(ConfigError::Io {
                    context: format!("reading {}", path.display()),
                    source: e,
                });
            }
        };
        serde_json::from_slice(&data).map_err(|e| ConfigError::Io {
            context: format!("parsing {}", path.display()),
            source: e.into(),
        })
    }

    /// Look up a single key. Absent keys are a normal outcome for callers
    /// probing optional config, surfaced as `KeyNotFound`.
    pub fn get(&self, key: &str) -> Result<String, ConfigError> {
        self.load()?
            .remove(key)
            .ok_or_else(|| ConfigError::KeyNotFound {
                key: key.to_string(),
            })
    }

    /// All entries sorted lexicographically by key.
    pub fn list(&self) -> Result<Vec<(String, String)>, ConfigError> {
        Ok(self.load()?.into_iter().collect())
    }

    /// Drop per-key files left over from an earlier delivery.
    fn remove_stale_keys(
        &self,
        entries_dir: &Path,
        entries: &ConfigSet,
    ) -> Result<(), ConfigError> {
        let keep: BTreeSet<String> = entries.keys().map(|k| paths::safe_key(k)).collect();
        let dir = fs::read_dir(entries_dir).map_err(|e| ConfigError::Io {
            context: format!("listing {}", entries_dir.display()),
            source: e,
        })?;
        for dirent in dir {
            let dirent = dirent.map_err(|e| ConfigError::Io {
                context: format!("listing {}", entries_dir.display()),
                source: e,
            })?;
            let name = dirent.file_name().to_string_lossy().into_owned();
            if !keep.contains(&name) {
                let _ = fs::remove_file(dirent.path());
            }
        }
        Ok(())
    }
}

/// Write `data` to a sibling temp file and rename it over `path`.
fn write_atomic(path: &Path, data: &[u8]) -> Result<(), ConfigError> {
    let mut tmp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    fs::write(&tmp, data).map_err(|e| ConfigError::Io {
        context: format!("writing {}", tmp.display()),
        source: e,
    })?;
    fs::rename(&tmp, path).map_err(|e| ConfigError::Io {
        context: format!("renaming {} into place", tmp.display()),
        source: e,
    })
}

// src/store.rs
//! Persisted grade snapshot: one JSON array of fingerprinted grades in a
//! single file, fully rewritten on every save (write to a sibling temp file,
//! then rename over the target).

use std::path::{Path, PathBuf};
use std::str::FromStr;

use tokio::fs;

use crate::error::StoreError;
use crate::grades::FingerprintedGrade;

/// What to do when the snapshot file does not exist yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FirstRunPolicy {
    /// Seed an empty snapshot, so the first cycle announces every grade once.
    #[default]
    NotifyAll,
    /// Seed the first fetched set, so the first cycle announces nothing.
    SeedSilently,
}

impl FromStr for FirstRunPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "notify-all" | "notify_all" => Ok(Self::NotifyAll),
            "seed-silently" | "seed_silently" => Ok(Self::SeedSilently),
            other => Err(format!(
                "unknown first-run policy `{other}` (expected notify-all or seed-silently)"
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GradeStore {
    path: PathBuf,
}

impl GradeStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }

    pub async fn exists(&self) -> Result<bool, StoreError> {
        fs::try_exists(&self.path).await.map_err(|e| self.io_err(e))
    }

    /// Read the snapshot. A missing file is an I/O error; malformed content
    /// is `StoreError::Corrupt`.
    pub async fn load(&self) -> Result<Vec<FingerprintedGrade>, StoreError> {
        let raw = fs::read_to_string(&self.path)
            .await
            .map_err(|e| self.io_err(e))?;
        serde_json::from_str(&raw).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    /// `None` when no snapshot has ever been written.
    pub async fn load_baseline(&self) -> Result<Option<Vec<FingerprintedGrade>>, StoreError> {
        if !self.exists().await? {
            return Ok(None);
        }
        self.load().await.map(Some)
    }

    /// Overwrite the snapshot with `complete`, creating parent directories.
    pub async fn save(&self, complete: &[FingerprintedGrade]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| self.io_err(e))?;
            }
        }

        let body = serde_json::to_vec_pretty(complete).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })?;

        let tmp = self.tmp_path();
        fs::write(&tmp, body).await.map_err(|e| self.io_err(e))?;
        fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| self.io_err(e))?;
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "grades.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

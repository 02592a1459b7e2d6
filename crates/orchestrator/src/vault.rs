//! Per-paper artifact vault on the local filesystem.
//!
//! Layout, per key `K` under the vault root:
//!
//! ```text
//! <root>/K/K_analysis.md                     canonical analysis artifact
//! <root>/K/K_ocr.md                          OCR reference text
//! <root>/K/imgs/                             extracted figure assets
//! <root>/K/K_analysis_backup_<timestamp>.md  immutable pre-correction snapshots
//! ```
//!
//! Artifact writes go to a temp file in the same directory followed by a
//! rename, so a crash mid-write can never leave a half-written artifact
//! observable to readers. Only the single task holding a key's registry slot
//! mutates that key's files, so no locking is needed here.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::info;

use paperflow_core::{PaperId, PipelineError, PipelineResult};

/// Filesystem layout and mutation for paper artifacts.
#[derive(Debug, Clone)]
pub struct PaperVault {
    root: PathBuf,
}

impl PaperVault {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn paper_dir(&self, key: &PaperId) -> PathBuf {
        self.root.join(key.as_str())
    }

    pub fn analysis_path(&self, key: &PaperId) -> PathBuf {
        self.paper_dir(key).join(format!("{key}_analysis.md"))
    }

    pub fn ocr_path(&self, key: &PaperId) -> PathBuf {
        self.paper_dir(key).join(format!("{key}_ocr.md"))
    }

    pub fn assets_dir(&self, key: &PaperId) -> PathBuf {
        self.paper_dir(key).join("imgs")
    }

    pub fn has_analysis(&self, key: &PaperId) -> bool {
        self.analysis_path(key).is_file()
    }

    pub fn has_ocr(&self, key: &PaperId) -> bool {
        self.ocr_path(key).is_file()
    }

    /// Overwrite the canonical analysis artifact atomically.
    pub fn write_analysis(&self, key: &PaperId, text: &str) -> PipelineResult<()> {
        let dir = self.paper_dir(key);
        fs::create_dir_all(&dir).map_err(|e| {
            PipelineError::persistence(format!("create {}: {e}", dir.display()))
        })?;
        let target = self.analysis_path(key);
        atomic_write(&target, text)
    }

    /// Snapshot the current analysis artifact before a correction overwrite.
    ///
    /// The backup filename carries a timestamp; backups are never deleted by
    /// the orchestrator. If this fails, the caller must not proceed with the
    /// overwrite.
    pub fn backup_analysis(&self, key: &PaperId) -> PipelineResult<PathBuf> {
        let source = self.analysis_path(key);
        let stamp = Utc::now().format("%Y%m%d_%H%M%S");
        let dir = self.paper_dir(key);

        let mut backup = dir.join(format!("{key}_analysis_backup_{stamp}.md"));
        // Sequential runs within the same second get a numeric suffix rather
        // than overwriting an existing snapshot.
        let mut seq = 1;
        while backup.exists() {
            backup = dir.join(format!("{key}_analysis_backup_{stamp}_{seq}.md"));
            seq += 1;
        }

        fs::copy(&source, &backup).map_err(|e| {
            PipelineError::persistence(format!(
                "backup {} -> {}: {e}",
                source.display(),
                backup.display()
            ))
        })?;
        info!(key = %key, backup = %backup.display(), "created analysis backup");
        Ok(backup)
    }

    /// Existing backup snapshots for `key`, oldest first.
    pub fn backups(&self, key: &PaperId) -> Vec<PathBuf> {
        let prefix = format!("{key}_analysis_backup_");
        let Ok(entries) = fs::read_dir(self.paper_dir(key)) else {
            return Vec::new();
        };
        let mut found: Vec<PathBuf> = entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(&prefix))
            })
            .collect();
        found.sort();
        found
    }
}

fn atomic_write(target: &Path, text: &str) -> PipelineResult<()> {
    let tmp = target.with_extension("md.tmp");
    fs::write(&tmp, text)
        .map_err(|e| PipelineError::persistence(format!("write {}: {e}", tmp.display())))?;
    fs::rename(&tmp, target).map_err(|e| {
        // Best-effort cleanup of the temp file; the original artifact is intact.
        let _ = fs::remove_file(&tmp);
        PipelineError::persistence(format!("rename into {}: {e}", target.display()))
    })
}

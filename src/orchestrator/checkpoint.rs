//! Durable partial-progress snapshots for the incremental crawl.
//!
//! A killed process resumes from the last checkpoint instead of repeating
//! already-scraped universities. The file is owned exclusively by the
//! orchestrator: read once at start, overwritten throughout the run,
//! deleted on explicit reset. The schema carries a version field so a
//! future change to the mapping-record shape fails loudly instead of
//! silently corrupting a resumed run.

use super::MappingData;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Current checkpoint schema version.
pub const CHECKPOINT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub version: u32,
    /// Partial scrape results keyed by university id.
    pub mapping_data: MappingData,
    /// University ids already fully processed.
    pub completed_universities: BTreeSet<String>,
    pub timestamp: DateTime<Utc>,
}

impl Checkpoint {
    pub fn empty() -> Self {
        Self {
            version: CHECKPOINT_VERSION,
            mapping_data: MappingData::new(),
            completed_universities: BTreeSet::new(),
            timestamp: Utc::now(),
        }
    }
}

/// Reader/writer for one checkpoint file.
pub struct CheckpointFile {
    path: PathBuf,
}

impl CheckpointFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the checkpoint, or an empty one when the file is absent.
    ///
    /// A malformed file or a version mismatch starts the run fresh with a
    /// warning rather than resuming over data of unknown shape.
    pub fn load(&self) -> Checkpoint {
        if !self.path.exists() {
            return Checkpoint::empty();
        }
        let loaded = std::fs::read_to_string(&self.path)
            .map_err(anyhow::Error::from)
            .and_then(|raw| serde_json::from_str::<Checkpoint>(&raw).map_err(Into::into));
        match loaded {
            Ok(cp) if cp.version == CHECKPOINT_VERSION => {
                tracing::info!(
                    "loaded checkpoint: {} universities completed",
                    cp.completed_universities.len()
                );
                cp
            }
            Ok(cp) => {
                tracing::warn!(
                    "checkpoint version {} != {}, starting fresh",
                    cp.version,
                    CHECKPOINT_VERSION
                );
                Checkpoint::empty()
            }
            Err(e) => {
                tracing::warn!("failed to load checkpoint, starting fresh: {e:#}");
                Checkpoint::empty()
            }
        }
    }

    /// Persist the checkpoint atomically (write to a temp file, rename).
    pub fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(checkpoint)?;
        std::fs::write(&tmp, body)
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("failed to move checkpoint into place: {}", self.path.display()))?;
        Ok(())
    }

    /// Delete the checkpoint file, if present.
    pub fn reset(&self) -> Result<bool> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)
                .with_context(|| format!("failed to delete {}", self.path.display()))?;
            tracing::info!("checkpoint cleared");
            return Ok(true);
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::navigator::ModuleMapping;

    fn mapping() -> ModuleMapping {
        ModuleMapping {
            home_module_code: "SC4001".to_string(),
            home_module_name: "Neural Networks".to_string(),
            home_module_type: "Core".to_string(),
            partner_module_code: "02456".to_string(),
            partner_module_name: "Deep Learning".to_string(),
            academic_units: "3".to_string(),
            status: "Approved".to_string(),
            approval_year: "2024".to_string(),
            semester: "1".to_string(),
        }
    }

    #[test]
    fn test_missing_file_yields_empty_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let file = CheckpointFile::new(dir.path().join("checkpoint.json"));
        let cp = file.load();
        assert!(cp.completed_universities.is_empty());
        assert!(cp.mapping_data.is_empty());
    }

    #[test]
    fn test_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let file = CheckpointFile::new(dir.path().join("checkpoint.json"));

        let mut cp = Checkpoint::empty();
        cp.completed_universities.insert("AU-UQ".to_string());
        cp.completed_universities.insert("DK-DTU".to_string());
        cp.mapping_data
            .entry("DK-DTU".to_string())
            .or_default()
            .insert("SC4001".to_string(), vec![mapping()]);
        file.save(&cp).unwrap();

        let loaded = file.load();
        assert_eq!(loaded.version, CHECKPOINT_VERSION);
        assert_eq!(loaded.completed_universities.len(), 2);
        assert_eq!(loaded.mapping_data["DK-DTU"]["SC4001"].len(), 1);
    }

    #[test]
    fn test_version_mismatch_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint.json");
        let file = CheckpointFile::new(path.clone());

        let mut cp = Checkpoint::empty();
        cp.completed_universities.insert("AU-UQ".to_string());
        file.save(&cp).unwrap();

        // Bump the stored version out from under the loader.
        let raw = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, raw.replace("\"version\": 1", "\"version\": 99")).unwrap();

        assert!(file.load().completed_universities.is_empty());
    }

    #[test]
    fn test_corrupt_file_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint.json");
        std::fs::write(&path, "{not json").unwrap();
        let file = CheckpointFile::new(path);
        assert!(file.load().completed_universities.is_empty());
    }

    #[test]
    fn test_reset_deletes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = CheckpointFile::new(dir.path().join("checkpoint.json"));
        assert!(!file.reset().unwrap());
        file.save(&Checkpoint::empty()).unwrap();
        assert!(file.reset().unwrap());
        assert!(!file.path().exists());
    }
}

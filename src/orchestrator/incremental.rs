//! Checkpointed incremental crawl for one student's targeted search.
//!
//! Walks only the universities that survived the vacancy filter, asks the
//! portal for each one's full mapping table, and keeps just the requested
//! module codes. Progress is checkpointed every few universities so a
//! killed process resumes without repeating work; a full reset deletes the
//! checkpoint file. Results go back to the caller (who owns the search
//! cache), not to the persistent store.

use super::bulk::search_with_retry;
use super::checkpoint::CheckpointFile;
use super::{jitter_delay, CancelFlag, MappingData};
use crate::config::Config;
use crate::navigator::Navigator;
use crate::progress::{emit, ProgressEventKind, ProgressSender};
use crate::session::PortalSession;
use crate::vacancy::UniversityProfile;
use anyhow::{bail, Result};
use std::collections::BTreeMap;

/// Save the checkpoint after this many universities.
const CHECKPOINT_INTERVAL: usize = 5;

/// Search attempts per university before recording it as empty.
const MAX_SEARCH_ATTEMPTS: u32 = 3;

pub struct IncrementalCrawler {
    config: Config,
    checkpoint: CheckpointFile,
    progress: Option<ProgressSender>,
    cancel: CancelFlag,
}

impl IncrementalCrawler {
    pub fn new(config: Config) -> Self {
        let checkpoint = CheckpointFile::new(config.checkpoint_file.clone());
        Self {
            config,
            checkpoint,
            progress: None,
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_progress(mut self, tx: ProgressSender) -> Self {
        self.progress = Some(tx);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Delete any existing checkpoint so the next run starts from scratch.
    pub fn reset(&self) -> Result<bool> {
        self.checkpoint.reset()
    }

    /// Crawl the given universities for the requested module codes.
    ///
    /// Resumes from the checkpoint: universities already marked complete are
    /// skipped outright. A tripped cancel flag ends the walk at the next
    /// university boundary with the partial data collected so far (already
    /// checkpointed). One university's repeated failure records it as zero
    /// mappings and the walk continues.
    pub async fn run(
        &self,
        session: &mut PortalSession,
        universities: &BTreeMap<String, UniversityProfile>,
        modules: &[String],
    ) -> Result<MappingData> {
        if !session.login().await? {
            bail!("login failed — check credentials and MFA");
        }

        let target_modules: Vec<String> = modules.iter().map(|m| m.to_uppercase()).collect();
        let mut checkpoint = self.checkpoint.load();
        let mut seq = 0u64;

        let remaining: Vec<(&String, &UniversityProfile)> = universities
            .iter()
            .filter(|(id, _)| !checkpoint.completed_universities.contains(*id))
            .collect();

        if universities.len() > remaining.len() {
            tracing::info!(
                "resuming from checkpoint: {}/{} universities already completed",
                universities.len() - remaining.len(),
                universities.len()
            );
        }
        emit(
            &self.progress,
            0,
            &mut seq,
            ProgressEventKind::Discovery {
                total_countries: 0,
                total_universities: remaining.len(),
            },
        );

        let mut navigator = Navigator::new(session, &self.config);
        let mut processed = 0usize;

        for (uni_id, profile) in remaining {
            if self.cancel.is_cancelled() {
                tracing::info!("incremental crawl cancelled, checkpoint saved");
                self.checkpoint.save(&checkpoint)?;
                return Ok(checkpoint.mapping_data);
            }

            emit(
                &self.progress,
                0,
                &mut seq,
                ProgressEventKind::UniversityStart {
                    country: profile.country.clone(),
                    university: profile.name.clone(),
                    completed_universities: processed,
                    total_universities: universities.len(),
                },
            );

            let grouped = search_with_retry(
                &mut navigator,
                &profile.name,
                &profile.country,
                MAX_SEARCH_ATTEMPTS,
            )
            .await;

            // Keep only the requested modules; absent codes are recorded as
            // empty so coverage math can tell "searched, nothing" apart
            // from "never searched".
            let entry = checkpoint.mapping_data.entry(uni_id.clone()).or_default();
            let mut found = 0usize;
            for module in &target_modules {
                let mappings = grouped.get(module).cloned().unwrap_or_default();
                if !mappings.is_empty() {
                    found += 1;
                }
                entry.insert(module.clone(), mappings);
            }

            emit(
                &self.progress,
                0,
                &mut seq,
                ProgressEventKind::UniversityComplete {
                    country: profile.country.clone(),
                    university: profile.name.clone(),
                    mappings_found: found,
                },
            );

            checkpoint.completed_universities.insert(uni_id.clone());
            processed += 1;

            if processed % CHECKPOINT_INTERVAL == 0 {
                checkpoint.timestamp = chrono::Utc::now();
                self.checkpoint.save(&checkpoint)?;
            }

            jitter_delay(
                self.config.rate_limiting.delay_min_ms,
                self.config.rate_limiting.delay_max_ms,
            )
            .await;
        }

        checkpoint.timestamp = chrono::Utc::now();
        self.checkpoint.save(&checkpoint)?;

        tracing::info!(
            "incremental crawl complete: {} universities in checkpoint",
            checkpoint.completed_universities.len()
        );
        Ok(checkpoint.mapping_data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::navigator::ModuleMapping;
    use crate::orchestrator::checkpoint::Checkpoint;
    use std::collections::BTreeSet;

    fn mapping(code: &str) -> ModuleMapping {
        ModuleMapping {
            home_module_code: code.to_string(),
            home_module_name: String::new(),
            home_module_type: String::new(),
            partner_module_code: "X100".to_string(),
            partner_module_name: String::new(),
            academic_units: "3".to_string(),
            status: "Approved".to_string(),
            approval_year: "2024".to_string(),
            semester: "1".to_string(),
        }
    }

    #[test]
    fn test_resume_skips_completed_universities() {
        // The resume contract lives in the remaining-set computation: a
        // checkpoint marking {A, B} complete out of {A, B, C} leaves only C.
        let mut checkpoint = Checkpoint::empty();
        checkpoint.completed_universities.insert("A".to_string());
        checkpoint.completed_universities.insert("B".to_string());

        let universities: BTreeSet<String> =
            ["A", "B", "C"].iter().map(|s| s.to_string()).collect();
        let remaining: Vec<_> = universities
            .iter()
            .filter(|id| !checkpoint.completed_universities.contains(*id))
            .collect();

        assert_eq!(remaining, vec!["C"]);
    }

    #[test]
    fn test_requested_modules_absent_from_results_are_recorded_empty() {
        let mut grouped = crate::navigator::UniversityMappings::new();
        grouped.insert("SC4001".to_string(), vec![mapping("SC4001")]);

        let targets = ["SC4001".to_string(), "SC4002".to_string()];
        let mut entry: BTreeMap<String, Vec<ModuleMapping>> = BTreeMap::new();
        for module in &targets {
            entry.insert(
                module.clone(),
                grouped.get(module).cloned().unwrap_or_default(),
            );
        }

        assert_eq!(entry["SC4001"].len(), 1);
        assert!(entry["SC4002"].is_empty());
        assert_eq!(entry.len(), 2);
    }
}

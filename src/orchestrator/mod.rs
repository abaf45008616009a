//! Scrape orchestration — the control loops that walk the portal.
//!
//! Two modes share the session and navigator. The bulk crawl populates the
//! persistent store for everyone's instant queries; the incremental crawl
//! answers one student's targeted search through a checkpoint file and the
//! search cache. Both are single-threaded per job by necessity: the
//! portal's session and dropdown state cannot be shared across concurrent
//! requests, so concurrency exists only between independent jobs, each on
//! its own tokio task reporting through the progress channel.

pub mod bulk;
pub mod checkpoint;
pub mod incremental;

use crate::error::ScoutError;
use crate::navigator::ModuleMapping;
use crate::store::{JobStatus, MappingStore, ScrapeJob};
use anyhow::Result;
use dashmap::DashMap;
use rand::Rng;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Scraped mappings keyed by university id, then by home module code.
pub type MappingData = BTreeMap<String, BTreeMap<String, Vec<ModuleMapping>>>;

/// Cooperative cancellation flag, polled at country and university
/// boundaries. Tripping it never interrupts an in-flight network call or
/// DOM wait.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Uniformly-distributed politeness delay.
///
/// Applied after every per-university round trip in both crawl modes. This
/// is a contract toward the scraped portal, not tunable throughput — do not
/// batch it away.
pub async fn jitter_delay(min_ms: u64, max_ms: u64) {
    let upper = max_ms.max(min_ms);
    let delay = rand::thread_rng().gen_range(min_ms..=upper);
    tokio::time::sleep(Duration::from_millis(delay)).await;
}

/// A running job owned by this process.
struct JobHandle {
    cancel: CancelFlag,
}

/// In-process registry of running crawl jobs.
///
/// At most one bulk crawl may run against a given store at a time; `start`
/// paths check both this registry and the store's own `running` row and
/// surface a conflict instead of queueing.
pub struct JobRegistry {
    store: Arc<dyn MappingStore>,
    jobs: DashMap<i64, JobHandle>,
}

impl JobRegistry {
    pub fn new(store: Arc<dyn MappingStore>) -> Self {
        Self {
            store,
            jobs: DashMap::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn MappingStore> {
        &self.store
    }

    /// Refuse to start when a crawl is already running, either in this
    /// process or according to the store.
    pub fn ensure_no_running_crawl(&self) -> Result<()> {
        if let Some(entry) = self.jobs.iter().next() {
            return Err(ScoutError::CrawlInProgress(*entry.key()).into());
        }
        if let Some(job) = self.store.running_job()? {
            return Err(ScoutError::CrawlInProgress(job.id).into());
        }
        Ok(())
    }

    /// Register a job owned by this process, returning its cancel flag.
    pub fn register(&self, job_id: i64) -> CancelFlag {
        let cancel = CancelFlag::new();
        self.jobs.insert(
            job_id,
            JobHandle {
                cancel: cancel.clone(),
            },
        );
        cancel
    }

    /// Remove a finished job from the registry.
    pub fn deregister(&self, job_id: i64) {
        self.jobs.remove(&job_id);
    }

    /// Trip the cancel flag of a job owned by this process.
    ///
    /// Cancelling an already-terminal job is rejected explicitly; a running
    /// job not in this registry belongs to a dead or foreign worker and
    /// needs `force_cancel_stale_running_jobs` instead.
    pub fn cancel(&self, job_id: i64) -> Result<()> {
        let job = self
            .store
            .get_job(job_id)?
            .ok_or(ScoutError::JobNotFound(job_id))?;
        if job.status.is_terminal() {
            tracing::info!("job {job_id} already {}, cancel is a no-op", job.status);
            return Ok(());
        }
        match self.jobs.get(&job_id) {
            Some(handle) => {
                handle.cancel.cancel();
                Ok(())
            }
            None => Err(ScoutError::JobNotOwned(job_id).into()),
        }
    }

    /// Query a job's durable status record.
    pub fn get_status(&self, job_id: i64) -> Result<ScrapeJob> {
        self.store
            .get_job(job_id)?
            .ok_or_else(|| ScoutError::JobNotFound(job_id).into())
    }

    /// Startup recovery: any `running` row without a live worker in this
    /// registry is a stale artifact of an unclean shutdown.
    pub fn recover_stale_jobs(&self) -> Result<usize> {
        match self.store.running_job()? {
            Some(job) if self.jobs.contains_key(&job.id) => Ok(0),
            Some(_) => self.store.force_cancel_stale_running_jobs(),
            None => Ok(0),
        }
    }
}

/// Outcome summary of a finished crawl.
#[derive(Debug, Clone)]
pub struct CrawlOutcome {
    pub job_id: i64,
    pub status: JobStatus,
    pub total_countries: usize,
    pub total_universities: usize,
    pub total_mappings: usize,
    pub duration: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::sqlite::SqliteStore;
    use crate::store::JobUpdate;

    fn registry() -> JobRegistry {
        JobRegistry::new(Arc::new(SqliteStore::open_in_memory().unwrap()))
    }

    #[test]
    fn test_cancel_flag_trips_once() {
        let flag = CancelFlag::new();
        assert!(!flag.is_cancelled());
        flag.cancel();
        assert!(flag.is_cancelled());
        let clone = flag.clone();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_second_crawl_is_rejected() {
        let reg = registry();
        reg.ensure_no_running_crawl().unwrap();

        let job_id = reg.store().create_job().unwrap();
        reg.register(job_id);

        let err = reg.ensure_no_running_crawl().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ScoutError>(),
            Some(ScoutError::CrawlInProgress(_))
        ));

        reg.deregister(job_id);
        // Still rejected: the store row is `running` even with no handle.
        assert!(reg.ensure_no_running_crawl().is_err());
    }

    #[test]
    fn test_cancel_terminal_job_is_noop() {
        let reg = registry();
        let job_id = reg.store().create_job().unwrap();
        reg.store()
            .update_job(job_id, &JobUpdate::status(JobStatus::Completed))
            .unwrap();

        reg.cancel(job_id).unwrap();
        assert_eq!(
            reg.get_status(job_id).unwrap().status,
            JobStatus::Completed
        );
    }

    #[test]
    fn test_cancel_unowned_running_job_is_rejected() {
        let reg = registry();
        let job_id = reg.store().create_job().unwrap();
        let err = reg.cancel(job_id).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ScoutError>(),
            Some(ScoutError::JobNotOwned(_))
        ));
    }

    #[test]
    fn test_recover_stale_jobs_spares_owned_workers() {
        let reg = registry();
        let owned = reg.store().create_job().unwrap();
        reg.register(owned);
        assert_eq!(reg.recover_stale_jobs().unwrap(), 0);

        reg.deregister(owned);
        assert_eq!(reg.recover_stale_jobs().unwrap(), 1);
        assert_eq!(
            reg.get_status(owned).unwrap().status,
            JobStatus::Cancelled
        );
    }

    #[test]
    fn test_get_status_unknown_job() {
        let reg = registry();
        assert!(reg.get_status(42).is_err());
    }
}

//! Full-portal bulk crawl.
//!
//! Logs in once, enumerates the complete country/university index, clears
//! the destination store (a full crawl always starts from empty — it is not
//! incremental), then walks every university, bulk-inserting the retained
//! mappings and reporting progress per university and per country. The job
//! row is updated after every state change so the crawl is observable from
//! outside the process at any time.
//!
//! Failure containment, outermost to innermost: an unexpected error escaping
//! the walk marks the job `failed` and never propagates past [`BulkCrawler::
//! run`]; a single university's failure is recorded and skipped; a tripped
//! cancel flag ends the walk at the next country or university boundary and
//! marks the job `cancelled`, never `failed`. The browser page is released
//! on every path.

use super::{jitter_delay, CancelFlag, CrawlOutcome, JobRegistry};
use crate::config::Config;
use crate::navigator::{Navigator, ALL_SENTINEL};
use crate::progress::{emit, ProgressEventKind, ProgressSender};
use crate::session::PortalSession;
use crate::store::{JobStatus, JobUpdate, MappingStore};
use anyhow::{bail, Result};
use std::sync::Arc;
use std::time::Instant;

/// How many times one university's search is attempted before it is
/// recorded as empty.
const MAX_SEARCH_ATTEMPTS: u32 = 3;

/// How the walk ended when it did not error.
enum WalkEnd {
    Completed,
    Cancelled,
}

#[derive(Default)]
struct Tally {
    total_countries: usize,
    total_universities: usize,
    completed_countries: u32,
    completed_universities: u32,
    total_mappings: usize,
}

pub struct BulkCrawler {
    store: Arc<dyn MappingStore>,
    config: Config,
    progress: Option<ProgressSender>,
    cancel: CancelFlag,
    index_cache: Option<crate::cache::SearchCache>,
}

impl BulkCrawler {
    pub fn new(store: Arc<dyn MappingStore>, config: Config) -> Self {
        Self {
            store,
            config,
            progress: None,
            cancel: CancelFlag::new(),
            index_cache: None,
        }
    }

    /// Also refresh the cached country/university index from this crawl's
    /// enumeration — the portal's selectors are the source of truth for
    /// what exists, and they change on the scale of tens of days.
    pub fn with_index_cache(mut self, cache: crate::cache::SearchCache) -> Self {
        self.index_cache = Some(cache);
        self
    }

    pub fn with_progress(mut self, tx: ProgressSender) -> Self {
        self.progress = Some(tx);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Start a bulk crawl on its own worker task.
    ///
    /// Rejects with a conflict when a crawl is already running against the
    /// registry's store. Returns the job id immediately; the join handle
    /// yields the outcome.
    pub fn spawn(
        registry: Arc<JobRegistry>,
        config: Config,
        session: PortalSession,
        progress: Option<ProgressSender>,
    ) -> Result<(i64, tokio::task::JoinHandle<CrawlOutcome>)> {
        registry.ensure_no_running_crawl()?;
        let store = Arc::clone(registry.store());
        let job_id = store.create_job()?;
        let cancel = registry.register(job_id);

        let index_cache = crate::cache::SearchCache::new(config.cache_dir()).ok();
        let mut crawler = Self::new(store, config).with_cancel(cancel);
        crawler.index_cache = index_cache;
        crawler.progress = progress;

        let handle = tokio::spawn(async move {
            let outcome = crawler.run(session, job_id).await;
            registry.deregister(job_id);
            outcome
        });
        Ok((job_id, handle))
    }

    /// Execute the crawl for an already-created job row.
    ///
    /// Never returns an error: every failure mode ends in a terminal job
    /// status and a matching outcome.
    pub async fn run(&self, session: PortalSession, job_id: i64) -> CrawlOutcome {
        let started = Instant::now();
        let mut seq = 0u64;
        let mut tally = Tally::default();
        let mut session = session;

        emit(
            &self.progress,
            job_id,
            &mut seq,
            ProgressEventKind::Started {
                message: "starting full crawl".to_string(),
            },
        );

        let walk = self
            .walk(&mut session, job_id, &mut seq, &mut tally)
            .await;

        // The page is released no matter how the walk ended.
        if let Err(e) = session.close().await {
            tracing::warn!("failed to close browser page: {e:#}");
        }

        let status = match walk {
            Ok(WalkEnd::Completed) => {
                self.finish_job(job_id, JobUpdate::status(JobStatus::Completed));
                emit(
                    &self.progress,
                    job_id,
                    &mut seq,
                    ProgressEventKind::Completed {
                        total_countries: tally.total_countries,
                        total_universities: tally.total_universities,
                        total_mappings: tally.total_mappings,
                        duration_ms: started.elapsed().as_millis() as u64,
                    },
                );
                JobStatus::Completed
            }
            Ok(WalkEnd::Cancelled) => {
                tracing::info!("crawl job {job_id} cancelled");
                self.finish_job(
                    job_id,
                    JobUpdate {
                        status: Some(JobStatus::Cancelled),
                        error_message: Some("cancelled by user".to_string()),
                        ..JobUpdate::default()
                    },
                );
                JobStatus::Cancelled
            }
            Err(e) => {
                let message = format!("{e:#}");
                tracing::error!("crawl job {job_id} failed: {message}");
                self.finish_job(
                    job_id,
                    JobUpdate {
                        status: Some(JobStatus::Failed),
                        error_message: Some(message.clone()),
                        ..JobUpdate::default()
                    },
                );
                emit(
                    &self.progress,
                    job_id,
                    &mut seq,
                    ProgressEventKind::Error { error: message },
                );
                JobStatus::Failed
            }
        };

        CrawlOutcome {
            job_id,
            status,
            total_countries: tally.total_countries,
            total_universities: tally.total_universities,
            total_mappings: tally.total_mappings,
            duration: started.elapsed(),
        }
    }

    async fn walk(
        &self,
        session: &mut PortalSession,
        job_id: i64,
        seq: &mut u64,
        tally: &mut Tally,
    ) -> Result<WalkEnd> {
        if !session.login().await? {
            bail!("login failed — check credentials and MFA");
        }

        let mut navigator = Navigator::new(session, &self.config);
        let index = navigator.enumerate_countries_and_universities().await?;

        if let Some(cache) = &self.index_cache {
            if let Err(e) = cache.put_index(&index) {
                tracing::warn!("failed to cache country index: {e:#}");
            }
        }

        tally.total_countries = index.total_countries();
        tally.total_universities = index.total_universities();
        self.store.update_job(
            job_id,
            &JobUpdate {
                total_countries: Some(tally.total_countries as u32),
                total_universities: Some(tally.total_universities as u32),
                ..JobUpdate::default()
            },
        )?;
        emit(
            &self.progress,
            job_id,
            seq,
            ProgressEventKind::Discovery {
                total_countries: tally.total_countries,
                total_universities: tally.total_universities,
            },
        );

        if self.cancel.is_cancelled() {
            return Ok(WalkEnd::Cancelled);
        }

        // A full crawl replaces the whole dataset.
        self.store.clear_all_data()?;

        for entry in &index.entries {
            if self.cancel.is_cancelled() {
                return Ok(WalkEnd::Cancelled);
            }

            let country_id = self.store.upsert_country(&entry.country)?;
            self.store.update_job(
                job_id,
                &JobUpdate {
                    current_country: Some(entry.country.clone()),
                    completed_countries: Some(tally.completed_countries),
                    ..JobUpdate::default()
                },
            )?;
            emit(
                &self.progress,
                job_id,
                seq,
                ProgressEventKind::CountryStart {
                    country: entry.country.clone(),
                    universities_count: entry.universities.len(),
                    completed_countries: tally.completed_countries as usize,
                    total_countries: tally.total_countries,
                },
            );

            for university in &entry.universities {
                if self.cancel.is_cancelled() {
                    return Ok(WalkEnd::Cancelled);
                }
                if university.eq_ignore_ascii_case(ALL_SENTINEL) {
                    continue;
                }

                self.store.update_job(
                    job_id,
                    &JobUpdate {
                        current_university: Some(university.clone()),
                        completed_universities: Some(tally.completed_universities),
                        ..JobUpdate::default()
                    },
                )?;
                emit(
                    &self.progress,
                    job_id,
                    seq,
                    ProgressEventKind::UniversityStart {
                        country: entry.country.clone(),
                        university: university.clone(),
                        completed_universities: tally.completed_universities as usize,
                        total_universities: tally.total_universities,
                    },
                );

                match self
                    .scrape_one(&mut navigator, country_id, &entry.country, university)
                    .await
                {
                    Ok(count) => {
                        tally.total_mappings += count;
                        emit(
                            &self.progress,
                            job_id,
                            seq,
                            ProgressEventKind::UniversityComplete {
                                country: entry.country.clone(),
                                university: university.clone(),
                                mappings_found: count,
                            },
                        );
                    }
                    Err(e) => {
                        tracing::warn!("failed to scrape {university}: {e:#}");
                        emit(
                            &self.progress,
                            job_id,
                            seq,
                            ProgressEventKind::UniversityError {
                                country: entry.country.clone(),
                                university: university.clone(),
                                error: format!("{e:#}"),
                            },
                        );
                    }
                }

                tally.completed_universities += 1;

                jitter_delay(
                    self.config.rate_limiting.delay_min_ms,
                    self.config.rate_limiting.delay_max_ms,
                )
                .await;
            }

            tally.completed_countries += 1;
            emit(
                &self.progress,
                job_id,
                seq,
                ProgressEventKind::CountryComplete {
                    country: entry.country.clone(),
                    completed_countries: tally.completed_countries as usize,
                    total_countries: tally.total_countries,
                },
            );
        }

        self.store.update_job(
            job_id,
            &JobUpdate {
                completed_countries: Some(tally.completed_countries),
                completed_universities: Some(tally.completed_universities),
                ..JobUpdate::default()
            },
        )?;
        Ok(WalkEnd::Completed)
    }

    /// One university: upsert, search with bounded retries, insert.
    async fn scrape_one(
        &self,
        navigator: &mut Navigator<'_>,
        country_id: i64,
        country: &str,
        university: &str,
    ) -> Result<usize> {
        let university_id = self.store.upsert_university(country_id, university)?;
        let grouped =
            search_with_retry(navigator, university, country, MAX_SEARCH_ATTEMPTS).await;

        let flat: Vec<_> = grouped.into_values().flatten().collect();
        if flat.is_empty() {
            return Ok(0);
        }
        self.store.bulk_insert_mappings(university_id, &flat)
    }

    /// Terminal job updates are best-effort: the outcome is already decided
    /// and a store hiccup here must not mask it.
    fn finish_job(&self, job_id: i64, update: JobUpdate) {
        if let Err(e) = self.store.update_job(job_id, &update) {
            tracing::error!("failed to persist terminal state for job {job_id}: {e:#}");
        }
    }
}

/// Search one university with bounded retries and linearly increasing
/// backoff. Exhaustion yields an empty result — a single stubborn
/// university never aborts a crawl.
pub(crate) async fn search_with_retry(
    navigator: &mut Navigator<'_>,
    university: &str,
    country: &str,
    max_attempts: u32,
) -> crate::navigator::UniversityMappings {
    for attempt in 1..=max_attempts {
        match navigator.search_university_mappings(university, country).await {
            Ok(mappings) => return mappings,
            Err(e) if attempt < max_attempts => {
                let backoff = std::time::Duration::from_secs(u64::from(attempt) * 2);
                tracing::warn!(
                    "search failed for {university} (attempt {attempt}/{max_attempts}), \
                     retrying in {}s: {e:#}",
                    backoff.as_secs()
                );
                tokio::time::sleep(backoff).await;
            }
            Err(e) => {
                tracing::warn!("search failed for {university} after {max_attempts} attempts: {e:#}");
            }
        }
    }
    crate::navigator::UniversityMappings::new()
}

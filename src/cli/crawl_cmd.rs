//! `modscout crawl` — full bulk crawl into the persistent store.

use crate::browser::chromium::ChromiumBrowser;
use crate::browser::BrowserEngine;
use crate::cli::output;
use crate::config::Config;
use crate::credentials::{CredentialVault, FileVault};
use crate::orchestrator::bulk::BulkCrawler;
use crate::orchestrator::JobRegistry;
use crate::progress::{self, ProgressEventKind, ProgressReceiver};
use crate::session::PortalSession;
use crate::store::{sqlite::SqliteStore, JobStatus};
use anyhow::{bail, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;

pub async fn run(config_path: &Path, identity: &str, headless: bool) -> Result<()> {
    let config = Config::load_or_default(config_path)?;
    let vault = FileVault::in_data_dir(&config.data_dir);
    let credentials = vault.get_credentials(identity)?;

    let store = Arc::new(SqliteStore::open(&config.db_path())?);
    let registry = Arc::new(JobRegistry::new(store));

    // Any `running` row at this point belongs to a dead worker.
    let recovered = registry.recover_stale_jobs()?;
    if recovered > 0 {
        output::say(&format!("  recovered {recovered} stale job(s) from a previous run"));
    }

    let engine = ChromiumBrowser::launch(headless).await?;
    let page = engine.new_page().await?;
    let session = PortalSession::new(page, credentials, config.clone());

    let (tx, rx) = progress::channel();
    let (job_id, handle) = BulkCrawler::spawn(Arc::clone(&registry), config, session, Some(tx))?;
    output::say(&format!("  crawl job {job_id} started"));

    // Ctrl-C trips the cooperative flag; the crawl stops at the next
    // country/university boundary and the job ends `cancelled`.
    let ctrl_registry = Arc::clone(&registry);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, cancelling job {job_id}");
            let _ = ctrl_registry.cancel(job_id);
        }
    });

    let render = tokio::spawn(render_progress(rx));
    let outcome = handle.await?;
    let _ = render.await;

    engine.shutdown().await?;

    if output::is_json() {
        output::print_json(&serde_json::json!({
            "job_id": outcome.job_id,
            "status": outcome.status.as_str(),
            "total_countries": outcome.total_countries,
            "total_universities": outcome.total_universities,
            "total_mappings": outcome.total_mappings,
            "duration_secs": outcome.duration.as_secs(),
        }));
    } else {
        output::say(&format!(
            "  crawl {}: {} countries, {} universities, {} mappings in {}s",
            outcome.status,
            outcome.total_countries,
            outcome.total_universities,
            outcome.total_mappings,
            outcome.duration.as_secs()
        ));
    }

    if outcome.status == JobStatus::Failed {
        let job = registry.get_status(job_id)?;
        bail!(
            "crawl failed: {}",
            job.error_message.unwrap_or_else(|| "unknown error".to_string())
        );
    }
    Ok(())
}

/// Drain the progress channel into a live progress bar.
async fn render_progress(mut rx: ProgressReceiver) {
    if output::is_quiet() || output::is_json() {
        // Still drain so the channel never backs up.
        while rx.recv().await.is_ok() {}
        return;
    }

    let mut bar: Option<ProgressBar> = None;
    while let Ok(event) = rx.recv().await {
        match event.event {
            ProgressEventKind::Discovery {
                total_countries,
                total_universities,
            } => {
                println!("  found {total_countries} countries, {total_universities} universities");
                let pb = ProgressBar::new(total_universities as u64);
                pb.set_style(
                    ProgressStyle::with_template(
                        "  {bar:40.cyan/blue} {pos}/{len} {msg}",
                    )
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
                );
                bar = Some(pb);
            }
            ProgressEventKind::UniversityComplete {
                university,
                mappings_found,
                ..
            } => {
                if let Some(pb) = &bar {
                    pb.inc(1);
                    pb.set_message(format!("{university} ({mappings_found})"));
                }
            }
            ProgressEventKind::UniversityError { university, error, .. } => {
                if let Some(pb) = &bar {
                    pb.inc(1);
                    pb.set_message(format!("{university} failed"));
                }
                if output::is_verbose() {
                    eprintln!("  ! {university}: {error}");
                }
            }
            ProgressEventKind::CountryComplete {
                country,
                completed_countries,
                total_countries,
            } => {
                if let Some(pb) = &bar {
                    pb.println(format!(
                        "  ✓ {country} ({completed_countries}/{total_countries})"
                    ));
                }
            }
            ProgressEventKind::Completed { .. } => {
                if let Some(pb) = &bar {
                    pb.finish_with_message("done");
                }
            }
            ProgressEventKind::Error { error } => {
                if let Some(pb) = &bar {
                    pb.abandon_with_message("failed");
                }
                eprintln!("  crawl error: {error}");
            }
            _ => {}
        }
    }
}

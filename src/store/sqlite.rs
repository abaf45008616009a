//! SQLite implementation of the mapping store.
//!
//! One connection behind a mutex: the writer is a single crawl worker and
//! readers are occasional CLI queries, so contention is not a concern and
//! serializing through the mutex doubles as the store's transaction
//! boundary for job-row updates.

use super::{
    JobStatus, JobUpdate, MappingStore, ScrapeJob, StoreStats, StoredUniversityMappings,
};
use crate::navigator::ModuleMapping;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (creating if needed) the store at `path` and ensure the schema.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open store: {}", path.display()))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// In-memory store, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS countries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT UNIQUE NOT NULL,
                created_at TEXT DEFAULT CURRENT_TIMESTAMP
            );

            CREATE TABLE IF NOT EXISTS universities (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                country_id INTEGER NOT NULL REFERENCES countries(id),
                name TEXT NOT NULL,
                created_at TEXT DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(country_id, name)
            );

            CREATE TABLE IF NOT EXISTS module_mappings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                university_id INTEGER NOT NULL REFERENCES universities(id),
                home_module_code TEXT NOT NULL,
                home_module_name TEXT,
                home_module_type TEXT,
                partner_module_code TEXT,
                partner_module_name TEXT,
                academic_units TEXT,
                status TEXT,
                approval_year TEXT,
                semester TEXT,
                scraped_at TEXT DEFAULT CURRENT_TIMESTAMP
            );

            CREATE TABLE IF NOT EXISTS scrape_jobs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                status TEXT NOT NULL DEFAULT 'pending',
                total_countries INTEGER DEFAULT 0,
                completed_countries INTEGER DEFAULT 0,
                total_universities INTEGER DEFAULT 0,
                completed_universities INTEGER DEFAULT 0,
                current_country TEXT,
                current_university TEXT,
                started_at TEXT,
                completed_at TEXT,
                error_message TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_mappings_home_module
                ON module_mappings(home_module_code);
            CREATE INDEX IF NOT EXISTS idx_mappings_university
                ON module_mappings(university_id);
            CREATE INDEX IF NOT EXISTS idx_universities_country
                ON universities(country_id);
            "#,
        )
        .context("failed to initialize store schema")?;
        Ok(())
    }

    fn job_from_row(row: &Row<'_>) -> rusqlite::Result<ScrapeJob> {
        let status: String = row.get("status")?;
        Ok(ScrapeJob {
            id: row.get("id")?,
            status: JobStatus::parse(&status).unwrap_or(JobStatus::Failed),
            total_countries: row.get("total_countries")?,
            completed_countries: row.get("completed_countries")?,
            total_universities: row.get("total_universities")?,
            completed_universities: row.get("completed_universities")?,
            current_country: row.get("current_country")?,
            current_university: row.get("current_university")?,
            started_at: parse_ts(row.get::<_, Option<String>>("started_at")?),
            completed_at: parse_ts(row.get::<_, Option<String>>("completed_at")?),
            error_message: row.get("error_message")?,
        })
    }
}

fn parse_ts(raw: Option<String>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| s.parse().ok())
}

impl MappingStore for SqliteStore {
    fn upsert_country(&self, name: &str) -> Result<i64> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.execute(
            "INSERT OR IGNORE INTO countries (name) VALUES (?1)",
            params![name],
        )?;
        let id = conn.query_row(
            "SELECT id FROM countries WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    fn upsert_university(&self, country_id: i64, name: &str) -> Result<i64> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.execute(
            "INSERT OR IGNORE INTO universities (country_id, name) VALUES (?1, ?2)",
            params![country_id, name],
        )?;
        let id = conn.query_row(
            "SELECT id FROM universities WHERE country_id = ?1 AND name = ?2",
            params![country_id, name],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    fn bulk_insert_mappings(&self, university_id: i64, mappings: &[ModuleMapping]) -> Result<usize> {
        if mappings.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.lock().expect("store mutex poisoned");
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO module_mappings (
                    university_id, home_module_code, home_module_name, home_module_type,
                    partner_module_code, partner_module_name, academic_units,
                    status, approval_year, semester
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            )?;
            for m in mappings {
                stmt.execute(params![
                    university_id,
                    m.home_module_code,
                    m.home_module_name,
                    m.home_module_type,
                    m.partner_module_code,
                    m.partner_module_name,
                    m.academic_units,
                    m.status,
                    m.approval_year,
                    m.semester,
                ])?;
            }
        }
        tx.commit()?;
        Ok(mappings.len())
    }

    fn query_by_modules(
        &self,
        module_codes: &[String],
        countries: Option<&[String]>,
    ) -> Result<Vec<StoredUniversityMappings>> {
        if module_codes.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn.lock().expect("store mutex poisoned");

        let module_placeholders = vec!["?"; module_codes.len()].join(",");
        let mut sql = format!(
            "SELECT c.name AS country, u.name AS university, u.id AS university_id, m.*
             FROM module_mappings m
             JOIN universities u ON m.university_id = u.id
             JOIN countries c ON u.country_id = c.id
             WHERE UPPER(m.home_module_code) IN ({module_placeholders})"
        );
        let mut args: Vec<String> = module_codes.iter().map(|c| c.to_uppercase()).collect();

        if let Some(countries) = countries {
            let country_placeholders = vec!["?"; countries.len()].join(",");
            sql.push_str(&format!(" AND c.name IN ({country_placeholders})"));
            args.extend(countries.iter().cloned());
        }
        sql.push_str(" ORDER BY c.name, u.name, m.home_module_code");

        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(args.iter()))?;

        let mut grouped: BTreeMap<i64, StoredUniversityMappings> = BTreeMap::new();
        while let Some(row) = rows.next()? {
            let university_id: i64 = row.get("university_id")?;
            let entry = grouped
                .entry(university_id)
                .or_insert_with(|| StoredUniversityMappings {
                    country: row.get("country").unwrap_or_default(),
                    university: row.get("university").unwrap_or_default(),
                    university_id,
                    mappings: BTreeMap::new(),
                });
            let mapping = ModuleMapping {
                home_module_code: row.get("home_module_code")?,
                home_module_name: row.get::<_, Option<String>>("home_module_name")?.unwrap_or_default(),
                home_module_type: row.get::<_, Option<String>>("home_module_type")?.unwrap_or_default(),
                partner_module_code: row.get::<_, Option<String>>("partner_module_code")?.unwrap_or_default(),
                partner_module_name: row.get::<_, Option<String>>("partner_module_name")?.unwrap_or_default(),
                academic_units: row.get::<_, Option<String>>("academic_units")?.unwrap_or_default(),
                status: row.get::<_, Option<String>>("status")?.unwrap_or_default(),
                approval_year: row.get::<_, Option<String>>("approval_year")?.unwrap_or_default(),
                semester: row.get::<_, Option<String>>("semester")?.unwrap_or_default(),
            };
            let code = mapping.home_module_code.to_uppercase();
            entry.mappings.entry(code).or_default().push(mapping);
        }

        Ok(grouped.into_values().collect())
    }

    fn create_job(&self) -> Result<i64> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.execute(
            "INSERT INTO scrape_jobs (status, started_at) VALUES ('running', ?1)",
            params![Utc::now().to_rfc3339()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn get_job(&self, id: i64) -> Result<Option<ScrapeJob>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let job = conn
            .query_row(
                "SELECT * FROM scrape_jobs WHERE id = ?1",
                params![id],
                Self::job_from_row,
            )
            .optional()?;
        Ok(job)
    }

    fn update_job(&self, id: i64, update: &JobUpdate) -> Result<()> {
        let conn = self.conn.lock().expect("store mutex poisoned");

        let current: Option<String> = conn
            .query_row(
                "SELECT status FROM scrape_jobs WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(current) = current else {
            return Err(crate::error::ScoutError::JobNotFound(id).into());
        };
        let current = JobStatus::parse(&current).unwrap_or(JobStatus::Failed);

        let mut sets: Vec<&str> = Vec::new();
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(status) = update.status {
            if current.is_terminal() && status != current {
                tracing::warn!(
                    "refusing transition of job {id} out of terminal state {current} → {status}"
                );
            } else {
                sets.push("status = ?");
                args.push(Box::new(status.as_str().to_string()));
                if status.is_terminal() {
                    sets.push("completed_at = ?");
                    args.push(Box::new(Utc::now().to_rfc3339()));
                }
            }
        }
        if let Some(v) = update.total_countries {
            sets.push("total_countries = ?");
            args.push(Box::new(v));
        }
        if let Some(v) = update.completed_countries {
            sets.push("completed_countries = ?");
            args.push(Box::new(v));
        }
        if let Some(v) = update.total_universities {
            sets.push("total_universities = ?");
            args.push(Box::new(v));
        }
        if let Some(v) = update.completed_universities {
            sets.push("completed_universities = ?");
            args.push(Box::new(v));
        }
        if let Some(ref v) = update.current_country {
            sets.push("current_country = ?");
            args.push(Box::new(v.clone()));
        }
        if let Some(ref v) = update.current_university {
            sets.push("current_university = ?");
            args.push(Box::new(v.clone()));
        }
        if let Some(ref v) = update.error_message {
            sets.push("error_message = ?");
            args.push(Box::new(v.clone()));
        }

        if sets.is_empty() {
            return Ok(());
        }

        // Anonymous placeholders bind in push order; id goes last.
        let sql = format!("UPDATE scrape_jobs SET {} WHERE id = ?", sets.join(", "));
        args.push(Box::new(id));

        conn.execute(&sql, params_from_iter(args.iter().map(|a| a.as_ref())))?;
        Ok(())
    }

    fn running_job(&self) -> Result<Option<ScrapeJob>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let job = conn
            .query_row(
                "SELECT * FROM scrape_jobs WHERE status = 'running' ORDER BY id DESC LIMIT 1",
                [],
                Self::job_from_row,
            )
            .optional()?;
        Ok(job)
    }

    fn force_cancel_stale_running_jobs(&self) -> Result<usize> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let count = conn.execute(
            "UPDATE scrape_jobs
             SET status = 'cancelled',
                 error_message = 'force cancelled — worker process died or was restarted',
                 completed_at = ?1
             WHERE status = 'running'",
            params![Utc::now().to_rfc3339()],
        )?;
        if count > 0 {
            tracing::info!("force-cancelled {count} stale running job(s)");
        }
        Ok(count)
    }

    fn is_populated(&self) -> Result<bool> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM module_mappings", [], |r| r.get(0))?;
        Ok(count > 0)
    }

    fn clear_all_data(&self) -> Result<()> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.execute_batch(
            "DELETE FROM module_mappings;
             DELETE FROM universities;
             DELETE FROM countries;",
        )?;
        Ok(())
    }

    fn stats(&self) -> Result<StoreStats> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let total_countries: u32 =
            conn.query_row("SELECT COUNT(*) FROM countries", [], |r| r.get(0))?;
        let total_universities: u32 =
            conn.query_row("SELECT COUNT(*) FROM universities", [], |r| r.get(0))?;
        let total_mappings: u32 =
            conn.query_row("SELECT COUNT(*) FROM module_mappings", [], |r| r.get(0))?;
        let unique_modules: u32 = conn.query_row(
            "SELECT COUNT(DISTINCT home_module_code) FROM module_mappings",
            [],
            |r| r.get(0),
        )?;
        let last_completed: Option<String> = conn
            .query_row(
                "SELECT completed_at FROM scrape_jobs WHERE status = 'completed'
                 ORDER BY id DESC LIMIT 1",
                [],
                |r| r.get(0),
            )
            .optional()?;

        Ok(StoreStats {
            populated: total_mappings > 0,
            total_countries,
            total_universities,
            total_mappings,
            unique_modules,
            last_completed_crawl: parse_ts(last_completed),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(code: &str) -> ModuleMapping {
        ModuleMapping {
            home_module_code: code.to_string(),
            home_module_name: "Neural Networks".to_string(),
            home_module_type: "Core".to_string(),
            partner_module_code: "COMP3308".to_string(),
            partner_module_name: "Introduction to AI".to_string(),
            academic_units: "3".to_string(),
            status: "Approved".to_string(),
            approval_year: "2024".to_string(),
            semester: "1".to_string(),
        }
    }

    #[test]
    fn test_upserts_are_idempotent() {
        let store = SqliteStore::open_in_memory().unwrap();
        let c1 = store.upsert_country("Australia").unwrap();
        let c2 = store.upsert_country("Australia").unwrap();
        assert_eq!(c1, c2);

        let u1 = store.upsert_university(c1, "University of Queensland").unwrap();
        let u2 = store.upsert_university(c1, "University of Queensland").unwrap();
        assert_eq!(u1, u2);
    }

    #[test]
    fn test_bulk_insert_and_query() {
        let store = SqliteStore::open_in_memory().unwrap();
        let country = store.upsert_country("Australia").unwrap();
        let uni = store.upsert_university(country, "University of Queensland").unwrap();

        let count = store
            .bulk_insert_mappings(uni, &[mapping("SC4001"), mapping("SC4002")])
            .unwrap();
        assert_eq!(count, 2);
        assert!(store.is_populated().unwrap());

        let results = store
            .query_by_modules(&["sc4001".to_string()], None)
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].university, "University of Queensland");
        assert!(results[0].mappings.contains_key("SC4001"));
        assert!(!results[0].mappings.contains_key("SC4002"));
    }

    #[test]
    fn test_query_filters_by_country() {
        let store = SqliteStore::open_in_memory().unwrap();
        let au = store.upsert_country("Australia").unwrap();
        let dk = store.upsert_country("Denmark").unwrap();
        let uq = store.upsert_university(au, "University of Queensland").unwrap();
        let dtu = store.upsert_university(dk, "Technical University of Denmark").unwrap();
        store.bulk_insert_mappings(uq, &[mapping("SC4001")]).unwrap();
        store.bulk_insert_mappings(dtu, &[mapping("SC4001")]).unwrap();

        let results = store
            .query_by_modules(&["SC4001".to_string()], Some(&["Denmark".to_string()]))
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].country, "Denmark");
    }

    #[test]
    fn test_job_lifecycle_and_partial_updates() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = store.create_job().unwrap();

        let job = store.get_job(id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Running);
        assert!(job.started_at.is_some());
        assert!(job.completed_at.is_none());

        store
            .update_job(
                id,
                &JobUpdate {
                    total_countries: Some(40),
                    current_country: Some("Australia".to_string()),
                    ..JobUpdate::default()
                },
            )
            .unwrap();
        let job = store.get_job(id).unwrap().unwrap();
        assert_eq!(job.total_countries, 40);
        assert_eq!(job.current_country.as_deref(), Some("Australia"));
        // Untouched fields stay put.
        assert_eq!(job.status, JobStatus::Running);

        store
            .update_job(id, &JobUpdate::status(JobStatus::Completed))
            .unwrap();
        let job = store.get_job(id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn test_terminal_states_are_sticky() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = store.create_job().unwrap();
        store
            .update_job(id, &JobUpdate::status(JobStatus::Completed))
            .unwrap();

        // Cancelling a completed job must not change its status.
        store
            .update_job(id, &JobUpdate::status(JobStatus::Cancelled))
            .unwrap();
        assert_eq!(store.get_job(id).unwrap().unwrap().status, JobStatus::Completed);
    }

    #[test]
    fn test_update_unknown_job_fails() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store
            .update_job(999, &JobUpdate::status(JobStatus::Cancelled))
            .is_err());
    }

    #[test]
    fn test_force_cancel_only_touches_running_jobs() {
        let store = SqliteStore::open_in_memory().unwrap();
        let stale = store.create_job().unwrap();
        let done = store.create_job().unwrap();
        let failed = store.create_job().unwrap();
        store.update_job(done, &JobUpdate::status(JobStatus::Completed)).unwrap();
        store
            .update_job(
                failed,
                &JobUpdate {
                    status: Some(JobStatus::Failed),
                    error_message: Some("boom".to_string()),
                    ..JobUpdate::default()
                },
            )
            .unwrap();

        assert_eq!(store.force_cancel_stale_running_jobs().unwrap(), 1);
        assert_eq!(store.get_job(stale).unwrap().unwrap().status, JobStatus::Cancelled);
        assert_eq!(store.get_job(done).unwrap().unwrap().status, JobStatus::Completed);
        assert_eq!(store.get_job(failed).unwrap().unwrap().status, JobStatus::Failed);
        assert!(store.running_job().unwrap().is_none());
    }

    #[test]
    fn test_clear_all_data_keeps_job_history() {
        let store = SqliteStore::open_in_memory().unwrap();
        let country = store.upsert_country("Australia").unwrap();
        let uni = store.upsert_university(country, "UQ").unwrap();
        store.bulk_insert_mappings(uni, &[mapping("SC4001")]).unwrap();
        let job = store.create_job().unwrap();

        store.clear_all_data().unwrap();
        assert!(!store.is_populated().unwrap());
        assert!(store.get_job(job).unwrap().is_some());

        let stats = store.stats().unwrap();
        assert_eq!(stats.total_countries, 0);
        assert_eq!(stats.total_mappings, 0);
    }
}

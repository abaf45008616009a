//! YAML configuration for the scout.
//!
//! Every field has a serde default so a partial file (or no file at all)
//! still produces a usable `Config`. Timeouts are split into three
//! independent layers — page load, element wait, and the manual-MFA wait —
//! because each must fail on its own without cascading into a job abort.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration, loaded from YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub portal: PortalConfig,
    /// Countries the student is willing to go to; vacancy rows outside this
    /// set are dropped at filter time.
    pub target_countries: Vec<String>,
    /// The student's college, matched against the vacancy list's
    /// eligible-colleges column ("All" is a wildcard there).
    pub student_college: String,
    /// Minimum semester-1 spots for a vacancy row to survive filtering.
    pub min_sem1_spots: u32,
    /// Home module codes the student wants mapped abroad.
    pub target_modules: Vec<String>,
    /// Approval years that count as "recent"; mappings outside this window
    /// are discarded at parse time.
    pub approved_years: Vec<String>,
    pub rate_limiting: RateLimitConfig,
    pub timeouts: TimeoutConfig,
    /// Path to the vacancy-list PDF.
    pub vacancy_pdf: PathBuf,
    /// Checkpoint file for the incremental crawl.
    pub checkpoint_file: PathBuf,
    /// Base directory for the store, cache, and credentials.
    pub data_dir: PathBuf,
}

/// Target portal endpoints and the identity used in deep links.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    /// SSO entry point; the deep-link target is appended as `p2`.
    pub sso_login_url: String,
    /// Authenticated search page, parameterized by student id (`p1`).
    pub search_url: String,
    /// Student matriculation id used in the deep link. Falls back to the
    /// vault username when empty.
    pub student_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Lower bound of the per-university politeness delay, milliseconds.
    pub delay_min_ms: u64,
    /// Upper bound of the per-university politeness delay, milliseconds.
    pub delay_max_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub page_load_ms: u64,
    pub element_wait_ms: u64,
    /// How long to wait for manual two-factor completion.
    pub mfa_wait_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            portal: PortalConfig::default(),
            target_countries: vec![
                "Australia".to_string(),
                "Denmark".to_string(),
                "Sweden".to_string(),
                "Finland".to_string(),
            ],
            student_college: "CCDS".to_string(),
            min_sem1_spots: 1,
            target_modules: Vec::new(),
            approved_years: vec!["2024".to_string(), "2025".to_string()],
            rate_limiting: RateLimitConfig::default(),
            timeouts: TimeoutConfig::default(),
            vacancy_pdf: PathBuf::from("vacancy_list.pdf"),
            checkpoint_file: PathBuf::from("checkpoint.json"),
            data_dir: default_data_dir(),
        }
    }
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            sso_login_url: "https://sso.wis.ntu.edu.sg/webexe88/owa/sso_login1.asp".to_string(),
            search_url:
                "https://wis.ntu.edu.sg/pls/lms/instep_past_subj_matching.show_rec_INSTEP"
                    .to_string(),
            student_id: String::new(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            delay_min_ms: 3_000,
            delay_max_ms: 5_000,
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            page_load_ms: 30_000,
            element_wait_ms: 10_000,
            mfa_wait_secs: 120,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&raw)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!("no config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// The deep-linked search URL for the given student id.
    pub fn deep_link(&self, student_id: &str) -> String {
        format!("{}?p1={}&p2=", self.portal.search_url, student_id)
    }

    /// The SSO entry URL carrying the deep-link target.
    pub fn sso_entry(&self, student_id: &str) -> String {
        format!(
            "{}?t=1&p2={}",
            self.portal.sso_login_url,
            self.deep_link(student_id)
        )
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("exchange_mappings.db")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir.join("cache")
    }
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".modscout")
}

//! Closed error taxonomy for caller-facing failure modes.
//!
//! Most internal plumbing uses `anyhow` with context. The variants here are
//! the failures a caller is expected to branch on: fatal preconditions that
//! abort before any browser activity, authentication outcomes, and job
//! lifecycle conflicts. Expected login failures (bad credentials, MFA
//! timeout) are *not* errors — `login()` returns `Ok(false)` — so the auth
//! variants below only surface when a caller converts that outcome into an
//! unauthorized-style response.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScoutError {
    /// Input file missing before any parsing or network activity starts.
    #[error("input file not found: {0}")]
    MissingInput(PathBuf),

    /// No credentials stored for the given identity.
    #[error("no credentials stored for '{0}' — run `modscout setup` first")]
    CredentialsNotFound(String),

    /// Login completed with a definitive failure (wrong credentials,
    /// SSO error page, or MFA never completed).
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// A bulk crawl is already running against the destination store.
    #[error("a crawl job is already running (job {0})")]
    CrawlInProgress(i64),

    /// Job id does not exist in the store.
    #[error("job {0} not found")]
    JobNotFound(i64),

    /// Job id exists but is not owned by this process, so its cooperative
    /// cancellation flag cannot be tripped from here.
    #[error("job {0} is not owned by this process; use `modscout maintenance` to clear stale jobs")]
    JobNotOwned(i64),
}

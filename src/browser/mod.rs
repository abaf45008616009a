//! Browser abstraction for portal automation.
//!
//! Defines the `BrowserEngine` and `PortalPage` traits that abstract over
//! the browser (currently Chromium via chromiumoxide). The portal is a
//! 1990s-era form-driven site, so beyond navigation the page surface is
//! form primitives: fill a field, drive a `<select>`, read its options,
//! click, and submit.

pub mod chromium;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Result of navigating to a URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationResult {
    /// The final URL after any redirects.
    pub final_url: String,
    /// Time taken to load the page in milliseconds.
    pub load_time_ms: u64,
}

/// One option of a `<select>` element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub value: String,
    pub text: String,
}

/// A browser engine that can open portal pages.
#[async_trait]
pub trait BrowserEngine: Send + Sync {
    /// Open a new page (tab).
    async fn new_page(&self) -> Result<Box<dyn PortalPage>>;
    /// Shut down the browser.
    async fn shutdown(&self) -> Result<()>;
}

/// A single browser page driving the portal.
///
/// Element-level operations return `Ok(false)` when the target element is
/// absent — an expected condition on a site whose markup is not under our
/// control — and `Err` only for browser-level failures.
#[async_trait]
pub trait PortalPage: Send + Sync {
    /// Navigate to a URL with a timeout.
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<NavigationResult>;
    /// Current URL of the page.
    async fn current_url(&self) -> Result<String>;
    /// Full page HTML.
    async fn html(&self) -> Result<String>;
    /// Execute JavaScript in the page and return the result.
    async fn eval(&self, script: &str) -> Result<serde_json::Value>;
    /// Set an input's value (fires `input`/`change`). False if absent.
    async fn fill(&self, selector: &str, value: &str) -> Result<bool>;
    /// Click the first element matching `selector`. False if absent.
    async fn click(&self, selector: &str) -> Result<bool>;
    /// Select an option by value, falling back to a case-insensitive
    /// visible-text containment match. False if nothing matched.
    async fn select_value(&self, select_name: &str, value: &str) -> Result<bool>;
    /// Read every option of a named `<select>`, in document order.
    async fn options_of(&self, select_name: &str) -> Result<Vec<SelectOption>>;
    /// Poll until `selector` exists, up to `timeout_ms`. False on timeout.
    async fn wait_for(&self, selector: &str, timeout_ms: u64) -> Result<bool>;
    /// Submit the first form on the page.
    async fn submit_form(&self) -> Result<()>;
    /// Close this page.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// A no-op engine used when Chromium is unavailable.
///
/// Everything that needs a page fails fast with an actionable message; the
/// offline paths (PDF extraction, reconciliation, cached searches) still
/// function.
pub struct NoopBrowser;

#[async_trait]
impl BrowserEngine for NoopBrowser {
    async fn new_page(&self) -> Result<Box<dyn PortalPage>> {
        Err(anyhow::anyhow!(
            "browser not available — run `modscout doctor` to check the Chromium install"
        ))
    }
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

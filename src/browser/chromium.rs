//! Chromium-based portal driver using chromiumoxide.
//!
//! Form interaction goes through `Page::evaluate` rather than CDP element
//! handles: the portal's dependent dropdowns repopulate on every selection,
//! so element references go stale immediately, while a fresh
//! `querySelector` inside the evaluated script never does.

use super::{BrowserEngine, NavigationResult, PortalPage, SelectOption};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::PathBuf;
use std::time::{Duration, Instant};

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// How often `wait_for` polls for an element.
const WAIT_POLL_MS: u64 = 250;

/// Find the Chromium binary path.
pub fn find_chromium() -> Option<PathBuf> {
    // 1. MODSCOUT_CHROMIUM_PATH env
    if let Ok(p) = std::env::var("MODSCOUT_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. ~/.modscout/chromium/
    if let Some(home) = dirs::home_dir() {
        let candidates = if cfg!(target_os = "macos") {
            vec![
                home.join(".modscout/chromium/chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".modscout/chromium/chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".modscout/chromium/chrome"),
            ]
        } else {
            vec![
                home.join(".modscout/chromium/chrome-linux64/chrome"),
                home.join(".modscout/chromium/chrome"),
            ]
        };
        for c in candidates {
            if c.exists() {
                return Some(c);
            }
        }
    }

    // 3. System PATH
    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 4. Common macOS location
    if cfg!(target_os = "macos") {
        let common = PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// Chromium-backed browser engine.
pub struct ChromiumBrowser {
    browser: Browser,
}

impl ChromiumBrowser {
    /// Launch a Chromium instance. `headless: false` keeps the window
    /// visible so a manual MFA challenge can be completed.
    pub async fn launch(headless: bool) -> Result<Self> {
        let chrome_path =
            find_chromium().context("Chromium not found. Run `modscout doctor` for setup hints.")?;

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .window_size(1920, 1080)
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-background-networking")
            .arg(format!("--user-agent={USER_AGENT}"));
        if headless {
            builder = builder.arg("--headless=new");
        } else {
            builder = builder.with_head();
        }
        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        // Spawn the CDP event handler task
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        Ok(Self { browser })
    }
}

#[async_trait]
impl BrowserEngine for ChromiumBrowser {
    async fn new_page(&self) -> Result<Box<dyn PortalPage>> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .context("failed to create new page")?;
        Ok(Box::new(ChromiumPage { page }))
    }

    async fn shutdown(&self) -> Result<()> {
        // Browser process exits when the ChromiumBrowser is dropped
        Ok(())
    }
}

/// A single Chromium page.
pub struct ChromiumPage {
    page: Page,
}

impl ChromiumPage {
    /// Evaluate a script expected to return a boolean.
    async fn eval_bool(&self, script: &str) -> Result<bool> {
        let value = self
            .page
            .evaluate(script)
            .await
            .context("JS execution failed")?
            .into_value::<serde_json::Value>()
            .map_err(|e| anyhow::anyhow!("failed to convert JS result: {e:?}"))?;
        Ok(value.as_bool().unwrap_or(false))
    }
}

#[async_trait]
impl PortalPage for ChromiumPage {
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<NavigationResult> {
        let start = Instant::now();

        let result = tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            self.page.goto(url),
        )
        .await;

        let load_time_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(_response)) => {
                let _ = self.page.wait_for_navigation().await;
                let final_url = self
                    .page
                    .url()
                    .await
                    .unwrap_or_default()
                    .map(|u| u.to_string())
                    .unwrap_or_else(|| url.to_string());

                Ok(NavigationResult {
                    final_url,
                    load_time_ms,
                })
            }
            Ok(Err(e)) => bail!("navigation failed: {e}"),
            Err(_) => bail!("navigation timed out after {timeout_ms}ms"),
        }
    }

    async fn current_url(&self) -> Result<String> {
        let url = self
            .page
            .url()
            .await
            .context("failed to get URL")?
            .map(|u| u.to_string())
            .unwrap_or_default();
        Ok(url)
    }

    async fn html(&self) -> Result<String> {
        let result = self
            .page
            .evaluate("document.documentElement.outerHTML")
            .await
            .context("failed to get HTML")?;
        result
            .into_value()
            .map_err(|e| anyhow::anyhow!("failed to convert HTML result: {e:?}"))
    }

    async fn eval(&self, script: &str) -> Result<serde_json::Value> {
        let result = self
            .page
            .evaluate(script)
            .await
            .context("JS execution failed")?;
        result
            .into_value()
            .map_err(|e| anyhow::anyhow!("failed to convert JS result: {e:?}"))
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<bool> {
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                if (!el) return false;
                el.focus();
                el.value = {val};
                el.dispatchEvent(new Event('input', {{bubbles: true}}));
                el.dispatchEvent(new Event('change', {{bubbles: true}}));
                return true;
            }})()"#,
            sel = js_str(selector),
            val = js_str(value),
        );
        self.eval_bool(&script).await
    }

    async fn click(&self, selector: &str) -> Result<bool> {
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                if (!el) return false;
                el.click();
                return true;
            }})()"#,
            sel = js_str(selector),
        );
        self.eval_bool(&script).await
    }

    async fn select_value(&self, select_name: &str, value: &str) -> Result<bool> {
        let script = format!(
            r#"(() => {{
                const sel = document.querySelector({sel});
                if (!sel) return false;
                const target = {val};
                let idx = -1;
                for (let i = 0; i < sel.options.length; i++) {{
                    if (sel.options[i].value === target) {{ idx = i; break; }}
                }}
                if (idx < 0) {{
                    const lower = target.toLowerCase();
                    for (let i = 0; i < sel.options.length; i++) {{
                        if (sel.options[i].text.toLowerCase().includes(lower)) {{ idx = i; break; }}
                    }}
                }}
                if (idx < 0) return false;
                sel.selectedIndex = idx;
                sel.dispatchEvent(new Event('change', {{bubbles: true}}));
                return true;
            }})()"#,
            sel = js_str(&select_selector(select_name)),
            val = js_str(value),
        );
        self.eval_bool(&script).await
    }

    async fn options_of(&self, select_name: &str) -> Result<Vec<SelectOption>> {
        let script = format!(
            r#"(() => {{
                const sel = document.querySelector({sel});
                if (!sel) return [];
                return Array.from(sel.options).map(o => ({{value: o.value, text: o.text.trim()}}));
            }})()"#,
            sel = js_str(&select_selector(select_name)),
        );
        let value = self.eval(&script).await?;
        let options: Vec<SelectOption> = serde_json::from_value(value)
            .with_context(|| format!("unexpected option list shape for select '{select_name}'"))?;
        Ok(options)
    }

    async fn wait_for(&self, selector: &str, timeout_ms: u64) -> Result<bool> {
        let script = format!(
            "!!document.querySelector({sel})",
            sel = js_str(selector)
        );
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            if self.eval_bool(&script).await? {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(Duration::from_millis(WAIT_POLL_MS)).await;
        }
    }

    async fn submit_form(&self) -> Result<()> {
        self.eval("document.forms[0] && document.forms[0].submit()")
            .await
            .map(|_| ())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let _ = self.page.close().await;
        Ok(())
    }
}

/// CSS selector for a named `<select>`.
fn select_selector(name: &str) -> String {
    format!("select[name='{name}']")
}

/// Encode a Rust string as a JS string literal (JSON escaping is a strict
/// subset of JS string syntax).
fn js_str(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_js_str_escapes_quotes() {
        assert_eq!(js_str("plain"), "\"plain\"");
        assert_eq!(js_str("a'b\"c"), r#""a'b\"c""#);
    }

    #[test]
    fn test_select_selector_shape() {
        assert_eq!(select_selector("which_cty"), "select[name='which_cty']");
    }

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn test_navigate_and_read_options() {
        let engine = ChromiumBrowser::launch(true)
            .await
            .expect("failed to launch browser");
        let mut page = engine.new_page().await.expect("failed to open page");

        page.navigate(
            "data:text/html,<select name='c'><option value=''>--</option>\
             <option value='AU'>Australia</option></select>",
            10_000,
        )
        .await
        .expect("navigation failed");

        let options = page.options_of("c").await.expect("options failed");
        assert_eq!(options.len(), 2);
        assert_eq!(options[1].value, "AU");

        assert!(page.select_value("c", "AU").await.expect("select failed"));
        assert!(!page.select_value("c", "ZZ").await.expect("select failed"));

        page.close().await.expect("close failed");
        engine.shutdown().await.expect("shutdown failed");
    }
}

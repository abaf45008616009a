//! Authenticated portal session.
//!
//! A stateful wrapper around one browser page: performs the multi-step SSO
//! login (username/domain → second-stage password → optional manual MFA
//! wait), tracks authentication as a cheap local flag, and re-authenticates
//! transparently when an operation discovers the session has expired.
//!
//! Expected authentication failures — wrong credentials, an SSO error page,
//! an MFA window that never completes — come back as `Ok(false)` from
//! [`PortalSession::login`], never as `Err`; the caller decides whether to
//! abort or retry. `Err` is reserved for browser-level breakage.
//!
//! The identity provider's markup is not under our control, so the password
//! field is located by a prioritized list of named strategies rather than
//! one selector.

use crate::browser::PortalPage;
use crate::config::Config;
use crate::credentials::Credentials;
use anyhow::Result;
use std::time::Duration;

/// URL fragments that mark the authenticated portal area.
const AUTHENTICATED_MARKERS: &[&str] = &["instep", "show_rec"];
/// URL fragments that mark the SSO login flow.
const SSO_MARKERS: &[&str] = &["sso", "sso_login"];
/// URL fragments that mark a pending OTP/MFA challenge.
const MFA_MARKERS: &[&str] = &["otp", "2fa", "mfa"];
/// Post-login landing page some SSO flows redirect to instead of the target.
const BLANK_LANDING: &str = "blank.htm";

/// Polling interval for redirect and MFA waits.
const POLL_INTERVAL: Duration = Duration::from_secs(5);
/// How many polls to spend waiting for the post-password redirect.
const REDIRECT_POLLS: u32 = 6;

/// A named selector strategy for locating a login field.
struct FieldStrategy {
    name: &'static str,
    selector: &'static str,
}

/// Password-field candidates, tried in order. The portal's own form comes
/// first; federated providers (ADFS, Microsoft) follow.
const PASSWORD_STRATEGIES: &[FieldStrategy] = &[
    FieldStrategy { name: "portal-form", selector: "input[name='Password']" },
    FieldStrategy { name: "lowercase", selector: "input[name='password']" },
    FieldStrategy { name: "legacy", selector: "input[name='passwd']" },
    FieldStrategy { name: "adfs", selector: "#passwordInput" },
    FieldStrategy { name: "microsoft", selector: "#i0118" },
    FieldStrategy { name: "generic", selector: "input[type='password']" },
];

/// Submit-control candidates for the username step.
const USERNAME_SUBMIT_STRATEGIES: &[FieldStrategy] = &[
    FieldStrategy { name: "portal-button", selector: "input[name='bOption']" },
    FieldStrategy { name: "generic-submit", selector: "input[type='submit']" },
];

/// Submit-control candidates for the password step.
const PASSWORD_SUBMIT_STRATEGIES: &[FieldStrategy] = &[
    FieldStrategy { name: "microsoft-next", selector: "#idSIButton9" },
    FieldStrategy { name: "generic-submit", selector: "input[type='submit']" },
    FieldStrategy { name: "generic-button", selector: "button[type='submit']" },
];

/// Authentication lifecycle of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    Authenticating,
    Authenticated,
    Expired,
}

/// One authenticated scrape session over one browser page.
pub struct PortalSession {
    page: Box<dyn PortalPage>,
    credentials: Credentials,
    config: Config,
    state: AuthState,
}

impl PortalSession {
    pub fn new(page: Box<dyn PortalPage>, credentials: Credentials, config: Config) -> Self {
        Self {
            page,
            credentials,
            config,
            state: AuthState::Unauthenticated,
        }
    }

    /// Cheap local check; expiry is discovered lazily at the point of use.
    pub fn is_session_valid(&self) -> bool {
        self.state == AuthState::Authenticated
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    /// The student id used in deep links (configured, or the username).
    pub fn student_id(&self) -> &str {
        if self.config.portal.student_id.is_empty() {
            &self.credentials.username
        } else {
            &self.config.portal.student_id
        }
    }

    /// Mutable access to the underlying page for the navigator.
    pub fn page_mut(&mut self) -> &mut Box<dyn PortalPage> {
        &mut self.page
    }

    pub fn page(&self) -> &dyn PortalPage {
        self.page.as_ref()
    }

    /// Release the underlying page.
    pub async fn close(self) -> Result<()> {
        self.page.close().await
    }

    /// Perform the SSO login. `Ok(true)` on success, `Ok(false)` on any
    /// expected authentication failure.
    pub async fn login(&mut self) -> Result<bool> {
        self.state = AuthState::Authenticating;
        let student_id = self.student_id().to_string();
        let target_url = self.config.deep_link(&student_id);
        let sso_url = self.config.sso_entry(&student_id);
        let page_load = self.config.timeouts.page_load_ms;

        tracing::info!("navigating to SSO entry point");
        self.page.navigate(&sso_url, page_load).await?;
        tokio::time::sleep(Duration::from_secs(2)).await;

        let url = self.page.current_url().await?;

        // The SSO check must come first: the SSO entry URL carries the
        // deep-link target in its p2 parameter, so it also contains the
        // authenticated-area markers.
        if !url_matches(&url, SSO_MARKERS) {
            if url_matches(&url, AUTHENTICATED_MARKERS) {
                // A previous session's cookies are still live.
                tracing::info!("already authenticated");
                self.state = AuthState::Authenticated;
                return Ok(true);
            }
            tracing::warn!("unexpected page during login: {url}");
            self.state = AuthState::Unauthenticated;
            return Ok(false);
        }

        if !self.submit_username().await? {
            self.state = AuthState::Unauthenticated;
            return Ok(false);
        }

        self.submit_password().await?;

        if !self.await_mfa_if_challenged().await? {
            self.state = AuthState::Unauthenticated;
            return Ok(false);
        }

        // Settle, then judge the landing URL. The blank landing page lives
        // on the SSO host, so it is checked before the SSO failure case.
        tokio::time::sleep(Duration::from_secs(3)).await;
        let landed = self.page.current_url().await?;
        tracing::debug!("post-login URL: {landed}");

        if landed.to_lowercase().contains(BLANK_LANDING) {
            // Authentication worked; walk to the target ourselves.
            self.page.navigate(&target_url, page_load).await?;
            tokio::time::sleep(Duration::from_secs(2)).await;
            let after = self.page.current_url().await?;
            if !url_matches(&after, SSO_MARKERS) && url_matches(&after, AUTHENTICATED_MARKERS) {
                self.state = AuthState::Authenticated;
                tracing::info!("login successful");
                return Ok(true);
            }
        } else if url_matches(&landed, SSO_MARKERS) {
            self.log_sso_error().await;
            self.state = AuthState::Unauthenticated;
            return Ok(false);
        } else if url_matches(&landed, AUTHENTICATED_MARKERS) {
            self.state = AuthState::Authenticated;
            tracing::info!("login successful");
            return Ok(true);
        }

        // Neither clearly failed nor clearly succeeded; try the target
        // directly and let the next operation discover the truth.
        tracing::warn!("ambiguous post-login page, navigating to target");
        self.page.navigate(&target_url, page_load).await?;
        self.state = AuthState::Authenticated;
        Ok(true)
    }

    /// Ensure the page is on the authenticated search area, re-logging-in
    /// once if the session has expired. Callers retry the discovering
    /// operation once after a `true` return.
    pub async fn ensure_active(&mut self) -> Result<bool> {
        let url = self.page.current_url().await?;

        // SSO before authenticated, for the same p2-parameter reason as in
        // `login`: being bounced to SSO is how expiry announces itself.
        if url_matches(&url, SSO_MARKERS) {
            tracing::warn!("session expired, re-authenticating");
            self.state = AuthState::Expired;
            return self.login().await;
        }

        if url_matches(&url, AUTHENTICATED_MARKERS) {
            return Ok(true);
        }

        let target = self.config.deep_link(&self.student_id().to_string());
        self.page
            .navigate(&target, self.config.timeouts.page_load_ms)
            .await?;
        Ok(true)
    }

    /// Step one: username + domain, then submit.
    async fn submit_username(&mut self) -> Result<bool> {
        let wait = self.config.timeouts.element_wait_ms;
        if !self.page.wait_for("input[name='UserName']", wait).await? {
            tracing::warn!("username field not found");
            return Ok(false);
        }
        self.page
            .fill("input[name='UserName']", &self.credentials.username)
            .await?;

        // The domain selector is optional on some variants of the page.
        let domain = self.credentials.domain.to_uppercase();
        if !self.page.select_value("Domain", &domain).await? {
            let _ = self
                .page
                .select_value("Domain", &self.credentials.domain)
                .await?;
        }

        self.click_first(USERNAME_SUBMIT_STRATEGIES).await?;
        tokio::time::sleep(Duration::from_secs(3)).await;
        Ok(true)
    }

    /// Step two: locate the password field by strategy, fill, submit, and
    /// wait out the redirect chain.
    async fn submit_password(&mut self) -> Result<()> {
        let mut matched: Option<&FieldStrategy> = None;
        for strategy in PASSWORD_STRATEGIES {
            if self.page.wait_for(strategy.selector, 5_000).await? {
                matched = Some(strategy);
                break;
            }
        }

        let Some(strategy) = matched else {
            // No password prompt at all can mean single-step auth; the
            // landing-URL check decides.
            tracing::debug!("no password field found, assuming single-step auth");
            return Ok(());
        };

        tracing::debug!("password field matched via '{}' strategy", strategy.name);
        self.page
            .fill(strategy.selector, &self.credentials.password)
            .await?;
        tokio::time::sleep(Duration::from_secs(1)).await;
        self.click_first(PASSWORD_SUBMIT_STRATEGIES).await?;

        // Wait for the redirect, dismissing "stay signed in?" interstitials.
        for _ in 0..REDIRECT_POLLS {
            tokio::time::sleep(POLL_INTERVAL).await;

            let _ = self.page.click("#idBtn_Back").await;
            let _ = self.page.click("#idSIButton9").await;

            let url = self.page.current_url().await?.to_lowercase();
            if url.contains(BLANK_LANDING) || !url_matches(&url, SSO_MARKERS) {
                break;
            }
        }
        Ok(())
    }

    /// If the post-login URL indicates an OTP/MFA challenge, poll until the
    /// user completes it in the (headed) browser window or the bounded wait
    /// elapses. `Ok(false)` on timeout.
    async fn await_mfa_if_challenged(&mut self) -> Result<bool> {
        let url = self.page.current_url().await?;
        if !url_matches(&url, MFA_MARKERS) {
            return Ok(true);
        }

        let wait_secs = self.config.timeouts.mfa_wait_secs;
        tracing::warn!("MFA challenge detected; waiting up to {wait_secs}s for completion");

        let polls = wait_secs / POLL_INTERVAL.as_secs().max(1);
        for _ in 0..polls {
            tokio::time::sleep(POLL_INTERVAL).await;
            let url = self.page.current_url().await?;
            // Off both the challenge and the SSO flow means it completed.
            if !url_matches(&url, MFA_MARKERS) && !url_matches(&url, SSO_MARKERS) {
                tracing::info!("MFA completed");
                return Ok(true);
            }
        }

        tracing::warn!("MFA wait timed out after {wait_secs}s");
        Ok(false)
    }

    /// Click the first matching submit control, or fall back to a raw form
    /// submission when none of the candidates exist.
    async fn click_first(&mut self, strategies: &[FieldStrategy]) -> Result<()> {
        for strategy in strategies {
            if self.page.click(strategy.selector).await? {
                tracing::trace!("clicked submit via '{}' strategy", strategy.name);
                return Ok(());
            }
        }
        self.page.submit_form().await
    }

    /// Best-effort extraction of an error hint from the SSO page.
    async fn log_sso_error(&self) {
        let Ok(html) = self.page.html().await else {
            return;
        };
        let lower = html.to_lowercase();
        for (needle, hint) in [
            ("invalid", "invalid credentials"),
            ("incorrect", "incorrect username or password"),
            ("locked", "account may be locked"),
        ] {
            if lower.contains(needle) {
                tracing::warn!("login failed: {hint}");
                return;
            }
        }
        tracing::warn!("login failed: still on SSO page");
    }
}

/// Case-insensitive check for any marker fragment in the URL.
fn url_matches(url: &str, markers: &[&str]) -> bool {
    let lower = url.to_lowercase();
    markers.iter().any(|m| lower.contains(m))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_markers() {
        assert!(url_matches(
            "https://wis.example.edu/pls/lms/instep_past_subj_matching.show_rec_INSTEP?p1=U1",
            AUTHENTICATED_MARKERS
        ));
        assert!(url_matches(
            "https://sso.example.edu/webexe88/owa/sso_login1.asp",
            SSO_MARKERS
        ));
        assert!(url_matches("https://idp.example.edu/common/OTP/verify", MFA_MARKERS));
        assert!(!url_matches("https://www.example.edu/home", AUTHENTICATED_MARKERS));
    }

    #[test]
    fn test_password_strategy_order_prefers_portal_form() {
        assert_eq!(PASSWORD_STRATEGIES[0].name, "portal-form");
        assert_eq!(
            PASSWORD_STRATEGIES.last().unwrap().selector,
            "input[type='password']"
        );
    }
}

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use fantoccini::elements::Element;
use fantoccini::error::CmdError;
use fantoccini::{Client, ClientBuilder, Locator};
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::config::SiteConfig;
use crate::error::SessionError;
use crate::models::Granularity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    Unauthenticated,
    Authenticating,
    Authenticated,
    OnDataPage,
    ModeSelected,
    LookupPending,
    Ready,
}

/// Outcome of a mode switch. Callers decide whether a failure aborts the date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModeSelection {
    AlreadySelected,
    Changed,
    Failed(String),
}

impl ModeSelection {
    pub fn is_selected(&self) -> bool {
        !matches!(self, ModeSelection::Failed(_))
    }

    /// Classify a radio from its state before and, if clicked, after the click.
    fn from_radio(selected_before: bool, selected_after_click: bool) -> Self {
        match (selected_before, selected_after_click) {
            (true, _) => ModeSelection::AlreadySelected,
            (false, true) => ModeSelection::Changed,
            (false, false) => ModeSelection::Failed("clicked but still not selected".to_string()),
        }
    }
}

/// Index of the first candidate that is both displayed and enabled.
fn first_live(candidates: &[(bool, bool)]) -> Option<usize> {
    candidates
        .iter()
        .position(|&(displayed, enabled)| displayed && enabled)
}

/// Locators are tried in order; within one, the first live match wins.
fn pick_lookup_control(per_locator: &[Vec<(bool, bool)>]) -> Option<(usize, usize)> {
    per_locator
        .iter()
        .enumerate()
        .find_map(|(locator, candidates)| first_live(candidates).map(|index| (locator, index)))
}

/// Remembers whether this browser has ever tried to log in.
#[derive(Debug, Default)]
struct LoginHistory {
    attempted: bool,
}

impl LoginHistory {
    /// Record a new attempt. True when cookies from an earlier one must be cleared.
    fn start(&mut self) -> bool {
        std::mem::replace(&mut self.attempted, true)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OverlayPoll {
    Cleared,
    Wait,
    GiveUp,
}

/// Next step of the overlay wait. `visible` is `None` when the check itself failed.
fn overlay_poll(visible: Option<bool>, expired: bool) -> OverlayPoll {
    match (visible, expired) {
        (Some(false), _) => OverlayPoll::Cleared,
        (_, true) => OverlayPoll::GiveUp,
        (_, false) => OverlayPoll::Wait,
    }
}

/// The portal operations a campaign drives, one call at a time.
#[async_trait]
pub trait Portal: Send {
    /// Log in from the login page. A failure ends the current account.
    async fn authenticate(&mut self, login_id: &str, login_pw: &str) -> Result<(), SessionError>;

    /// Close the notice popup if it shows up. Never fails.
    async fn dismiss_popup(&mut self);

    async fn navigate_to_data_page(&mut self) -> Result<(), SessionError>;

    /// Write `date` (YYYY-MM-DD) into the read-only date control.
    async fn set_date(&mut self, date: &str) -> Result<(), SessionError>;

    /// Wait for the loading overlay to go away; proceeds with a warning on timeout.
    async fn await_overlay_clear(&mut self);

    async fn select_interval_mode(&mut self, mode: Granularity) -> ModeSelection;

    /// Click the live lookup control and wait for the results table.
    async fn trigger_lookup(&mut self) -> Result<(), SessionError>;

    async fn page_source(&mut self) -> Result<String, SessionError>;

    fn results_table_id(&self) -> &str;
}

/// A WebDriver-backed browser session against the usage portal.
pub struct Session {
    client: Client,
    config: SiteConfig,
    state: SessionState,
    logins: LoginHistory,
}

impl Session {
    pub async fn connect(
        webdriver_url: &str,
        headless: bool,
        config: SiteConfig,
    ) -> anyhow::Result<Self> {
        let mut args = vec![
            "--no-sandbox",
            "--disable-dev-shm-usage",
            "--disable-gpu",
            "--window-size=1920,1080",
        ];
        if headless {
            args.insert(0, "--headless=new");
        }

        let mut capabilities = serde_json::Map::new();
        capabilities.insert("browserName".to_string(), json!("chrome"));
        capabilities.insert("goog:chromeOptions".to_string(), json!({ "args": args }));

        let client = ClientBuilder::native()
            .capabilities(capabilities)
            .connect(webdriver_url)
            .await
            .with_context(|| format!("failed to start a browser session at {webdriver_url}"))?;

        info!(webdriver_url, headless, "browser session started");
        Ok(Self {
            client,
            config,
            state: SessionState::Unauthenticated,
            logins: LoginHistory::default(),
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Tear the browser down. Consumes the session.
    pub async fn close(self) -> Result<(), SessionError> {
        self.client.close().await?;
        info!("browser session closed");
        Ok(())
    }

    fn transition(&mut self, next: SessionState) {
        debug!(from = ?self.state, to = ?next, "session transition");
        self.state = next;
    }

    fn require(&self, at_least: SessionState) -> Result<(), String> {
        if self.state < at_least {
            return Err(format!(
                "session is {:?}, expected at least {:?}",
                self.state, at_least
            ));
        }
        Ok(())
    }

    async fn wait_for(&self, locator: Locator<'_>, timeout: Duration) -> Result<Element, CmdError> {
        self.client
            .wait()
            .at_most(timeout)
            .every(self.config.timeouts.poll())
            .for_element(locator)
            .await
    }

    async fn login(&self, login_id: &str, login_pw: &str, relogin: bool) -> Result<(), CmdError> {
        let timeout = self.config.timeouts.login();

        if relogin {
            self.client.delete_all_cookies().await?;
        }
        self.client.goto(&self.config.login_url).await?;

        let id_field = self
            .wait_for(Locator::Css(&self.config.id_selector), timeout)
            .await?;
        id_field.send_keys(login_id).await?;
        self.client
            .find(Locator::Css(&self.config.pw_selector))
            .await?
            .send_keys(login_pw)
            .await?;
        self.client
            .find(Locator::Css(&self.config.submit_selector))
            .await?
            .click()
            .await?;

        self.wait_for(Locator::Id(&self.config.post_login_marker_id), timeout)
            .await?;
        Ok(())
    }

    async fn overlay_visible(&self) -> Result<bool, CmdError> {
        match self.client.find(Locator::Id(&self.config.overlay_id)).await {
            Ok(overlay) => overlay.is_displayed().await,
            Err(err) if err.is_no_such_element() => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Every match for `xpath` with its `(displayed, enabled)` flags.
    async fn scan_xpath(&self, xpath: &str) -> Vec<(Element, (bool, bool))> {
        let elements = match self.client.find_all(Locator::XPath(xpath)).await {
            Ok(elements) => elements,
            Err(err) => {
                debug!(xpath, error = %err, "locator failed");
                return Vec::new();
            }
        };

        let mut scanned = Vec::with_capacity(elements.len());
        for element in elements {
            let displayed = element.is_displayed().await.unwrap_or(false);
            let enabled = element.is_enabled().await.unwrap_or(false);
            scanned.push((element, (displayed, enabled)));
        }
        scanned
    }

    async fn find_lookup_control(&self) -> Result<Element, SessionError> {
        let mut scanned = Vec::with_capacity(self.config.lookup_xpaths.len());
        for xpath in &self.config.lookup_xpaths {
            scanned.push(self.scan_xpath(xpath).await);
        }

        let flags: Vec<Vec<(bool, bool)>> = scanned
            .iter()
            .map(|matches| matches.iter().map(|(_, flags)| *flags).collect())
            .collect();
        let (locator, index) = pick_lookup_control(&flags).ok_or_else(|| {
            SessionError::Lookup("no visible and enabled lookup control".to_string())
        })?;

        debug!(xpath = self.config.lookup_xpaths[locator].as_str(), "found visible lookup control");
        Ok(scanned.swap_remove(locator).swap_remove(index).0)
    }

    /// Poll until a displayed, enabled popup button shows up or the popup wait runs out.
    async fn wait_for_popup_button(&self) -> Option<Element> {
        let deadline = Instant::now() + self.config.timeouts.popup();
        loop {
            let mut scanned = self.scan_xpath(&self.config.popup_dismiss_xpath).await;
            let flags: Vec<(bool, bool)> = scanned.iter().map(|(_, flags)| *flags).collect();
            if let Some(index) = first_live(&flags) {
                return Some(scanned.swap_remove(index).0);
            }
            if Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(self.config.timeouts.poll()).await;
        }
    }

    async fn run_lookup(&self) -> Result<(), SessionError> {
        let timeouts = &self.config.timeouts;
        let control = self.find_lookup_control().await?;
        let control_arg = serde_json::to_value(&control)
            .map_err(|err| SessionError::Lookup(err.to_string()))?;

        self.client
            .execute(
                "arguments[0].scrollIntoView({block: 'center'});",
                vec![control_arg.clone()],
            )
            .await?;
        tokio::time::sleep(timeouts.scroll_settle()).await;

        if let Err(err) = control.click().await {
            debug!(error = %err, "direct click failed, falling back to script click");
            self.client
                .execute("arguments[0].click();", vec![control_arg])
                .await?;
        }

        self.wait_for(Locator::Id(&self.config.results_table_id), timeouts.lookup())
            .await
            .map_err(|err| SessionError::Lookup(format!("results table did not appear: {err}")))?;
        tokio::time::sleep(timeouts.render_settle()).await;
        Ok(())
    }

    /// Save a screenshot of the current view for post-mortem.
    async fn snapshot(&self, label: &str) -> Option<PathBuf> {
        let png = match self.client.screenshot().await {
            Ok(png) => png,
            Err(err) => {
                warn!(error = %err, "could not capture snapshot");
                return None;
            }
        };

        let dir = &self.config.snapshot_dir;
        let path = dir.join(format!("{label}_{}.png", Utc::now().timestamp()));
        let written = async {
            tokio::fs::create_dir_all(dir).await?;
            tokio::fs::write(&path, png).await
        };
        match written.await {
            Ok(()) => Some(path),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "could not write snapshot");
                None
            }
        }
    }
}

#[async_trait]
impl Portal for Session {
    async fn authenticate(&mut self, login_id: &str, login_pw: &str) -> Result<(), SessionError> {
        // The browser is reused across accounts. Any earlier attempt, even a failed
        // one, may have left a portal cookie behind.
        let relogin = self.logins.start();
        self.transition(SessionState::Authenticating);

        match self.login(login_id, login_pw, relogin).await {
            Ok(()) => {
                self.transition(SessionState::Authenticated);
                info!(login_id, "login succeeded");
                Ok(())
            }
            Err(err) => {
                self.transition(SessionState::Unauthenticated);
                Err(SessionError::Auth(err.to_string()))
            }
        }
    }

    async fn dismiss_popup(&mut self) {
        match self.wait_for_popup_button().await {
            Some(button) => match button.click().await {
                Ok(()) => info!("dismissed notice popup"),
                Err(err) => debug!(error = %err, "popup button was not clickable"),
            },
            None => debug!("no popup to dismiss"),
        }
    }

    async fn navigate_to_data_page(&mut self) -> Result<(), SessionError> {
        self.require(SessionState::Authenticated)
            .map_err(SessionError::Navigation)?;

        self.client
            .goto(&self.config.data_page_url)
            .await
            .map_err(|err| SessionError::Navigation(err.to_string()))?;
        self.wait_for(
            Locator::Id(&self.config.data_page_marker_id),
            self.config.timeouts.navigation(),
        )
        .await
        .map_err(|err| SessionError::Navigation(format!("data page marker missing: {err}")))?;

        self.transition(SessionState::OnDataPage);
        Ok(())
    }

    async fn set_date(&mut self, date: &str) -> Result<(), SessionError> {
        self.require(SessionState::OnDataPage)
            .map_err(SessionError::Input)?;

        let script = r#"
            var input = document.getElementById(arguments[0]);
            if (!input) { return false; }
            input.value = arguments[1];
            input.removeAttribute('readonly');
            return true;
        "#;
        let found = self
            .client
            .execute(script, vec![json!(self.config.date_input_id), json!(date)])
            .await
            .map_err(|err| SessionError::Input(err.to_string()))?;

        if found.as_bool() != Some(true) {
            return Err(SessionError::Input(format!(
                "date control '{}' not found",
                self.config.date_input_id
            )));
        }

        self.transition(SessionState::OnDataPage);
        debug!(date, "date set");
        Ok(())
    }

    async fn await_overlay_clear(&mut self) {
        let deadline = Instant::now() + self.config.timeouts.overlay();
        loop {
            let visible = match self.overlay_visible().await {
                Ok(visible) => Some(visible),
                Err(err) => {
                    debug!(error = %err, "overlay check failed");
                    None
                }
            };
            match overlay_poll(visible, Instant::now() >= deadline) {
                OverlayPoll::Cleared => return,
                OverlayPoll::GiveUp => {
                    warn!(
                        overlay = self.config.overlay_id.as_str(),
                        "overlay still visible after timeout, continuing"
                    );
                    return;
                }
                OverlayPoll::Wait => tokio::time::sleep(self.config.timeouts.poll()).await,
            }
        }
    }

    async fn select_interval_mode(&mut self, mode: Granularity) -> ModeSelection {
        if let Err(reason) = self.require(SessionState::OnDataPage) {
            return ModeSelection::Failed(reason);
        }

        let selector = self.config.mode_selector(mode);
        let radio = match self
            .wait_for(Locator::Css(&selector), self.config.timeouts.mode())
            .await
        {
            Ok(radio) => radio,
            Err(err) => return ModeSelection::Failed(format!("radio control not available: {err}")),
        };

        let selection = match radio.is_selected().await {
            Ok(true) => ModeSelection::from_radio(true, true),
            Ok(false) => match radio.click().await {
                Err(err) => ModeSelection::Failed(format!("click failed: {err}")),
                Ok(()) => match radio.is_selected().await {
                    Ok(after) => ModeSelection::from_radio(false, after),
                    Err(err) => ModeSelection::Failed(err.to_string()),
                },
            },
            Err(err) => ModeSelection::Failed(err.to_string()),
        };

        if selection.is_selected() {
            self.transition(SessionState::ModeSelected);
            debug!(%mode, ?selection, "interval mode selected");
        }
        selection
    }

    async fn trigger_lookup(&mut self) -> Result<(), SessionError> {
        let outcome = match self.require(SessionState::OnDataPage) {
            Ok(()) => {
                self.transition(SessionState::LookupPending);
                self.run_lookup().await
            }
            Err(reason) => Err(SessionError::Lookup(reason)),
        };

        match outcome {
            Ok(()) => {
                self.transition(SessionState::Ready);
                Ok(())
            }
            Err(err) => {
                let snapshot = self.snapshot("lookup_error").await;
                error!(
                    error = %err,
                    snapshot = ?snapshot,
                    "lookup failed"
                );
                if self.state == SessionState::LookupPending {
                    self.transition(SessionState::OnDataPage);
                }
                Err(err)
            }
        }
    }

    async fn page_source(&mut self) -> Result<String, SessionError> {
        Ok(self.client.source().await?)
    }

    fn results_table_id(&self) -> &str {
        &self.config.results_table_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_are_ordered_along_the_workflow() {
        assert!(SessionState::Unauthenticated < SessionState::Authenticated);
        assert!(SessionState::OnDataPage < SessionState::ModeSelected);
        assert!(SessionState::Ready > SessionState::LookupPending);
    }

    #[test]
    fn only_failed_selection_is_unselected() {
        assert!(ModeSelection::AlreadySelected.is_selected());
        assert!(ModeSelection::Changed.is_selected());
        assert!(!ModeSelection::Failed("timeout".to_string()).is_selected());
    }

    #[test]
    fn cookies_are_cleared_after_any_earlier_attempt() {
        let mut logins = LoginHistory::default();
        assert!(!logins.start());
        // A failed attempt still counts; the next account must start clean.
        assert!(logins.start());
        assert!(logins.start());
    }

    #[test]
    fn radio_state_is_read_again_after_the_click() {
        assert_eq!(ModeSelection::from_radio(true, false), ModeSelection::AlreadySelected);
        assert_eq!(ModeSelection::from_radio(false, true), ModeSelection::Changed);
        assert!(matches!(
            ModeSelection::from_radio(false, false),
            ModeSelection::Failed(reason) if reason.contains("still not selected")
        ));
    }

    #[test]
    fn hidden_decoy_loses_to_the_visible_control() {
        let per_locator = vec![vec![(false, true), (true, false), (true, true)]];
        assert_eq!(pick_lookup_control(&per_locator), Some((0, 2)));
    }

    #[test]
    fn later_locator_is_used_when_earlier_ones_have_no_live_match() {
        let per_locator = vec![
            Vec::new(),
            vec![(false, false)],
            vec![(false, true), (true, true), (true, true)],
        ];
        assert_eq!(pick_lookup_control(&per_locator), Some((2, 1)));

        let earlier_wins = vec![vec![(true, true)], vec![(true, true)]];
        assert_eq!(pick_lookup_control(&earlier_wins), Some((0, 0)));
    }

    #[test]
    fn no_live_candidate_means_no_control() {
        assert_eq!(pick_lookup_control(&[vec![(false, true)], vec![(true, false)]]), None);
        assert_eq!(first_live(&[]), None);
    }

    #[test]
    fn overlay_wait_gives_up_and_moves_on_after_the_deadline() {
        assert_eq!(overlay_poll(Some(false), false), OverlayPoll::Cleared);
        assert_eq!(overlay_poll(Some(false), true), OverlayPoll::Cleared);
        assert_eq!(overlay_poll(Some(true), false), OverlayPoll::Wait);
        assert_eq!(overlay_poll(None, false), OverlayPoll::Wait);
        assert_eq!(overlay_poll(Some(true), true), OverlayPoll::GiveUp);
        assert_eq!(overlay_poll(None, true), OverlayPoll::GiveUp);
    }
}

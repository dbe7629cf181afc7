use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use crate::models::Granularity;

/// Element locators, URLs and wait bounds of the usage portal.
///
/// Defaults describe the production Power Planner site. A JSON file with any
/// subset of these keys overrides them, so a relocated or versioned site can
/// be targeted without touching the session code.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub login_url: String,
    pub data_page_url: String,
    pub id_selector: String,
    pub pw_selector: String,
    pub submit_selector: String,
    pub post_login_marker_id: String,
    pub data_page_marker_id: String,
    pub date_input_id: String,
    pub overlay_id: String,
    pub mode_radio_name: String,
    pub results_table_id: String,
    pub popup_dismiss_xpath: String,
    /// Tried in order; the first visible and enabled match is clicked.
    pub lookup_xpaths: Vec<String>,
    pub snapshot_dir: PathBuf,
    pub timeouts: Timeouts,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            login_url: "https://pp.kepco.co.kr/".to_string(),
            data_page_url: "https://pp.kepco.co.kr/rs/rs0101N.do?menu_id=O010201".to_string(),
            id_selector: "#RSA_USER_ID".to_string(),
            pw_selector: "#RSA_USER_PWD".to_string(),
            submit_selector: ".intro_btn".to_string(),
            post_login_marker_id: "SELECT_DT".to_string(),
            data_page_marker_id: "SELECT_DT".to_string(),
            date_input_id: "SELECT_DT".to_string(),
            overlay_id: "backgroundLayer".to_string(),
            mode_radio_name: "T_MODE".to_string(),
            results_table_id: "tableListChart".to_string(),
            popup_dismiss_xpath: "//button[text()='확인']".to_string(),
            lookup_xpaths: vec![
                "//img[@alt='조회' and not(contains(@style,'display:none') or contains(@style,'visibility:hidden'))]".to_string(),
                "//img[contains(@src, 'btn_blue_lookup.png') and not(contains(@style,'display:none') or contains(@style,'visibility:hidden'))]".to_string(),
                "//img[@alt='조회']".to_string(),
            ],
            snapshot_dir: PathBuf::from("out/snapshots"),
            timeouts: Timeouts::default(),
        }
    }
}

impl SiteConfig {
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read site config {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("invalid site config {}", path.display()))
    }

    /// CSS selector of the radio control for `granularity`.
    pub fn mode_selector(&self, granularity: Granularity) -> String {
        format!(
            "input[name='{}'][value='{}']",
            self.mode_radio_name,
            granularity.radio_value()
        )
    }
}

/// Wait bounds, in milliseconds on the wire.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub login_ms: u64,
    pub popup_ms: u64,
    pub navigation_ms: u64,
    pub overlay_ms: u64,
    pub mode_ms: u64,
    pub lookup_ms: u64,
    pub poll_ms: u64,
    /// Pause after the lookup click before the table wait starts.
    pub scroll_settle_ms: u64,
    /// Pause after the results table appears so late cells can render.
    pub render_settle_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            login_ms: 10_000,
            popup_ms: 3_000,
            navigation_ms: 10_000,
            overlay_ms: 30_000,
            mode_ms: 10_000,
            lookup_ms: 15_000,
            poll_ms: 250,
            scroll_settle_ms: 1_000,
            render_settle_ms: 2_000,
        }
    }
}

impl Timeouts {
    pub fn login(&self) -> Duration {
        Duration::from_millis(self.login_ms)
    }

    pub fn popup(&self) -> Duration {
        Duration::from_millis(self.popup_ms)
    }

    pub fn navigation(&self) -> Duration {
        Duration::from_millis(self.navigation_ms)
    }

    pub fn overlay(&self) -> Duration {
        Duration::from_millis(self.overlay_ms)
    }

    pub fn mode(&self) -> Duration {
        Duration::from_millis(self.mode_ms)
    }

    pub fn lookup(&self) -> Duration {
        Duration::from_millis(self.lookup_ms)
    }

    pub fn poll(&self) -> Duration {
        Duration::from_millis(self.poll_ms.max(1))
    }

    pub fn scroll_settle(&self) -> Duration {
        Duration::from_millis(self.scroll_settle_ms)
    }

    pub fn render_settle(&self) -> Duration {
        Duration::from_millis(self.render_settle_ms)
    }
}

/// Which lookups a campaign performs for every date.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub fine: bool,
    pub coarse: bool,
    /// Wait between selecting a mode and triggering the lookup.
    pub settle_after_mode: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            fine: true,
            coarse: true,
            settle_after_mode: Duration::from_secs(2),
        }
    }
}

impl RunOptions {
    /// Enabled granularities in the order they are looked up.
    pub fn granularities(&self) -> Vec<Granularity> {
        Granularity::ALL
            .into_iter()
            .filter(|granularity| match granularity {
                Granularity::Fine => self.fine,
                Granularity::Coarse => self.coarse,
            })
            .collect()
    }
}

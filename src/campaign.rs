use tracing::{error, info, warn};

use crate::config::RunOptions;
use crate::dates::DateRange;
use crate::error::{SessionError, StepError};
use crate::extract::extract_table;
use crate::models::{AccountRecord, FrameMeta, Granularity, IntervalFrame};
use crate::session::{ModeSelection, Portal};
use crate::transform::process_table;

/// Frames gathered during a run, in encounter order.
#[derive(Debug, Default)]
pub struct FrameStore {
    frames: Vec<IntervalFrame>,
}

impl FrameStore {
    pub fn push(&mut self, frame: IntervalFrame) {
        self.frames.push(frame);
    }

    pub fn all(&self) -> &[IntervalFrame] {
        &self.frames
    }

    pub fn count(&self, granularity: Granularity) -> usize {
        self.frames
            .iter()
            .filter(|frame| frame.granularity == granularity)
            .count()
    }

    pub fn rows(&self, granularity: Granularity) -> usize {
        self.frames
            .iter()
            .filter(|frame| frame.granularity == granularity)
            .map(|frame| frame.table.len())
            .sum()
    }
}

#[derive(Debug, Clone)]
pub struct DateReport {
    pub date: String,
    pub rows: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub enum AccountStatus {
    Completed,
    Skipped(String),
}

#[derive(Debug, Clone)]
pub struct AccountReport {
    pub site_unit: String,
    pub factory: String,
    pub status: AccountStatus,
    pub dates: Vec<DateReport>,
}

impl AccountReport {
    pub fn failed_dates(&self) -> usize {
        self.dates.iter().filter(|date| date.error.is_some()).count()
    }
}

#[derive(Debug, Default)]
pub struct CampaignResult {
    pub frames: FrameStore,
    pub accounts: Vec<AccountReport>,
}

impl CampaignResult {
    pub fn skipped_accounts(&self) -> usize {
        self.accounts
            .iter()
            .filter(|account| matches!(account.status, AccountStatus::Skipped(_)))
            .count()
    }

    pub fn failed_dates(&self) -> usize {
        self.accounts.iter().map(AccountReport::failed_dates).sum()
    }
}

/// Crawl every account over its date range.
///
/// Failures never escape: a bad date is skipped and the loop moves on to
/// the next date, a failed login or navigation skips the account.
pub async fn run<P: Portal>(
    portal: &mut P,
    accounts: &[AccountRecord],
    options: &RunOptions,
) -> CampaignResult {
    let mut result = CampaignResult::default();
    let total = accounts.len();

    for (index, account) in accounts.iter().enumerate() {
        let site_unit = account.site_unit.as_str();
        let factory = account.factory_label();
        info!(
            account = index + 1,
            total, site_unit, factory, "starting account"
        );

        let mut report = AccountReport {
            site_unit: account.site_unit.clone(),
            factory: factory.to_string(),
            status: AccountStatus::Completed,
            dates: Vec::new(),
        };

        let range = match DateRange::parse(&account.start_date, &account.end_date) {
            Ok(range) => range,
            Err(err) => {
                warn!(site_unit, factory, error = %err, "skipping account with invalid date range");
                report.status = AccountStatus::Skipped(err.to_string());
                result.accounts.push(report);
                continue;
            }
        };

        match run_account(portal, account, &range, options, &mut result.frames).await {
            Ok(dates) => report.dates = dates,
            Err(err) => {
                error!(site_unit, factory, error = %err, "skipping account");
                report.status = AccountStatus::Skipped(err.to_string());
            }
        }

        info!(
            site_unit,
            factory,
            dates = report.dates.len(),
            failed = report.failed_dates(),
            "finished account"
        );
        result.accounts.push(report);
    }

    result
}

async fn run_account<P: Portal>(
    portal: &mut P,
    account: &AccountRecord,
    range: &DateRange,
    options: &RunOptions,
    frames: &mut FrameStore,
) -> Result<Vec<DateReport>, SessionError> {
    portal
        .authenticate(&account.login_id, &account.login_pw)
        .await?;
    portal.dismiss_popup().await;
    portal.navigate_to_data_page().await?;
    portal.dismiss_popup().await;

    let mut reports = Vec::with_capacity(range.len());
    for date in range {
        info!(date = date.as_str(), "processing date");
        let mut rows = 0;
        let outcome = run_date(portal, account, &date, options, frames, &mut rows).await;

        let error = match outcome {
            Ok(()) => {
                info!(date = date.as_str(), rows, "date done");
                None
            }
            Err(err) => {
                error!(date = date.as_str(), error = %err, "skipping date");
                Some(err.to_string())
            }
        };
        reports.push(DateReport { date, rows, error });
    }

    Ok(reports)
}

/// One date: set it, then look up and extract each enabled granularity.
/// Frames of a granularity that finished before a failure are kept.
async fn run_date<P: Portal>(
    portal: &mut P,
    account: &AccountRecord,
    date: &str,
    options: &RunOptions,
    frames: &mut FrameStore,
    rows: &mut usize,
) -> Result<(), StepError> {
    portal.set_date(date).await?;
    portal.await_overlay_clear().await;

    let meta = FrameMeta {
        project: account.business_unit.clone(),
        site_unit: account.site_unit.clone(),
        factory: account.factory.clone(),
        date: date.to_string(),
    };

    for granularity in options.granularities() {
        if let ModeSelection::Failed(reason) = portal.select_interval_mode(granularity).await {
            return Err(StepError::ModeNotSelected {
                mode: granularity.to_string(),
                reason,
            });
        }
        if !options.settle_after_mode.is_zero() {
            tokio::time::sleep(options.settle_after_mode).await;
        }

        portal.trigger_lookup().await?;
        portal.await_overlay_clear().await;

        let html = portal.page_source().await?;
        let table = extract_table(&html, portal.results_table_id())?;
        let frame = process_table(table, granularity.as_str(), &meta)?;

        *rows += frame.table.len();
        frames.push(frame);
    }

    Ok(())
}

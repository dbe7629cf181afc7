use std::fmt::Write;

use crate::campaign::{AccountStatus, CampaignResult};
use crate::models::Granularity;

pub fn build_report(run_stamp: &str, result: &CampaignResult, granularities: &[Granularity]) -> String {
    let mut output = String::new();

    let completed = result.accounts.len() - result.skipped_accounts();
    let dates_total: usize = result.accounts.iter().map(|a| a.dates.len()).sum();
    let dates_failed = result.failed_dates();

    let _ = writeln!(output, "# Usage Crawl Report");
    let _ = writeln!(output, "Run {run_stamp}");
    let _ = writeln!(output);
    let _ = writeln!(output, "## Totals");
    let _ = writeln!(
        output,
        "- Accounts: {} completed, {} skipped",
        completed,
        result.skipped_accounts()
    );
    let _ = writeln!(
        output,
        "- Dates: {} succeeded, {} failed",
        dates_total - dates_failed,
        dates_failed
    );
    for granularity in granularities {
        let _ = writeln!(
            output,
            "- {} rows: {} across {} lookups",
            granularity,
            result.frames.rows(*granularity),
            result.frames.count(*granularity)
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Accounts");

    if result.accounts.is_empty() {
        let _ = writeln!(output, "No accounts were loaded.");
    }

    for account in &result.accounts {
        let label = if account.factory.is_empty() {
            account.site_unit.clone()
        } else {
            format!("{} / {}", account.site_unit, account.factory)
        };

        match &account.status {
            AccountStatus::Skipped(reason) => {
                let _ = writeln!(output, "- {label}: skipped ({reason})");
            }
            AccountStatus::Completed => {
                let _ = writeln!(
                    output,
                    "- {label}: {} dates, {} failed",
                    account.dates.len(),
                    account.failed_dates()
                );
                for date in account.dates.iter().filter(|d| d.error.is_some()) {
                    let _ = writeln!(
                        output,
                        "  - {}: {}",
                        date.date,
                        date.error.as_deref().unwrap_or_default()
                    );
                }
            }
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::campaign::{AccountReport, DateReport};

    #[test]
    fn lists_skips_and_failed_dates() {
        let mut result = CampaignResult::default();
        result.accounts.push(AccountReport {
            site_unit: "Plant 1".to_string(),
            factory: String::new(),
            status: AccountStatus::Skipped("login failed: timeout".to_string()),
            dates: Vec::new(),
        });
        result.accounts.push(AccountReport {
            site_unit: "Plant 2".to_string(),
            factory: "East".to_string(),
            status: AccountStatus::Completed,
            dates: vec![
                DateReport {
                    date: "2024-03-01".to_string(),
                    rows: 48,
                    error: None,
                },
                DateReport {
                    date: "2024-03-02".to_string(),
                    rows: 0,
                    error: Some("lookup failed: no visible and enabled lookup control".to_string()),
                },
            ],
        });

        let report = build_report("20240303_000000", &result, &[Granularity::Coarse]);

        assert!(report.contains("- Accounts: 1 completed, 1 skipped"));
        assert!(report.contains("- Dates: 1 succeeded, 1 failed"));
        assert!(report.contains("- Plant 1: skipped (login failed: timeout)"));
        assert!(report.contains("- Plant 2 / East: 2 dates, 1 failed"));
        assert!(report.contains("  - 2024-03-02: lookup failed"));
        assert!(report.contains("- 30m rows: 0 across 0 lookups"));
    }
}

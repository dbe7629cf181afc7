use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use crate::models::AccountRecord;

/// One row of the account sheet, or one entry of the JSON secret payload.
#[derive(Debug, Deserialize)]
struct AccountRow {
    #[serde(alias = "Project", default)]
    business_unit: String,
    #[serde(alias = "Site_Unit", default)]
    site_unit: String,
    #[serde(alias = "Factory", default)]
    factory: Option<String>,
    #[serde(rename = "ID", alias = "login_id")]
    login_id: String,
    #[serde(rename = "PW", alias = "login_pw")]
    login_pw: String,
    #[serde(default)]
    start_date: String,
    #[serde(default)]
    end_date: String,
}

impl From<AccountRow> for AccountRecord {
    fn from(row: AccountRow) -> Self {
        AccountRecord {
            business_unit: row.business_unit.trim().to_string(),
            site_unit: row.site_unit.trim().to_string(),
            factory: row
                .factory
                .map(|factory| factory.trim().to_string())
                .filter(|factory| !factory.is_empty()),
            login_id: row.login_id.trim().to_string(),
            login_pw: row.login_pw,
            start_date: row.start_date.trim().to_string(),
            end_date: row.end_date.trim().to_string(),
        }
    }
}

/// Load account records from a `.json` payload or a CSV export of the sheet.
pub fn load(path: &Path) -> anyhow::Result<Vec<AccountRecord>> {
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    if is_json {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        return parse_json(&raw).with_context(|| format!("invalid account file {}", path.display()));
    }

    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    parse_csv(file).with_context(|| format!("invalid account file {}", path.display()))
}

pub fn parse_json(raw: &str) -> anyhow::Result<Vec<AccountRecord>> {
    let rows: Vec<AccountRow> = serde_json::from_str(raw)?;
    Ok(rows.into_iter().map(AccountRecord::from).collect())
}

pub fn parse_csv<R: std::io::Read>(reader: R) -> anyhow::Result<Vec<AccountRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(reader);
    let headers = reader.headers()?.clone();
    let mut accounts = Vec::new();

    // Sheet exports drop trailing blank cells; pad them back to the header width.
    for (index, result) in reader.records().enumerate() {
        let mut record = result.with_context(|| format!("account row {} is unreadable", index + 1))?;
        record.truncate(headers.len());
        while record.len() < headers.len() {
            record.push_field("");
        }
        let row: AccountRow = record
            .deserialize(Some(&headers))
            .with_context(|| format!("account row {} is malformed", index + 1))?;
        accounts.push(AccountRecord::from(row));
    }

    Ok(accounts)
}

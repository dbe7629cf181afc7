use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::error::ValidationError;

/// Columns of the usage table as rendered by the portal, in display order.
pub const RAW_COLUMNS: [&str; 8] = [
    "Time",
    "Usage_kWh",
    "MaxDemand_kW",
    "ReactivePower_Lead",
    "ReactivePower_Lag",
    "CO2_t",
    "PowerFactor_Lead",
    "PowerFactor_Lag",
];

pub const PROJECT_COLUMN: &str = "Project";
pub const SITE_UNIT_COLUMN: &str = "Site_Unit";
pub const FACTORY_COLUMN: &str = "Factory";
pub const DATE_COLUMN: &str = "Date";
pub const TIME_COLUMN: &str = "Time";
pub const DATETIME_COLUMN: &str = "DateTime";

/// The raw measurement columns, i.e. everything except `Time`.
pub fn measurement_columns() -> &'static [&'static str] {
    &RAW_COLUMNS[1..]
}

#[derive(Clone, PartialEq, Eq)]
pub struct AccountRecord {
    pub business_unit: String,
    pub site_unit: String,
    pub factory: Option<String>,
    pub login_id: String,
    pub login_pw: String,
    pub start_date: String,
    pub end_date: String,
}

impl AccountRecord {
    pub fn factory_label(&self) -> &str {
        self.factory.as_deref().unwrap_or("")
    }
}

// Hand-written so credentials never end up in logs.
impl fmt::Debug for AccountRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountRecord")
            .field("business_unit", &self.business_unit)
            .field("site_unit", &self.site_unit)
            .field("factory", &self.factory)
            .field("login_id", &self.login_id)
            .field("login_pw", &"<redacted>")
            .field("start_date", &self.start_date)
            .field("end_date", &self.end_date)
            .finish()
    }
}

/// Measurement interval selected on the data page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Granularity {
    /// 15-minute intervals.
    Fine,
    /// 30-minute intervals.
    Coarse,
}

impl Granularity {
    pub const ALL: [Granularity; 2] = [Granularity::Fine, Granularity::Coarse];

    pub fn as_str(self) -> &'static str {
        match self {
            Granularity::Fine => "15m",
            Granularity::Coarse => "30m",
        }
    }

    /// Value attribute of the matching mode radio control.
    pub fn radio_value(self) -> &'static str {
        match self {
            Granularity::Fine => "15",
            Granularity::Coarse => "30",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fine" | "15m" | "15" => Ok(Granularity::Fine),
            "coarse" | "30m" | "30" => Ok(Granularity::Coarse),
            _ => Err(ValidationError::UnknownMode(value.to_string())),
        }
    }
}

/// A named-column table of text cells.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    pub fn value(&self, row: usize, column: &str) -> Option<&str> {
        let index = self.column_index(column)?;
        self.rows.get(row)?.get(index).map(String::as_str)
    }
}

/// Metadata attached to every row of a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameMeta {
    pub project: String,
    pub site_unit: String,
    pub factory: Option<String>,
    pub date: String,
}

/// One lookup's worth of rows, renamed for its granularity and tagged.
#[derive(Debug, Clone, PartialEq)]
pub struct IntervalFrame {
    pub granularity: Granularity,
    pub table: Table,
}

/// All frames of one granularity, merged in encounter order.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedDataset {
    pub granularity: Granularity,
    pub table: Table,
    /// Parsed `DateTime` column, one entry per row.
    pub timestamps: Vec<NaiveDateTime>,
}

impl MergedDataset {
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

/// Long-format row for warehouse ingestion.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementRecord {
    pub measure_time: NaiveDateTime,
    pub measure_point: String,
    pub measure_value: Option<f64>,
    pub measure_unit: String,
    pub country: String,
    pub source_name: String,
    pub business_unit: String,
    pub site_unit: String,
    pub factory: String,
    pub insertion_time: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn granularity_parses_both_spellings() {
        assert_eq!("coarse".parse::<Granularity>().unwrap(), Granularity::Coarse);
        assert_eq!("15m".parse::<Granularity>().unwrap(), Granularity::Fine);
        assert!(matches!(
            "hourly".parse::<Granularity>(),
            Err(ValidationError::UnknownMode(_))
        ));
    }

    #[test]
    fn account_debug_hides_password() {
        let account = AccountRecord {
            business_unit: "BU".to_string(),
            site_unit: "Plant".to_string(),
            factory: None,
            login_id: "user".to_string(),
            login_pw: "hunter2".to_string(),
            start_date: "2024-01-01".to_string(),
            end_date: "2024-01-02".to_string(),
        };
        let rendered = format!("{account:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }
}

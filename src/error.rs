use thiserror::Error;

#[derive(Debug, Error)]
pub enum DateRangeError {
    #[error("date '{value}' is not in YYYY-MM-DD format: {source}")]
    Format {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
    #[error("start date {start} is after end date {end}")]
    Order { start: String, end: String },
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("table '{0}' is not present in the document")]
    NotFound(String),
    #[error("invalid selector '{0}'")]
    Selector(String),
    #[error("row {row} has {found} cells after normalization, expected {expected}")]
    Schema {
        row: usize,
        expected: usize,
        found: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("extracted table is empty")]
    EmptyTable,
    #[error("expected columns are missing: {missing:?} (present: {present:?})")]
    MissingColumns {
        missing: Vec<String>,
        present: Vec<String>,
    },
    #[error("unsupported interval mode '{0}'")]
    UnknownMode(String),
}

/// Failures of a browser session transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("login failed: {0}")]
    Auth(String),
    #[error("navigation failed: {0}")]
    Navigation(String),
    #[error("date input failed: {0}")]
    Input(String),
    #[error("lookup failed: {0}")]
    Lookup(String),
    #[error("webdriver error: {0}")]
    Driver(String),
}

impl From<fantoccini::error::CmdError> for SessionError {
    fn from(error: fantoccini::error::CmdError) -> Self {
        SessionError::Driver(error.to_string())
    }
}

#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("cannot build DateTime from Date '{date}' and Time '{time}'")]
    TimeFormat { date: String, time: String },
    #[error("frame is missing column '{0}'")]
    MissingColumn(String),
}

/// Anything that abandons a single date of a campaign.
#[derive(Debug, Error)]
pub enum StepError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("{mode} mode could not be selected: {reason}")]
    ModeNotSelected { mode: String, reason: String },
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

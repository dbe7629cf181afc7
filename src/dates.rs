use chrono::NaiveDate;

use crate::error::DateRangeError;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Inclusive run of calendar days. Iterating it again starts over from `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn parse(start: &str, end: &str) -> Result<Self, DateRangeError> {
        Self::new(parse_date(start)?, parse_date(end)?).map_err(|_| DateRangeError::Order {
            start: start.to_string(),
            end: end.to_string(),
        })
    }

    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, DateRangeError> {
        if start > end {
            return Err(DateRangeError::Order {
                start: start.format(DATE_FORMAT).to_string(),
                end: end.format(DATE_FORMAT).to_string(),
            });
        }
        Ok(Self { start, end })
    }

    pub fn len(&self) -> usize {
        (self.end - self.start).num_days() as usize + 1
    }

    pub fn iter(&self) -> DateRangeIter {
        DateRangeIter {
            next: Some(self.start),
            end: self.end,
        }
    }
}

impl IntoIterator for DateRange {
    type Item = String;
    type IntoIter = DateRangeIter;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl IntoIterator for &DateRange {
    type Item = String;
    type IntoIter = DateRangeIter;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[derive(Debug, Clone)]
pub struct DateRangeIter {
    next: Option<NaiveDate>,
    end: NaiveDate,
}

impl Iterator for DateRangeIter {
    type Item = String;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.filter(|day| *day <= self.end)?;
        self.next = current.succ_opt();
        Some(current.format(DATE_FORMAT).to_string())
    }
}

pub fn parse_date(value: &str) -> Result<NaiveDate, DateRangeError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|source| {
        DateRangeError::Format {
            value: value.to_string(),
            source,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spans_month_boundary_inclusively() {
        let range = DateRange::parse("2024-01-30", "2024-02-01").unwrap();
        let days: Vec<String> = range.iter().collect();
        assert_eq!(days, vec!["2024-01-30", "2024-01-31", "2024-02-01"]);
        assert_eq!(range.len(), 3);
    }

    #[test]
    fn single_day_range_yields_one_date() {
        let range = DateRange::parse("2024-02-29", "2024-02-29").unwrap();
        assert_eq!(range.iter().collect::<Vec<_>>(), vec!["2024-02-29"]);
    }

    #[test]
    fn range_can_be_iterated_twice() {
        let range = DateRange::parse("2023-12-30", "2024-01-02").unwrap();
        let first: Vec<String> = range.iter().collect();
        let second: Vec<String> = range.into_iter().collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 4);
    }

    #[test]
    fn reversed_range_is_an_order_error() {
        let err = DateRange::parse("2024-03-02", "2024-03-01").unwrap_err();
        assert!(matches!(err, DateRangeError::Order { .. }));
    }

    #[test]
    fn malformed_date_is_a_format_error() {
        let err = DateRange::parse("2024/03/01", "2024-03-02").unwrap_err();
        assert!(matches!(err, DateRangeError::Format { .. }));

        let err = DateRange::parse("2024-03-01", "").unwrap_err();
        assert!(matches!(err, DateRangeError::Format { .. }));
    }
}

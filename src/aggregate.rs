use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use tracing::{info, warn};

use crate::dates::DATE_FORMAT;
use crate::error::AggregateError;
use crate::models::{
    Granularity, IntervalFrame, MeasurementRecord, MergedDataset, Table, DATETIME_COLUMN,
    DATE_COLUMN, FACTORY_COLUMN, PROJECT_COLUMN, SITE_UNIT_COLUMN, TIME_COLUMN,
};
use crate::transform::{base_label, display_labels};

pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const COUNTRY: &str = "South Korea";
pub const SOURCE_NAME: &str = "kepco_power_planner_rpa";

/// Base measurement label and its unit.
const UNITS: [(&str, &str); 7] = [
    ("Electricity consumption", "kWh"),
    ("Peak power", "kW"),
    ("Leading reactive power", "kVarh"),
    ("Lagging reactive power", "kVarh"),
    ("CO2", "tCO2"),
    ("Leading power factor", "%"),
    ("Lagging power factor", "%"),
];

/// Fixed output column order for a merged dataset.
pub fn column_order(granularity: Granularity) -> Vec<String> {
    let mut columns = vec![
        DATE_COLUMN.to_string(),
        TIME_COLUMN.to_string(),
        DATETIME_COLUMN.to_string(),
    ];
    columns.extend(display_labels(granularity));
    columns.extend(
        [PROJECT_COLUMN, SITE_UNIT_COLUMN, FACTORY_COLUMN]
            .iter()
            .map(|column| column.to_string()),
    );
    columns
}

/// Combine a day's `Date` and `Time` cells. `24:00` is midnight of the next day.
pub fn fix_datetime(date: &str, time: &str) -> Result<NaiveDateTime, AggregateError> {
    let invalid = || AggregateError::TimeFormat {
        date: date.to_string(),
        time: time.to_string(),
    };

    let day = NaiveDate::parse_from_str(date.trim(), DATE_FORMAT).map_err(|_| invalid())?;
    let time_text = time.trim();

    if time_text == "24:00" || time_text == "24:00:00" {
        return day
            .succ_opt()
            .map(|next| next.and_time(NaiveTime::MIN))
            .ok_or_else(invalid);
    }

    let clock = NaiveTime::parse_from_str(time_text, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(time_text, "%H:%M:%S"))
        .map_err(|_| invalid())?;
    Ok(day.and_time(clock))
}

/// Concatenate every frame of `granularity` in encounter order and derive
/// the `DateTime` column.
pub fn merge_frames(
    frames: &[IntervalFrame],
    granularity: Granularity,
) -> Result<MergedDataset, AggregateError> {
    let columns = column_order(granularity);
    let mut table = Table::new(columns.iter().cloned());
    let mut timestamps = Vec::new();

    for frame in frames.iter().filter(|frame| frame.granularity == granularity) {
        let indices = columns
            .iter()
            .filter(|column| column.as_str() != DATETIME_COLUMN)
            .map(|column| {
                frame
                    .table
                    .column_index(column)
                    .ok_or_else(|| AggregateError::MissingColumn(column.clone()))
            })
            .collect::<Result<Vec<usize>, _>>()?;
        let date_index = indices[0];
        let time_index = indices[1];

        for row in &frame.table.rows {
            let cell = |index: usize| row.get(index).cloned().unwrap_or_default();
            let stamp = fix_datetime(&cell(date_index), &cell(time_index))?;

            let mut merged: Vec<String> = Vec::with_capacity(columns.len());
            merged.push(cell(date_index));
            merged.push(cell(time_index));
            merged.push(stamp.format(DATETIME_FORMAT).to_string());
            merged.extend(indices[2..].iter().map(|index| cell(*index)));

            table.rows.push(merged);
            timestamps.push(stamp);
        }
    }

    info!(%granularity, rows = table.len(), "merged interval frames");
    Ok(MergedDataset {
        granularity,
        table,
        timestamps,
    })
}

/// Melt a merged dataset into one record per measurement point, grouped by
/// measurement then row.
pub fn to_long_format(
    dataset: &MergedDataset,
    insertion_time: DateTime<Utc>,
) -> Vec<MeasurementRecord> {
    let table = &dataset.table;
    let (Some(project), Some(site_unit), Some(factory)) = (
        table.column_index(PROJECT_COLUMN),
        table.column_index(SITE_UNIT_COLUMN),
        table.column_index(FACTORY_COLUMN),
    ) else {
        warn!("merged dataset lacks metadata columns, nothing to melt");
        return Vec::new();
    };

    let mut records = Vec::with_capacity(table.len() * UNITS.len());

    for label in display_labels(dataset.granularity) {
        let Some(value_index) = table.column_index(&label) else {
            continue;
        };
        let point = base_label(&label);
        let unit = UNITS
            .iter()
            .find(|(name, _)| *name == point)
            .map(|(_, unit)| *unit)
            .unwrap_or("");

        for (row, measure_time) in table.rows.iter().zip(dataset.timestamps.iter()) {
            let text = |index: usize| row.get(index).cloned().unwrap_or_default();
            records.push(MeasurementRecord {
                measure_time: *measure_time,
                measure_point: point.to_string(),
                measure_value: text(value_index).trim().parse::<f64>().ok(),
                measure_unit: unit.to_string(),
                country: COUNTRY.to_string(),
                source_name: SOURCE_NAME.to_string(),
                business_unit: text(project),
                site_unit: text(site_unit),
                factory: text(factory),
                insertion_time,
            });
        }
    }

    if records.is_empty() {
        warn!(granularity = %dataset.granularity, "long-format transform produced no records");
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FrameMeta, RAW_COLUMNS};
    use crate::transform::process_table;

    fn frame(mode: &str, date: &str, times: &[&str]) -> IntervalFrame {
        let mut table = Table::new(RAW_COLUMNS);
        for time in times {
            table.rows.push(
                [time, &"10.5", &"20", &"0", &"1", &"-", &"100", &"99"]
                    .iter()
                    .map(|cell| cell.to_string())
                    .collect(),
            );
        }
        let meta = FrameMeta {
            project: "BU-1".to_string(),
            site_unit: "Site".to_string(),
            factory: Some("F2".to_string()),
            date: date.to_string(),
        };
        process_table(table, mode, &meta).unwrap()
    }

    fn at(date: &str, time: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(&format!("{date} {time}"), "%Y-%m-%d %H:%M").unwrap()
    }

    #[test]
    fn end_of_day_rolls_to_next_midnight() {
        assert_eq!(
            fix_datetime("2024-03-01", "24:00").unwrap(),
            at("2024-03-02", "00:00")
        );
        assert_eq!(
            fix_datetime("2024-12-31", "24:00").unwrap(),
            at("2025-01-01", "00:00")
        );
        assert_eq!(
            fix_datetime("2024-03-01", "13:30").unwrap(),
            at("2024-03-01", "13:30")
        );
    }

    #[test]
    fn unparsable_time_is_a_time_format_error() {
        assert!(matches!(
            fix_datetime("2024-03-01", "noon"),
            Err(AggregateError::TimeFormat { .. })
        ));
        assert!(matches!(
            fix_datetime("03/01/2024", "00:30"),
            Err(AggregateError::TimeFormat { .. })
        ));
    }

    #[test]
    fn merge_keeps_order_and_fixes_columns() {
        let frames = vec![
            frame("30m", "2024-03-01", &["00:30", "24:00"]),
            frame("15m", "2024-03-01", &["00:15"]),
            frame("30m", "2024-03-02", &["00:30"]),
        ];

        let merged = merge_frames(&frames, Granularity::Coarse).unwrap();
        assert_eq!(merged.table.columns, column_order(Granularity::Coarse));
        assert_eq!(merged.len(), 3);
        assert_eq!(merged.table.value(1, "DateTime"), Some("2024-03-02 00:00:00"));
        assert_eq!(merged.table.value(2, "Date"), Some("2024-03-02"));
        assert_eq!(merged.table.value(0, "Factory"), Some("F2"));
        assert_eq!(merged.timestamps[1], at("2024-03-02", "00:00"));

        let fine = merge_frames(&frames, Granularity::Fine).unwrap();
        assert_eq!(fine.len(), 1);
        assert_eq!(fine.table.columns[3], "Electricity consumption");
    }

    #[test]
    fn long_format_maps_points_and_units() {
        let frames = vec![frame("30m", "2024-03-01", &["00:30", "01:00"])];
        let merged = merge_frames(&frames, Granularity::Coarse).unwrap();
        let inserted = Utc::now();
        let records = to_long_format(&merged, inserted);

        assert_eq!(records.len(), 14);
        let first = &records[0];
        assert_eq!(first.measure_point, "Electricity consumption");
        assert_eq!(first.measure_unit, "kWh");
        assert_eq!(first.measure_value, Some(10.5));
        assert_eq!(first.business_unit, "BU-1");
        assert_eq!(first.country, COUNTRY);
        assert_eq!(first.insertion_time, inserted);
        assert_eq!(records[1].measure_time, at("2024-03-01", "01:00"));

        let co2 = records.iter().find(|r| r.measure_point == "CO2").unwrap();
        assert_eq!(co2.measure_unit, "tCO2");
        assert_eq!(co2.measure_value, None);
    }

    #[test]
    fn empty_dataset_melts_to_nothing() {
        let merged = merge_frames(&[], Granularity::Fine).unwrap();
        assert!(merged.is_empty());
        assert!(to_long_format(&merged, Utc::now()).is_empty());
    }
}

use std::path::{Path, PathBuf};

use anyhow::Context;
use csv::WriterBuilder;

use crate::models::{Granularity, MergedDataset};

pub fn dataset_file_name(granularity: Granularity, run_stamp: &str) -> String {
    format!("kepco_power_{granularity}_{run_stamp}.csv")
}

/// Write a merged dataset as a spreadsheet-ready CSV under `dir`.
pub fn write_dataset(dir: &Path, dataset: &MergedDataset, run_stamp: &str) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create output directory {}", dir.display()))?;
    let path = dir.join(dataset_file_name(dataset.granularity, run_stamp));

    let mut writer = WriterBuilder::new()
        .from_path(&path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    writer.write_record(&dataset.table.columns)?;
    for row in &dataset.table.rows {
        writer.write_record(row)?;
    }
    writer.flush()?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::merge_frames;
    use crate::models::{FrameMeta, Table, RAW_COLUMNS};
    use crate::transform::process_table;

    #[test]
    fn writes_header_and_rows_in_dataset_order() {
        let mut table = Table::new(RAW_COLUMNS);
        table.rows.push(
            ["00:15", "12", "40", "0", "1", "0.01", "100", "98"]
                .iter()
                .map(|cell| cell.to_string())
                .collect(),
        );
        let meta = FrameMeta {
            project: "Solar A".to_string(),
            site_unit: "Plant, North".to_string(),
            factory: None,
            date: "2024-03-01".to_string(),
        };
        let frame = process_table(table, "15m", &meta).unwrap();
        let dataset = merge_frames(&[frame], Granularity::Fine).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = write_dataset(dir.path(), &dataset, "20240302_010203").unwrap();

        assert!(path.ends_with("kepco_power_15m_20240302_010203.csv"));
        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(&headers[0], "Date");
        assert_eq!(&headers[2], "DateTime");
        assert_eq!(&headers[3], "Electricity consumption");

        let rows: Vec<csv::StringRecord> = reader.records().map(Result::unwrap).collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(&rows[0][2], "2024-03-01 00:15:00");
        assert_eq!(&rows[0][11], "Plant, North");
    }
}

use crate::error::ValidationError;
use crate::models::{
    measurement_columns, FrameMeta, Granularity, IntervalFrame, Table, DATE_COLUMN,
    FACTORY_COLUMN, PROJECT_COLUMN, SITE_UNIT_COLUMN,
};

/// Raw measurement column and its display label.
const LABELS: [(&str, &str); 7] = [
    ("Usage_kWh", "Electricity consumption"),
    ("MaxDemand_kW", "Peak power"),
    ("ReactivePower_Lead", "Leading reactive power"),
    ("ReactivePower_Lag", "Lagging reactive power"),
    ("CO2_t", "CO2"),
    ("PowerFactor_Lead", "Leading power factor"),
    ("PowerFactor_Lag", "Lagging power factor"),
];

const COARSE_SUFFIX: &str = "_30m";

/// Display labels of the seven measurements for `granularity`, in table order.
pub fn display_labels(granularity: Granularity) -> Vec<String> {
    LABELS
        .iter()
        .map(|(_, label)| display_label(granularity, label))
        .collect()
}

/// Label a measurement column carries in a frame of `granularity`.
pub fn display_label(granularity: Granularity, base: &str) -> String {
    match granularity {
        Granularity::Fine => base.to_string(),
        Granularity::Coarse => format!("{base}{COARSE_SUFFIX}"),
    }
}

/// Base label (no granularity suffix) for a display label.
pub fn base_label(label: &str) -> &str {
    label.strip_suffix(COARSE_SUFFIX).unwrap_or(label)
}

/// Validate an extracted table, tag it with `meta` and rename its
/// measurement columns for `mode`.
///
/// Nothing is mutated unless every check passes.
pub fn process_table(
    table: Table,
    mode: &str,
    meta: &FrameMeta,
) -> Result<IntervalFrame, ValidationError> {
    if table.is_empty() {
        return Err(ValidationError::EmptyTable);
    }

    let missing: Vec<String> = measurement_columns()
        .iter()
        .filter(|column| table.column_index(column).is_none())
        .map(|column| column.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(ValidationError::MissingColumns {
            missing,
            present: table.columns.clone(),
        });
    }

    let granularity: Granularity = mode.parse()?;

    let mut table = add_metadata(table, meta);
    for column in table.columns.iter_mut() {
        if let Some((_, label)) = LABELS.iter().find(|(raw, _)| *raw == column.as_str()) {
            *column = display_label(granularity, label);
        }
    }

    Ok(IntervalFrame { granularity, table })
}

fn add_metadata(mut table: Table, meta: &FrameMeta) -> Table {
    table.columns.extend(
        [PROJECT_COLUMN, SITE_UNIT_COLUMN, FACTORY_COLUMN, DATE_COLUMN]
            .iter()
            .map(|column| column.to_string()),
    );
    let factory = meta.factory.clone().unwrap_or_default();
    for row in table.rows.iter_mut() {
        row.push(meta.project.clone());
        row.push(meta.site_unit.clone());
        row.push(factory.clone());
        row.push(meta.date.clone());
    }
    table
}

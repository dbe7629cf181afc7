use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

use crate::error::ExtractError;
use crate::models::{Table, RAW_COLUMNS};

/// Parse the usage table with id `table_id` out of a rendered page.
///
/// The portal packs two time slots into one visual row, so 16-cell rows are
/// split into a left and a right row. Rows of any width other than 8 or 16
/// are dropped with a warning.
pub fn extract_table(html: &str, table_id: &str) -> Result<Table, ExtractError> {
    let document = Html::parse_document(html);
    let table_selector = selector(&format!("table[id=\"{table_id}\"]"))?;
    let row_selector = selector("tbody tr")?;
    let cell_selector = selector("td, th")?;

    let table = document
        .select(&table_selector)
        .next()
        .ok_or_else(|| ExtractError::NotFound(table_id.to_string()))?;

    let width = RAW_COLUMNS.len();
    let mut rows: Vec<Vec<String>> = Vec::new();

    for (index, tr) in table.select(&row_selector).enumerate() {
        let cells: Vec<String> = tr.select(&cell_selector).map(cell_text).collect();

        match cells.len() {
            n if n == width * 2 => {
                let (left, right) = cells.split_at(width);
                rows.push(left.to_vec());
                rows.push(right.to_vec());
            }
            n if n == width => rows.push(cells),
            n => warn!(row = index, cells = n, "dropping malformed table row"),
        }
    }

    if let Some((row, cells)) = rows.iter().enumerate().find(|(_, cells)| cells.len() != width) {
        return Err(ExtractError::Schema {
            row,
            expected: width,
            found: cells.len(),
        });
    }

    debug!(rows = rows.len(), table_id, "extracted usage table");

    let mut extracted = Table::new(RAW_COLUMNS);
    extracted.rows = rows;
    Ok(extracted)
}

fn selector(css: &str) -> Result<Selector, ExtractError> {
    Selector::parse(css).map_err(|_| ExtractError::Selector(css.to_string()))
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text().map(str::trim).collect::<String>().replace(',', "")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(body: &str) -> String {
        format!(
            "<html><body><div id=\"wrap\"><table id=\"tableListChart\"><thead>\
             <tr><th>시간</th></tr></thead><tbody>{body}</tbody></table></div></body></html>"
        )
    }

    fn row(cells: &[&str]) -> String {
        let tds: String = cells.iter().map(|c| format!("<td> {c} </td>")).collect();
        format!("<tr>{tds}</tr>")
    }

    const LEFT: [&str; 8] = ["00:15", "1,234.5", "98", "0", "12", "0.5", "100", "95.1"];
    const RIGHT: [&str; 8] = ["12:15", "2,001", "120", "1", "10", "0.9", "99", "97"];

    #[test]
    fn double_width_rows_split_left_then_right() {
        let cells: Vec<&str> = LEFT.iter().chain(RIGHT.iter()).copied().collect();
        let table = extract_table(&page(&row(&cells)), "tableListChart").unwrap();

        assert_eq!(table.columns, RAW_COLUMNS);
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[0][0], "00:15");
        assert_eq!(table.rows[1][0], "12:15");
        assert_eq!(table.value(1, "Usage_kWh"), Some("2001"));
    }

    #[test]
    fn thousands_separators_are_stripped() {
        let table = extract_table(&page(&row(&LEFT)), "tableListChart").unwrap();
        assert_eq!(table.value(0, "Usage_kWh"), Some("1234.5"));
        assert_eq!(table.value(0, "PowerFactor_Lag"), Some("95.1"));
    }

    #[test]
    fn malformed_rows_are_dropped_not_fatal() {
        let body = format!(
            "{}{}{}",
            row(&LEFT),
            row(&LEFT[..7]),
            row(&RIGHT)
        );
        let table = extract_table(&page(&body), "tableListChart").unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[0][0], "00:15");
        assert_eq!(table.rows[1][0], "12:15");
    }

    #[test]
    fn header_rows_outside_tbody_are_ignored() {
        let table = extract_table(&page(&row(&LEFT)), "tableListChart").unwrap();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn missing_table_is_not_found() {
        let err = extract_table(&page(&row(&LEFT)), "otherTable").unwrap_err();
        assert!(matches!(err, ExtractError::NotFound(id) if id == "otherTable"));
    }

    #[test]
    fn extraction_is_repeatable() {
        let html = page(&format!("{}{}", row(&LEFT), row(&RIGHT)));
        let first = extract_table(&html, "tableListChart").unwrap();
        let second = extract_table(&html, "tableListChart").unwrap();
        assert_eq!(first, second);
    }
}

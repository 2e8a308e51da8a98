//! Table formatting utilities for displaying structured CLI output.
//!
//! The comparison summary has dynamic columns (one per parameter axis
//! plus the score statistics), so tables are assembled through the
//! `tabled` builder rather than a derived row type.
use tabled::builder::Builder;
use tabled::settings::{object::Rows, Alignment, Modify, Style};

/// One ranked row of the comparison summary.
#[derive(Debug, Clone)]
pub struct ComparisonRow {
    /// Parameter values, aligned with the header columns
    pub values: Vec<String>,
    /// Mean score across repeats
    pub mean: f64,
    /// Population standard deviation across repeats
    pub std_dev: f64,
}

/// Create the ranked comparison table.
///
/// `param_columns` are the parameter axis names in file order; two
/// statistics columns (`score`, `sd`) are appended. Rows are rendered in
/// the order given, which the caller has already sorted by mean score
/// descending.
pub fn create_comparison_table(param_columns: &[String], rows: &[ComparisonRow]) -> String {
    let mut builder = Builder::default();
    let mut header: Vec<String> = param_columns.to_vec();
    header.push("score".to_string());
    header.push("sd".to_string());
    builder.push_record(header);

    for row in rows {
        let mut record = row.values.clone();
        record.push(format!("{:.4}", row.mean));
        record.push(format!("{:.4}", row.std_dev));
        builder.push_record(record);
    }

    let mut table = builder.build();
    table
        .with(Style::rounded())
        .with(Modify::new(Rows::new(1..)).with(Alignment::left()));
    table.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_contains_headers_and_formatted_stats() {
        let columns = vec!["a".to_string(), "b".to_string()];
        let rows = vec![
            ComparisonRow {
                values: vec!["3".to_string(), "x".to_string()],
                mean: 2.5,
                std_dev: 0.125,
            },
            ComparisonRow {
                values: vec!["1".to_string(), "y".to_string()],
                mean: 1.0,
                std_dev: 0.0,
            },
        ];
        let table = create_comparison_table(&columns, &rows);
        assert!(table.contains("score"));
        assert!(table.contains("sd"));
        assert!(table.contains("2.5000"));
        assert!(table.contains("0.1250"));
    }

    #[test]
    fn test_empty_rows_render_header_only() {
        let table = create_comparison_table(&["a".to_string()], &[]);
        assert!(table.contains('a'));
    }
}

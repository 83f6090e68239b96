use serde_json::Value;
use stockpipe_core::Envelope;

use crate::cli::OutputFormat;
use crate::error::CliError;

pub fn render(
    envelope: &Envelope<Value>,
    format: OutputFormat,
    pretty: bool,
) -> Result<(), CliError> {
    match format {
        OutputFormat::Json => {
            let payload = if pretty {
                serde_json::to_string_pretty(envelope)?
            } else {
                serde_json::to_string(envelope)?
            };
            println!("{payload}");
        }
        OutputFormat::Ndjson => {
            let payload = serde_json::to_string(envelope)?;
            println!("{payload}");
        }
        OutputFormat::Table => print!("{}", render_table(envelope)?),
    }

    Ok(())
}

fn render_table(envelope: &Envelope<Value>) -> Result<String, CliError> {
    let mut out = String::new();
    out.push_str(&format!("request_id  : {}\n", envelope.meta.request_id));
    out.push_str(&format!("schema      : {}\n", envelope.meta.schema_version));
    out.push_str(&format!("generated_at: {}\n", envelope.meta.generated_at));
    out.push_str(&format!("latency_ms  : {}\n", envelope.meta.latency_ms));

    if !envelope.meta.warnings.is_empty() {
        out.push_str("warnings:\n");
        for warning in &envelope.meta.warnings {
            out.push_str(&format!("  - {warning}\n"));
        }
    }

    if let Some(rows) = report_rows(&envelope.data) {
        out.push_str(&format_rows(rows));
    }

    out.push_str("data:\n");
    let pretty_data = serde_json::to_string_pretty(&envelope.data)?;
    for line in pretty_data.lines() {
        out.push_str(&format!("  {line}\n"));
    }

    if !envelope.errors.is_empty() {
        out.push_str("errors:\n");
        for error in &envelope.errors {
            out.push_str(&format!("  - {}: {}\n", error.code, error.message));
        }
    }

    Ok(out)
}

/// Report rows sit at the top of `report` output and under `report` for `run`.
fn report_rows(data: &Value) -> Option<&Vec<Value>> {
    data.get("rows")
        .or_else(|| data.get("report").and_then(|report| report.get("rows")))
        .and_then(Value::as_array)
}

/// Aligned columns for report rows, which are JSON objects.
fn format_rows(rows: &[Value]) -> String {
    const COLUMNS: [&str; 6] = [
        "security_id",
        "trade_date",
        "close_price",
        "volume",
        "dsa_indicator",
        "ma_5_days",
    ];

    if rows.is_empty() || !rows.iter().all(Value::is_object) {
        return String::new();
    }

    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            COLUMNS
                .iter()
                .map(|column| match row.get(*column) {
                    None | Some(Value::Null) => String::from("-"),
                    Some(Value::String(text)) => text.clone(),
                    Some(other) => other.to_string(),
                })
                .collect()
        })
        .collect();

    let widths: Vec<usize> = COLUMNS
        .iter()
        .enumerate()
        .map(|(index, column)| {
            cells
                .iter()
                .map(|row| row[index].len())
                .chain(std::iter::once(column.len()))
                .max()
                .unwrap_or(column.len())
        })
        .collect();

    let mut out = String::from("rows:\n");
    let header: Vec<String> = COLUMNS
        .iter()
        .zip(&widths)
        .map(|(column, width)| format!("{column:<width$}", width = *width))
        .collect();
    out.push_str(&format!("  {}\n", header.join("  ")));
    for row in &cells {
        let line: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{cell:>width$}", width = *width))
            .collect();
        out.push_str(&format!("  {}\n", line.join("  ")));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stockpipe_core::EnvelopeMeta;

    #[test]
    fn table_lists_rows_and_errors() {
        let meta = EnvelopeMeta::new("request-12345", 3).expect("meta");
        let mut envelope = Envelope::success(
            meta,
            json!({
                "rows": [
                    {"security_id": 2330, "trade_date": "2024-01-05", "close_price": 590.0,
                     "volume": 100, "dsa_indicator": 0.6, "ma_5_days": null}
                ]
            }),
        );
        envelope
            .push_error(
                stockpipe_core::EnvelopeError::new("ma_write_failed", "security 2 rolled back")
                    .expect("error"),
            )
            .expect("push");

        let table = render_table(&envelope).expect("render");

        assert!(table.contains("request_id  : request-12345"));
        assert!(table.contains("2024-01-05"));
        assert!(table.contains("ma_write_failed: security 2 rolled back"));
    }

    #[test]
    fn table_lists_rows_nested_under_report() {
        let meta = EnvelopeMeta::new("request-67890", 9).expect("meta");
        let envelope = Envelope::success(
            meta,
            json!({
                "import": {"imported": 1},
                "report": {
                    "rows": [
                        {"security_id": 2317, "trade_date": "2024-01-04", "close_price": 300.0,
                         "volume": 8, "dsa_indicator": 0.1, "ma_5_days": 200.0}
                    ]
                }
            }),
        );

        let table = render_table(&envelope).expect("render");

        assert!(table.contains("rows:\n"));
        assert!(table.contains("security_id  trade_date"));
    }

    #[test]
    fn non_object_rows_are_not_tabulated() {
        assert!(format_rows(&[json!([1, 2])]).is_empty());
    }
}

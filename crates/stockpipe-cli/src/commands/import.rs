use serde::Serialize;
use stockpipe_core::{CsvLoader, SkippedLine, StockRecord, Warehouse};

use crate::cli::ImportArgs;
use crate::error::CliError;

use super::CommandResult;

#[derive(Debug, Serialize)]
pub struct ImportSummary {
    pub file: String,
    pub lines_read: usize,
    pub imported: usize,
    pub skipped: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped_lines: Vec<SkippedLine>,
}

pub fn run(args: &ImportArgs, warehouse: &Warehouse) -> Result<CommandResult, CliError> {
    let summary = import_file(args, warehouse)?;
    let warnings = skip_warnings(&summary.skipped_lines);
    Ok(CommandResult::ok(serde_json::to_value(&summary)?).with_warnings(warnings))
}

/// Load the CSV and replace the stored records with it.
pub fn import_file(args: &ImportArgs, warehouse: &Warehouse) -> Result<ImportSummary, CliError> {
    let outcome = CsvLoader::load_path(&args.file)?;
    let rows: Vec<StockRecord> = outcome.records.iter().map(StockRecord::from).collect();
    let imported = warehouse.replace_stock_data(&rows)?;
    tracing::info!(imported, skipped = outcome.skipped.len(), "import finished");

    Ok(ImportSummary {
        file: args.file.display().to_string(),
        lines_read: outcome.lines_read,
        imported,
        skipped: outcome.skipped.len(),
        skipped_lines: outcome.skipped,
    })
}

pub fn skip_warnings(skipped: &[SkippedLine]) -> Vec<String> {
    skipped
        .iter()
        .map(|skipped| format!("line {}: {}", skipped.line, skipped.reason))
        .collect()
}

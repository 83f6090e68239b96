use serde::Serialize;
use stockpipe_core::{PipelineReport, Stage, Warehouse};

use crate::cli::{ImportArgs, RunArgs};
use crate::error::CliError;

use super::compute::compute_stages;
use super::import::{import_file, skip_warnings, ImportSummary};
use super::report::{build_report, Report};
use super::CommandResult;

#[derive(Debug, Serialize)]
struct RunSummary {
    import: ImportSummary,
    compute: PipelineReport,
    report: Report,
}

/// Import, compute every stage, then summarize.
pub fn run(args: &RunArgs, warehouse: &Warehouse) -> Result<CommandResult, CliError> {
    let import = import_file(
        &ImportArgs {
            file: args.file.clone(),
        },
        warehouse,
    )?;
    let mut warnings = skip_warnings(&import.skipped_lines);

    let (compute, errors) = compute_stages(Stage::All, warehouse)?;
    let (report, report_warnings) = build_report(&args.report, warehouse)?;
    warnings.extend(report_warnings);

    let summary = RunSummary {
        import,
        compute,
        report,
    };

    Ok(CommandResult::ok(serde_json::to_value(&summary)?)
        .with_warnings(warnings)
        .with_errors(errors))
}

use stockpipe_core::{
    run_dsa_stage, run_moving_average_stage, EnvelopeError, PipelineReport, Stage, Warehouse,
    MA_WINDOW,
};
use stockpipe_warehouse::RunLogEntry;
use uuid::Uuid;

use crate::cli::{ComputeArgs, StageSelector};
use crate::error::CliError;

use super::CommandResult;

pub fn run(args: &ComputeArgs, warehouse: &Warehouse) -> Result<CommandResult, CliError> {
    let (report, errors) = compute_stages(to_stage(args.stage), warehouse)?;
    Ok(CommandResult::ok(serde_json::to_value(&report)?).with_errors(errors))
}

/// Run the selected stages, recording each one in `run_log`.
///
/// Securities whose moving averages could not be written come back as
/// envelope errors rather than failing the command.
pub fn compute_stages(
    stage: Stage,
    warehouse: &Warehouse,
) -> Result<(PipelineReport, Vec<EnvelopeError>), CliError> {
    let run_id = Uuid::new_v4().to_string();
    let mut report = PipelineReport::default();
    let mut errors = Vec::new();

    if stage.includes_dsa() {
        let result = run_dsa_stage(warehouse);
        match &result {
            Ok(dsa) => log_run(warehouse, &run_id, Stage::Dsa, dsa.rows_updated, 0, "ok"),
            Err(_) => log_run(warehouse, &run_id, Stage::Dsa, 0, 0, "failed"),
        }
        report.dsa = Some(result?);
    }

    if stage.includes_moving_average() {
        let result = run_moving_average_stage(warehouse, MA_WINDOW);
        match &result {
            Ok(ma) => log_run(
                warehouse,
                &run_id,
                Stage::MovingAverage,
                ma.rows_updated,
                ma.failures.iter().map(|failure| failure.rows).sum(),
                if ma.is_partial() { "partial" } else { "ok" },
            ),
            Err(_) => log_run(warehouse, &run_id, Stage::MovingAverage, 0, 0, "failed"),
        }
        let ma = result?;

        for failure in &ma.failures {
            errors.push(EnvelopeError::new(
                "ma_write_failed",
                format!(
                    "security {}: moving averages rolled back: {}",
                    failure.security_id, failure.error
                ),
            )?);
        }
        report.moving_average = Some(ma);
    }

    Ok((report, errors))
}

fn log_run(
    warehouse: &Warehouse,
    run_id: &str,
    stage: Stage,
    rows_processed: usize,
    rows_failed: usize,
    status: &str,
) {
    let entry = RunLogEntry {
        run_id: run_id.to_owned(),
        stage: stage.as_str().to_owned(),
        rows_processed: rows_processed as u64,
        rows_failed: rows_failed as u64,
        status: status.to_owned(),
    };
    if let Err(error) = warehouse.record_run(&entry) {
        tracing::warn!(%error, stage = %stage, "failed to record stage run");
    }
}

pub const fn to_stage(selector: StageSelector) -> Stage {
    match selector {
        StageSelector::Dsa => Stage::Dsa,
        StageSelector::Ma => Stage::MovingAverage,
        StageSelector::All => Stage::All,
    }
}


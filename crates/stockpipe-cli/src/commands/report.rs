use serde::Serialize;
use stockpipe_core::{
    round_half_up, DsaBreakdown, DsaSummary, QueryGuardrails, SecurityId, StockRow, Warehouse,
    DSA_DISPLAY_PLACES, MA_DISPLAY_PLACES,
};

use crate::cli::ReportArgs;
use crate::error::CliError;

use super::CommandResult;

#[derive(Debug, Serialize)]
pub struct ReportRow {
    pub security_id: i32,
    pub stock_name: String,
    pub trade_date: String,
    pub open_price: f64,
    pub high_price: f64,
    pub low_price: f64,
    pub close_price: f64,
    pub volume: i64,
    pub dsa_indicator: Option<f64>,
    pub ma_5_days: Option<f64>,
}

impl From<StockRow> for ReportRow {
    fn from(row: StockRow) -> Self {
        Self {
            security_id: row.security_id,
            stock_name: row.stock_name,
            trade_date: row.trade_date,
            open_price: row.open_price,
            high_price: row.high_price,
            low_price: row.low_price,
            close_price: row.close_price,
            volume: row.volume,
            dsa_indicator: row
                .dsa_indicator
                .map(|value| round_half_up(value, DSA_DISPLAY_PLACES)),
            ma_5_days: row
                .ma_5_days
                .map(|value| round_half_up(value, MA_DISPLAY_PLACES)),
        }
    }
}

/// How the DSA of the newest reported row was derived from its prices.
#[derive(Debug, Serialize)]
pub struct DsaVerification {
    pub security_id: i32,
    pub trade_date: String,
    pub open_price: f64,
    pub high_price: f64,
    pub low_price: f64,
    #[serde(flatten)]
    pub breakdown: DsaBreakdown,
}

impl From<&StockRow> for DsaVerification {
    fn from(row: &StockRow) -> Self {
        Self {
            security_id: row.security_id,
            trade_date: row.trade_date.clone(),
            open_price: row.open_price,
            high_price: row.high_price,
            low_price: row.low_price,
            breakdown: DsaBreakdown::new(row.open_price, row.high_price, row.low_price),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Report {
    pub summary: DsaSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_id: Option<SecurityId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification: Option<DsaVerification>,
    pub rows: Vec<ReportRow>,
}

pub fn run(args: &ReportArgs, warehouse: &Warehouse) -> Result<CommandResult, CliError> {
    let (report, warnings) = build_report(args, warehouse)?;
    Ok(CommandResult::ok(serde_json::to_value(&report)?).with_warnings(warnings))
}

/// DSA statistics plus the latest rows, newest first, and the DSA terms of
/// the newest row.
pub fn build_report(
    args: &ReportArgs,
    warehouse: &Warehouse,
) -> Result<(Report, Vec<String>), CliError> {
    if args.limit == 0 {
        return Err(CliError::InvalidArgument(String::from(
            "--limit must be greater than zero",
        )));
    }

    let mut warnings = Vec::new();
    let max_rows = QueryGuardrails::default().max_rows;
    let limit = if args.limit > max_rows {
        warnings.push(format!("--limit capped at {max_rows} rows"));
        max_rows
    } else {
        args.limit
    };

    let security_id = if args.all {
        None
    } else {
        Some(SecurityId::parse(&args.security)?)
    };

    let summary = warehouse.dsa_summary()?;
    let latest = warehouse.latest_rows(security_id.map(SecurityId::get), limit)?;
    let verification = latest.first().map(DsaVerification::from);
    let rows: Vec<ReportRow> = latest.into_iter().map(ReportRow::from).collect();

    if let Some(security_id) = security_id {
        if rows.is_empty() {
            warnings.push(format!("no stored rows for security {security_id}"));
        }
    }
    if summary.total > 0 && summary.positive + summary.negative + summary.zero < summary.total {
        warnings.push(String::from(
            "some rows have no dsa_indicator yet; run `stockpipe compute`",
        ));
    }

    Ok((
        Report {
            summary,
            security_id,
            verification,
            rows,
        },
        warnings,
    ))
}

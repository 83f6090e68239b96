//! Stage orchestration: read prices, run an engine, write values back.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::SecurityId;
use crate::indicators::{dsa_updates, moving_averages, MA_WINDOW};
use crate::store::{PriceStore, StoreError};
use crate::ValidationError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{stage} stage could not read input: {source}")]
    Load {
        stage: Stage,
        #[source]
        source: StoreError,
    },

    #[error("{stage} stage could not write results: {source}")]
    Write {
        stage: Stage,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Which engine passes to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Dsa,
    #[serde(rename = "ma")]
    MovingAverage,
    All,
}

impl Stage {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dsa => "dsa",
            Self::MovingAverage => "ma",
            Self::All => "all",
        }
    }

    pub const fn includes_dsa(self) -> bool {
        matches!(self, Self::Dsa | Self::All)
    }

    pub const fn includes_moving_average(self) -> bool {
        matches!(self, Self::MovingAverage | Self::All)
    }
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dsa" => Ok(Self::Dsa),
            "ma" => Ok(Self::MovingAverage),
            "all" => Ok(Self::All),
            other => Err(format!("unknown stage '{other}', expected dsa, ma or all")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DsaStageReport {
    pub rows_read: usize,
    pub rows_updated: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityFailure {
    pub security_id: SecurityId,
    pub rows: usize,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovingAverageStageReport {
    pub window: usize,
    pub rows_read: usize,
    pub rows_updated: usize,
    pub securities_processed: usize,
    pub securities_failed: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<SecurityFailure>,
}

impl MovingAverageStageReport {
    pub fn is_partial(&self) -> bool {
        self.securities_failed > 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dsa: Option<DsaStageReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub moving_average: Option<MovingAverageStageReport>,
}

/// Compute DSA for every stored row and write all values in one batch.
///
/// A write failure aborts the stage; nothing is partially applied.
pub fn run_dsa_stage<S>(store: &S) -> Result<DsaStageReport, PipelineError>
where
    S: PriceStore + ?Sized,
{
    let ranges = store
        .load_price_ranges()
        .map_err(|source| PipelineError::Load {
            stage: Stage::Dsa,
            source,
        })?;
    tracing::info!(rows = ranges.len(), "computing dsa indicator");

    let updates = dsa_updates(&ranges);
    let rows_updated = store.write_dsa(&updates).map_err(|source| {
        tracing::error!(error = %source, "dsa write-back failed");
        PipelineError::Write {
            stage: Stage::Dsa,
            source,
        }
    })?;

    tracing::info!(rows_updated, "dsa stage finished");
    Ok(DsaStageReport {
        rows_read: ranges.len(),
        rows_updated,
    })
}

/// Compute trailing averages per security and write each security atomically.
///
/// A security whose write fails keeps its previous values and is listed in
/// the report; the remaining securities are still written.
pub fn run_moving_average_stage<S>(
    store: &S,
    window: usize,
) -> Result<MovingAverageStageReport, PipelineError>
where
    S: PriceStore + ?Sized,
{
    let points = store
        .load_closing_prices()
        .map_err(|source| PipelineError::Load {
            stage: Stage::MovingAverage,
            source,
        })?;
    let series = moving_averages(&points, window)?;
    tracing::info!(
        rows = points.len(),
        securities = series.len(),
        window,
        "computing moving averages"
    );

    let mut report = MovingAverageStageReport {
        window,
        rows_read: points.len(),
        rows_updated: 0,
        securities_processed: 0,
        securities_failed: 0,
        failures: Vec::new(),
    };

    for (index, security) in series.iter().enumerate() {
        match store.write_moving_averages(security.security_id, &security.updates) {
            Ok(updated) => {
                report.rows_updated += updated;
                report.securities_processed += 1;
            }
            Err(error) => {
                tracing::error!(
                    security_id = %security.security_id,
                    error = %error,
                    "moving-average write-back failed"
                );
                report.securities_failed += 1;
                report.failures.push(SecurityFailure {
                    security_id: security.security_id,
                    rows: security.updates.len(),
                    error: error.to_string(),
                });
            }
        }

        if (index + 1) % 100 == 0 {
            tracing::debug!(done = index + 1, total = series.len(), "moving-average progress");
        }
    }

    tracing::info!(
        rows_updated = report.rows_updated,
        securities_processed = report.securities_processed,
        securities_failed = report.securities_failed,
        "moving-average stage finished"
    );
    Ok(report)
}

/// Run the requested stages in order: DSA first, then moving averages.
pub fn run_stages<S>(store: &S, stage: Stage) -> Result<PipelineReport, PipelineError>
where
    S: PriceStore + ?Sized,
{
    let mut report = PipelineReport::default();
    if stage.includes_dsa() {
        report.dsa = Some(run_dsa_stage(store)?);
    }
    if stage.includes_moving_average() {
        report.moving_average = Some(run_moving_average_stage(store, MA_WINDOW)?);
    }
    Ok(report)
}

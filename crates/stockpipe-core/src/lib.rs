//! Core of stockpipe.
//!
//! This crate contains:
//! - Domain types for daily stock records and their validation
//! - The DSA indicator and trailing moving-average engines
//! - The `PriceStore` seam and the pipeline stages that drive the engines
//! - The CSV loader and the response envelope

pub mod domain;
pub mod envelope;
pub mod error;
pub mod indicators;
pub mod loader;
pub mod pipeline;
pub mod store;

pub use domain::{DailyRecord, Prices, SecurityId, TradeDate, UtcDateTime};
pub use envelope::{Envelope, EnvelopeError, EnvelopeMeta, SCHEMA_VERSION};
pub use error::ValidationError;
pub use indicators::{
    compute_dsa, dsa_updates, moving_averages, round_half_up, trailing_average, ClosePoint,
    DsaBreakdown, DsaUpdate, MovingAverageUpdate, PriceRange, SecuritySeries, TrailingWindow,
    DSA_DISPLAY_PLACES, MA_DISPLAY_PLACES, MA_WINDOW,
};
pub use loader::{CsvLoader, LoadError, LoadOutcome, SkipReason, SkippedLine};
pub use pipeline::{
    run_dsa_stage, run_moving_average_stage, run_stages, DsaStageReport, MovingAverageStageReport,
    PipelineError, PipelineReport, SecurityFailure, Stage,
};
pub use stockpipe_warehouse::{
    DsaSummary, QueryGuardrails, QueryResult, SqlColumn, StockRecord, StockRow, Warehouse,
    WarehouseConfig, WarehouseError,
};
pub use store::{MemoryStore, PriceStore, StoreError};

//! Row-local DSA indicator and per-security trailing moving average.
//!
//! Both engines are pure: they take price tuples and return keyed updates.
//! Reading from and writing to storage happens in [`crate::pipeline`].

mod dsa;
mod moving_average;

pub use dsa::{compute_dsa, dsa_updates, DsaBreakdown, DsaUpdate, PriceRange};
pub use moving_average::{
    moving_averages, trailing_average, ClosePoint, MovingAverageUpdate, SecuritySeries,
    TrailingWindow,
};

/// Trailing window used by the pipeline's moving-average stage.
pub const MA_WINDOW: usize = 5;

/// Decimal places DSA values are shown with.
pub const DSA_DISPLAY_PLACES: u32 = 6;

/// Decimal places moving averages are shown with.
pub const MA_DISPLAY_PLACES: u32 = 2;

/// Round half away from zero to `places` decimals.
///
/// Stored values keep full precision; this is for display only.
pub fn round_half_up(value: f64, places: u32) -> f64 {
    let scale = 10_f64.powi(places as i32);
    (value * scale).round() / scale
}

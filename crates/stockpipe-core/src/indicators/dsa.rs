use serde::{Deserialize, Serialize};

use crate::domain::{SecurityId, TradeDate};

/// Open/high/low of one stored row, addressed by its key.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceRange {
    pub security_id: SecurityId,
    pub trade_date: TradeDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DsaUpdate {
    pub security_id: SecurityId,
    pub trade_date: TradeDate,
    pub dsa: f64,
}

/// The intermediate terms of one DSA computation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DsaBreakdown {
    /// `high - open`
    pub up: f64,
    /// `open - low`
    pub down: f64,
    pub numerator: f64,
    pub denominator: f64,
    pub dsa: f64,
}

impl DsaBreakdown {
    pub fn new(open: f64, high: f64, low: f64) -> Self {
        let up = high - open;
        let down = open - low;
        let numerator = up + down;
        let denominator = up * up + down * down;
        let dsa = if denominator == 0.0 {
            0.0
        } else {
            numerator / denominator
        };
        Self {
            up,
            down,
            numerator,
            denominator,
            dsa,
        }
    }
}

/// DSA indicator for a single day.
///
/// With `up = high - open` and `down = open - low`, the value is
/// `(up + down) / (up² + down²)`, or `0` when both legs are zero.
pub fn compute_dsa(open: f64, high: f64, low: f64) -> f64 {
    DsaBreakdown::new(open, high, low).dsa
}

pub fn dsa_updates(ranges: &[PriceRange]) -> Vec<DsaUpdate> {
    ranges
        .iter()
        .map(|range| DsaUpdate {
            security_id: range.security_id,
            trade_date: range.trade_date,
            dsa: compute_dsa(range.open, range.high, range.low),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_day_is_zero() {
        assert_eq!(compute_dsa(10.0, 10.0, 10.0), 0.0);
        assert_eq!(compute_dsa(0.0, 0.0, 0.0), 0.0);
    }

    #[test]
    fn breakdown_exposes_each_term() {
        let breakdown = DsaBreakdown::new(10.0, 12.0, 9.0);
        assert_eq!(breakdown.up, 2.0);
        assert_eq!(breakdown.down, 1.0);
        assert_eq!(breakdown.numerator, 3.0);
        assert_eq!(breakdown.denominator, 5.0);
        assert_eq!(breakdown.dsa, compute_dsa(10.0, 12.0, 9.0));
    }

    #[test]
    fn matches_formula() {
        // up = 2, down = 1: 3 / 5
        let dsa = compute_dsa(10.0, 12.0, 9.0);
        assert!((dsa - 0.6).abs() < 1e-12, "got {dsa}");
    }

    #[test]
    fn sign_follows_numerator() {
        let cases = [
            (10.0, 12.0, 9.0),
            (10.0, 9.0, 8.0),
            (10.0, 11.0, 12.0),
            (10.0, 8.0, 11.0),
            (5.0, 5.0, 4.0),
        ];
        for (open, high, low) in cases {
            let numerator: f64 = (high - open) + (open - low);
            let dsa = compute_dsa(open, high, low);
            assert_eq!(
                dsa.signum(),
                numerator.signum(),
                "open={open} high={high} low={low}"
            );
        }
    }

    #[test]
    fn one_update_per_range() {
        let security_id = SecurityId::new(1);
        let ranges = [
            PriceRange {
                security_id,
                trade_date: TradeDate::parse("2024-01-02").expect("date"),
                open: 10.0,
                high: 12.0,
                low: 9.0,
            },
            PriceRange {
                security_id,
                trade_date: TradeDate::parse("2024-01-03").expect("date"),
                open: 7.0,
                high: 7.0,
                low: 7.0,
            },
        ];

        let updates = dsa_updates(&ranges);
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].trade_date, ranges[0].trade_date);
        assert_eq!(updates[1].dsa, 0.0);
    }
}

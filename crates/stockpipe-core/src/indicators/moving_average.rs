use std::collections::{BTreeMap, VecDeque};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::domain::{SecurityId, TradeDate};
use crate::ValidationError;

/// Closing price of one stored row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClosePoint {
    pub security_id: SecurityId,
    pub trade_date: TradeDate,
    pub close: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MovingAverageUpdate {
    pub security_id: SecurityId,
    pub trade_date: TradeDate,
    pub ma_5_days: f64,
}

/// All moving-average updates for one security, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecuritySeries {
    pub security_id: SecurityId,
    pub updates: Vec<MovingAverageUpdate>,
}

/// Fixed-capacity window keeping the sum of its values.
///
/// The sum is rebuilt from the held values whenever one is evicted, so a large
/// close leaving the window cannot cancel out the smaller ones still in it.
#[derive(Debug, Clone)]
pub struct TrailingWindow {
    values: VecDeque<f64>,
    capacity: usize,
    sum: f64,
}

impl TrailingWindow {
    pub fn new(capacity: usize) -> Result<Self, ValidationError> {
        if capacity == 0 {
            return Err(ValidationError::ZeroWindow);
        }
        Ok(Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
            sum: 0.0,
        })
    }

    /// Add `value`, evicting the oldest value once full, and return the mean.
    pub fn push(&mut self, value: f64) -> f64 {
        let evicted = self.values.len() == self.capacity && self.values.pop_front().is_some();
        self.values.push_back(value);
        if evicted {
            self.sum = self.values.iter().sum();
        } else {
            self.sum += value;
        }
        self.mean()
    }

    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.sum / self.values.len() as f64
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Trailing mean of `closes` over at most `window` values ending at each index.
///
/// The window shrinks at the start of the series, so the first output equals
/// the first close.
pub fn trailing_average(closes: &[f64], window: usize) -> Result<Vec<f64>, ValidationError> {
    let mut trailing = TrailingWindow::new(window)?;
    Ok(closes.iter().map(|close| trailing.push(*close)).collect())
}

/// Group `points` by security, order each group by trade date and window it.
///
/// Groups are computed in parallel. The result is ordered by security id.
pub fn moving_averages(
    points: &[ClosePoint],
    window: usize,
) -> Result<Vec<SecuritySeries>, ValidationError> {
    if window == 0 {
        return Err(ValidationError::ZeroWindow);
    }

    let mut groups: BTreeMap<SecurityId, Vec<ClosePoint>> = BTreeMap::new();
    for point in points {
        groups.entry(point.security_id).or_default().push(*point);
    }

    let groups: Vec<(SecurityId, Vec<ClosePoint>)> = groups.into_iter().collect();
    groups
        .into_par_iter()
        .map(|(security_id, mut points)| -> Result<SecuritySeries, ValidationError> {
            points.sort_by_key(|point| point.trade_date);
            let closes: Vec<f64> = points.iter().map(|point| point.close).collect();
            let averages = trailing_average(&closes, window)?;

            let updates = points
                .iter()
                .zip(averages)
                .map(|(point, ma_5_days)| MovingAverageUpdate {
                    security_id,
                    trade_date: point.trade_date,
                    ma_5_days,
                })
                .collect();

            Ok(SecuritySeries {
                security_id,
                updates,
            })
        })
        .collect()
}

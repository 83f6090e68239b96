//! Storage seam between the indicator engines and wherever rows live.
//!
//! The pipeline only reads price tuples and writes derived values back by key
//! through [`PriceStore`]; it never inserts or deletes rows.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use stockpipe_warehouse::{DsaRow, MovingAverageRow, Warehouse, WarehouseError};
use thiserror::Error;

use crate::domain::{DailyRecord, SecurityId, TradeDate};
use crate::indicators::{ClosePoint, DsaUpdate, MovingAverageUpdate, PriceRange};
use crate::ValidationError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Warehouse(#[from] WarehouseError),

    #[error("stored row is invalid: {0}")]
    InvalidRow(#[from] ValidationError),

    #[error("{0}")]
    Unavailable(String),
}

pub trait PriceStore {
    /// Open/high/low of every stored row.
    fn load_price_ranges(&self) -> Result<Vec<PriceRange>, StoreError>;

    /// Overwrite DSA values by key as one atomic batch. Returns rows updated.
    fn write_dsa(&self, updates: &[DsaUpdate]) -> Result<usize, StoreError>;

    /// Closing price of every stored row.
    fn load_closing_prices(&self) -> Result<Vec<ClosePoint>, StoreError>;

    /// Overwrite one security's moving averages atomically. Returns rows updated.
    fn write_moving_averages(
        &self,
        security_id: SecurityId,
        updates: &[MovingAverageUpdate],
    ) -> Result<usize, StoreError>;
}

impl PriceStore for Warehouse {
    fn load_price_ranges(&self) -> Result<Vec<PriceRange>, StoreError> {
        self.price_ranges()?
            .into_iter()
            .map(|row| -> Result<PriceRange, StoreError> {
                Ok(PriceRange {
                    security_id: SecurityId::new(row.security_id),
                    trade_date: TradeDate::parse(&row.trade_date)?,
                    open: row.open_price,
                    high: row.high_price,
                    low: row.low_price,
                })
            })
            .collect()
    }

    fn write_dsa(&self, updates: &[DsaUpdate]) -> Result<usize, StoreError> {
        let rows: Vec<DsaRow> = updates
            .iter()
            .map(|update| DsaRow {
                security_id: update.security_id.get(),
                trade_date: update.trade_date.format_iso(),
                dsa_indicator: update.dsa,
            })
            .collect();
        Ok(Warehouse::write_dsa(self, &rows)?)
    }

    fn load_closing_prices(&self) -> Result<Vec<ClosePoint>, StoreError> {
        self.closing_prices()?
            .into_iter()
            .map(|row| -> Result<ClosePoint, StoreError> {
                Ok(ClosePoint {
                    security_id: SecurityId::new(row.security_id),
                    trade_date: TradeDate::parse(&row.trade_date)?,
                    close: row.close_price,
                })
            })
            .collect()
    }

    fn write_moving_averages(
        &self,
        security_id: SecurityId,
        updates: &[MovingAverageUpdate],
    ) -> Result<usize, StoreError> {
        let rows: Vec<MovingAverageRow> = updates
            .iter()
            .map(|update| MovingAverageRow {
                trade_date: update.trade_date.format_iso(),
                ma_5_days: update.ma_5_days,
            })
            .collect();
        Ok(Warehouse::write_moving_averages(
            self,
            security_id.get(),
            &rows,
        )?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct MemoryRow {
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    dsa_indicator: Option<f64>,
    ma_5_days: Option<f64>,
}

#[derive(Debug, Default)]
struct MemoryState {
    rows: BTreeMap<(SecurityId, TradeDate), MemoryRow>,
    fail_dsa: bool,
    failing_securities: HashSet<SecurityId>,
}

/// In-process [`PriceStore`] with optional injected write failures.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a DailyRecord>) -> Self {
        let store = Self::new();
        for record in records {
            store.insert(record);
        }
        store
    }

    /// Insert or replace the row keyed by the record's security and date.
    pub fn insert(&self, record: &DailyRecord) {
        self.lock().rows.insert(
            (record.security_id, record.trade_date),
            MemoryRow {
                open: record.open_price,
                high: record.high_price,
                low: record.low_price,
                close: record.close_price,
                dsa_indicator: None,
                ma_5_days: None,
            },
        );
    }

    /// Make every later DSA write fail.
    pub fn fail_dsa_writes(&self) {
        self.lock().fail_dsa = true;
    }

    /// Make later moving-average writes for `security_id` fail.
    pub fn fail_moving_averages_for(&self, security_id: SecurityId) {
        self.lock().failing_securities.insert(security_id);
    }

    pub fn len(&self) -> usize {
        self.lock().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().rows.is_empty()
    }

    pub fn dsa(&self, security_id: SecurityId, trade_date: TradeDate) -> Option<f64> {
        self.lock()
            .rows
            .get(&(security_id, trade_date))
            .and_then(|row| row.dsa_indicator)
    }

    pub fn moving_average(&self, security_id: SecurityId, trade_date: TradeDate) -> Option<f64> {
        self.lock()
            .rows
            .get(&(security_id, trade_date))
            .and_then(|row| row.ma_5_days)
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PriceStore for MemoryStore {
    fn load_price_ranges(&self) -> Result<Vec<PriceRange>, StoreError> {
        Ok(self
            .lock()
            .rows
            .iter()
            .map(|(&(security_id, trade_date), row)| PriceRange {
                security_id,
                trade_date,
                open: row.open,
                high: row.high,
                low: row.low,
            })
            .collect())
    }

    fn write_dsa(&self, updates: &[DsaUpdate]) -> Result<usize, StoreError> {
        let mut state = self.lock();
        if state.fail_dsa {
            return Err(StoreError::Unavailable(String::from(
                "dsa write rejected by store",
            )));
        }

        let mut updated = 0;
        for update in updates {
            if let Some(row) = state.rows.get_mut(&(update.security_id, update.trade_date)) {
                row.dsa_indicator = Some(update.dsa);
                updated += 1;
            }
        }
        Ok(updated)
    }

    fn load_closing_prices(&self) -> Result<Vec<ClosePoint>, StoreError> {
        Ok(self
            .lock()
            .rows
            .iter()
            .map(|(&(security_id, trade_date), row)| ClosePoint {
                security_id,
                trade_date,
                close: row.close,
            })
            .collect())
    }

    fn write_moving_averages(
        &self,
        security_id: SecurityId,
        updates: &[MovingAverageUpdate],
    ) -> Result<usize, StoreError> {
        let mut state = self.lock();
        if state.failing_securities.contains(&security_id) {
            return Err(StoreError::Unavailable(format!(
                "moving-average write rejected for security {security_id}"
            )));
        }

        let mut updated = 0;
        for update in updates {
            if let Some(row) = state.rows.get_mut(&(security_id, update.trade_date)) {
                row.ma_5_days = Some(update.ma_5_days);
                updated += 1;
            }
        }
        Ok(updated)
    }
}

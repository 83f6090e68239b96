use serde::{Deserialize, Serialize};
use stockpipe_warehouse::StockRecord;

use crate::domain::{SecurityId, TradeDate};
use crate::ValidationError;

/// One security's prices and descriptive fields for one trading day.
///
/// Prices are checked to be finite and non-negative. The usual
/// `low <= open, close <= high` ordering is assumed but not enforced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyRecord {
    pub security_id: SecurityId,
    pub stock_name: String,
    pub trade_date: TradeDate,
    pub open_price: f64,
    pub high_price: f64,
    pub low_price: f64,
    pub close_price: f64,
    pub volume: u64,
    pub market_cap: f64,
    pub pe_ratio: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub sector: Option<String>,
}

/// Open/high/low/close of one trading day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prices {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl DailyRecord {
    pub fn new(
        security_id: SecurityId,
        stock_name: impl Into<String>,
        trade_date: TradeDate,
        prices: Prices,
        volume: u64,
        market_cap: f64,
    ) -> Result<Self, ValidationError> {
        let stock_name = stock_name.into().trim().to_owned();
        if stock_name.is_empty() {
            return Err(ValidationError::EmptyField {
                field: "stock_name",
            });
        }

        validate_price("open_price", prices.open)?;
        validate_price("high_price", prices.high)?;
        validate_price("low_price", prices.low)?;
        validate_price("close_price", prices.close)?;
        validate_price("market_cap", market_cap)?;

        Ok(Self {
            security_id,
            stock_name,
            trade_date,
            open_price: prices.open,
            high_price: prices.high,
            low_price: prices.low,
            close_price: prices.close,
            volume,
            market_cap,
            pe_ratio: None,
            dividend_yield: None,
            sector: None,
        })
    }

    pub fn with_pe_ratio(mut self, pe_ratio: Option<f64>) -> Self {
        self.pe_ratio = pe_ratio.filter(|value| value.is_finite());
        self
    }

    pub fn with_dividend_yield(mut self, dividend_yield: Option<f64>) -> Self {
        self.dividend_yield = dividend_yield.filter(|value| value.is_finite());
        self
    }

    pub fn with_sector(mut self, sector: Option<String>) -> Self {
        self.sector = sector
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty());
        self
    }
}

impl From<&DailyRecord> for StockRecord {
    fn from(record: &DailyRecord) -> Self {
        Self {
            security_id: record.security_id.get(),
            stock_name: record.stock_name.clone(),
            close_price: record.close_price,
            open_price: record.open_price,
            high_price: record.high_price,
            low_price: record.low_price,
            volume: record.volume,
            market_cap: record.market_cap,
            pe_ratio: record.pe_ratio,
            dividend_yield: record.dividend_yield,
            sector: record.sector.clone(),
            trade_date: record.trade_date.format_iso(),
        }
    }
}

fn validate_price(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NonFiniteValue { field });
    }
    if value < 0.0 {
        return Err(ValidationError::NegativeValue { field });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prices(open: f64, high: f64, low: f64, close: f64) -> Prices {
        Prices {
            open,
            high,
            low,
            close,
        }
    }

    fn build(prices: Prices) -> Result<DailyRecord, ValidationError> {
        DailyRecord::new(
            SecurityId::new(2330),
            "TSMC",
            TradeDate::parse("2024-01-02").expect("date"),
            prices,
            25_000_000,
            1.5e13,
        )
    }

    #[test]
    fn accepts_valid_record() {
        let record = build(prices(575.0, 585.0, 572.0, 580.0))
            .expect("record should validate")
            .with_sector(Some(String::from("  Semiconductors ")))
            .with_pe_ratio(Some(15.5));

        assert_eq!(record.sector.as_deref(), Some("Semiconductors"));
        assert_eq!(record.pe_ratio, Some(15.5));
        assert_eq!(record.dividend_yield, None);
    }

    #[test]
    fn rejects_negative_price() {
        let err = build(prices(-1.0, 2.0, 1.0, 1.5)).expect_err("must fail");
        assert_eq!(err, ValidationError::NegativeValue { field: "open_price" });
    }

    #[test]
    fn rejects_non_finite_price() {
        let err = build(prices(1.0, f64::INFINITY, 1.0, 1.0)).expect_err("must fail");
        assert_eq!(err, ValidationError::NonFiniteValue { field: "high_price" });
    }

    #[test]
    fn does_not_enforce_range_ordering() {
        // high below low is stored as given
        let record = build(prices(10.0, 5.0, 8.0, 9.0)).expect("ordering is not checked");
        assert_eq!(record.high_price, 5.0);
    }

    #[test]
    fn blank_sector_becomes_none() {
        let record = build(prices(1.0, 1.0, 1.0, 1.0))
            .expect("record")
            .with_sector(Some(String::from("   ")));
        assert_eq!(record.sector, None);
    }
}

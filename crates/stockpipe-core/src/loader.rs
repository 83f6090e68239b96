//! CSV loader for daily stock records.
//!
//! Expected layout, header row required, columns positional:
//!
//! ```text
//! id,stock_name,close_price,open_price,high_price,low_price,volume,market_cap,pe_ratio,dividend_yield,sector,trade_date
//! ```
//!
//! Lines that cannot become a [`DailyRecord`] are skipped and reported with
//! their line number; they never reach storage.

use std::collections::HashSet;
use std::fmt::{Display, Formatter};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord, Trim};
use serde::Serialize;
use thiserror::Error;

use crate::domain::{DailyRecord, Prices, SecurityId, TradeDate};
use crate::ValidationError;

/// Number of positional columns in an input line.
pub const FIELD_COUNT: usize = 12;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to open '{path}': {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("input has no header row")]
    MissingHeader,

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    Incomplete { fields: usize },
    Malformed { message: String },
    Duplicate { security_id: SecurityId, trade_date: String },
}

impl Display for SkipReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Incomplete { fields } => {
                write!(f, "incomplete line: {fields} of {FIELD_COUNT} fields")
            }
            Self::Malformed { message } => write!(f, "malformed line: {message}"),
            Self::Duplicate {
                security_id,
                trade_date,
            } => write!(f, "duplicate key ({security_id}, {trade_date})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedLine {
    pub line: u64,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadOutcome {
    pub records: Vec<DailyRecord>,
    pub lines_read: usize,
    pub skipped: Vec<SkippedLine>,
}

pub struct CsvLoader;

impl CsvLoader {
    pub fn load_path(path: impl AsRef<Path>) -> Result<LoadOutcome, LoadError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| LoadError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!(path = %path.display(), "loading stock records");
        Self::load_reader(file)
    }

    pub fn load_reader<R: Read>(reader: R) -> Result<LoadOutcome, LoadError> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(reader);

        if rdr.headers()?.is_empty() {
            return Err(LoadError::MissingHeader);
        }

        let mut outcome = LoadOutcome::default();
        let mut seen = HashSet::new();

        for result in rdr.records() {
            outcome.lines_read += 1;
            let record = match result {
                Ok(record) => record,
                Err(error) if error.is_io_error() => return Err(error.into()),
                Err(error) => {
                    let line = error.position().map_or(0, |position| position.line());
                    skip(
                        &mut outcome,
                        line,
                        SkipReason::Malformed {
                            message: error.to_string(),
                        },
                    );
                    continue;
                }
            };

            let line = record.position().map_or(0, |position| position.line());
            if record.len() < FIELD_COUNT {
                skip(
                    &mut outcome,
                    line,
                    SkipReason::Incomplete {
                        fields: record.len(),
                    },
                );
                continue;
            }

            let daily = match parse_record(&record) {
                Ok(daily) => daily,
                Err(error) => {
                    skip(
                        &mut outcome,
                        line,
                        SkipReason::Malformed {
                            message: error.to_string(),
                        },
                    );
                    continue;
                }
            };

            if !seen.insert((daily.security_id, daily.trade_date)) {
                skip(
                    &mut outcome,
                    line,
                    SkipReason::Duplicate {
                        security_id: daily.security_id,
                        trade_date: daily.trade_date.to_string(),
                    },
                );
                continue;
            }

            outcome.records.push(daily);
        }

        tracing::info!(
            lines_read = outcome.lines_read,
            loaded = outcome.records.len(),
            skipped = outcome.skipped.len(),
            "finished reading stock records"
        );
        Ok(outcome)
    }
}

fn skip(outcome: &mut LoadOutcome, line: u64, reason: SkipReason) {
    tracing::warn!(line, %reason, "skipping input line");
    outcome.skipped.push(SkippedLine { line, reason });
}

fn parse_record(record: &StringRecord) -> Result<DailyRecord, ValidationError> {
    let field = |index: usize| record.get(index).unwrap_or_default();

    let security_id = SecurityId::parse(field(0))?;
    let prices = Prices {
        close: parse_number("close_price", field(2))?,
        open: parse_number("open_price", field(3))?,
        high: parse_number("high_price", field(4))?,
        low: parse_number("low_price", field(5))?,
    };
    let volume = parse_volume(field(6))?;
    let market_cap = parse_number("market_cap", field(7))?;
    let trade_date = TradeDate::parse(field(11))?;

    let record = DailyRecord::new(
        security_id,
        field(1),
        trade_date,
        prices,
        volume,
        market_cap,
    )?
    .with_pe_ratio(parse_optional(field(8)))
    .with_dividend_yield(parse_optional(field(9)))
    .with_sector(Some(field(10).to_owned()));

    Ok(record)
}

fn parse_number(field: &'static str, raw: &str) -> Result<f64, ValidationError> {
    raw.parse::<f64>()
        .map_err(|_| ValidationError::InvalidNumber {
            field,
            value: raw.to_owned(),
        })
}

fn parse_volume(raw: &str) -> Result<u64, ValidationError> {
    let value = raw
        .parse::<i64>()
        .map_err(|_| ValidationError::InvalidNumber {
            field: "volume",
            value: raw.to_owned(),
        })?;
    u64::try_from(value).map_err(|_| ValidationError::NegativeValue { field: "volume" })
}

// Optional ratios fall back to NULL rather than rejecting the line.
fn parse_optional(raw: &str) -> Option<f64> {
    if raw.is_empty() {
        return None;
    }
    raw.parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "id,stock_name,close_price,open_price,high_price,low_price,volume,market_cap,pe_ratio,dividend_yield,setor,trade_date\n";

    fn load(body: &str) -> LoadOutcome {
        let input = format!("{HEADER}{body}");
        CsvLoader::load_reader(input.as_bytes()).expect("load")
    }

    #[test]
    fn parses_complete_line() {
        let outcome = load(
            "2330, TSMC ,580.00,575.00,585.00,572.00,25000000,15000000000000,15.5,2.1,Semiconductors,2024-01-02\n",
        );

        assert!(outcome.skipped.is_empty());
        let record = &outcome.records[0];
        assert_eq!(record.security_id.get(), 2330);
        assert_eq!(record.stock_name, "TSMC");
        assert_eq!(record.close_price, 580.0);
        assert_eq!(record.open_price, 575.0);
        assert_eq!(record.high_price, 585.0);
        assert_eq!(record.low_price, 572.0);
        assert_eq!(record.volume, 25_000_000);
        assert_eq!(record.pe_ratio, Some(15.5));
        assert_eq!(record.sector.as_deref(), Some("Semiconductors"));
        assert_eq!(record.trade_date.to_string(), "2024-01-02");
    }

    #[test]
    fn blank_ratios_become_none() {
        let outcome = load("1,Acme,10,10,11,9,100,1000,,,,2024-01-02\n");

        let record = &outcome.records[0];
        assert_eq!(record.pe_ratio, None);
        assert_eq!(record.dividend_yield, None);
        assert_eq!(record.sector, None);
    }

    #[test]
    fn reports_skipped_lines_with_line_numbers() {
        let outcome = load(concat!(
            "1,Acme,10,10,11,9,100,1000,1,1,Tech,2024-01-02\n",
            "1,Acme,10,10,11\n",
            "2,Beta,abc,10,11,9,100,1000,1,1,Tech,2024-01-02\n",
            "3,Gamma,10,10,11,9,-5,1000,1,1,Tech,2024-01-02\n",
            "4,Delta,10,10,11,9,100,1000,1,1,Tech,2024/01/02\n",
        ));

        assert_eq!(outcome.lines_read, 5);
        assert_eq!(outcome.records.len(), 1);
        let lines: Vec<u64> = outcome.skipped.iter().map(|skipped| skipped.line).collect();
        assert_eq!(lines, vec![3, 4, 5, 6]);
        assert_eq!(outcome.skipped[0].reason, SkipReason::Incomplete { fields: 5 });
        assert!(matches!(
            outcome.skipped[2].reason,
            SkipReason::Malformed { ref message } if message.contains("volume")
        ));
    }

    #[test]
    fn second_occurrence_of_key_is_skipped() {
        let outcome = load(concat!(
            "1,Acme,10,10,11,9,100,1000,1,1,Tech,2024-01-02\n",
            "1,Acme,12,10,13,9,100,1000,1,1,Tech,2024-01-02\n",
        ));

        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].close_price, 10.0);
        assert!(matches!(
            outcome.skipped[0].reason,
            SkipReason::Duplicate { .. }
        ));
    }

    #[test]
    fn non_finite_values_are_malformed() {
        let outcome = load("1,Acme,NaN,10,11,9,100,1000,1,1,Tech,2024-01-02\n");
        assert!(outcome.records.is_empty());
        assert!(matches!(
            outcome.skipped[0].reason,
            SkipReason::Malformed { .. }
        ));
    }

    #[test]
    fn empty_input_has_no_header() {
        let err = CsvLoader::load_reader("".as_bytes()).expect_err("must fail");
        assert!(matches!(err, LoadError::MissingHeader));
    }

    #[test]
    fn loads_from_path() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("stocks.csv");
        std::fs::write(&path, format!("{HEADER}1,Acme,10,10,11,9,100,1000,,,,2024-01-02\n"))
            .expect("write");

        let outcome = CsvLoader::load_path(&path).expect("load");
        assert_eq!(outcome.records.len(), 1);
    }

    #[test]
    fn missing_file_is_reported_with_path() {
        let err = CsvLoader::load_path("/definitely/not/here.csv").expect_err("must fail");
        assert!(matches!(err, LoadError::Open { .. }));
    }
}

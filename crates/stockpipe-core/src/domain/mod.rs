mod record;
mod security;
mod timestamp;
mod trade_date;

pub use record::{DailyRecord, Prices};
pub use security::SecurityId;
pub use timestamp::UtcDateTime;
pub use trade_date::TradeDate;

//! Database views used by run summaries.

use ::duckdb::Connection;

/// Create the reporting views.
///
/// - `vw_dsa_summary`: count of rows and positive/negative/zero DSA values,
///   with the minimum and maximum DSA
/// - `vw_latest_by_security`: each security's most recent trading day
///
/// # Errors
/// Returns an error if the view creation SQL fails to execute.
pub fn create_views(connection: &Connection) -> Result<(), ::duckdb::Error> {
    connection.execute_batch(
        r"
CREATE OR REPLACE VIEW vw_dsa_summary AS
SELECT
    COUNT(*) AS total,
    COUNT(CASE WHEN dsa_indicator > 0 THEN 1 END) AS positive,
    COUNT(CASE WHEN dsa_indicator < 0 THEN 1 END) AS negative,
    COUNT(CASE WHEN dsa_indicator = 0 THEN 1 END) AS zero,
    MIN(dsa_indicator) AS min_dsa,
    MAX(dsa_indicator) AS max_dsa
FROM stock_data;

CREATE OR REPLACE VIEW vw_latest_by_security AS
SELECT *
FROM (
    SELECT
        *,
        ROW_NUMBER() OVER (PARTITION BY security_id ORDER BY trade_date DESC) AS recency
    FROM stock_data
)
WHERE recency = 1;
",
    )?;

    Ok(())
}

//! Behavior-driven tests for the DuckDB warehouse.

use stockpipe_core::{run_stages, Stage, StockRecord};
use stockpipe_tests::{open_warehouse, sample_records, seeded_warehouse};
use stockpipe_warehouse::{MovingAverageRow, QueryGuardrails, WarehouseError};
use tempfile::tempdir;

#[test]
fn importing_again_replaces_the_previous_data() {
    // Given: A warehouse holding the sample rows
    let temp = tempdir().expect("tempdir");
    let warehouse = seeded_warehouse(temp.path());
    assert_eq!(warehouse.row_count().expect("count"), 9);

    // When: A smaller file is imported
    let rows: Vec<StockRecord> = sample_records()
        .iter()
        .filter(|record| record.security_id.get() == 2317)
        .map(StockRecord::from)
        .collect();
    let imported = warehouse.replace_stock_data(&rows).expect("import");

    // Then: Only the new rows remain
    assert_eq!(imported, 3);
    assert_eq!(warehouse.row_count().expect("count"), 3);
    assert!(warehouse.latest_rows(Some(2330), 5).expect("rows").is_empty());
}

#[test]
fn write_back_never_creates_rows() {
    // Given: A warehouse holding the sample rows
    let temp = tempdir().expect("tempdir");
    let warehouse = seeded_warehouse(temp.path());

    // When: Moving averages are written for a security that is not stored
    let updated = warehouse
        .write_moving_averages(
            9999,
            &[MovingAverageRow {
                trade_date: String::from("2024-01-02"),
                ma_5_days: 1.0,
            }],
        )
        .expect("write");

    // Then: Nothing is updated and the row count is unchanged
    assert_eq!(updated, 0);
    assert_eq!(warehouse.row_count().expect("count"), 9);
}

#[test]
fn summary_view_counts_dsa_signs_after_compute() {
    // Given: A computed warehouse
    let temp = tempdir().expect("tempdir");
    let warehouse = seeded_warehouse(temp.path());
    run_stages(&warehouse, Stage::All).expect("compute");

    // When: The summary is read
    let summary = warehouse.dsa_summary().expect("summary");

    // Then: One flat day is zero and every other row is positive
    assert_eq!(summary.total, 9);
    assert_eq!(summary.zero, 1);
    assert_eq!(summary.positive, 8);
    assert_eq!(summary.negative, 0);
    assert_eq!(summary.min_dsa, Some(0.0));
}

#[test]
fn read_only_sql_rejects_writes_but_answers_queries() {
    // Given: A warehouse holding the sample rows
    let temp = tempdir().expect("tempdir");
    let warehouse = seeded_warehouse(temp.path());

    // When: A write is attempted without permission
    let error = warehouse
        .execute_query("DELETE FROM stock_data", QueryGuardrails::default(), false)
        .expect_err("must be rejected");

    // Then: It is rejected and the data is untouched
    assert!(matches!(error, WarehouseError::QueryRejected(_)));
    assert_eq!(warehouse.row_count().expect("count"), 9);

    // And: Reads respect the row guardrail
    let result = warehouse
        .execute_query(
            "SELECT * FROM stock_data ORDER BY trade_date",
            QueryGuardrails {
                max_rows: 4,
                query_timeout_ms: 5_000,
            },
            false,
        )
        .expect("query");
    assert_eq!(result.row_count, 4);
    assert!(result.truncated);
}

#[test]
fn latest_view_has_one_row_per_security() {
    // Given: A warehouse holding two securities
    let temp = tempdir().expect("tempdir");
    let warehouse = seeded_warehouse(temp.path());

    // When: The latest-by-security view is queried
    let result = warehouse
        .execute_query(
            "SELECT security_id, CAST(trade_date AS VARCHAR) FROM vw_latest_by_security ORDER BY security_id",
            QueryGuardrails::default(),
            false,
        )
        .expect("query");

    // Then: Each security appears once with its most recent day
    assert_eq!(result.row_count, 2);
    assert_eq!(result.rows[0][1], "2024-01-04");
    assert_eq!(result.rows[1][1], "2024-01-09");
}

#[test]
fn reopening_keeps_data_and_schema() {
    // Given: A warehouse that was written and closed
    let temp = tempdir().expect("tempdir");
    drop(seeded_warehouse(temp.path()));

    // When: It is opened again
    let warehouse = open_warehouse(temp.path());

    // Then: The rows are still there
    assert_eq!(warehouse.row_count().expect("count"), 9);
}

#[test]
fn read_only_sql_discards_data_modifying_ctes() {
    // Given: A warehouse holding the sample rows
    let temp = tempdir().expect("tempdir");
    let warehouse = seeded_warehouse(temp.path());

    // When: Writes hidden behind a WITH clause run without permission
    for sql in [
        "WITH x AS (SELECT 1) DELETE FROM stock_data WHERE security_id = 2317",
        "WITH x AS (SELECT 1) UPDATE stock_data SET close_price = -1",
    ] {
        let _ = warehouse.execute_query(sql, QueryGuardrails::default(), false);
    }

    // Then: Every row is still stored with its original prices
    assert_eq!(warehouse.row_count().expect("count"), 9);
    let result = warehouse
        .execute_query(
            "SELECT COUNT(*) FROM stock_data WHERE close_price < 0",
            QueryGuardrails::default(),
            false,
        )
        .expect("query");
    assert_eq!(result.rows[0][0], 0);
}

#[test]
fn read_only_sql_rejects_explain_analyze() {
    // Given: A warehouse holding the sample rows
    let temp = tempdir().expect("tempdir");
    let warehouse = seeded_warehouse(temp.path());

    // When: EXPLAIN ANALYZE wraps a delete
    let error = warehouse
        .execute_query(
            "EXPLAIN ANALYZE DELETE FROM stock_data",
            QueryGuardrails::default(),
            false,
        )
        .expect_err("must be rejected");

    // Then: It is rejected before running and the data is untouched
    assert!(matches!(error, WarehouseError::QueryRejected(_)));
    assert_eq!(warehouse.row_count().expect("count"), 9);
}

#[test]
fn write_mode_keeps_data_modifying_ctes() {
    // Given: A warehouse holding the sample rows
    let temp = tempdir().expect("tempdir");
    let warehouse = seeded_warehouse(temp.path());

    // When: The same CTE delete runs with write permission
    warehouse
        .execute_query(
            "WITH x AS (SELECT 1) DELETE FROM stock_data WHERE security_id = 2317",
            QueryGuardrails::default(),
            true,
        )
        .expect("write");

    // Then: The deleted security is gone
    assert_eq!(warehouse.row_count().expect("count"), 6);
}

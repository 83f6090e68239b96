//! Behavior-driven tests for the indicator stages, run against both the
//! in-memory store and a real DuckDB warehouse.

use stockpipe_core::{
    run_dsa_stage, run_moving_average_stage, run_stages, MemoryStore, SecurityId, Stage,
    TradeDate, MA_WINDOW,
};
use stockpipe_tests::{sample_records, seeded_warehouse};
use tempfile::tempdir;

fn id(value: i32) -> SecurityId {
    SecurityId::new(value)
}

fn date(value: &str) -> TradeDate {
    TradeDate::parse(value).expect("valid date")
}

#[test]
fn moving_average_grows_then_slides_per_security() {
    // Given: Interleaved history for two securities
    let store = MemoryStore::from_records(&sample_records());

    // When: The moving-average stage runs
    let report = run_moving_average_stage(&store, MA_WINDOW).expect("stage");

    // Then: Each security is windowed over its own closes only
    assert_eq!(report.securities_processed, 2);
    assert_eq!(report.rows_updated, 9);

    let tsmc: Vec<Option<f64>> = [
        "2024-01-02",
        "2024-01-03",
        "2024-01-04",
        "2024-01-05",
        "2024-01-08",
        "2024-01-09",
    ]
    .iter()
    .map(|day| store.moving_average(id(2330), date(day)))
    .collect();
    assert_eq!(
        tsmc,
        vec![Some(10.0), Some(15.0), Some(20.0), Some(25.0), Some(30.0), Some(40.0)]
    );
    assert_eq!(store.moving_average(id(2317), date("2024-01-04")), Some(200.0));
}

#[test]
fn dsa_is_computed_from_each_days_own_range() {
    // Given: Stored rows including a flat day
    let store = MemoryStore::from_records(&sample_records());

    // When: The DSA stage runs
    let report = run_dsa_stage(&store).expect("stage");

    // Then: Every row is updated
    assert_eq!(report.rows_read, 9);
    assert_eq!(report.rows_updated, 9);

    // And: The values follow the formula, with zero for a flat day
    let tsmc = store.dsa(id(2330), date("2024-01-02")).expect("dsa");
    assert!((tsmc - 0.6).abs() < 1e-12);
    assert_eq!(store.dsa(id(2317), date("2024-01-02")), Some(0.0));
    let hon_hai = store.dsa(id(2317), date("2024-01-03")).expect("dsa");
    assert!((hon_hai - 0.12).abs() < 1e-12);
}

#[test]
fn warehouse_pipeline_matches_in_memory_pipeline() {
    // Given: The same rows in memory and in a DuckDB warehouse
    let temp = tempdir().expect("tempdir");
    let warehouse = seeded_warehouse(temp.path());
    let store = MemoryStore::from_records(&sample_records());

    // When: Every stage runs against both
    let from_warehouse = run_stages(&warehouse, Stage::All).expect("warehouse run");
    let from_memory = run_stages(&store, Stage::All).expect("memory run");

    // Then: The reports agree
    assert_eq!(from_warehouse, from_memory);

    // And: The warehouse holds the same values
    let rows = warehouse.latest_rows(Some(2330), 1).expect("latest");
    assert_eq!(rows[0].trade_date, "2024-01-09");
    assert_eq!(rows[0].ma_5_days, Some(40.0));
    assert_eq!(
        rows[0].dsa_indicator,
        store.dsa(id(2330), date("2024-01-09"))
    );
}

#[test]
fn running_twice_changes_nothing() {
    // Given: A warehouse whose indicators were already computed
    let temp = tempdir().expect("tempdir");
    let warehouse = seeded_warehouse(temp.path());
    run_stages(&warehouse, Stage::All).expect("first run");
    let before = warehouse.latest_rows(None, 20).expect("rows");

    // When: The stages run again
    run_stages(&warehouse, Stage::All).expect("second run");

    // Then: Every stored value is identical and no rows were added
    let after = warehouse.latest_rows(None, 20).expect("rows");
    assert_eq!(before, after);
    assert_eq!(warehouse.row_count().expect("count"), 9);
}

#[test]
fn one_failing_security_leaves_its_old_values_and_others_proceed() {
    // Given: A store that rejects writes for 2317 after a first full run
    let store = MemoryStore::from_records(&sample_records());
    run_moving_average_stage(&store, MA_WINDOW).expect("first run");
    let previous = store.moving_average(id(2317), date("2024-01-04"));
    store.fail_moving_averages_for(id(2317));

    // When: The moving-average stage runs again
    let report = run_moving_average_stage(&store, MA_WINDOW).expect("stage");

    // Then: The failure is reported rather than aborting the stage
    assert_eq!(report.securities_failed, 1);
    assert_eq!(report.securities_processed, 1);
    assert_eq!(report.failures[0].security_id, id(2317));

    // And: 2317 keeps exactly its previous values
    assert_eq!(store.moving_average(id(2317), date("2024-01-04")), previous);
    assert_eq!(store.moving_average(id(2330), date("2024-01-09")), Some(40.0));
}

#[test]
fn an_empty_warehouse_runs_cleanly() {
    // Given: A warehouse with no rows
    let temp = tempdir().expect("tempdir");
    let warehouse = stockpipe_tests::open_warehouse(temp.path());

    // When: Every stage runs
    let report = run_stages(&warehouse, Stage::All).expect("run");

    // Then: Nothing is read or written
    assert_eq!(report.dsa.map(|dsa| dsa.rows_updated), Some(0));
    assert_eq!(report.moving_average.map(|ma| ma.rows_read), Some(0));
}

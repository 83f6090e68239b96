//! Command-line arguments for `stockpipe`.
//!
//! | Command | Description |
//! |---------|-------------|
//! | `import` | Replace stored records with the contents of a CSV file |
//! | `compute` | Run the DSA and/or moving-average stages |
//! | `run` | `import`, then every stage, then the `report` summary |
//! | `report` | DSA statistics and the most recent rows |
//! | `sql` | Query the local DuckDB warehouse |
//!
//! ```bash
//! stockpipe run data/stock_data.csv --pretty
//! stockpipe compute --stage ma
//! stockpipe report --security 2330 --limit 5 --format table
//! stockpipe sql "SELECT security_id, AVG(dsa_indicator) FROM stock_data GROUP BY 1"
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Daily stock record pipeline: CSV import, DSA indicator and 5-day moving average.
#[derive(Debug, Parser)]
#[command(
    name = "stockpipe",
    author,
    version,
    about = "Daily stock record pipeline with DSA and 5-day moving average"
)]
pub struct Cli {
    /// Output format for results.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Treat warnings and errors as failures (exit code 5).
    #[arg(long, global = true, default_value_t = false)]
    pub strict: bool,

    /// Data directory holding `warehouse.duckdb`.
    ///
    /// Defaults to `$STOCKPIPE_HOME`, then `~/.stockpipe`.
    #[arg(long, global = true)]
    pub home: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable layout for terminals.
    Table,
    /// Single JSON object.
    Json,
    /// Newline-delimited JSON.
    Ndjson,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Clear stored records and load a CSV file.
    Import(ImportArgs),

    /// Compute indicator columns for stored records.
    Compute(ComputeArgs),

    /// Import a CSV file, compute every stage and print the summary.
    Run(RunArgs),

    /// Show DSA statistics and the most recent rows.
    Report(ReportArgs),

    /// Run SQL against the local warehouse.
    Sql(SqlArgs),
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    /// CSV file with one record per line and a header row.
    pub file: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StageSelector {
    /// DSA indicator only.
    Dsa,
    /// 5-day moving average only.
    Ma,
    /// DSA, then moving average.
    All,
}

#[derive(Debug, Args)]
pub struct ComputeArgs {
    /// Stage(s) to run.
    #[arg(long, value_enum, default_value_t = StageSelector::All)]
    pub stage: StageSelector,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// CSV file with one record per line and a header row.
    pub file: PathBuf,

    #[command(flatten)]
    pub report: ReportArgs,
}

#[derive(Debug, Clone, Args)]
pub struct ReportArgs {
    /// Security whose latest rows are shown.
    #[arg(long, default_value = "2330")]
    pub security: String,

    /// Number of rows to show.
    #[arg(long, default_value_t = 5)]
    pub limit: usize,

    /// Show the latest rows across all securities instead of one.
    #[arg(long, default_value_t = false)]
    pub all: bool,
}

#[derive(Debug, Args)]
pub struct SqlArgs {
    /// SQL query to execute.
    pub query: String,

    /// Allow write operations (INSERT, UPDATE, DELETE, CREATE, etc.).
    ///
    /// Without this flag, only SELECT and CTE queries are allowed.
    #[arg(long, default_value_t = false)]
    pub write: bool,

    /// Maximum number of rows to return.
    #[arg(long, default_value_t = 10_000)]
    pub max_rows: usize,

    /// Query timeout in milliseconds.
    #[arg(long, default_value_t = 5_000)]
    pub query_timeout_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "stockpipe",
            "compute",
            "--stage",
            "ma",
            "--format",
            "table",
            "--strict",
        ])
        .expect("args should parse");

        assert_eq!(cli.format, OutputFormat::Table);
        assert!(cli.strict);
        match cli.command {
            Command::Compute(args) => assert_eq!(args.stage, StageSelector::Ma),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn report_defaults_to_security_2330() {
        let cli = Cli::try_parse_from(["stockpipe", "report"]).expect("args should parse");
        match cli.command {
            Command::Report(args) => {
                assert_eq!(args.security, "2330");
                assert_eq!(args.limit, 5);
                assert!(!args.all);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_stage() {
        assert!(Cli::try_parse_from(["stockpipe", "compute", "--stage", "ema"]).is_err());
    }
}

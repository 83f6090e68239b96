mod compute;
mod import;
mod report;
mod run;
mod sql;

use std::time::Instant;

use serde_json::Value;
use stockpipe_core::{Envelope, EnvelopeError, EnvelopeMeta, Warehouse, WarehouseConfig};
use uuid::Uuid;

use crate::cli::{Cli, Command};
use crate::error::CliError;

pub struct CommandResult {
    pub data: Value,
    pub warnings: Vec<String>,
    pub errors: Vec<EnvelopeError>,
}

impl CommandResult {
    pub fn ok(data: Value) -> Self {
        Self {
            data,
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings.extend(warnings);
        self
    }

    pub fn with_errors(mut self, errors: Vec<EnvelopeError>) -> Self {
        self.errors.extend(errors);
        self
    }
}

pub fn run(cli: &Cli) -> Result<Envelope<Value>, CliError> {
    let started = Instant::now();
    let warehouse = open_warehouse(cli)?;

    let command_result = match &cli.command {
        Command::Import(args) => import::run(args, &warehouse)?,
        Command::Compute(args) => compute::run(args, &warehouse)?,
        Command::Run(args) => run::run(args, &warehouse)?,
        Command::Report(args) => report::run(args, &warehouse)?,
        Command::Sql(args) => sql::run(args, &warehouse)?,
    };

    let CommandResult {
        data,
        warnings,
        errors,
    } = command_result;

    let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    let mut meta = EnvelopeMeta::new(Uuid::new_v4().to_string(), latency_ms)?;
    for warning in warnings {
        meta.push_warning(warning);
    }

    Envelope::with_errors(meta, data, errors).map_err(CliError::from)
}

fn open_warehouse(cli: &Cli) -> Result<Warehouse, CliError> {
    let config = match &cli.home {
        Some(home) => WarehouseConfig::with_home(home),
        None => WarehouseConfig::default(),
    };
    tracing::debug!(db_path = %config.db_path.display(), "opening warehouse");
    Ok(Warehouse::open(config)?)
}

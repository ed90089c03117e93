use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use cityweather_core::{AppError, Config, ConfigError, NoMatchPolicy, ResultOrdering};
use cityweather_services::build_aggregator;
use tokio_util::sync::CancellationToken;

/// Look up current weather for many location names at once.
///
/// Every name is resolved to its location identifiers and weather is fetched
/// for each identifier, with a bounded number of upstream calls in flight.
/// The combined records and failures are printed as JSON.
///
/// Examples:
///   cityweather London Paris "San Francisco"
///   cityweather --workers 2 --attempts 5 Springfield Atlantis
///   cityweather --config ./cityweather.toml --ordering completion Oslo
#[derive(Parser)]
#[command(name = "cityweather", version, about, long_about = None)]
struct Cli {
    /// Location names to look up
    #[arg(required = true)]
    names: Vec<String>,

    /// Config file (defaults to the per-user config, created on first run)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Maximum concurrent upstream calls
    #[arg(long, short = 'w')]
    workers: Option<usize>,

    /// Total attempts per upstream call, first try included
    #[arg(long)]
    attempts: Option<u32>,

    /// Abort the whole aggregation after this many milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Result order: input or completion
    #[arg(long, value_parser = parse_ordering)]
    ordering: Option<ResultOrdering>,

    /// Leave names with no matching location out of the failure list
    #[arg(long)]
    drop_no_match: bool,

    /// Debug logging (RUST_LOG overrides)
    #[arg(long, short = 'v')]
    verbose: bool,
}

fn parse_ordering(s: &str) -> Result<ResultOrdering, String> {
    match s.to_lowercase().as_str() {
        "input" => Ok(ResultOrdering::Input),
        "completion" => Ok(ResultOrdering::Completion),
        _ => Err(format!("Unknown ordering '{}'. Use 'input' or 'completion'.", s)),
    }
}

impl Cli {
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(workers) = self.workers {
            config.aggregate.max_workers = workers;
        }
        if let Some(attempts) = self.attempts {
            config.retry.max_attempts = attempts;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.aggregate.call_timeout_ms = Some(timeout_ms);
        }
        if let Some(ordering) = self.ordering {
            config.aggregate.ordering = ordering;
        }
        if self.drop_no_match {
            config.aggregate.no_match = NoMatchPolicy::Drop;
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("Error: {}", e.user_message());
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode, AppError> {
    cityweather_core::init(if cli.verbose { "debug" } else { "info" })?;

    let (mut config, _) = Config::load_validated(cli.config.as_deref())?;
    cli.apply_overrides(&mut config);

    let validation = config.validate();
    if !validation.is_valid() {
        return Err(ConfigError::Invalid(validation.error_summary()).into());
    }

    let aggregator = build_aggregator(&config)?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling outstanding lookups");
            on_interrupt.cancel();
        }
    });

    let outcome = match aggregator.aggregate_with_cancel(&cli.names[..], &cancel).await {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(ExitCode::FAILURE);
        }
    };

    let json = serde_json::to_string_pretty(&outcome).map_err(|e| AppError::Other(e.into()))?;
    println!("{}", json);

    if !outcome.is_complete() {
        tracing::info!(
            "{} of {} lookups did not produce weather",
            outcome.failures.len(),
            outcome.failures.len() + outcome.records.len()
        );
    }
    Ok(ExitCode::SUCCESS)
}

mod config;

use clap::{Args, Parser};
use config::{Config, ConfigError, LoggingConfig, MetricsConfig};
use entity::EntityServiceError;
use metrics_exporter_statsd::{StatsdBuilder, StatsdError};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const METRICS_PREFIX: &str = "id2osm";

#[derive(Parser)]
#[command(name = "id2osm", version, about = "External id to OSM id mapping service")]
enum CliCommand {
    /// Start the entity service
    Run(ConfigArgs),
    /// Create the database schema and exit
    Migrate(ConfigArgs),
}

#[derive(Args)]
struct ConfigArgs {
    /// Path to the YAML config file
    #[arg(long)]
    config: PathBuf,
}

impl CliCommand {
    fn config_path(&self) -> &PathBuf {
        match self {
            CliCommand::Run(args) | CliCommand::Migrate(args) => &args.config,
        }
    }
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("could not build statsd recorder: {0}")]
    Metrics(#[from] StatsdError),
    #[error("could not install metrics recorder: {0}")]
    Recorder(String),
    #[error("could not start runtime: {0}")]
    Runtime(#[from] std::io::Error),
    #[error(transparent)]
    Service(#[from] EntityServiceError),
}

fn init_logging(logging: &LoggingConfig) -> Option<sentry::ClientInitGuard> {
    let guard = logging.sentry_dsn.as_deref().map(|dsn| {
        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(guard.as_ref().map(|_| sentry::integrations::tracing::layer()))
        .init();

    guard
}

fn init_metrics(metrics: &MetricsConfig) -> Result<(), CliError> {
    let recorder = StatsdBuilder::from(metrics.statsd_host.as_str(), metrics.statsd_port)
        .build(Some(METRICS_PREFIX))?;
    metrics::set_global_recorder(recorder).map_err(|e| CliError::Recorder(e.to_string()))?;
    shared::metrics_defs::describe_all(entity::metrics_defs::ALL_METRICS);

    tracing::info!(
        host = %metrics.statsd_host,
        port = metrics.statsd_port,
        "statsd metrics enabled"
    );
    Ok(())
}

fn run(cli: CliCommand) -> Result<(), CliError> {
    let config = Config::from_file(cli.config_path())?;
    let _sentry = init_logging(&config.common.logging);

    match cli {
        CliCommand::Run(_) => {
            if let Some(metrics) = &config.common.metrics {
                init_metrics(metrics)?;
            }

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            runtime.block_on(entity::run(config.entity))?;
        }
        CliCommand::Migrate(_) => entity::migrate(&config.entity)?,
    }

    Ok(())
}

fn main() -> ExitCode {
    let cli = CliCommand::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "id2osm exited with an error");
            eprintln!("id2osm: {e}");
            ExitCode::FAILURE
        }
    }
}

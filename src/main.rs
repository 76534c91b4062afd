use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use weather_pipeline::config::PipelineConfig;
use weather_pipeline::logging::{self, Component, LogLevel};
use weather_pipeline::model::StageOutcome;
use weather_pipeline::pipeline::LocalPipeline;
use weather_pipeline::trigger;

#[derive(Debug, Parser)]
#[command(name = "weather_pipeline", version, about = "Hourly forecast ingestion and validation")]
struct Cli {
    /// TOML configuration file
    #[arg(long, short, global = true, env = "PIPELINE_CONFIG")]
    config: Option<PathBuf>,

    /// debug, info, warn or error
    #[arg(long, global = true, default_value = "info")]
    log_level: LogLevel,

    /// Also append log lines to this file
    #[arg(long, global = true)]
    log_file: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fetch the forecast once and land it in the staging bucket
    Ingest,
    /// Validate and partition one staged object
    Validate {
        #[arg(long, requires = "key", conflicts_with = "event")]
        bucket: Option<String>,
        #[arg(long, requires = "bucket")]
        key: Option<String>,
        /// JSON file holding an object-created event (S3 notification or {bucket, key})
        #[arg(long)]
        event: Option<PathBuf>,
    },
    /// Ingest on the configured interval, validating each staged object
    Run {
        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,
        /// Seconds between cycles, overriding the configured interval
        #[arg(long)]
        interval_secs: Option<u64>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_logger(cli.log_level, cli.log_file.as_deref(), cli.log_file.is_some());

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(message) => {
            logging::error(Component::System, None, &message);
            ExitCode::from(2)
        }
    }
}

/// Returns whether every stage outcome succeeded.
fn run(cli: Cli) -> Result<bool, String> {
    let mut config = PipelineConfig::load(cli.config.as_deref()).map_err(|e| e.to_string())?;
    if let Command::Run {
        interval_secs: Some(secs),
        ..
    } = cli.command
    {
        config.set_schedule_interval(secs).map_err(|e| e.to_string())?;
    }
    let pipeline = LocalPipeline::from_config(config).map_err(|e| e.to_string())?;

    let outcomes = match cli.command {
        Command::Ingest => vec![pipeline.ingest()],
        Command::Validate { bucket, key, event } => match (bucket, key, event) {
            (Some(bucket), Some(key), None) => vec![pipeline.validate(&bucket, &key)],
            (None, None, Some(path)) => {
                let payload = fs::read_to_string(&path)
                    .map_err(|e| format!("failed to read event file {}: {}", path.display(), e))?;
                let events = trigger::parse_event_payload(&payload).map_err(|e| e.to_string())?;
                pipeline.dispatch(&events)
            }
            _ => return Err("validate needs either --bucket and --key, or --event".to_string()),
        },
        Command::Run { once: true, .. } => pipeline.run_cycle(),
        Command::Run { once: false, .. } => {
            pipeline.run_scheduled(|outcomes| print_outcomes(outcomes));
            return Ok(true);
        }
    };

    print_outcomes(&outcomes);
    Ok(outcomes.iter().all(StageOutcome::is_success))
}

fn print_outcomes(outcomes: &[StageOutcome]) {
    for outcome in outcomes {
        match serde_json::to_string(outcome) {
            Ok(line) => println!("{}", line),
            Err(e) => logging::error(Component::System, None, &format!("failed to encode outcome: {}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_accepts_interval_override() {
        let cli = Cli::try_parse_from(["weather_pipeline", "run", "--once", "--interval-secs", "60"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Run {
                once: true,
                interval_secs: Some(60)
            }
        ));
    }

    #[test]
    fn test_run_interval_defaults_to_config() {
        let cli = Cli::try_parse_from(["weather_pipeline", "run"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Run {
                once: false,
                interval_secs: None
            }
        ));
    }

    #[test]
    fn test_interval_must_be_a_number() {
        assert!(Cli::try_parse_from(["weather_pipeline", "run", "--interval-secs", "hourly"]).is_err());
    }
}

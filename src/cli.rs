use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api::router;
use crate::campaigns::{CampaignDirectory, Campaigns};
use crate::charts::generate_simulation_chart;
use crate::config::AppConfig;
use crate::errors::SimulationError;
use crate::logger::{sanitize_filename, ConsoleReceiver, FileReceiver, LogEvent, Logger};
use crate::report::SimulationReport;
use crate::scenarios::get_scenario_catalog;
use crate::service::{run_campaign, run_synthetic};
use crate::simulationrun::{RunLimits, SimulationRun};
use crate::state::AppState;
use crate::traffic::ReplayTraffic;
use crate::{log, logln};

/// Constrained online bid-pacing simulator
#[derive(Parser)]
#[command(name = "pacing-simulator", version, about = "Simulates OnlineLp bid pacing against a budget and a CPA constraint")]
pub struct Cli {
    /// TOML configuration file (defaults to $PACING_SIM_CONFIG, then built-in defaults)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API
    Serve {
        /// Address to bind, overrides the configuration
        #[arg(long)]
        bind: Option<String>,
    },

    /// Simulate one campaign and print the history
    Simulate {
        #[arg(long)]
        campaign_id: u64,

        /// Number of steps (defaults to the configured number)
        #[arg(long)]
        steps: Option<usize>,

        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,

        /// Also write an SVG chart of the run
        #[arg(long)]
        chart: Option<PathBuf>,

        /// Replay recorded opportunities from a JSON file instead of synthetic traffic
        #[arg(long)]
        replay: Option<PathBuf>,
    },

    /// List the campaigns available to simulate
    Campaigns,

    /// Run a validation scenario by name, or all of them
    Scenario {
        #[arg(default_value = "all")]
        name: String,
    },

    /// Simulate one campaign and write its SVG chart
    Chart {
        #[arg(long)]
        campaign_id: u64,

        #[arg(long)]
        steps: Option<usize>,

        #[arg(long, default_value = "charts/simulation.svg")]
        out: PathBuf,
    },
}

/// Initialize tracing; logs go to stderr so stdout stays clean for reports
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pacing_simulator=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

pub fn run_cli() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    init_tracing();

    let config = AppConfig::from_env(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { bind } => {
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(serve(config, bind))
        }
        Commands::Simulate { campaign_id, steps, format, chart, replay } => {
            let report = simulate_campaign(&config, campaign_id, steps, replay.as_deref())?;
            match format {
                OutputFormat::Table => {
                    let mut logger = Logger::new();
                    logger.add_receiver(ConsoleReceiver::new(vec![LogEvent::Step, LogEvent::Run]));
                    report.printout(&mut logger);
                }
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
            }
            if let Some(path) = chart {
                write_chart(&report, &path)?;
            }
            Ok(())
        }
        Commands::Campaigns => {
            let mut logger = Logger::new();
            logger.add_receiver(ConsoleReceiver::new(vec![LogEvent::Run]));
            for campaign in Campaigns::from_profiles(&config.campaigns).list() {
                logln!(logger, LogEvent::Run, "{}", campaign.profile_string());
            }
            Ok(())
        }
        Commands::Scenario { name } => run_scenarios(&name),
        Commands::Chart { campaign_id, steps, out } => {
            let report = simulate_campaign(&config, campaign_id, steps, None)?;
            write_chart(&report, &out)
        }
    }
}

fn simulate_campaign(
    config: &AppConfig,
    campaign_id: u64,
    steps: Option<usize>,
    replay: Option<&Path>,
) -> anyhow::Result<SimulationReport> {
    let campaign = Campaigns::from_profiles(&config.campaigns)
        .get(campaign_id)
        .ok_or(SimulationError::CampaignNotFound(campaign_id))?;
    let steps = steps.unwrap_or(config.simulation.default_steps);
    let limits = RunLimits::with_timeout(config.simulation.timeout(), CancellationToken::new());

    let report = match replay {
        Some(path) => {
            let run = SimulationRun::new(&campaign, steps, config.simulation.max_steps)?;
            let traffic = ReplayTraffic::load(&campaign, run.steps, config.simulation.seed, path)
                .with_context(|| format!("loading replay file {}", path.display()))?;
            run_campaign(&run, &traffic, &config.pacing, &limits)?
        }
        None => run_synthetic(config, &campaign, steps, &limits)?,
    };
    Ok(report)
}

fn write_chart(report: &SimulationReport, path: &Path) -> anyhow::Result<()> {
    generate_simulation_chart(report, path).map_err(|e| anyhow::anyhow!("chart generation failed: {}", e))?;
    tracing::info!(path = %path.display(), "chart written");
    Ok(())
}

async fn serve(config: AppConfig, bind: Option<String>) -> anyhow::Result<()> {
    let addr = bind.unwrap_or_else(|| config.server.bind.clone());
    let app = router(AppState::new(config));

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    tracing::info!("API server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

/// Run the named scenario (or all) with console and file receivers
fn run_scenarios(scenario_arg: &str) -> anyhow::Result<()> {
    let all_scenarios = get_scenario_catalog();
    let scenarios: Vec<_> = if scenario_arg == "all" {
        all_scenarios.clone()
    } else {
        match all_scenarios.iter().find(|s| s.short_name == scenario_arg) {
            Some(scenario) => vec![scenario.clone()],
            None => {
                let names: Vec<&str> = all_scenarios.iter().map(|s| s.short_name).collect();
                anyhow::bail!("Scenario '{}' not found. Available scenarios: {}", scenario_arg, names.join(", "));
            }
        }
    };

    // A single scenario also shows its individual validations
    let mut logger = Logger::new();
    if scenario_arg == "all" {
        logger.add_receiver(ConsoleReceiver::new(vec![LogEvent::Validation]));
    } else {
        logger.add_receiver(ConsoleReceiver::new(vec![LogEvent::Validation, LogEvent::Scenario]));
    }
    let summary_receiver_id =
        logger.add_receiver(FileReceiver::new(&PathBuf::from("log/summary.log"), vec![LogEvent::Validation])?);

    let mut failed = Vec::new();
    for scenario in &scenarios {
        log!(&mut logger, LogEvent::Validation, "{}: ", scenario.short_name);

        let scenario_receiver_id = logger.add_receiver(FileReceiver::new(
            &PathBuf::from(format!("log/{}/scenario.log", sanitize_filename(scenario.short_name))),
            vec![LogEvent::Scenario, LogEvent::Run, LogEvent::Step],
        )?);

        match (scenario.run)(scenario.short_name, &mut logger) {
            Ok(()) => logln!(&mut logger, LogEvent::Validation, "✓ PASSED"),
            Err(e) => {
                logln!(&mut logger, LogEvent::Validation, "✗ FAILED: {}", e);
                failed.push(scenario.short_name);
            }
        }
        let _ = logger.flush();
        logger.remove_receiver(scenario_receiver_id);
    }
    logger.remove_receiver(summary_receiver_id);

    if failed.is_empty() {
        Ok(())
    } else {
        anyhow::bail!("{} scenario(s) failed: {}", failed.len(), failed.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_simulate() {
        let cli = Cli::try_parse_from([
            "pacing-simulator",
            "simulate",
            "--campaign-id",
            "101",
            "--steps",
            "24",
            "--format",
            "json",
        ])
        .unwrap();
        match cli.command {
            Commands::Simulate { campaign_id, steps, format, chart, replay } => {
                assert_eq!(campaign_id, 101);
                assert_eq!(steps, Some(24));
                assert!(matches!(format, OutputFormat::Json));
                assert!(chart.is_none() && replay.is_none());
            }
            _ => panic!("expected simulate"),
        }
    }

    #[test]
    fn test_simulate_campaign_unknown_id() {
        let err = simulate_campaign(&AppConfig::default(), 999, None, None).unwrap_err();
        assert_eq!(
            err.downcast_ref::<SimulationError>(),
            Some(&SimulationError::CampaignNotFound(999))
        );
    }

    #[test]
    fn test_simulate_campaign_from_replay_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replay.json");
        std::fs::write(
            &path,
            r#"[{"step": 0, "p_value": 0.05, "least_winning_cost": 1.0},
                {"step": 1, "p_value": 0.05, "least_winning_cost": 1000.0}]"#,
        )
        .unwrap();
        let report = simulate_campaign(&AppConfig::default(), 101, Some(3), Some(&path)).unwrap();
        assert_eq!(report.history.len(), 3);
        assert_eq!(report.history[0].wins, 1);
        assert_eq!(report.history[1].wins, 0);
        assert_eq!(report.history[2].traffic, 0);
    }

    #[test]
    fn test_simulate_campaign_rejects_replay_without_usable_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replay.json");
        std::fs::write(&path, "[]").unwrap();
        assert!(simulate_campaign(&AppConfig::default(), 101, None, Some(&path)).is_err());

        std::fs::write(&path, r#"[{"step": 500, "p_value": 0.05, "least_winning_cost": 1.0}]"#).unwrap();
        let err = simulate_campaign(&AppConfig::default(), 101, None, Some(&path)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SimulationError>(),
            Some(SimulationError::Validation { field: "replay", .. })
        ));
    }
}

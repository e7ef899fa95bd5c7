use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::campaign::CampaignProfile;
use crate::campaigns::CampaignDirectory;
use crate::config::{AppConfig, PacingConfig};
use crate::controllers::ControllerOnlineLp;
use crate::errors::SimulationError;
use crate::report::SimulationReport;
use crate::simulationrun::{simulate, RunLimits, SimulationRun};
use crate::traffic::{AuctionOutcomeGenerator, SyntheticTraffic};

/// Extra time the async guard waits past the run's own deadline before giving up on it
const TIMEOUT_GRACE: Duration = Duration::from_millis(250);

/// Run one campaign with the OnlineLp controller against the given generator
pub fn run_campaign(
    run: &SimulationRun,
    generator: &dyn AuctionOutcomeGenerator,
    pacing: &PacingConfig,
    limits: &RunLimits,
) -> Result<SimulationReport, SimulationError> {
    let controller = ControllerOnlineLp::from_config(pacing);
    let outcome = simulate(run, generator, &controller, limits)?;
    Ok(SimulationReport::new(run, outcome))
}

/// Validate, build the synthetic traffic and run a campaign; blocking
pub fn run_synthetic(
    config: &AppConfig,
    campaign: &CampaignProfile,
    steps: usize,
    limits: &RunLimits,
) -> Result<SimulationReport, SimulationError> {
    let run = SimulationRun::new(campaign, steps, config.simulation.max_steps)?;
    let traffic = SyntheticTraffic::new(campaign, run.steps, config.simulation.seed, &config.traffic)?;
    run_campaign(&run, &traffic, &config.pacing, limits)
}

/// Answers simulation requests without blocking the async runtime
#[derive(Clone)]
pub struct SimulationService {
    config: Arc<AppConfig>,
    campaigns: Arc<dyn CampaignDirectory>,
}

impl SimulationService {
    pub fn new(config: Arc<AppConfig>, campaigns: Arc<dyn CampaignDirectory>) -> Self {
        Self { config, campaigns }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn campaigns(&self) -> Vec<CampaignProfile> {
        self.campaigns.list()
    }

    pub fn campaign(&self, campaign_id: u64) -> Result<CampaignProfile, SimulationError> {
        self.campaigns
            .get(campaign_id)
            .ok_or(SimulationError::CampaignNotFound(campaign_id))
    }

    /// Simulate with the configured timeout; `steps` defaults to the configured number
    pub async fn simulate(&self, campaign_id: u64, steps: Option<usize>) -> Result<SimulationReport, SimulationError> {
        self.simulate_with_timeout(campaign_id, steps, self.config.simulation.timeout())
            .await
    }

    pub async fn simulate_with_timeout(
        &self,
        campaign_id: u64,
        steps: Option<usize>,
        timeout: Duration,
    ) -> Result<SimulationReport, SimulationError> {
        let campaign = self.campaign(campaign_id)?;
        let steps = steps.unwrap_or(self.config.simulation.default_steps);
        tracing::info!(campaign_id, steps, timeout_ms = timeout.as_millis() as u64, "simulation requested");

        let token = CancellationToken::new();
        let limits = RunLimits::with_timeout(timeout, token.clone());
        let config = self.config.clone();
        let started = Instant::now();
        let handle = tokio::task::spawn_blocking(move || run_synthetic(&config, &campaign, steps, &limits));

        match tokio::time::timeout(timeout + TIMEOUT_GRACE, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => {
                tracing::error!(campaign_id, error = %join_error, "simulation task failed");
                Err(SimulationError::TaskFailed(join_error.to_string()))
            }
            Err(_) => {
                // the run is stuck inside a step; stop it at the next step boundary
                token.cancel();
                let elapsed_ms = started.elapsed().as_millis() as u64;
                tracing::warn!(campaign_id, elapsed_ms, "simulation abandoned after timeout");
                Err(SimulationError::Timeout {
                    completed_steps: 0,
                    elapsed_ms,
                })
            }
        }
    }
}

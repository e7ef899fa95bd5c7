//! Auction outcome generators
//!
//! A generator turns `(alpha, step)` into the traffic, wins, cost and conversions of that step.
//! Each step draws its opportunities from its own seeded stream, and every opportunity consumes
//! the same draws whether it is won or not, so a step's outcome depends only on alpha and
//! grows monotonically with it.

use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::campaign::CampaignProfile;
use crate::competition::{competition_generator, CompetitionGeneratorTrait, ImpressionCompetition};
use crate::config::{TrafficConfig, TrafficRange};
use crate::errors::{ensure_positive, SimulationError};
use crate::impressions::{BidOpportunity, Impressions, StepOutcome};
use crate::utils::step_seed;

/// Source of per-step auction outcomes
pub trait AuctionOutcomeGenerator: Send + Sync {
    fn simulate_step(&self, alpha: f64, step_index: usize) -> Result<StepOutcome, SimulationError>;
}

/// Synthetic traffic with a time-of-day profile
/// The horizon of `steps` is spread over one day; steps falling into peak hours get more opportunities
pub struct SyntheticTraffic {
    campaign_id: u64,
    cpa_constraint: f64,
    steps: usize,
    seed: u64,
    config: TrafficConfig,
    competition: Box<dyn CompetitionGeneratorTrait>,
}

impl SyntheticTraffic {
    pub fn new(
        campaign: &CampaignProfile,
        steps: usize,
        seed: u64,
        config: &TrafficConfig,
    ) -> Result<Self, SimulationError> {
        ensure_positive("cpa_constraint", campaign.cpa_constraint)?;
        if steps == 0 {
            return Err(SimulationError::validation("steps", "must be > 0"));
        }
        config.validate()?;
        Ok(Self {
            campaign_id: campaign.campaign_id,
            cpa_constraint: campaign.cpa_constraint,
            steps,
            seed,
            config: config.clone(),
            competition: competition_generator(&config.competition)?,
        })
    }

    /// Hour of day a step stands for
    pub fn hour_of_step(&self, step_index: usize) -> f64 {
        step_index as f64 / self.steps as f64 * 24.0
    }

    pub fn is_peak(&self, step_index: usize) -> bool {
        let hour = self.hour_of_step(step_index);
        self.config
            .peak_hours
            .iter()
            .any(|[from, to]| *from <= hour && hour <= *to)
    }

    fn traffic_range(&self, step_index: usize) -> TrafficRange {
        if self.is_peak(step_index) {
            self.config.peak_traffic
        } else {
            self.config.off_peak_traffic
        }
    }

    /// Opportunities of one step; identical for every alpha
    pub fn generate_impressions(&self, step_index: usize) -> Impressions {
        let mut rng = StdRng::seed_from_u64(step_seed(self.seed, self.campaign_id, step_index));
        let range = self.traffic_range(step_index);
        let traffic = rng.gen_range(range.min..=range.max);

        let mut opportunities = Vec::with_capacity(traffic as usize);
        for _ in 0..traffic {
            let p_value = rng.gen_range(self.config.p_value_min..=self.config.p_value_max);
            let competition = self
                .competition
                .generate_competition(self.cpa_constraint * p_value, &mut rng);
            let conversion_draw = rng.gen::<f64>();
            opportunities.push(BidOpportunity {
                p_value,
                competition,
                conversion_draw,
            });
        }
        Impressions::new(opportunities)
    }
}

impl AuctionOutcomeGenerator for SyntheticTraffic {
    fn simulate_step(&self, alpha: f64, step_index: usize) -> Result<StepOutcome, SimulationError> {
        let outcome = self
            .generate_impressions(step_index)
            .run_step(alpha, self.cpa_constraint);
        tracing::trace!(step = step_index, alpha, traffic = outcome.traffic, wins = outcome.wins, "synthetic step");
        Ok(outcome)
    }
}

/// One recorded bid opportunity, as exported from auction logs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedOpportunity {
    pub step: usize,
    pub p_value: f64,
    pub least_winning_cost: f64,
}

/// Replays recorded opportunities instead of generating them
/// Conversions are still drawn, from a stream seeded per step
pub struct ReplayTraffic {
    campaign_id: u64,
    cpa_constraint: f64,
    seed: u64,
    by_step: BTreeMap<usize, Vec<RecordedOpportunity>>,
}

impl ReplayTraffic {
    /// Records at or past `steps` are dropped; a replay with nothing inside the horizon is rejected
    pub fn new(
        campaign: &CampaignProfile,
        steps: usize,
        seed: u64,
        records: Vec<RecordedOpportunity>,
    ) -> Result<Self, SimulationError> {
        ensure_positive("cpa_constraint", campaign.cpa_constraint)?;
        if records.is_empty() {
            return Err(SimulationError::validation("replay", "no recorded opportunities"));
        }
        let recorded = records.len();
        let mut by_step: BTreeMap<usize, Vec<RecordedOpportunity>> = BTreeMap::new();
        for record in records {
            if !(record.p_value > 0.0 && record.p_value <= 1.0) {
                return Err(SimulationError::validation(
                    "replay.p_value",
                    format!("must be within (0, 1], got {} at step {}", record.p_value, record.step),
                ));
            }
            if !(record.least_winning_cost.is_finite() && record.least_winning_cost >= 0.0) {
                return Err(SimulationError::validation(
                    "replay.least_winning_cost",
                    format!("must be finite and >= 0, got {} at step {}", record.least_winning_cost, record.step),
                ));
            }
            if record.step < steps {
                by_step.entry(record.step).or_default().push(record);
            }
        }
        if by_step.is_empty() {
            return Err(SimulationError::validation(
                "replay",
                format!("none of the {} recorded opportunities falls within the {} steps of the run", recorded, steps),
            ));
        }
        let kept: usize = by_step.values().map(Vec::len).sum();
        if kept < recorded {
            tracing::warn!(
                campaign_id = campaign.campaign_id,
                dropped = recorded - kept,
                steps,
                "replay records past the run horizon ignored"
            );
        }
        Ok(Self {
            campaign_id: campaign.campaign_id,
            cpa_constraint: campaign.cpa_constraint,
            seed,
            by_step,
        })
    }

    /// Load records from a JSON array file
    pub fn load(campaign: &CampaignProfile, steps: usize, seed: u64, path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let records: Vec<RecordedOpportunity> = serde_json::from_str(&contents)?;
        Ok(Self::new(campaign, steps, seed, records)?)
    }

    pub fn recorded_steps(&self) -> usize {
        self.by_step.len()
    }
}

impl AuctionOutcomeGenerator for ReplayTraffic {
    fn simulate_step(&self, alpha: f64, step_index: usize) -> Result<StepOutcome, SimulationError> {
        let Some(records) = self.by_step.get(&step_index) else {
            return Ok(StepOutcome::default());
        };
        let mut rng = StdRng::seed_from_u64(step_seed(self.seed, self.campaign_id, step_index));
        let opportunities = records
            .iter()
            .map(|record| BidOpportunity {
                p_value: record.p_value,
                competition: ImpressionCompetition::LeastWinningCost(record.least_winning_cost),
                conversion_draw: rng.gen::<f64>(),
            })
            .collect();
        Ok(Impressions::new(opportunities).run_step(alpha, self.cpa_constraint))
    }
}

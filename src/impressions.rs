use serde::{Deserialize, Serialize};

use crate::competition::ImpressionCompetition;
use crate::errors::SimulationError;

/// Represents the result of an auction for one bid opportunity
#[derive(Debug, Clone, PartialEq)]
pub enum AuctionResult {
    Won { cost: f64, converted: bool },
    Lost,
}

/// One bid opportunity offered to the campaign during a step
#[derive(Debug, Clone, PartialEq)]
pub struct BidOpportunity {
    /// Predicted conversion probability
    pub p_value: f64,
    pub competition: ImpressionCompetition,
    /// Uniform draw deciding the conversion if the impression is won
    pub conversion_draw: f64,
}

impl BidOpportunity {
    /// Bid at the CPA threshold scaled by alpha
    pub fn bid(&self, alpha: f64, cpa_constraint: f64) -> f64 {
        alpha * cpa_constraint * self.p_value
    }

    pub fn run_auction(&self, alpha: f64, cpa_constraint: f64) -> AuctionResult {
        match self.competition.resolve(self.bid(alpha, cpa_constraint)) {
            Some(cost) => AuctionResult::Won {
                cost,
                converted: self.conversion_draw < self.p_value,
            },
            None => AuctionResult::Lost,
        }
    }
}

/// Aggregated auction results of one step
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub traffic: u64,
    pub wins: u64,
    pub cost: f64,
    pub conversions: u64,
}

impl StepOutcome {
    /// Reject outcomes that would corrupt the accounting
    pub fn validate(&self, step: usize) -> Result<(), SimulationError> {
        if !self.cost.is_finite() {
            return Err(SimulationError::computation(step, format!("step cost is not finite: {}", self.cost)));
        }
        if self.cost < 0.0 {
            return Err(SimulationError::computation(step, format!("negative step cost: {}", self.cost)));
        }
        if self.wins > self.traffic {
            return Err(SimulationError::computation(
                step,
                format!("wins {} exceed traffic {}", self.wins, self.traffic),
            ));
        }
        if self.conversions > self.wins {
            return Err(SimulationError::computation(
                step,
                format!("conversions {} exceed wins {}", self.conversions, self.wins),
            ));
        }
        if self.wins == 0 && self.cost > 0.0 {
            return Err(SimulationError::computation(step, "cost charged without a win"));
        }
        Ok(())
    }
}

/// Bid opportunities of one step
pub struct Impressions {
    pub opportunities: Vec<BidOpportunity>,
}

impl Impressions {
    pub fn new(opportunities: Vec<BidOpportunity>) -> Self {
        Self { opportunities }
    }

    /// Run every auction of the step at the given alpha
    pub fn run_step(&self, alpha: f64, cpa_constraint: f64) -> StepOutcome {
        let mut outcome = StepOutcome {
            traffic: self.opportunities.len() as u64,
            ..StepOutcome::default()
        };
        for opportunity in &self.opportunities {
            if let AuctionResult::Won { cost, converted } = opportunity.run_auction(alpha, cpa_constraint) {
                outcome.wins += 1;
                outcome.cost += cost;
                if converted {
                    outcome.conversions += 1;
                }
            }
        }
        outcome
    }
}

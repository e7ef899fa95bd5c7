use serde::Serialize;

use crate::config::PacingConfig;
pub use crate::controller_core::ControllerProportionalCore;

/// Everything a controller may look at when choosing the next alpha
/// Cumulative totals already include the step that was just observed
#[derive(Debug, Clone, PartialEq)]
pub struct PacingInput {
    pub alpha: f64,
    pub total_cost: f64,
    pub total_conversions: u64,
    pub step_cost: f64,
    pub step_conversions: u64,
    pub step_traffic: u64,
    pub cpa_constraint: f64,
    pub initial_budget: f64,
    /// Steps still to run after the observed one
    pub remaining_steps: usize,
}

/// Why alpha moved (or did not) after a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Adjustment {
    Hold,
    /// Step had no traffic, nothing to learn from
    NoEvidence,
    CpaOverConstraint,
    Underspend,
    Overspend,
    FinalStep,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PacingDecision {
    Continue { alpha: f64, adjustment: Adjustment },
    /// Budget is gone; no further spend is allowed and the run stops
    Exhausted,
}

/// Trait for pacing controllers driving the bid multiplier
/// Implementations are pure: no I/O and no state outside of the input
pub trait ControllerTrait: Send + Sync {
    /// Alpha used for the very first step
    fn initial_alpha(&self) -> f64;

    /// Calculate alpha for the next step from the observed outcome
    fn next_alpha(&self, input: &PacingInput) -> PacingDecision;

    /// Get a string representation of the controller at the given alpha
    fn controller_string(&self, alpha: f64) -> String;
}

/// Constant implementation of ControllerTrait
/// Bids with a fixed multiplier and only stops on budget exhaustion (unpaced baseline)
pub struct ControllerConstant {
    pub default_value: f64,
}

impl ControllerConstant {
    /// Create a new ControllerConstant with the given default value
    pub fn new(default_value: f64) -> Self {
        Self { default_value }
    }
}

impl ControllerTrait for ControllerConstant {
    fn initial_alpha(&self) -> f64 {
        self.default_value
    }

    fn next_alpha(&self, input: &PacingInput) -> PacingDecision {
        if input.total_cost >= input.initial_budget {
            return PacingDecision::Exhausted;
        }
        PacingDecision::Continue {
            alpha: self.default_value,
            adjustment: Adjustment::Hold,
        }
    }

    fn controller_string(&self, alpha: f64) -> String {
        format!("Constant: {:.4}", alpha)
    }
}

/// Online primal-dual style pacing controller ("OnlineLp")
///
/// Steers realized CPA under the constraint first and uses the remaining freedom
/// to spread the remaining budget evenly over the remaining steps:
/// - budget gone: stop
/// - no traffic in the step: keep alpha
/// - realized CPA above constraint: proportional decrease
/// - otherwise compare step spend with `(remaining budget) / (remaining steps)` and move toward it,
///   increases only while CPA has headroom
///
/// Every move is multiplicative, clamped per step by the proportional core and overall to `[min_alpha, max_alpha]`.
pub struct ControllerOnlineLp {
    pub controller: ControllerProportionalCore,
    pub initial_alpha: f64,
    pub min_alpha: f64,
    pub max_alpha: f64,
}

impl ControllerOnlineLp {
    /// Create a new ControllerOnlineLp with default parameters
    pub fn new() -> Self {
        Self::from_config(&PacingConfig::default())
    }

    pub fn from_config(config: &PacingConfig) -> Self {
        Self {
            controller: ControllerProportionalCore::new_advanced(
                config.tolerance_fraction,
                config.max_adjustment_factor,
                config.proportional_gain,
            ),
            initial_alpha: config.initial_alpha,
            min_alpha: config.min_alpha,
            max_alpha: config.max_alpha,
        }
    }

    /// Realized CPA if there is evidence for one
    /// Without conversions the realized CPA is at least `total_cost`, which only
    /// counts as evidence once it already exceeds the constraint
    fn realized_cpa(input: &PacingInput) -> Option<f64> {
        if input.total_conversions > 0 {
            Some(input.total_cost / input.total_conversions as f64)
        } else if input.total_cost > input.cpa_constraint {
            Some(input.total_cost)
        } else {
            None
        }
    }
}

impl Default for ControllerOnlineLp {
    fn default() -> Self {
        Self::new()
    }
}

impl ControllerTrait for ControllerOnlineLp {
    fn initial_alpha(&self) -> f64 {
        self.initial_alpha.clamp(self.min_alpha, self.max_alpha)
    }

    fn next_alpha(&self, input: &PacingInput) -> PacingDecision {
        if input.total_cost >= input.initial_budget {
            return PacingDecision::Exhausted;
        }
        if input.step_traffic == 0 {
            return PacingDecision::Continue {
                alpha: input.alpha,
                adjustment: Adjustment::NoEvidence,
            };
        }
        if input.remaining_steps == 0 {
            return PacingDecision::Continue {
                alpha: input.alpha,
                adjustment: Adjustment::FinalStep,
            };
        }

        let realized_cpa = Self::realized_cpa(input);
        let cpa_ceiling = input.cpa_constraint * (1.0 + self.controller.tolerance_fraction());

        let (multiplier, adjustment) = match realized_cpa {
            Some(cpa) if cpa > cpa_ceiling => (
                self.controller.next_multiplier(input.cpa_constraint, cpa),
                Adjustment::CpaOverConstraint,
            ),
            _ => {
                // budget left before the observed step, spread over it and the remaining ones
                let remaining_budget = input.initial_budget - input.total_cost;
                let planned_step_spend =
                    (remaining_budget + input.step_cost) / (input.remaining_steps + 1) as f64;
                let multiplier = self.controller.next_multiplier(planned_step_spend, input.step_cost);
                let cpa_headroom = realized_cpa.map_or(true, |cpa| cpa < input.cpa_constraint);

                if multiplier > 1.0 && cpa_headroom {
                    (multiplier, Adjustment::Underspend)
                } else if multiplier < 1.0 {
                    (multiplier, Adjustment::Overspend)
                } else {
                    (1.0, Adjustment::Hold)
                }
            }
        };

        PacingDecision::Continue {
            alpha: (input.alpha * multiplier).clamp(self.min_alpha, self.max_alpha),
            adjustment,
        }
    }

    fn controller_string(&self, alpha: f64) -> String {
        format!("OnlineLp cntrl: {:.4}", alpha)
    }
}

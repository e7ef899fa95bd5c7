use thiserror::Error;

/// Every way a simulation run can fail. All of them are terminal for the run:
/// a failed run never hands back a partial history.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimulationError {
    /// Run parameters rejected before the first step executed
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("campaign {0} not found")]
    CampaignNotFound(u64),

    /// Numeric or accounting anomaly detected while stepping
    #[error("computation failed at step {step}: {reason}")]
    Computation { step: usize, reason: String },

    /// The worker running the simulation died before reporting a result; no step is attributable
    #[error("simulation task failed: {0}")]
    TaskFailed(String),

    /// Run exceeded its wall-clock budget or was cancelled
    #[error("simulation timed out after {elapsed_ms} ms ({completed_steps} steps completed)")]
    Timeout { completed_steps: usize, elapsed_ms: u64 },
}

impl SimulationError {
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        SimulationError::Validation {
            field,
            reason: reason.into(),
        }
    }

    pub fn computation(step: usize, reason: impl Into<String>) -> Self {
        SimulationError::Computation {
            step,
            reason: reason.into(),
        }
    }

    /// Unknown campaigns count as bad input, same as a non-positive budget.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            SimulationError::Validation { .. } | SimulationError::CampaignNotFound(_)
        )
    }

    /// Short machine-readable tag, used in API error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            SimulationError::Validation { .. } => "validation",
            SimulationError::CampaignNotFound(_) => "not_found",
            SimulationError::Computation { .. } | SimulationError::TaskFailed(_) => "computation",
            SimulationError::Timeout { .. } => "timeout",
        }
    }
}

/// Reject zero, negative, NaN and infinite values for a money-like parameter.
pub fn ensure_positive(field: &'static str, value: f64) -> Result<f64, SimulationError> {
    if !value.is_finite() {
        return Err(SimulationError::validation(field, format!("must be finite, got {}", value)));
    }
    if value <= 0.0 {
        return Err(SimulationError::validation(field, format!("must be > 0, got {}", value)));
    }
    Ok(value)
}

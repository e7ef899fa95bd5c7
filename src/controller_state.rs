/// Pacing state threaded through the simulation loop
/// One value per completed step; the driver replaces it rather than mutating shared state,
/// so concurrent runs never see each other's accumulators
#[derive(Debug, Clone, PartialEq)]
pub struct PacingState {
    /// Bid multiplier to use for the next step
    pub alpha: f64,
    pub total_cost: f64,
    pub total_conversions: u64,
    pub total_wins: u64,
    pub total_traffic: u64,
}

impl PacingState {
    /// State before the first step
    pub fn initial(alpha: f64) -> Self {
        Self {
            alpha,
            total_cost: 0.0,
            total_conversions: 0,
            total_wins: 0,
            total_traffic: 0,
        }
    }

    /// Realized cost per acquisition, `total_cost / max(total_conversions, 1)`
    pub fn real_cpa(&self) -> f64 {
        self.total_cost / self.total_conversions.max(1) as f64
    }

    pub fn remaining_budget(&self, initial_budget: f64) -> f64 {
        (initial_budget - self.total_cost).max(0.0)
    }

    /// Spent share of the budget in percent, capped at 100 once the budget is gone
    pub fn budget_percentage(&self, initial_budget: f64) -> f64 {
        (100.0 * self.total_cost / initial_budget).min(100.0)
    }

    pub fn budget_exhausted(&self, initial_budget: f64) -> bool {
        self.total_cost >= initial_budget
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_real_cpa_without_conversions() {
        let mut state = PacingState::initial(1.0);
        assert_eq!(state.real_cpa(), 0.0);
        state.total_cost = 42.0;
        assert_eq!(state.real_cpa(), 42.0);
        state.total_conversions = 4;
        assert_eq!(state.real_cpa(), 10.5);
    }

    #[test]
    fn test_budget_percentage_is_capped() {
        let mut state = PacingState::initial(1.0);
        state.total_cost = 250.0;
        assert_eq!(state.budget_percentage(1000.0), 25.0);
        assert!(!state.budget_exhausted(1000.0));
        state.total_cost = 1012.5;
        assert_eq!(state.budget_percentage(1000.0), 100.0);
        assert_eq!(state.remaining_budget(1000.0), 0.0);
        assert!(state.budget_exhausted(1000.0));
    }
}

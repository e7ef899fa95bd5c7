
/// Proportional controller core shared by the pacing rules
/// Produces a multiplicative step for alpha rather than an additive one, so the
/// same gains work for campaigns with a 30 CPA and a 300 CPA alike.
/// Full PID was tried on the budget signal, the integral term kept overshooting in the last steps
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerProportionalCore {
    tolerance_fraction: f64,      // Tolerance as a fraction of target (e.g., 0.02 = 2%)
    max_adjustment_factor: f64,   // Maximum per-step change (e.g., 0.2 = 20%)
    proportional_gain: f64,       // Proportional gain (e.g., 0.3 = 30% of relative error)
}

impl ControllerProportionalCore {
    /// Create a new proportional controller with default parameters
    pub fn new() -> Self {
        Self {
            tolerance_fraction: 0.02,
            max_adjustment_factor: 0.2,
            proportional_gain: 0.3,
        }
    }

    /// Create a new proportional controller with custom parameters
    ///
    /// # Arguments
    /// * `tolerance_fraction` - Tolerance as a fraction of target (e.g., 0.005 = 0.5%)
    /// * `max_adjustment_factor` - Maximum adjustment factor (e.g., 0.2 = 20%)
    /// * `proportional_gain` - Proportional gain (e.g., 0.1 = 10% of error)
    pub fn new_advanced(tolerance_fraction: f64, max_adjustment_factor: f64, proportional_gain: f64) -> Self {
        Self {
            tolerance_fraction,
            max_adjustment_factor,
            proportional_gain,
        }
    }

    pub fn tolerance_fraction(&self) -> f64 {
        self.tolerance_fraction
    }

    pub fn max_adjustment_factor(&self) -> f64 {
        self.max_adjustment_factor
    }

    /// Multiplier to apply to the control variable for the next step
    ///
    /// # Arguments
    /// * `target` - Target value to achieve (must be > 0)
    /// * `actual` - Actual value achieved
    ///
    /// # Returns
    /// A value in `[1 - max_adjustment_factor, 1 + max_adjustment_factor]`:
    /// above 1 when `actual` is below target, below 1 when above, exactly 1 inside the tolerance band
    pub fn next_multiplier(&self, target: f64, actual: f64) -> f64 {
        let tolerance = target * self.tolerance_fraction;
        // target is never zero

        if actual < target - tolerance {
            // Below target - increase
            let error_ratio = (target - actual) / target;
            let adjustment_factor = (error_ratio * self.proportional_gain).min(self.max_adjustment_factor);
            1.0 + adjustment_factor
        } else if actual > target + tolerance {
            // Above target - decrease
            let error_ratio = (actual - target) / target;
            let adjustment_factor = (error_ratio * self.proportional_gain).min(self.max_adjustment_factor);
            1.0 - adjustment_factor
        } else {
            1.0
        }
    }
}

impl Default for ControllerProportionalCore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_below_target_increases() {
        let core = ControllerProportionalCore::new_advanced(0.0, 0.2, 0.5);
        // 10% below target, half of it applied
        let m = core.next_multiplier(100.0, 90.0);
        assert!((m - 1.05).abs() < 1e-12);
    }

    #[test]
    fn test_above_target_decreases() {
        let core = ControllerProportionalCore::new_advanced(0.0, 0.2, 0.5);
        let m = core.next_multiplier(100.0, 120.0);
        assert!((m - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_within_tolerance_holds() {
        let core = ControllerProportionalCore::new_advanced(0.05, 0.2, 0.5);
        assert_eq!(core.next_multiplier(100.0, 96.0), 1.0);
        assert_eq!(core.next_multiplier(100.0, 104.0), 1.0);
    }

    #[test]
    fn test_change_is_clamped() {
        let core = ControllerProportionalCore::new();
        assert!((core.next_multiplier(100.0, 10_000.0) - 0.8).abs() < 1e-12);
        assert!((core.next_multiplier(100.0, 0.0) - 1.2).abs() < 1e-12);
    }
}

/// This file contains the SimulationRun struct, which describes one run of the pacing simulation
/// for one campaign, and the Simulation that executes it step by step.
///
/// A simulation moves through three phases:
/// - Init: parameters validated, alpha at the controller's initial value, totals zero
/// - Stepping: per step, generate the outcome, accumulate, ask the controller for the next alpha
/// - Done: history complete, with the reason the run ended
///
/// Any failure is terminal and leaves no partial history behind.

use serde::Serialize;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::campaign::CampaignProfile;
use crate::controller_state::PacingState;
use crate::controllers::{ControllerTrait, PacingDecision, PacingInput};
use crate::errors::{ensure_positive, SimulationError};
use crate::impressions::StepOutcome;
use crate::traffic::AuctionOutcomeGenerator;

/// Parameters of a single run; immutable once validated
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationRun {
    pub campaign_id: u64,
    pub advertiser_number: String,
    pub category: String,
    pub initial_budget: f64,
    pub cpa_constraint: f64,
    pub steps: usize,
}

impl SimulationRun {
    pub fn new(campaign: &CampaignProfile, steps: usize, max_steps: usize) -> Result<Self, SimulationError> {
        let initial_budget = ensure_positive("initial_budget", campaign.budget)?;
        let cpa_constraint = ensure_positive("cpa_constraint", campaign.cpa_constraint)?;
        if steps == 0 {
            return Err(SimulationError::validation("steps", "must be > 0"));
        }
        if steps > max_steps {
            return Err(SimulationError::validation(
                "steps",
                format!("must be <= {}, got {}", max_steps, steps),
            ));
        }
        Ok(Self {
            campaign_id: campaign.campaign_id,
            advertiser_number: campaign.advertiser_number.clone(),
            category: campaign.category.clone(),
            initial_budget,
            cpa_constraint,
            steps,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Init,
    Stepping,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    StepsCompleted,
    BudgetExhausted,
}

/// What the driver does after a step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepVerdict {
    Continue,
    Stop(TerminationReason),
}

/// One entry of the run history
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepRecord {
    pub step: usize,
    /// Alpha the step was bid with
    pub alpha: f64,
    pub traffic: u64,
    pub wins: u64,
    pub cost: f64,
    pub total_cost: f64,
    pub conversions: u64,
    pub total_conversions: u64,
    pub total_wins: u64,
    pub real_cpa: f64,
    pub budget_percentage: f64,
    pub remaining_budget: f64,
}

/// Pure transition of one step: accumulate the outcome, record it, ask the controller what comes next
///
/// Returns the state for the next step, the record of this one and whether to go on.
pub fn advance(
    state: &PacingState,
    run: &SimulationRun,
    step: usize,
    outcome: &StepOutcome,
    controller: &dyn ControllerTrait,
) -> Result<(PacingState, StepRecord, StepVerdict), SimulationError> {
    outcome.validate(step)?;

    let overflow = |what: &str| SimulationError::computation(step, format!("{} overflow", what));
    let total_conversions = state
        .total_conversions
        .checked_add(outcome.conversions)
        .ok_or_else(|| overflow("total_conversions"))?;
    let total_wins = state
        .total_wins
        .checked_add(outcome.wins)
        .ok_or_else(|| overflow("total_wins"))?;
    let total_traffic = state
        .total_traffic
        .checked_add(outcome.traffic)
        .ok_or_else(|| overflow("total_traffic"))?;
    let total_cost = state.total_cost + outcome.cost;
    if !total_cost.is_finite() {
        return Err(SimulationError::computation(step, "total_cost is not finite"));
    }

    let accumulated = PacingState {
        alpha: state.alpha,
        total_cost,
        total_conversions,
        total_wins,
        total_traffic,
    };

    let record = StepRecord {
        step,
        alpha: state.alpha,
        traffic: outcome.traffic,
        wins: outcome.wins,
        cost: outcome.cost,
        total_cost,
        conversions: outcome.conversions,
        total_conversions,
        total_wins,
        real_cpa: accumulated.real_cpa(),
        budget_percentage: accumulated.budget_percentage(run.initial_budget),
        remaining_budget: accumulated.remaining_budget(run.initial_budget),
    };

    let remaining_steps = run.steps.saturating_sub(step + 1);
    let input = PacingInput {
        alpha: state.alpha,
        total_cost,
        total_conversions,
        step_cost: outcome.cost,
        step_conversions: outcome.conversions,
        step_traffic: outcome.traffic,
        cpa_constraint: run.cpa_constraint,
        initial_budget: run.initial_budget,
        remaining_steps,
    };

    match controller.next_alpha(&input) {
        PacingDecision::Exhausted => Ok((
            accumulated,
            record,
            StepVerdict::Stop(TerminationReason::BudgetExhausted),
        )),
        PacingDecision::Continue { alpha, adjustment } => {
            if !(alpha.is_finite() && alpha > 0.0) {
                return Err(SimulationError::computation(
                    step,
                    format!("controller produced invalid alpha {}", alpha),
                ));
            }
            tracing::trace!(step, alpha, ?adjustment, "pacing decision");
            let verdict = if remaining_steps == 0 {
                StepVerdict::Stop(TerminationReason::StepsCompleted)
            } else {
                StepVerdict::Continue
            };
            Ok((PacingState { alpha, ..accumulated }, record, verdict))
        }
    }
}

/// Bounds on how long a run may take
#[derive(Debug, Clone, Default)]
pub struct RunLimits {
    pub deadline: Option<Instant>,
    pub cancel: Option<CancellationToken>,
}

impl RunLimits {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration, cancel: CancellationToken) -> Self {
        Self {
            deadline: Some(Instant::now() + timeout),
            cancel: Some(cancel),
        }
    }

    fn exceeded(&self) -> bool {
        let cancelled = self.cancel.as_ref().is_some_and(|token| token.is_cancelled());
        let expired = self.deadline.is_some_and(|deadline| Instant::now() >= deadline);
        cancelled || expired
    }
}

/// Finished run
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationOutcome {
    pub history: Vec<StepRecord>,
    pub termination: TerminationReason,
    /// Alpha the controller settled on after the last step
    pub final_alpha: f64,
}

/// Executes a SimulationRun against a generator and a controller
pub struct Simulation<'a> {
    run: &'a SimulationRun,
    generator: &'a dyn AuctionOutcomeGenerator,
    controller: &'a dyn ControllerTrait,
    phase: RunPhase,
    state: PacingState,
    history: Vec<StepRecord>,
    termination: Option<TerminationReason>,
}

impl<'a> Simulation<'a> {
    pub fn new(
        run: &'a SimulationRun,
        generator: &'a dyn AuctionOutcomeGenerator,
        controller: &'a dyn ControllerTrait,
    ) -> Self {
        Self {
            run,
            generator,
            controller,
            phase: RunPhase::Init,
            state: PacingState::initial(controller.initial_alpha()),
            history: Vec::with_capacity(run.steps),
            termination: None,
        }
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn state(&self) -> &PacingState {
        &self.state
    }

    /// Execute the next step; returns the phase after it
    pub fn step(&mut self) -> Result<RunPhase, SimulationError> {
        if self.phase == RunPhase::Done {
            return Ok(RunPhase::Done);
        }
        self.phase = RunPhase::Stepping;

        let step = self.history.len();
        let outcome = self.generator.simulate_step(self.state.alpha, step)?;
        let (state, record, verdict) = advance(&self.state, self.run, step, &outcome, self.controller)?;

        tracing::debug!(
            campaign_id = self.run.campaign_id,
            step,
            alpha = record.alpha,
            cost = record.cost,
            total_cost = record.total_cost,
            conversions = record.conversions,
            "step completed"
        );

        self.state = state;
        self.history.push(record);
        if let StepVerdict::Stop(reason) = verdict {
            self.termination = Some(reason);
            self.phase = RunPhase::Done;
        }
        Ok(self.phase)
    }

    /// Step until done, checking the limits before every step
    pub fn run_to_completion(mut self, limits: &RunLimits) -> Result<SimulationOutcome, SimulationError> {
        let started = Instant::now();
        while self.phase != RunPhase::Done {
            if limits.exceeded() {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                tracing::warn!(
                    campaign_id = self.run.campaign_id,
                    completed_steps = self.history.len(),
                    elapsed_ms,
                    "simulation stopped by deadline or cancellation"
                );
                return Err(SimulationError::Timeout {
                    completed_steps: self.history.len(),
                    elapsed_ms,
                });
            }
            self.step()?;
        }

        let termination = self
            .termination
            .ok_or_else(|| SimulationError::computation(self.history.len(), "run finished without a termination reason"))?;
        Ok(SimulationOutcome {
            history: self.history,
            termination,
            final_alpha: self.state.alpha,
        })
    }
}

/// Validate, run and return the history of one campaign
pub fn simulate(
    run: &SimulationRun,
    generator: &dyn AuctionOutcomeGenerator,
    controller: &dyn ControllerTrait,
    limits: &RunLimits,
) -> Result<SimulationOutcome, SimulationError> {
    let started = Instant::now();
    let result = Simulation::new(run, generator, controller).run_to_completion(limits);
    match &result {
        Ok(outcome) => tracing::info!(
            campaign_id = run.campaign_id,
            steps = outcome.history.len(),
            termination = ?outcome.termination,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "simulation finished"
        ),
        Err(SimulationError::Computation { step, reason }) => {
            tracing::error!(campaign_id = run.campaign_id, step, reason = %reason, "simulation failed")
        }
        Err(_) => {}
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controllers::{ControllerConstant, ControllerOnlineLp};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Same outcome every step, regardless of alpha
    struct FixedOutcome(StepOutcome);

    impl AuctionOutcomeGenerator for FixedOutcome {
        fn simulate_step(&self, _alpha: f64, _step_index: usize) -> Result<StepOutcome, SimulationError> {
            Ok(self.0)
        }
    }

    /// Fails with a NaN cost at a given step
    struct NanAt(usize);

    impl AuctionOutcomeGenerator for NanAt {
        fn simulate_step(&self, _alpha: f64, step_index: usize) -> Result<StepOutcome, SimulationError> {
            let cost = if step_index == self.0 { f64::NAN } else { 1.0 };
            Ok(StepOutcome { traffic: 10, wins: 1, cost, conversions: 0 })
        }
    }

    /// Cancels its token after a number of steps
    struct CancelAfter {
        steps: usize,
        token: CancellationToken,
        calls: AtomicUsize,
    }

    impl AuctionOutcomeGenerator for CancelAfter {
        fn simulate_step(&self, _alpha: f64, _step_index: usize) -> Result<StepOutcome, SimulationError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) + 1 >= self.steps {
                self.token.cancel();
            }
            Ok(StepOutcome { traffic: 10, wins: 1, cost: 1.0, conversions: 1 })
        }
    }

    fn campaign(budget: f64) -> CampaignProfile {
        CampaignProfile::new(1, "test", "adv-1", "ecommerce", budget, 50.0)
    }

    fn run(budget: f64, steps: usize) -> SimulationRun {
        SimulationRun::new(&campaign(budget), steps, 100).unwrap()
    }

    #[test]
    fn test_validation() {
        assert_eq!(
            SimulationRun::new(&campaign(0.0), 10, 100).unwrap_err(),
            SimulationError::validation("initial_budget", "must be > 0, got 0")
        );
        let no_cpa = CampaignProfile { cpa_constraint: f64::NAN, ..campaign(10.0) };
        assert!(SimulationRun::new(&no_cpa, 10, 100).unwrap_err().is_validation());
        assert!(matches!(
            SimulationRun::new(&campaign(10.0), 0, 100),
            Err(SimulationError::Validation { field: "steps", .. })
        ));
        assert!(matches!(
            SimulationRun::new(&campaign(10.0), 101, 100),
            Err(SimulationError::Validation { field: "steps", .. })
        ));
    }

    #[test]
    fn test_budget_exhaustion_stops_run() {
        let run = run(1000.0, 48);
        let generator = FixedOutcome(StepOutcome { traffic: 100, wins: 20, cost: 100.0, conversions: 2 });
        let controller = ControllerConstant::new(1.0);
        let outcome = simulate(&run, &generator, &controller, &RunLimits::unbounded()).unwrap();

        assert_eq!(outcome.termination, TerminationReason::BudgetExhausted);
        assert_eq!(outcome.history.len(), 10);
        let last = outcome.history.last().unwrap();
        assert_eq!(last.total_cost, 1000.0);
        assert_eq!(last.total_conversions, 20);
        assert_eq!(last.budget_percentage, 100.0);
        assert_eq!(last.remaining_budget, 0.0);
        assert_eq!(last.real_cpa, 50.0);
    }

    #[test]
    fn test_steps_completed() {
        let run = run(1_000_000.0, 12);
        let generator = FixedOutcome(StepOutcome { traffic: 100, wins: 20, cost: 10.0, conversions: 1 });
        let controller = ControllerOnlineLp::new();
        let outcome = simulate(&run, &generator, &controller, &RunLimits::unbounded()).unwrap();

        assert_eq!(outcome.termination, TerminationReason::StepsCompleted);
        assert_eq!(outcome.history.len(), 12);
        for (i, record) in outcome.history.iter().enumerate() {
            assert_eq!(record.step, i);
            assert!(record.alpha > 0.0);
            assert!(record.wins <= record.traffic);
            assert_eq!(record.total_wins, 20 * (i as u64 + 1));
        }
        for pair in outcome.history.windows(2) {
            assert!(pair[1].total_cost >= pair[0].total_cost);
            assert!((pair[1].total_cost - pair[0].total_cost - pair[1].cost).abs() < 1e-9);
            assert_eq!(pair[1].total_conversions, pair[0].total_conversions + pair[1].conversions);
        }
        // massively under-spending with CPA headroom pushes alpha up to the cap
        assert_eq!(outcome.final_alpha, 1.5);
    }

    #[test]
    fn test_zero_traffic_holds_alpha() {
        let run = run(1000.0, 5);
        let generator = FixedOutcome(StepOutcome::default());
        let controller = ControllerOnlineLp::new();
        let outcome = simulate(&run, &generator, &controller, &RunLimits::unbounded()).unwrap();
        assert_eq!(outcome.history.len(), 5);
        for record in &outcome.history {
            assert_eq!(record.alpha, 1.0);
            assert_eq!(record.cost, 0.0);
            assert_eq!(record.wins, 0);
            assert_eq!(record.real_cpa, 0.0);
        }
    }

    #[test]
    fn test_computation_error_aborts() {
        let run = run(1000.0, 10);
        let controller = ControllerOnlineLp::new();
        let err = simulate(&run, &NanAt(3), &controller, &RunLimits::unbounded()).unwrap_err();
        assert!(matches!(err, SimulationError::Computation { step: 3, .. }));
        assert_eq!(err.kind(), "computation");
    }

    #[test]
    fn test_expired_deadline_times_out() {
        let run = run(1000.0, 10);
        let generator = FixedOutcome(StepOutcome { traffic: 1, wins: 1, cost: 1.0, conversions: 1 });
        let limits = RunLimits { deadline: Some(Instant::now()), cancel: None };
        let err = simulate(&run, &generator, &ControllerOnlineLp::new(), &limits).unwrap_err();
        assert!(matches!(err, SimulationError::Timeout { completed_steps: 0, .. }));
    }

    #[test]
    fn test_cancellation_times_out() {
        let run = run(1_000_000.0, 50);
        let token = CancellationToken::new();
        let generator = CancelAfter { steps: 3, token: token.clone(), calls: AtomicUsize::new(0) };
        let limits = RunLimits { deadline: None, cancel: Some(token) };
        let err = simulate(&run, &generator, &ControllerOnlineLp::new(), &limits).unwrap_err();
        assert!(matches!(err, SimulationError::Timeout { completed_steps: 3, .. }));
    }

    #[test]
    fn test_phases() {
        let run = run(1_000_000.0, 2);
        let generator = FixedOutcome(StepOutcome { traffic: 1, wins: 1, cost: 1.0, conversions: 1 });
        let controller = ControllerConstant::new(1.0);
        let mut simulation = Simulation::new(&run, &generator, &controller);
        assert_eq!(simulation.phase(), RunPhase::Init);
        assert_eq!(simulation.step().unwrap(), RunPhase::Stepping);
        assert_eq!(simulation.step().unwrap(), RunPhase::Done);
        assert_eq!(simulation.step().unwrap(), RunPhase::Done);
        assert_eq!(simulation.state().total_cost, 2.0);
    }

    #[test]
    fn test_advance_is_pure() {
        let run = run(1000.0, 10);
        let state = PacingState::initial(1.0);
        let outcome = StepOutcome { traffic: 50, wins: 5, cost: 20.0, conversions: 1 };
        let controller = ControllerOnlineLp::new();
        let first = advance(&state, &run, 0, &outcome, &controller).unwrap();
        let second = advance(&state, &run, 0, &outcome, &controller).unwrap();
        assert_eq!(first, second);
        assert_eq!(state, PacingState::initial(1.0));
        assert_eq!(first.1.total_cost, 20.0);
        assert_eq!(first.2, StepVerdict::Continue);
    }

    #[test]
    fn test_advance_rejects_overflow() {
        let run = run(1000.0, 10);
        let state = PacingState { total_traffic: u64::MAX, ..PacingState::initial(1.0) };
        let outcome = StepOutcome { traffic: 1, wins: 0, cost: 0.0, conversions: 0 };
        let err = advance(&state, &run, 4, &outcome, &ControllerOnlineLp::new()).unwrap_err();
        assert!(matches!(err, SimulationError::Computation { step: 4, .. }));
    }
}

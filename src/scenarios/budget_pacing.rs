/// This scenario runs every catalog campaign through a simulated day twice:
/// once with the OnlineLp controller and once with a constant alpha of 1.0 (no pacing).
///
/// It validates:
/// - Both runs keep the accounting invariants: cumulative totals grow by exactly the step values,
///   wins never exceed traffic, and no step runs after the budget is spent
/// - For campaigns whose budget covers only a fraction of the day's traffic, the unpaced run
///   burns out early while the paced one spreads spend past the middle of the day

use crate::campaign::CampaignProfile;
use crate::campaigns::{CampaignDirectory, Campaigns};
use crate::config::AppConfig;
use crate::controllers::{ControllerConstant, ControllerOnlineLp, ControllerTrait};
use crate::logger::{Logger, LogEvent};
use crate::logln;
use crate::report::SimulationReport;
use crate::scenarios::{check, finish};
use crate::simulationrun::{simulate, RunLimits, SimulationRun, TerminationReason};
use crate::traffic::SyntheticTraffic;

// Register this scenario in the catalog
inventory::submit!(crate::scenarios::ScenarioEntry {
    short_name: "budget_pacing",
    run,
});

/// Campaigns whose budget is at most a third of what an unpaced day would cost
const TIGHT_BUDGET_CAMPAIGNS: [u64; 3] = [102, 103, 105];

fn run_variant(
    config: &AppConfig,
    campaign: &CampaignProfile,
    controller: &dyn ControllerTrait,
) -> Result<SimulationReport, Box<dyn std::error::Error>> {
    let run = SimulationRun::new(campaign, config.simulation.default_steps, config.simulation.max_steps)?;
    let traffic = SyntheticTraffic::new(campaign, run.steps, config.simulation.seed, &config.traffic)?;
    let outcome = simulate(&run, &traffic, controller, &RunLimits::unbounded())?;
    Ok(SimulationReport::new(&run, outcome))
}

/// Accounting invariants every history must satisfy
pub(crate) fn history_is_consistent(report: &SimulationReport) -> bool {
    let budget = report.meta.initial_budget;
    let mut total_cost = 0.0;
    let mut total_conversions = 0;
    let mut total_wins = 0;
    for (i, r) in report.history.iter().enumerate() {
        total_cost += r.cost;
        total_conversions += r.conversions;
        total_wins += r.wins;
        let is_last = i + 1 == report.history.len();
        let ok = r.step == i
            && r.alpha > 0.0
            && r.wins <= r.traffic
            && r.conversions <= r.wins
            && (r.total_cost - total_cost).abs() < 1e-6
            && r.total_conversions == total_conversions
            && r.total_wins == total_wins
            && r.budget_percentage <= 100.0
            && (is_last || r.total_cost < budget);
        if !ok {
            return false;
        }
    }
    report.history.len() <= report.meta.steps_requested
}

pub fn run(scenario_name: &str, logger: &mut Logger) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::default();
    let campaigns = Campaigns::default_catalog();
    let paced_controller = ControllerOnlineLp::from_config(&config.pacing);
    let unpaced_controller = ControllerConstant::new(1.0);
    let mut errors: Vec<String> = Vec::new();

    logln!(logger, LogEvent::Scenario, "=== Scenario: Budget pacing over {} steps ===", config.simulation.default_steps);

    for campaign in campaigns.list() {
        logln!(logger, LogEvent::Scenario, "");
        logln!(logger, LogEvent::Scenario, "{}", campaign.profile_string());

        let paced = run_variant(&config, &campaign, &paced_controller)?;
        paced.printout(logger);
        let unpaced = run_variant(&config, &campaign, &unpaced_controller)?;
        unpaced.printout(logger);

        check(
            logger,
            &mut errors,
            history_is_consistent(&paced) && history_is_consistent(&unpaced),
            format!("Campaign {}: histories keep the accounting invariants", campaign.campaign_id),
        );

        if TIGHT_BUDGET_CAMPAIGNS.contains(&campaign.campaign_id) {
            check(
                logger,
                &mut errors,
                unpaced.summary.termination == TerminationReason::BudgetExhausted,
                format!(
                    "Campaign {}: unpaced run exhausts the budget: {:?} after {} steps",
                    campaign.campaign_id, unpaced.summary.termination, unpaced.summary.steps_completed
                ),
            );
            check(
                logger,
                &mut errors,
                paced.summary.steps_completed > unpaced.summary.steps_completed,
                format!(
                    "Campaign {}: paced run lasts longer than unpaced: {} > {}",
                    campaign.campaign_id, paced.summary.steps_completed, unpaced.summary.steps_completed
                ),
            );
            check(
                logger,
                &mut errors,
                paced.summary.steps_completed > paced.meta.steps_requested / 2,
                format!(
                    "Campaign {}: paced run spends past the middle of the day: {} of {} steps",
                    campaign.campaign_id, paced.summary.steps_completed, paced.meta.steps_requested
                ),
            );
        }
    }

    finish(scenario_name, errors)
}

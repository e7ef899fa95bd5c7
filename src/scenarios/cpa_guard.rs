/// This scenario puts a campaign with an effectively unlimited budget into a market where
/// competition is expensive (least winning cost centred on twice the CPA-constrained bid),
/// starting both the paced and the unpaced run at the highest allowed alpha of 1.5.
///
/// Budget pacing alone would keep pushing alpha up here. It validates that the CPA constraint wins:
/// - whenever realized CPA is above the constraint, the next step never bids higher
/// - the paced run does back off from the cap at some point

use crate::campaign::CampaignProfile;
use crate::config::{AppConfig, CompetitionConfig};
use crate::controllers::{ControllerConstant, ControllerOnlineLp};
use crate::logger::{Logger, LogEvent};
use crate::logln;
use crate::report::SimulationReport;
use crate::scenarios::budget_pacing::history_is_consistent;
use crate::scenarios::{check, finish};
use crate::simulationrun::{simulate, RunLimits, SimulationRun};
use crate::traffic::SyntheticTraffic;

// Register this scenario in the catalog
inventory::submit!(crate::scenarios::ScenarioEntry {
    short_name: "cpa_guard",
    run,
});

/// Steps whose realized CPA was above the constraint but were followed by a higher alpha
fn increases_over_constraint(report: &SimulationReport) -> Vec<usize> {
    report
        .history
        .windows(2)
        .filter(|pair| pair[0].real_cpa > report.meta.cpa_constraint && pair[1].alpha > pair[0].alpha)
        .map(|pair| pair[0].step)
        .collect()
}

pub fn run(scenario_name: &str, logger: &mut Logger) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::default();
    config.traffic.competition = CompetitionConfig::LogNormal { level: 2.0, spread: 0.5 };
    config.pacing.initial_alpha = 1.5;

    let campaign = CampaignProfile::new(901, "expensive_inventory", "adv-9001", "finance", 1_000_000.0, 50.0);
    let run = SimulationRun::new(&campaign, config.simulation.default_steps, config.simulation.max_steps)?;
    let traffic = SyntheticTraffic::new(&campaign, run.steps, config.simulation.seed, &config.traffic)?;

    logln!(logger, LogEvent::Scenario, "=== Scenario: CPA guard under expensive competition ===");
    logln!(logger, LogEvent::Scenario, "{}", campaign.profile_string());

    let paced_controller = ControllerOnlineLp::from_config(&config.pacing);
    let paced = SimulationReport::new(
        &run,
        simulate(&run, &traffic, &paced_controller, &RunLimits::unbounded())?,
    );
    paced.printout(logger);

    let unpaced = SimulationReport::new(
        &run,
        simulate(&run, &traffic, &ControllerConstant::new(1.5), &RunLimits::unbounded())?,
    );
    unpaced.printout(logger);

    logln!(
        logger,
        LogEvent::Scenario,
        "Final CPA paced {:.2} (score {:.2}) vs unpaced {:.2} (score {:.2}), constraint {:.2}",
        paced.summary.final_cpa,
        paced.summary.score,
        unpaced.summary.final_cpa,
        unpaced.summary.score,
        campaign.cpa_constraint
    );

    let mut errors: Vec<String> = Vec::new();

    check(
        logger,
        &mut errors,
        history_is_consistent(&paced),
        "Paced history keeps the accounting invariants".to_string(),
    );

    let violations = increases_over_constraint(&paced);
    check(
        logger,
        &mut errors,
        violations.is_empty(),
        format!("Alpha never rises after a step with CPA over the constraint (violations at steps {:?})", violations),
    );

    let min_alpha = paced.history.iter().map(|r| r.alpha).fold(f64::INFINITY, f64::min);
    check(
        logger,
        &mut errors,
        min_alpha < 1.5,
        format!("Paced run backs off from the alpha cap: min alpha {:.4} < 1.5", min_alpha),
    );

    finish(scenario_name, errors)
}

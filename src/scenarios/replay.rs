/// This scenario records the opportunities of a synthetic day, drops a block of steps as if the
/// auction logs had a gap, writes them to disk and replays them from the file.
///
/// It validates:
/// - the replayed file holds exactly the recorded opportunities
/// - steps in the gap have no traffic and leave alpha unchanged
/// - replayed wins, cost and conversions grow with alpha in every step
/// - the replayed run keeps the accounting invariants

use std::ops::Range;
use std::path::PathBuf;

use crate::campaigns::{CampaignDirectory, Campaigns};
use crate::competition::ImpressionCompetition;
use crate::config::AppConfig;
use crate::controllers::ControllerOnlineLp;
use crate::logger::{sanitize_filename, Logger, LogEvent};
use crate::logln;
use crate::report::SimulationReport;
use crate::scenarios::budget_pacing::history_is_consistent;
use crate::scenarios::{check, finish};
use crate::simulationrun::{simulate, RunLimits, SimulationRun};
use crate::traffic::{AuctionOutcomeGenerator, RecordedOpportunity, ReplayTraffic, SyntheticTraffic};

// Register this scenario in the catalog
inventory::submit!(crate::scenarios::ScenarioEntry {
    short_name: "replay",
    run,
});

const STEPS: usize = 24;
const GAP: Range<usize> = 10..13;

fn record_day(traffic: &SyntheticTraffic) -> Vec<RecordedOpportunity> {
    let mut records = Vec::new();
    for step in (0..STEPS).filter(|step| !GAP.contains(step)) {
        for opportunity in traffic.generate_impressions(step).opportunities {
            if let ImpressionCompetition::LeastWinningCost(least_winning_cost) = opportunity.competition {
                records.push(RecordedOpportunity {
                    step,
                    p_value: opportunity.p_value,
                    least_winning_cost,
                });
            }
        }
    }
    records
}

pub fn run(scenario_name: &str, logger: &mut Logger) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::default();
    let campaign = Campaigns::default_catalog()
        .get(104)
        .ok_or("campaign 104 missing from the catalog")?;
    let mut errors: Vec<String> = Vec::new();

    logln!(logger, LogEvent::Scenario, "=== Scenario: Replay of recorded opportunities ===");
    logln!(logger, LogEvent::Scenario, "{}", campaign.profile_string());

    let synthetic = SyntheticTraffic::new(&campaign, STEPS, config.simulation.seed, &config.traffic)?;
    let records = record_day(&synthetic);

    let path = PathBuf::from(format!("log/{}/opportunities.json", sanitize_filename(scenario_name)));
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, serde_json::to_string(&records)?)?;
    logln!(logger, LogEvent::Scenario, "Recorded {} opportunities to {}", records.len(), path.display());

    let replay = ReplayTraffic::load(&campaign, STEPS, config.simulation.seed, &path)?;
    check(
        logger,
        &mut errors,
        replay.recorded_steps() == STEPS - GAP.len(),
        format!("Replay file holds {} of {} steps", replay.recorded_steps(), STEPS),
    );

    let mut monotone = true;
    for step in 0..STEPS {
        let low = replay.simulate_step(0.5, step)?;
        let mid = replay.simulate_step(1.0, step)?;
        let high = replay.simulate_step(1.5, step)?;
        monotone &= low.wins <= mid.wins && mid.wins <= high.wins;
        monotone &= low.cost <= mid.cost && mid.cost <= high.cost;
        monotone &= low.conversions <= mid.conversions && mid.conversions <= high.conversions;
    }
    check(
        logger,
        &mut errors,
        monotone,
        "Replayed wins, cost and conversions grow with alpha in every step".to_string(),
    );

    let run = SimulationRun::new(&campaign, STEPS, config.simulation.max_steps)?;
    let controller = ControllerOnlineLp::from_config(&config.pacing);
    let report = SimulationReport::new(&run, simulate(&run, &replay, &controller, &RunLimits::unbounded())?);
    report.printout(logger);

    check(
        logger,
        &mut errors,
        history_is_consistent(&report),
        "Replayed history keeps the accounting invariants".to_string(),
    );

    let gap_held = report
        .history
        .iter()
        .filter(|r| GAP.contains(&r.step))
        .all(|r| r.traffic == 0 && r.cost == 0.0)
        && report
            .history
            .windows(2)
            .filter(|pair| GAP.contains(&pair[0].step))
            .all(|pair| pair[1].alpha == pair[0].alpha);
    check(
        logger,
        &mut errors,
        gap_held,
        format!("Steps {:?} without records have no traffic and hold alpha", GAP),
    );

    finish(scenario_name, errors)
}

/// This scenario feeds the simulator bad input and checks that every case is rejected
/// as a validation failure before any step runs, naming the offending field.
/// It also checks the one degenerate input that is not an error: a single step with no traffic.

use crate::campaign::CampaignProfile;
use crate::campaigns::{CampaignDirectory, Campaigns};
use crate::config::AppConfig;
use crate::controllers::ControllerOnlineLp;
use crate::errors::SimulationError;
use crate::logger::{Logger, LogEvent};
use crate::logln;
use crate::scenarios::{check, finish};
use crate::service::run_synthetic;
use crate::simulationrun::{simulate, RunLimits, SimulationRun};
use crate::traffic::{RecordedOpportunity, ReplayTraffic};

// Register this scenario in the catalog
inventory::submit!(crate::scenarios::ScenarioEntry {
    short_name: "input_validation",
    run,
});

fn rejected_field(result: Result<impl Sized, SimulationError>) -> Option<&'static str> {
    match result {
        Err(SimulationError::Validation { field, .. }) => Some(field),
        _ => None,
    }
}

pub fn run(scenario_name: &str, logger: &mut Logger) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::default();
    let limits = RunLimits::unbounded();
    let good = CampaignProfile::new(1, "validation_target", "adv-1", "education", 1000.0, 20.0);
    let mut errors: Vec<String> = Vec::new();

    logln!(logger, LogEvent::Scenario, "=== Scenario: Input validation ===");

    let cases: Vec<(&str, CampaignProfile, usize, &'static str)> = vec![
        ("zero budget", CampaignProfile { budget: 0.0, ..good.clone() }, 48, "initial_budget"),
        ("negative budget", CampaignProfile { budget: -10.0, ..good.clone() }, 48, "initial_budget"),
        ("NaN budget", CampaignProfile { budget: f64::NAN, ..good.clone() }, 48, "initial_budget"),
        ("zero CPA constraint", CampaignProfile { cpa_constraint: 0.0, ..good.clone() }, 48, "cpa_constraint"),
        ("infinite CPA constraint", CampaignProfile { cpa_constraint: f64::INFINITY, ..good.clone() }, 48, "cpa_constraint"),
        ("zero steps", good.clone(), 0, "steps"),
        ("too many steps", good.clone(), config.simulation.max_steps + 1, "steps"),
    ];

    for (name, campaign, steps, field) in cases {
        let rejected = rejected_field(run_synthetic(&config, &campaign, steps, &limits));
        check(
            logger,
            &mut errors,
            rejected == Some(field),
            format!("{} is rejected on '{}' (got {:?})", name, field, rejected),
        );
    }

    let campaigns = Campaigns::default_catalog();
    check(
        logger,
        &mut errors,
        campaigns.get(999).is_none(),
        "Unknown campaign id 999 is not in the directory".to_string(),
    );

    let run = SimulationRun::new(&good, 6, config.simulation.max_steps)?;
    check(
        logger,
        &mut errors,
        rejected_field(ReplayTraffic::new(&good, run.steps, config.simulation.seed, Vec::new())) == Some("replay"),
        "Replay without records is rejected as field 'replay'".to_string(),
    );
    let late = vec![RecordedOpportunity { step: 500, p_value: 0.05, least_winning_cost: 1.0 }];
    check(
        logger,
        &mut errors,
        rejected_field(ReplayTraffic::new(&good, run.steps, config.simulation.seed, late)) == Some("replay"),
        "Replay with every record past the last step is rejected as field 'replay'".to_string(),
    );

    // only the last step has recorded traffic; the steps before it are empty but valid
    let last_only = vec![RecordedOpportunity { step: 5, p_value: 0.05, least_winning_cost: 1.0 }];
    let sparse = ReplayTraffic::new(&good, run.steps, config.simulation.seed, last_only)?;
    let controller = ControllerOnlineLp::from_config(&config.pacing);
    let outcome = simulate(&run, &sparse, &controller, &limits)?;
    let all_zero = outcome.history.len() == 6
        && outcome.history[..5]
            .iter()
            .all(|r| r.traffic == 0 && r.cost == 0.0 && r.conversions == 0 && r.alpha == config.pacing.initial_alpha);
    check(
        logger,
        &mut errors,
        all_zero,
        "Zero-traffic steps record zeros and keep alpha unchanged".to_string(),
    );

    finish(scenario_name, errors)
}

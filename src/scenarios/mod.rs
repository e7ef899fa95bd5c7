use std::error::Error;
use crate::logger::{Logger, LogEvent};
use crate::{errln, logln};

/// Function type for scenario entry functions
pub type ScenarioFn = fn(scenario_name: &str, logger: &mut Logger) -> Result<(), Box<dyn Error>>;

/// Entry in the scenario catalog
#[derive(Clone)]
pub struct ScenarioEntry {
    pub short_name: &'static str,
    pub run: ScenarioFn,
}

// Create an inventory collection for scenario entries
inventory::collect!(ScenarioEntry);

/// Get all registered scenarios from the catalog, sorted by name
pub fn get_scenario_catalog() -> Vec<ScenarioEntry> {
    let mut entries: Vec<ScenarioEntry> = inventory::iter::<ScenarioEntry>
        .into_iter()
        .cloned()
        .collect();
    entries.sort_by_key(|entry| entry.short_name);
    entries
}

/// Log one validation line and remember it if it failed
pub(crate) fn check(logger: &mut Logger, errors: &mut Vec<String>, passed: bool, msg: String) {
    if passed {
        logln!(logger, LogEvent::Scenario, "✓ {}", msg);
    } else {
        errln!(logger, LogEvent::Scenario, "✗ {}", msg);
        errors.push(msg);
    }
}

pub(crate) fn finish(scenario_name: &str, errors: Vec<String>) -> Result<(), Box<dyn Error>> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(format!("Scenario '{}' validation failed:\n{}", scenario_name, errors.join("\n")).into())
    }
}

// Scenario modules
pub mod budget_pacing;
pub mod cpa_guard;
pub mod determinism;
pub mod input_validation;
pub mod replay;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_lists_all_scenarios() {
        let names: Vec<&str> = get_scenario_catalog().iter().map(|s| s.short_name).collect();
        assert_eq!(names, vec!["budget_pacing", "cpa_guard", "determinism", "input_validation", "replay"]);
    }

    #[test]
    fn test_every_scenario_passes() {
        for scenario in get_scenario_catalog() {
            let mut logger = Logger::new();
            if let Err(e) = (scenario.run)(scenario.short_name, &mut logger) {
                panic!("scenario {} failed: {}", scenario.short_name, e);
            }
        }
    }

    #[test]
    fn test_check_collects_failures() {
        let mut logger = Logger::new();
        let mut errors = Vec::new();
        check(&mut logger, &mut errors, true, "fine".to_string());
        check(&mut logger, &mut errors, false, "broken".to_string());
        assert_eq!(errors, vec!["broken".to_string()]);
        assert!(finish("x", errors).is_err());
        assert!(finish("x", Vec::new()).is_ok());
    }
}

use serde::Serialize;

use crate::logger::{LogEvent, Logger};
use crate::logln;
use crate::simulationrun::{SimulationOutcome, SimulationRun, StepRecord, TerminationReason};

/// Exponent of the CPA penalty in the score
const SCORE_BETA: i32 = 2;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportMeta {
    pub campaign_id: u64,
    pub advertiser_number: String,
    pub category: String,
    pub initial_budget: f64,
    pub cpa_constraint: f64,
    pub steps_requested: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSummary {
    pub steps_completed: usize,
    pub termination: TerminationReason,
    pub total_cost: f64,
    pub total_conversions: u64,
    pub total_wins: u64,
    pub total_traffic: u64,
    pub final_cpa: f64,
    pub final_alpha: f64,
    pub budget_percentage: f64,
    pub score: f64,
}

/// Result of one run as handed to callers; assembled once and never changed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationReport {
    pub meta: ReportMeta,
    pub history: Vec<StepRecord>,
    pub summary: ReportSummary,
}

/// Conversions discounted by how far the realized CPA overshoots the constraint
/// `reward * min(1, cpa_constraint / cpa)^2`
pub fn score(reward: u64, cpa: f64, cpa_constraint: f64) -> f64 {
    let penalty = if cpa > cpa_constraint {
        (cpa_constraint / cpa).powi(SCORE_BETA)
    } else {
        1.0
    };
    reward as f64 * penalty
}

impl SimulationReport {
    pub fn new(run: &SimulationRun, outcome: SimulationOutcome) -> Self {
        let meta = ReportMeta {
            campaign_id: run.campaign_id,
            advertiser_number: run.advertiser_number.clone(),
            category: run.category.clone(),
            initial_budget: run.initial_budget,
            cpa_constraint: run.cpa_constraint,
            steps_requested: run.steps,
        };

        let summary = match outcome.history.last() {
            Some(last) => ReportSummary {
                steps_completed: outcome.history.len(),
                termination: outcome.termination,
                total_cost: last.total_cost,
                total_conversions: last.total_conversions,
                total_wins: last.total_wins,
                total_traffic: outcome.history.iter().map(|r| r.traffic).sum(),
                final_cpa: last.real_cpa,
                final_alpha: outcome.final_alpha,
                budget_percentage: last.budget_percentage,
                score: score(last.total_conversions, last.real_cpa, run.cpa_constraint),
            },
            None => ReportSummary {
                steps_completed: 0,
                termination: outcome.termination,
                total_cost: 0.0,
                total_conversions: 0,
                total_wins: 0,
                total_traffic: 0,
                final_cpa: 0.0,
                final_alpha: outcome.final_alpha,
                budget_percentage: 0.0,
                score: 0.0,
            },
        };

        Self {
            meta,
            history: outcome.history,
            summary,
        }
    }

    /// Print the step table and summary
    pub fn printout(&self, logger: &mut Logger) {
        logln!(
            logger,
            LogEvent::Run,
            "Campaign {} advertiser={} category={} budget={:.2} cpa<={:.2} steps={}",
            self.meta.campaign_id,
            self.meta.advertiser_number,
            self.meta.category,
            self.meta.initial_budget,
            self.meta.cpa_constraint,
            self.meta.steps_requested
        );
        logln!(
            logger,
            LogEvent::Step,
            "{:>4} {:>8} {:>7} {:>6} {:>10} {:>12} {:>5} {:>7} {:>10} {:>7}",
            "step", "alpha", "traffic", "wins", "cost", "total_cost", "conv", "t_conv", "real_cpa", "budget%"
        );
        for r in &self.history {
            logln!(
                logger,
                LogEvent::Step,
                "{:>4} {:>8.4} {:>7} {:>6} {:>10.2} {:>12.2} {:>5} {:>7} {:>10.2} {:>6.1}%",
                r.step,
                r.alpha,
                r.traffic,
                r.wins,
                r.cost,
                r.total_cost,
                r.conversions,
                r.total_conversions,
                r.real_cpa,
                r.budget_percentage
            );
        }
        let s = &self.summary;
        logln!(
            logger,
            LogEvent::Run,
            "Finished after {} steps ({:?}): cost {:.2} ({:.1}% of budget), conversions {}, wins {}/{}, cpa {:.2}, alpha {:.4}, score {:.2}",
            s.steps_completed,
            s.termination,
            s.total_cost,
            s.budget_percentage,
            s.total_conversions,
            s.total_wins,
            s.total_traffic,
            s.final_cpa,
            s.final_alpha,
            s.score
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::campaign::CampaignProfile;

    fn record(step: usize, cost: f64, total_cost: f64, conversions: u64, total_conversions: u64) -> StepRecord {
        StepRecord {
            step,
            alpha: 1.0,
            traffic: 100,
            wins: 10,
            cost,
            total_cost,
            conversions,
            total_conversions,
            total_wins: 10 * (step as u64 + 1),
            real_cpa: total_cost / total_conversions.max(1) as f64,
            budget_percentage: total_cost / 10.0,
            remaining_budget: 1000.0 - total_cost,
        }
    }

    #[test]
    fn test_score() {
        assert_eq!(score(10, 40.0, 50.0), 10.0);
        assert_eq!(score(10, 50.0, 50.0), 10.0);
        assert!((score(10, 100.0, 50.0) - 2.5).abs() < 1e-12);
        assert_eq!(score(0, 0.0, 50.0), 0.0);
    }

    #[test]
    fn test_report_summary() {
        let campaign = CampaignProfile::new(101, "c", "adv-1001", "ecommerce", 1000.0, 50.0);
        let run = SimulationRun::new(&campaign, 48, 100).unwrap();
        let outcome = SimulationOutcome {
            history: vec![record(0, 100.0, 100.0, 1, 1), record(1, 200.0, 300.0, 2, 3)],
            termination: TerminationReason::StepsCompleted,
            final_alpha: 0.9,
        };
        let report = SimulationReport::new(&run, outcome);

        assert_eq!(report.meta.advertiser_number, "adv-1001");
        assert_eq!(report.meta.steps_requested, 48);
        assert_eq!(report.summary.steps_completed, 2);
        assert_eq!(report.summary.total_traffic, 200);
        assert_eq!(report.summary.total_wins, 20);
        assert_eq!(report.summary.total_cost, 300.0);
        assert_eq!(report.summary.final_cpa, 100.0);
        assert!((report.summary.score - 0.75).abs() < 1e-12);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["meta"]["campaign_id"], 101);
        assert_eq!(json["summary"]["termination"], "steps_completed");
        assert_eq!(json["history"][1]["cost"], 200.0);
        assert_eq!(json["history"][1]["total_cost"], 300.0);
        assert_eq!(json["history"][1]["conversions"], 2);
        assert_eq!(json["history"][1]["total_conversions"], 3);
    }
}

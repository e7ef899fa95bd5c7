use plotters::prelude::*;
use std::error::Error;
use std::path::Path;

use crate::report::SimulationReport;

/// Draw the playback chart of a run as SVG
/// Three panels over the steps: alpha, realized CPA against the constraint, and budget spent with per-step cost and conversions
pub fn generate_simulation_chart(report: &SimulationReport, path: &Path) -> Result<(), Box<dyn Error>> {
    if report.history.is_empty() {
        return Err("Cannot chart a run without steps".into());
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let steps = report.history.len();
    let x_range = 0f64..(steps.max(2) - 1) as f64;

    let root = SVGBackend::new(path, (1000, 900)).into_drawing_area();
    root.fill(&WHITE)?;
    let panels = root.split_evenly((3, 1));

    // alpha
    {
        let max_alpha = report.history.iter().map(|r| r.alpha).fold(0.0, f64::max);
        let mut chart = ChartBuilder::on(&panels[0])
            .caption(
                format!("Campaign {} - bid multiplier", report.meta.campaign_id),
                ("sans-serif", 20),
            )
            .margin(10)
            .x_label_area_size(30)
            .y_label_area_size(50)
            .build_cartesian_2d(x_range.clone(), 0.0..max_alpha * 1.1)?;

        chart.configure_mesh().x_desc("Step").y_desc("Alpha").draw()?;

        chart
            .draw_series(LineSeries::new(
                report.history.iter().map(|r| (r.step as f64, r.alpha)),
                &BLUE,
            ))?
            .label("alpha")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &BLUE));

        chart
            .configure_series_labels()
            .background_style(&WHITE.mix(0.8))
            .border_style(&BLACK)
            .draw()?;
    }

    // realized CPA
    {
        let constraint = report.meta.cpa_constraint;
        let max_cpa = report
            .history
            .iter()
            .map(|r| r.real_cpa)
            .fold(constraint, f64::max);
        let mut chart = ChartBuilder::on(&panels[1])
            .caption("Realized CPA", ("sans-serif", 20))
            .margin(10)
            .x_label_area_size(30)
            .y_label_area_size(50)
            .build_cartesian_2d(x_range.clone(), 0.0..max_cpa * 1.1)?;

        chart.configure_mesh().x_desc("Step").y_desc("CPA").draw()?;

        chart
            .draw_series(LineSeries::new(
                report.history.iter().map(|r| (r.step as f64, r.real_cpa)),
                &RED,
            ))?
            .label("real CPA")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &RED));

        chart
            .draw_series(std::iter::once(PathElement::new(
                vec![(x_range.start, constraint), (x_range.end, constraint)],
                &BLACK,
            )))?
            .label(format!("constraint: {:.2}", constraint))
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &BLACK));

        chart
            .configure_series_labels()
            .background_style(&WHITE.mix(0.8))
            .border_style(&BLACK)
            .draw()?;
    }

    // budget
    {
        let max_cost = report.history.iter().map(|r| r.cost).fold(0.0, f64::max);
        // per-step cost is drawn against budget percentage, rescaled onto 0..100
        let cost_scale = if max_cost > 0.0 { 100.0 / max_cost } else { 0.0 };
        let mut chart = ChartBuilder::on(&panels[2])
            .caption(
                format!("Budget spent (max step cost {:.2})", max_cost),
                ("sans-serif", 20),
            )
            .margin(10)
            .x_label_area_size(30)
            .y_label_area_size(50)
            .build_cartesian_2d(x_range, 0.0..105.0)?;

        chart.configure_mesh().x_desc("Step").y_desc("%").draw()?;

        chart
            .draw_series(report.history.iter().map(|r| {
                let x = r.step as f64;
                Rectangle::new([(x - 0.3, 0.0), (x + 0.3, r.cost * cost_scale)], GREEN.mix(0.4).filled())
            }))?
            .label("step cost (relative)")
            .legend(|(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], GREEN.mix(0.4).filled()));

        let max_conversions = report.history.iter().map(|r| r.conversions).max().unwrap_or(0);
        if max_conversions > 0 {
            let conversion_scale = 100.0 / max_conversions as f64;
            chart
                .draw_series(LineSeries::new(
                    report.history.iter().map(|r| (r.step as f64, r.conversions as f64 * conversion_scale)),
                    &CYAN,
                ))?
                .label(format!("step conversions (relative, max {})", max_conversions))
                .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &CYAN));
        }

        chart
            .draw_series(LineSeries::new(
                report.history.iter().map(|r| (r.step as f64, r.budget_percentage)),
                &MAGENTA,
            ))?
            .label("budget %")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &MAGENTA));

        chart
            .configure_series_labels()
            .background_style(&WHITE.mix(0.8))
            .border_style(&BLACK)
            .draw()?;
    }

    root.present()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::campaign::CampaignProfile;
    use crate::controllers::ControllerOnlineLp;
    use crate::impressions::StepOutcome;
    use crate::simulationrun::{simulate, RunLimits, SimulationRun};
    use crate::traffic::AuctionOutcomeGenerator;

    struct Steady;

    impl AuctionOutcomeGenerator for Steady {
        fn simulate_step(&self, _alpha: f64, step_index: usize) -> Result<StepOutcome, crate::errors::SimulationError> {
            Ok(StepOutcome {
                traffic: 100,
                wins: 10,
                cost: 20.0 + step_index as f64,
                conversions: 1,
            })
        }
    }

    #[test]
    fn test_chart_written() {
        let campaign = CampaignProfile::new(101, "c", "adv-1001", "ecommerce", 1000.0, 50.0);
        let run = SimulationRun::new(&campaign, 10, 100).unwrap();
        let outcome = simulate(&run, &Steady, &ControllerOnlineLp::new(), &RunLimits::unbounded()).unwrap();
        let report = SimulationReport::new(&run, outcome);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("charts").join("run.svg");
        generate_simulation_chart(&report, &path).unwrap();
        let svg = std::fs::read_to_string(&path).unwrap();
        assert!(svg.contains("<svg"));
        assert!(svg.contains("Realized CPA"));
    }
}

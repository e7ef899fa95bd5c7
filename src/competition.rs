use rand::{rngs::StdRng, Rng};
use rand_distr::{Distribution, LogNormal};

use crate::config::CompetitionConfig;
use crate::errors::{ensure_positive, SimulationError};
use crate::utils::lognormal_dist;

/// Win-rate curve of a first price auction
/// Returns: 1.0 / (1 + exp(-(bid - offset) * scale))
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sigmoid {
    pub offset: f64,
    pub scale: f64,
}

impl Sigmoid {
    pub fn new(offset: f64, scale: f64) -> Self {
        Self { offset, scale }
    }

    /// Get the win probability at bid x
    pub fn get_probability(&self, x: f64) -> f64 {
        1.0 / (1.0 + (-(x - self.offset) * self.scale).exp())
    }
}

/// Competition a single opportunity faces, fixed before the bid is known
/// so that the same draws decide the auction at any alpha
#[derive(Debug, Clone, PartialEq)]
pub enum ImpressionCompetition {
    /// Second price: win at or above the least winning cost and pay it
    LeastWinningCost(f64),
    /// First price: win when `draw` falls under the curve at the bid, pay the bid
    WinRateCurve { curve: Sigmoid, draw: f64 },
}

impl ImpressionCompetition {
    /// Price charged if `bid` wins, `None` if it loses
    pub fn resolve(&self, bid: f64) -> Option<f64> {
        match self {
            ImpressionCompetition::LeastWinningCost(cost) => {
                if bid >= *cost {
                    Some(*cost)
                } else {
                    None
                }
            }
            ImpressionCompetition::WinRateCurve { curve, draw } => {
                if *draw < curve.get_probability(bid) {
                    Some(bid)
                } else {
                    None
                }
            }
        }
    }
}

/// Trait for generating the competition of an opportunity
/// `reference_price` is what the opportunity is worth at the CPA constraint, `cpa_constraint * p_value`
pub trait CompetitionGeneratorTrait: Send + Sync {
    /// Consumes exactly one draw from `rng`
    fn generate_competition(&self, reference_price: f64, rng: &mut StdRng) -> ImpressionCompetition;
}

/// Log-normal least winning cost with mean `level * reference_price`
/// and standard deviation `spread` times that mean
pub struct CompetitionGeneratorLogNormal {
    level: f64,
    unit: LogNormal<f64>,
}

impl CompetitionGeneratorLogNormal {
    pub fn new(level: f64, spread: f64) -> Result<Self, SimulationError> {
        ensure_positive("traffic.competition.level", level)?;
        ensure_positive("traffic.competition.spread", spread)?;
        // log-normal scales linearly, so one unit-mean distribution serves every price
        let unit = lognormal_dist(1.0, spread)?;
        Ok(Self { level, unit })
    }
}

impl CompetitionGeneratorTrait for CompetitionGeneratorLogNormal {
    fn generate_competition(&self, reference_price: f64, rng: &mut StdRng) -> ImpressionCompetition {
        let cost = self.level * reference_price * self.unit.sample(rng);
        ImpressionCompetition::LeastWinningCost(cost)
    }
}

/// Sigmoid win rate centred on `level * reference_price`
/// `sharpness` is relative to the price, so the curve has the same shape for every opportunity
pub struct CompetitionGeneratorSigmoid {
    level: f64,
    sharpness: f64,
}

impl CompetitionGeneratorSigmoid {
    pub fn new(level: f64, sharpness: f64) -> Result<Self, SimulationError> {
        ensure_positive("traffic.competition.level", level)?;
        ensure_positive("traffic.competition.sharpness", sharpness)?;
        Ok(Self { level, sharpness })
    }
}

impl CompetitionGeneratorTrait for CompetitionGeneratorSigmoid {
    fn generate_competition(&self, reference_price: f64, rng: &mut StdRng) -> ImpressionCompetition {
        let curve = Sigmoid::new(self.level * reference_price, self.sharpness / reference_price);
        ImpressionCompetition::WinRateCurve {
            curve,
            draw: rng.gen::<f64>(),
        }
    }
}

pub fn competition_generator(
    config: &CompetitionConfig,
) -> Result<Box<dyn CompetitionGeneratorTrait>, SimulationError> {
    Ok(match *config {
        CompetitionConfig::LogNormal { level, spread } => Box::new(CompetitionGeneratorLogNormal::new(level, spread)?),
        CompetitionConfig::Sigmoid { level, sharpness } => {
            Box::new(CompetitionGeneratorSigmoid::new(level, sharpness)?)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_sigmoid_midpoint() {
        let s = Sigmoid::new(2.0, 3.0);
        assert!((s.get_probability(2.0) - 0.5).abs() < 1e-12);
        assert!(s.get_probability(3.0) > 0.9);
        assert!(s.get_probability(1.0) < 0.1);
    }

    #[test]
    fn test_second_price_resolution() {
        let c = ImpressionCompetition::LeastWinningCost(1.5);
        assert_eq!(c.resolve(1.0), None);
        assert_eq!(c.resolve(1.5), Some(1.5));
        assert_eq!(c.resolve(4.0), Some(1.5));
    }

    #[test]
    fn test_first_price_pays_bid() {
        let c = ImpressionCompetition::WinRateCurve {
            curve: Sigmoid::new(1.0, 10.0),
            draw: 0.5,
        };
        assert_eq!(c.resolve(0.5), None);
        assert_eq!(c.resolve(1.2), Some(1.2));
    }

    #[test]
    fn test_lognormal_centred_on_level() {
        let generator = CompetitionGeneratorLogNormal::new(0.8, 0.5).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let n = 20_000;
        let mut sum = 0.0;
        for _ in 0..n {
            match generator.generate_competition(2.0, &mut rng) {
                ImpressionCompetition::LeastWinningCost(cost) => {
                    assert!(cost > 0.0);
                    sum += cost;
                }
                other => panic!("unexpected {:?}", other),
            }
        }
        let mean = sum / n as f64;
        assert!((mean - 1.6).abs() < 0.05, "mean {}", mean);
    }

    #[test]
    fn test_generator_from_config() {
        assert!(competition_generator(&CompetitionConfig::default()).is_ok());
        assert!(competition_generator(&CompetitionConfig::LogNormal { level: 0.0, spread: 0.5 }).is_err());
        assert!(competition_generator(&CompetitionConfig::Sigmoid { level: 1.0, sharpness: 4.0 }).is_ok());
    }
}

//! Service and simulation configuration
//!
//! Loaded from a TOML file (`--config` or `PACING_SIM_CONFIG`); every section has defaults,
//! so an empty file or no file at all gives a working setup.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::campaign::CampaignProfile;
use crate::errors::{ensure_positive, SimulationError};

pub const CONFIG_PATH_ENV: &str = "PACING_SIM_CONFIG";
pub const BIND_ENV: &str = "PACING_SIM_BIND";
pub const SEED_ENV: &str = "PACING_SIM_SEED";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub simulation: SimulationConfig,
    pub pacing: PacingConfig,
    pub traffic: TrafficConfig,
    /// Campaigns available to simulate; empty means the built-in catalog
    pub campaigns: Vec<CampaignProfile>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
        }
    }
}

/// Limits applied to a single run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Steps simulated when a request does not say (48 half-hour slots)
    pub default_steps: usize,
    pub max_steps: usize,
    /// Wall-clock budget for one run
    pub timeout_ms: u64,
    /// Base seed mixed with campaign id and step for the synthetic traffic
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            default_steps: 48,
            max_steps: 100,
            timeout_ms: 5_000,
            seed: 20_240_601,
        }
    }
}

impl SimulationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    pub tolerance_fraction: f64,
    pub proportional_gain: f64,
    /// Largest relative change of alpha in one step
    pub max_adjustment_factor: f64,
    pub initial_alpha: f64,
    pub min_alpha: f64,
    /// Bids never exceed 1.5x the CPA constraint times conversion probability
    pub max_alpha: f64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            tolerance_fraction: 0.02,
            proportional_gain: 0.3,
            max_adjustment_factor: 0.2,
            initial_alpha: 1.0,
            min_alpha: 0.05,
            max_alpha: 1.5,
        }
    }
}

impl PacingConfig {
    pub fn validate(&self) -> Result<(), SimulationError> {
        ensure_positive("pacing.proportional_gain", self.proportional_gain)?;
        ensure_positive("pacing.max_adjustment_factor", self.max_adjustment_factor)?;
        ensure_positive("pacing.initial_alpha", self.initial_alpha)?;
        ensure_positive("pacing.min_alpha", self.min_alpha)?;
        ensure_positive("pacing.max_alpha", self.max_alpha)?;
        if !(0.0..1.0).contains(&self.tolerance_fraction) {
            return Err(SimulationError::validation("pacing.tolerance_fraction", "must be in [0, 1)"));
        }
        if self.max_adjustment_factor >= 1.0 {
            // a 100% cut would drive alpha to zero
            return Err(SimulationError::validation("pacing.max_adjustment_factor", "must be < 1"));
        }
        if self.min_alpha > self.max_alpha {
            return Err(SimulationError::validation("pacing.min_alpha", "must not exceed max_alpha"));
        }
        Ok(())
    }
}

/// Inclusive range of bid opportunities per step
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrafficRange {
    pub min: u32,
    pub max: u32,
}

/// How the least winning cost of an opportunity is produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum CompetitionConfig {
    /// Second price against a log-normal competing bid centred on
    /// `level * cpa_constraint * p_value` with relative spread `spread`
    LogNormal { level: f64, spread: f64 },
    /// First price with a sigmoid win-rate curve centred on `level * cpa_constraint * p_value`
    Sigmoid { level: f64, sharpness: f64 },
}

impl Default for CompetitionConfig {
    fn default() -> Self {
        CompetitionConfig::LogNormal { level: 0.8, spread: 0.5 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrafficConfig {
    pub peak_traffic: TrafficRange,
    pub off_peak_traffic: TrafficRange,
    /// Hour-of-day windows (inclusive) that count as peak
    pub peak_hours: Vec<[f64; 2]>,
    pub p_value_min: f64,
    pub p_value_max: f64,
    pub competition: CompetitionConfig,
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            peak_traffic: TrafficRange { min: 150, max: 300 },
            off_peak_traffic: TrafficRange { min: 50, max: 120 },
            peak_hours: vec![[8.0, 10.0], [19.0, 22.0]],
            p_value_min: 0.001,
            p_value_max: 0.08,
            competition: CompetitionConfig::default(),
        }
    }
}

impl TrafficConfig {
    /// Zero traffic must never come out of a configuration mistake
    pub fn validate(&self) -> Result<(), SimulationError> {
        for (field, range) in [
            ("traffic.peak_traffic", self.peak_traffic),
            ("traffic.off_peak_traffic", self.off_peak_traffic),
        ] {
            if range.min == 0 {
                return Err(SimulationError::validation(field, "min must be >= 1"));
            }
            if range.min > range.max {
                return Err(SimulationError::validation(field, "min must not exceed max"));
            }
        }
        ensure_positive("traffic.p_value_min", self.p_value_min)?;
        if !(self.p_value_min <= self.p_value_max && self.p_value_max <= 1.0) {
            return Err(SimulationError::validation(
                "traffic.p_value_max",
                "must be within [p_value_min, 1]",
            ));
        }
        match self.competition {
            CompetitionConfig::LogNormal { level, spread } => {
                ensure_positive("traffic.competition.level", level)?;
                ensure_positive("traffic.competition.spread", spread)?;
            }
            CompetitionConfig::Sigmoid { level, sharpness } => {
                ensure_positive("traffic.competition.level", level)?;
                ensure_positive("traffic.competition.sharpness", sharpness)?;
            }
        }
        Ok(())
    }
}

impl AppConfig {
    /// Load from TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load from an explicit path, else from `PACING_SIM_CONFIG`, else defaults,
    /// then apply environment overrides
    pub fn from_env(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => match std::env::var(CONFIG_PATH_ENV) {
                Ok(path) => Self::load(&path)?,
                Err(_) => {
                    tracing::debug!("{} not set, using default config", CONFIG_PATH_ENV);
                    Self::default()
                }
            },
        };

        if let Ok(bind) = std::env::var(BIND_ENV) {
            config.server.bind = bind;
        }
        if let Ok(seed) = std::env::var(SEED_ENV) {
            config.simulation.seed = seed
                .parse()
                .map_err(|e| anyhow::anyhow!("{} must be an integer: {}", SEED_ENV, e))?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SimulationError> {
        if self.simulation.max_steps == 0 {
            return Err(SimulationError::validation("simulation.max_steps", "must be > 0"));
        }
        if self.simulation.default_steps == 0 || self.simulation.default_steps > self.simulation.max_steps {
            return Err(SimulationError::validation(
                "simulation.default_steps",
                "must be within 1..=max_steps",
            ));
        }
        if self.simulation.timeout_ms == 0 {
            return Err(SimulationError::validation("simulation.timeout_ms", "must be > 0"));
        }
        self.pacing.validate()?;
        self.traffic.validate()?;
        for campaign in &self.campaigns {
            campaign.validate()?;
        }
        Ok(())
    }

    /// Save to TOML file
    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}

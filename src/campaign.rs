use serde::{Deserialize, Serialize};

use crate::errors::{ensure_positive, SimulationError};

/// The slice of a campaign the simulator needs: who it belongs to, how much it may spend,
/// and the cost per acquisition it must stay under
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignProfile {
    pub campaign_id: u64,
    pub name: String,
    pub advertiser_number: String,
    pub category: String,
    pub budget: f64,
    pub cpa_constraint: f64,
}

impl CampaignProfile {
    pub fn new(
        campaign_id: u64,
        name: impl Into<String>,
        advertiser_number: impl Into<String>,
        category: impl Into<String>,
        budget: f64,
        cpa_constraint: f64,
    ) -> Self {
        Self {
            campaign_id,
            name: name.into(),
            advertiser_number: advertiser_number.into(),
            category: category.into(),
            budget,
            cpa_constraint,
        }
    }

    /// A campaign with no money or no CPA target cannot be simulated;
    /// this is bad input, not a run that spends nothing.
    pub fn validate(&self) -> Result<(), SimulationError> {
        ensure_positive("initial_budget", self.budget)?;
        ensure_positive("cpa_constraint", self.cpa_constraint)?;
        Ok(())
    }

    pub fn profile_string(&self) -> String {
        format!(
            "Campaign {} ({}) advertiser={} category={} budget={:.2} cpa<={:.2}",
            self.campaign_id, self.name, self.advertiser_number, self.category, self.budget, self.cpa_constraint
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        let campaign = CampaignProfile::new(1, "c", "adv-1", "ecommerce", 1000.0, 50.0);
        assert!(campaign.validate().is_ok());

        let broke = CampaignProfile { budget: 0.0, ..campaign.clone() };
        assert_eq!(
            broke.validate().unwrap_err(),
            SimulationError::validation("initial_budget", "must be > 0, got 0")
        );

        let no_target = CampaignProfile { cpa_constraint: -5.0, ..campaign };
        assert!(matches!(
            no_target.validate(),
            Err(SimulationError::Validation { field: "cpa_constraint", .. })
        ));
    }
}

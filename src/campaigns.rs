use crate::campaign::CampaignProfile;

/// Read-only source of campaigns to simulate
/// The real campaign store lives elsewhere; the simulator only ever looks campaigns up
pub trait CampaignDirectory: Send + Sync {
    fn get(&self, campaign_id: u64) -> Option<CampaignProfile>;

    fn list(&self) -> Vec<CampaignProfile>;
}

/// Container for campaigns held in memory
pub struct Campaigns {
    pub campaigns: Vec<CampaignProfile>,
}

impl Campaigns {
    /// Create a new empty campaigns container
    pub fn new() -> Self {
        Self {
            campaigns: Vec::new(),
        }
    }

    /// Add a campaign; a campaign with the same id replaces the earlier one
    pub fn add(&mut self, campaign: CampaignProfile) {
        self.campaigns.retain(|c| c.campaign_id != campaign.campaign_id);
        self.campaigns.push(campaign);
    }

    /// Campaigns used when the configuration does not list any.
    /// CPA constraints are 1.5x the campaign's manual bid.
    pub fn default_catalog() -> Self {
        let mut campaigns = Self::new();
        campaigns.add(CampaignProfile::new(101, "new_arrivals_winter_coats_v1", "adv-1001", "ecommerce", 5000.0, 67.5));
        campaigns.add(CampaignProfile::new(102, "singles_day_warmup_beauty_gift_box", "adv-1002", "ecommerce", 2000.0, 180.0));
        campaigns.add(CampaignProfile::new(103, "inventory_clearance_long_tail_003", "adv-1003", "local_services", 1000.0, 30.0));
        campaigns.add(CampaignProfile::new(104, "brand_exposure_spring_festival_ab", "adv-1004", "automotive", 8000.0, 120.0));
        campaigns.add(CampaignProfile::new(105, "high_value_audience_precision", "adv-1005", "finance", 3000.0, 225.0));
        campaigns
    }

    /// Build from configured campaigns, falling back to the default catalog when none are configured
    pub fn from_profiles(profiles: &[CampaignProfile]) -> Self {
        if profiles.is_empty() {
            return Self::default_catalog();
        }
        let mut campaigns = Self::new();
        for profile in profiles {
            campaigns.add(profile.clone());
        }
        campaigns
    }
}

impl Default for Campaigns {
    fn default() -> Self {
        Self::default_catalog()
    }
}

impl CampaignDirectory for Campaigns {
    fn get(&self, campaign_id: u64) -> Option<CampaignProfile> {
        self.campaigns.iter().find(|c| c.campaign_id == campaign_id).cloned()
    }

    fn list(&self) -> Vec<CampaignProfile> {
        let mut campaigns = self.campaigns.clone();
        campaigns.sort_by_key(|c| c.campaign_id);
        campaigns
    }
}

use std::sync::Arc;

use crate::campaigns::{CampaignDirectory, Campaigns};
use crate::config::AppConfig;
use crate::service::SimulationService;

#[derive(Clone)]
pub struct AppState {
    pub service: SimulationService,
}

impl AppState {
    /// State over the configured campaigns, or the built-in catalog when none are configured
    pub fn new(config: AppConfig) -> Self {
        let campaigns = Campaigns::from_profiles(&config.campaigns);
        Self::with_directory(config, Arc::new(campaigns))
    }

    pub fn with_directory(config: AppConfig, campaigns: Arc<dyn CampaignDirectory>) -> Self {
        Self {
            service: SimulationService::new(Arc::new(config), campaigns),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        AppState::new(AppConfig::default())
    }
}

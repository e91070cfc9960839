mod client_factory;
mod integrations_model;
mod integrations_service;
mod integrations_traits;

pub use client_factory::OneCClientFactory;
pub use integrations_model::*;
pub use integrations_service::{
    EntityTotals, HealthCheckReport, IntegrationService, IntegrationStats, RecentRun,
    SyncStatusOverview, MAX_OVERVIEW_HOURS, MIN_OVERVIEW_HOURS, RECENT_RUNS,
};
pub use integrations_traits::{ClientFactory, IntegrationRepositoryTrait, IntegrationServiceTrait};

#[cfg(test)]
mod tests;

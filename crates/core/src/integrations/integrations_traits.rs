//! Integration repository and service traits.

use async_trait::async_trait;
use std::sync::Arc;

use super::integrations_model::{Integration, IntegrationOutcome, IntegrationUpdate, NewIntegration};
use super::integrations_service::{HealthCheckReport, IntegrationStats, SyncStatusOverview};
use crate::errors::Result;
use tradeos_onec::{ConnectionTestResult, OneCApi};

/// Trait defining the contract for Integration repository operations.
///
/// Integrations are never hard-deleted; disabling is the only removal.
#[async_trait]
pub trait IntegrationRepositoryTrait: Send + Sync {
    /// Creates a new integration with fresh counters.
    async fn create(&self, new_integration: NewIntegration) -> Result<Integration>;

    /// Applies an admin update.
    async fn update(&self, integration_id: &str, update: IntegrationUpdate) -> Result<Integration>;

    /// Applies a runtime outcome (counters, health, timestamps).
    ///
    /// Implementations must read and write the row atomically so that
    /// concurrent outcomes for the same integration are not lost.
    async fn record_outcome(
        &self,
        integration_id: &str,
        outcome: IntegrationOutcome,
    ) -> Result<Integration>;

    /// Retrieves an integration by its ID.
    fn get_by_id(&self, integration_id: &str) -> Result<Integration>;

    /// Retrieves an integration by its unique name.
    fn get_by_name(&self, name: &str) -> Result<Option<Integration>>;

    /// Lists integrations with optional filters.
    fn list(
        &self,
        is_enabled: Option<bool>,
        integration_type: Option<&str>,
    ) -> Result<Vec<Integration>>;
}

/// Builds a client for an integration's endpoint and credentials.
pub trait ClientFactory: Send + Sync {
    fn client_for(&self, integration: &Integration) -> Result<Arc<dyn OneCApi>>;
}

/// Trait defining the contract for integration administration and health.
#[async_trait]
pub trait IntegrationServiceTrait: Send + Sync {
    async fn create_integration(&self, new_integration: NewIntegration) -> Result<Integration>;

    async fn update_integration(
        &self,
        integration_id: &str,
        update: IntegrationUpdate,
    ) -> Result<Integration>;

    async fn set_enabled(&self, integration_id: &str, enabled: bool) -> Result<Integration>;

    fn get_integration(&self, integration_id: &str) -> Result<Integration>;

    fn list_integrations(
        &self,
        is_enabled: Option<bool>,
        integration_type: Option<&str>,
    ) -> Result<Vec<Integration>>;

    /// Probes an integration without touching its stored state.
    async fn test_connection(&self, integration_id: &str) -> Result<ConnectionTestResult>;

    /// Health-checks every enabled integration and records the results.
    async fn check_all(&self) -> Result<Vec<HealthCheckReport>>;

    fn integration_stats(&self, integration_id: &str) -> Result<IntegrationStats>;

    fn sync_status_overview(&self, last_hours: i64) -> Result<SyncStatusOverview>;
}

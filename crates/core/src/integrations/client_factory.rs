use std::sync::Arc;

use super::integrations_model::{Integration, INTEGRATION_TYPE_ONEC};
use super::integrations_traits::ClientFactory;
use crate::errors::{Error, Result, ValidationError};
use tradeos_onec::{ClientConfig, OneCApi, OneCClient, RetryPolicy};

/// Builds HTTP clients from an integration's stored settings.
#[derive(Debug, Clone, Default)]
pub struct OneCClientFactory {
    retry: RetryPolicy,
}

impl OneCClientFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the backoff base (the attempt count always comes from the
    /// integration's settings).
    pub fn with_retry(retry: RetryPolicy) -> Self {
        Self { retry }
    }
}

impl ClientFactory for OneCClientFactory {
    fn client_for(&self, integration: &Integration) -> Result<Arc<dyn OneCApi>> {
        if integration.integration_type != INTEGRATION_TYPE_ONEC {
            return Err(Error::Validation(ValidationError::InvalidInput(format!(
                "Unsupported integration type '{}'",
                integration.integration_type
            ))));
        }

        let config = ClientConfig::new(integration.base_url.clone(), integration.credential.clone())
            .with_timeout(integration.settings.timeout())
            .with_retry(RetryPolicy {
                max_attempts: integration.settings.max_retries,
                ..self.retry
            });
        Ok(Arc::new(OneCClient::new(config)?))
    }
}

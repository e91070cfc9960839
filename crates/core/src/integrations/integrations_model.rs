//! Integration domain models.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration as StdDuration;

use crate::{errors::ValidationError, Error, Result};
use tradeos_onec::Credential;

/// The only external system type currently supported.
pub const INTEGRATION_TYPE_ONEC: &str = "1c";

/// Default interval between scheduled syncs.
pub const DEFAULT_SYNC_INTERVAL_SECS: i64 = 3600;

/// Weight of the newest sample in the rolling response-time average.
const RESPONSE_TIME_SMOOTHING: f64 = 0.2;

/// Runtime status of an integration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationStatus {
    #[default]
    Active,
    Inactive,
    Error,
    Syncing,
}

impl IntegrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntegrationStatus::Active => "active",
            IntegrationStatus::Inactive => "inactive",
            IntegrationStatus::Error => "error",
            IntegrationStatus::Syncing => "syncing",
        }
    }
}

impl std::str::FromStr for IntegrationStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            "error" => Ok(Self::Error),
            "syncing" => Ok(Self::Syncing),
            other => Err(Error::Validation(ValidationError::InvalidInput(format!(
                "Unknown integration status '{}'",
                other
            )))),
        }
    }
}

/// Typed per-integration tuning. Unknown keys are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IntegrationSettings {
    /// Per-attempt request timeout.
    pub timeout_secs: u64,
    /// Attempts per client request.
    pub max_retries: u32,
    /// Records requested per page.
    pub page_size: u32,
    /// Records per persistence transaction.
    pub batch_size: usize,
    /// Records between progress events.
    pub progress_every: usize,
}

impl Default for IntegrationSettings {
    fn default() -> Self {
        Self {
            timeout_secs: tradeos_onec::DEFAULT_TIMEOUT_SECS,
            max_retries: tradeos_onec::DEFAULT_MAX_RETRIES,
            page_size: 1000,
            batch_size: 50,
            progress_every: 10,
        }
    }
}

impl IntegrationSettings {
    pub fn validate(&self) -> Result<()> {
        fn check(ok: bool, message: &str) -> Result<()> {
            if ok {
                Ok(())
            } else {
                Err(Error::InvalidConfigValue(message.to_string()))
            }
        }
        check(
            (1..=600).contains(&self.timeout_secs),
            "timeout_secs must be between 1 and 600",
        )?;
        check(
            (1..=10).contains(&self.max_retries),
            "max_retries must be between 1 and 10",
        )?;
        check(
            (1..=1000).contains(&self.page_size),
            "page_size must be between 1 and 1000",
        )?;
        check(
            (1..=1000).contains(&self.batch_size),
            "batch_size must be between 1 and 1000",
        )?;
        check(self.progress_every >= 1, "progress_every must be at least 1")
    }

    pub fn timeout(&self) -> StdDuration {
        StdDuration::from_secs(self.timeout_secs)
    }
}

/// Domain model representing one configured external-system connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Integration {
    pub id: String,
    pub name: String,
    pub integration_type: String,
    pub base_url: String,
    pub credential: Credential,
    pub settings: IntegrationSettings,
    pub is_enabled: bool,
    pub is_healthy: bool,
    pub status: IntegrationStatus,
    pub sync_interval_secs: i64,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub next_sync_at: Option<DateTime<Utc>>,
    pub last_health_check: Option<DateTime<Utc>>,
    pub total_syncs: i64,
    pub successful_syncs: i64,
    pub failed_syncs: i64,
    /// Rolling average latency of calls to the external system.
    pub avg_response_time_ms: Option<f64>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A change to an integration's runtime state.
#[derive(Debug, Clone, PartialEq)]
pub enum IntegrationOutcome {
    SyncStarted {
        at: DateTime<Utc>,
    },
    SyncSucceeded {
        at: DateTime<Utc>,
        response_time_ms: Option<f64>,
    },
    SyncFailed {
        at: DateTime<Utc>,
        error: String,
    },
    SyncCancelled {
        at: DateTime<Utc>,
    },
    HealthChecked {
        at: DateTime<Utc>,
        healthy: bool,
        response_time_ms: Option<f64>,
    },
}

impl Integration {
    /// Applies a runtime outcome to counters, health and timestamps.
    ///
    /// Every finished sync bumps `total_syncs` together with exactly one of
    /// `successful_syncs` / `failed_syncs`.
    pub fn apply(&mut self, outcome: &IntegrationOutcome) {
        match outcome {
            IntegrationOutcome::SyncStarted { at } => {
                self.status = IntegrationStatus::Syncing;
                self.updated_at = *at;
            }
            IntegrationOutcome::SyncSucceeded {
                at,
                response_time_ms,
            } => {
                self.total_syncs += 1;
                self.successful_syncs += 1;
                self.last_sync_at = Some(*at);
                self.next_sync_at = Some(*at + Duration::seconds(self.sync_interval_secs));
                self.is_healthy = true;
                self.last_error = None;
                self.status = self.resting_status();
                if let Some(sample) = response_time_ms {
                    self.record_response_time(*sample);
                }
                self.updated_at = *at;
            }
            IntegrationOutcome::SyncFailed { at, error } => {
                self.total_syncs += 1;
                self.failed_syncs += 1;
                self.is_healthy = false;
                self.last_error = Some(error.clone());
                self.status = if self.is_enabled {
                    IntegrationStatus::Error
                } else {
                    IntegrationStatus::Inactive
                };
                self.updated_at = *at;
            }
            IntegrationOutcome::SyncCancelled { at } => {
                self.status = if self.is_healthy {
                    self.resting_status()
                } else {
                    IntegrationStatus::Error
                };
                self.updated_at = *at;
            }
            IntegrationOutcome::HealthChecked {
                at,
                healthy,
                response_time_ms,
            } => {
                self.is_healthy = *healthy;
                self.last_health_check = Some(*at);
                if let Some(sample) = response_time_ms {
                    self.record_response_time(*sample);
                }
                // A running sync owns the status until it finishes.
                if self.status != IntegrationStatus::Syncing {
                    self.status = if !self.is_enabled {
                        IntegrationStatus::Inactive
                    } else if *healthy {
                        IntegrationStatus::Active
                    } else {
                        IntegrationStatus::Error
                    };
                }
                self.updated_at = *at;
            }
        }
    }

    /// Share of finished syncs that succeeded, in percent.
    pub fn success_rate(&self) -> f64 {
        if self.total_syncs == 0 {
            0.0
        } else {
            self.successful_syncs as f64 / self.total_syncs as f64 * 100.0
        }
    }

    /// True when a scheduled sweep should include this integration.
    pub fn is_syncable(&self) -> bool {
        self.is_enabled && (self.is_healthy || self.status == IntegrationStatus::Active)
    }

    fn resting_status(&self) -> IntegrationStatus {
        if self.is_enabled {
            IntegrationStatus::Active
        } else {
            IntegrationStatus::Inactive
        }
    }

    fn record_response_time(&mut self, sample: f64) {
        self.avg_response_time_ms = Some(match self.avg_response_time_ms {
            Some(avg) => avg * (1.0 - RESPONSE_TIME_SMOOTHING) + sample * RESPONSE_TIME_SMOOTHING,
            None => sample,
        });
    }
}

/// Input model for creating a new integration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewIntegration {
    pub name: String,
    #[serde(default = "default_integration_type")]
    pub integration_type: String,
    pub base_url: String,
    #[serde(default)]
    pub credential: Credential,
    #[serde(default)]
    pub settings: IntegrationSettings,
    #[serde(default = "default_enabled")]
    pub is_enabled: bool,
    #[serde(default = "default_sync_interval")]
    pub sync_interval_secs: i64,
}

fn default_integration_type() -> String {
    INTEGRATION_TYPE_ONEC.to_string()
}

fn default_enabled() -> bool {
    true
}

fn default_sync_interval() -> i64 {
    DEFAULT_SYNC_INTERVAL_SECS
}

impl NewIntegration {
    /// Validates the new integration data.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Validation(ValidationError::InvalidInput(
                "Integration name cannot be empty".to_string(),
            )));
        }
        if self.integration_type != INTEGRATION_TYPE_ONEC {
            return Err(Error::Validation(ValidationError::InvalidInput(format!(
                "Unsupported integration type '{}'",
                self.integration_type
            ))));
        }
        validate_base_url(&self.base_url)?;
        validate_sync_interval(self.sync_interval_secs)?;
        self.settings.validate()
    }
}

/// Input model for updating an existing integration. `None` keeps the value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IntegrationUpdate {
    pub name: Option<String>,
    pub base_url: Option<String>,
    pub credential: Option<Credential>,
    pub settings: Option<IntegrationSettings>,
    pub sync_interval_secs: Option<i64>,
    pub is_enabled: Option<bool>,
}

impl IntegrationUpdate {
    pub fn validate(&self) -> Result<()> {
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(Error::Validation(ValidationError::InvalidInput(
                    "Integration name cannot be empty".to_string(),
                )));
            }
        }
        if let Some(base_url) = &self.base_url {
            validate_base_url(base_url)?;
        }
        if let Some(interval) = self.sync_interval_secs {
            validate_sync_interval(interval)?;
        }
        if let Some(settings) = &self.settings {
            settings.validate()?;
        }
        Ok(())
    }

    /// Applies the update onto an existing integration.
    pub fn apply_to(self, integration: &mut Integration, now: DateTime<Utc>) {
        if let Some(name) = self.name {
            integration.name = name;
        }
        if let Some(base_url) = self.base_url {
            integration.base_url = base_url;
        }
        if let Some(credential) = self.credential {
            integration.credential = credential;
        }
        if let Some(settings) = self.settings {
            integration.settings = settings;
        }
        if let Some(interval) = self.sync_interval_secs {
            integration.sync_interval_secs = interval;
        }
        if let Some(enabled) = self.is_enabled {
            integration.set_enabled(enabled);
        }
        integration.updated_at = now;
    }
}

impl Integration {
    /// Builds a fresh integration with zeroed counters.
    pub fn from_new(new_integration: NewIntegration, now: DateTime<Utc>) -> Self {
        let status = if new_integration.is_enabled {
            IntegrationStatus::Active
        } else {
            IntegrationStatus::Inactive
        };
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: new_integration.name.trim().to_string(),
            integration_type: new_integration.integration_type,
            base_url: new_integration.base_url.trim().to_string(),
            credential: new_integration.credential,
            settings: new_integration.settings,
            is_enabled: new_integration.is_enabled,
            is_healthy: true,
            status,
            sync_interval_secs: new_integration.sync_interval_secs,
            last_sync_at: None,
            next_sync_at: None,
            last_health_check: None,
            total_syncs: 0,
            successful_syncs: 0,
            failed_syncs: 0,
            avg_response_time_ms: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Enables or disables the integration. Disabling is the only removal.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.is_enabled = enabled;
        if !enabled {
            self.status = IntegrationStatus::Inactive;
        } else if self.status == IntegrationStatus::Inactive {
            self.status = if self.is_healthy {
                IntegrationStatus::Active
            } else {
                IntegrationStatus::Error
            };
        }
    }
}

fn validate_base_url(base_url: &str) -> Result<()> {
    let trimmed = base_url.trim();
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(Error::Validation(ValidationError::InvalidInput(format!(
            "Base URL must start with http:// or https://, got '{}'",
            base_url
        ))));
    }
    Ok(())
}

fn validate_sync_interval(interval: i64) -> Result<()> {
    if interval < 60 {
        return Err(Error::InvalidConfigValue(
            "sync_interval_secs must be at least 60".to_string(),
        ));
    }
    Ok(())
}

//! Console configuration.
//!
//! [`ConsoleConfig`] names the backing table and the resource it is exposed
//! under, the admin group operators must hold, and how the gateway pages
//! through the table and retries lost create races.

use std::time::Duration;

use keyrot_authn::{DEFAULT_ADMIN_GROUP, SessionConfig};
use keyrot_storage::keys::DEFAULT_PAGE_SIZE;
use serde::{Deserialize, Serialize};

use crate::error::{AdminError, AdminResult};

/// Resource name the key store is registered under by default.
pub const DEFAULT_RESOURCE_NAME: &str = "Encryption";

/// Configuration for [`AdminConsole`](crate::AdminConsole).
///
/// # Example
///
/// ```
/// use keyrot_admin::ConsoleConfig;
///
/// let config = ConsoleConfig::builder().table_name("encryption-keys").build()?;
/// assert_eq!(config.resource_name(), "Encryption");
/// assert_eq!(config.admin_group(), "AdminGroup");
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConsoleConfig {
    /// Backing table name.
    pub(crate) table_name: String,

    /// Resource name the key store is exposed under.
    #[serde(default = "default_resource_name")]
    pub(crate) resource_name: String,

    /// Group operators must belong to.
    #[serde(default = "default_admin_group")]
    pub(crate) admin_group: String,

    /// Items evaluated per backend scan call.
    #[serde(default = "default_scan_page_size")]
    pub(crate) scan_page_size: usize,

    /// Retry policy for creates that lose a version race.
    #[serde(default)]
    pub(crate) create_retry: CreateRetryConfig,
}

fn default_resource_name() -> String {
    DEFAULT_RESOURCE_NAME.to_owned()
}

fn default_admin_group() -> String {
    DEFAULT_ADMIN_GROUP.to_owned()
}

fn default_scan_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

/// Retry policy for creates that hit a version conflict.
///
/// Each attempt re-runs the full allocate-then-commit sequence, so a retried
/// create consumes a fresh version. The default makes a single attempt.
#[derive(Debug, Clone, PartialEq, Eq, bon::Builder, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateRetryConfig {
    /// Total attempts, including the first.
    #[serde(default = "default_max_attempts")]
    #[builder(default = default_max_attempts())]
    pub max_attempts: u32,

    /// Backoff before the first retry.
    #[serde(with = "humantime_serde", default = "default_initial_backoff")]
    #[builder(default = default_initial_backoff())]
    pub initial_backoff: Duration,

    /// Upper bound on the backoff between retries.
    #[serde(with = "humantime_serde", default = "default_max_backoff")]
    #[builder(default = default_max_backoff())]
    pub max_backoff: Duration,
}

fn default_max_attempts() -> u32 {
    1
}

fn default_initial_backoff() -> Duration {
    Duration::from_millis(50)
}

fn default_max_backoff() -> Duration {
    Duration::from_secs(1)
}

impl Default for CreateRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff: default_initial_backoff(),
            max_backoff: default_max_backoff(),
        }
    }
}

#[bon::bon]
impl ConsoleConfig {
    /// Creates a new configuration, validating all fields.
    ///
    /// # Arguments
    ///
    /// * `table_name` - Backing table name.
    ///
    /// # Optional Fields
    ///
    /// * `resource_name` - Resource name (default: `Encryption`).
    /// * `admin_group` - Required operator group (default: `AdminGroup`).
    /// * `scan_page_size` - Items per backend scan call (default: 100).
    /// * `create_retry` - Create retry policy (default: a single attempt).
    ///
    /// # Errors
    ///
    /// Returns [`AdminError::Config`] if validation fails (see [`validate`](Self::validate)).
    #[builder]
    pub fn new(
        #[builder(into)] table_name: String,
        #[builder(into, default = default_resource_name())] resource_name: String,
        #[builder(into, default = default_admin_group())] admin_group: String,
        #[builder(default = DEFAULT_PAGE_SIZE)] scan_page_size: usize,
        #[builder(default)] create_retry: CreateRetryConfig,
    ) -> AdminResult<Self> {
        let config = Self { table_name, resource_name, admin_group, scan_page_size, create_retry };
        config.validate()?;
        Ok(config)
    }

    /// Checks the configuration, e.g. after deserializing it.
    ///
    /// # Errors
    ///
    /// Returns [`AdminError::Config`] if:
    /// - `table_name`, `resource_name` or `admin_group` is empty
    /// - `scan_page_size` is zero
    /// - `create_retry.max_attempts` is zero
    /// - `create_retry.initial_backoff` exceeds `create_retry.max_backoff`
    pub fn validate(&self) -> AdminResult<()> {
        if self.table_name.is_empty() {
            return Err(AdminError::config("table_name cannot be empty"));
        }
        if self.resource_name.is_empty() {
            return Err(AdminError::config("resource_name cannot be empty"));
        }
        if self.admin_group.is_empty() {
            return Err(AdminError::config("admin_group cannot be empty"));
        }
        if self.scan_page_size == 0 {
            return Err(AdminError::config("scan_page_size must be at least 1"));
        }
        if self.create_retry.max_attempts == 0 {
            return Err(AdminError::config("create_retry.max_attempts must be at least 1"));
        }
        if self.create_retry.initial_backoff > self.create_retry.max_backoff {
            return Err(AdminError::config(
                "create_retry.initial_backoff cannot exceed create_retry.max_backoff",
            ));
        }
        Ok(())
    }

    /// Returns the backing table name.
    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Returns the resource name.
    #[must_use]
    pub fn resource_name(&self) -> &str {
        &self.resource_name
    }

    /// Returns the required operator group.
    #[must_use]
    pub fn admin_group(&self) -> &str {
        &self.admin_group
    }

    /// Returns the scan page size.
    #[must_use]
    pub fn scan_page_size(&self) -> usize {
        self.scan_page_size
    }

    /// Returns the create retry policy.
    #[must_use]
    pub fn create_retry(&self) -> &CreateRetryConfig {
        &self.create_retry
    }

    /// Session policy derived from this configuration.
    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::builder().admin_group(self.admin_group.clone()).build()
    }
}

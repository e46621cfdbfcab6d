//! Task runtime configuration

use serde::{Deserialize, Serialize};

use crate::error::ConfigResult;
use crate::validation::{validate_positive, Validatable};

/// Task runtime configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Bound of every task mailbox
    pub mailbox_capacity: usize,

    /// Number of workers in a worker pool
    pub pool_workers: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 256,
            pool_workers: 4,
        }
    }
}

impl Validatable for RuntimeConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(self.mailbox_capacity, "mailbox_capacity", self.domain_name())?;
        validate_positive(self.pool_workers, "pool_workers", self.domain_name())?;
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "runtime"
    }
}

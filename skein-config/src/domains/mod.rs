//! Domain-specific configuration modules

pub mod logging;
pub mod runtime;
pub mod socket;

use crate::error::ConfigResult;
use crate::validation::Validatable;
use serde::{Deserialize, Serialize};

/// Main Skein configuration combining all domains
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SkeinConfig {
    /// Task runtime and worker pool configuration
    pub runtime: runtime::RuntimeConfig,

    /// Request/reply socket configuration
    pub socket: socket::SocketConfig,

    /// Logging configuration
    pub logging: logging::LoggingConfig,
}

impl SkeinConfig {
    /// Validate all domain configurations
    pub fn validate_all(&self) -> ConfigResult<()> {
        self.runtime.validate()?;
        self.socket.validate()?;
        self.logging.validate()?;
        Ok(())
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        let config = SkeinConfig::default();
        serde_yaml::to_string(&config)
            .unwrap_or_else(|_| "# Failed to generate sample config".to_string())
    }
}

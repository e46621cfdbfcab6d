//! Request/reply socket configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ConfigResult;
use crate::validation::{validate_port_range, validate_required_string, Validatable};

/// Request/reply socket configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SocketConfig {
    /// Address the reply socket binds and the request socket dials
    pub bind_address: String,

    pub port: u16,

    /// Shared secret for the connection handshake
    pub authkey: String,

    /// Pause between reconnection attempts of a request socket
    #[serde(with = "humantime_serde")]
    pub reconnect_delay: Duration,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 20000,
            authkey: "default".to_string(),
            reconnect_delay: Duration::from_secs(1),
        }
    }
}

impl SocketConfig {
    /// `host:port` form of the configured endpoint
    pub fn address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

impl Validatable for SocketConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_required_string(&self.bind_address, "bind_address", self.domain_name())?;
        validate_port_range(self.port, "port", self.domain_name())?;
        validate_required_string(&self.authkey, "authkey", self.domain_name())?;

        if self.reconnect_delay.is_zero() {
            return Err(self.validation_error("reconnect_delay must be greater than 0"));
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "socket"
    }
}

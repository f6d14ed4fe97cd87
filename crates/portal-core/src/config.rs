//! Engine settings

use crate::address::validate_address;
use crate::error::InvalidAddress;
use crate::transport::tcp::DEFAULT_BIND_HOST;
use portal_types::DEFAULT_ADDRESS;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_RPC_PORT: u16 = 16810;
pub const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 30;

/// User settings, stored as `settings.json` in the portal home directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub version: String,
    /// Pre-filled address for new portals
    pub default_address: String,
    /// Port of the daemon's local RPC listener
    pub rpc_port: u16,
    /// Interface the TCP relay binds its listeners to
    pub bind_host: String,
    /// How long a client waits for a session before giving up
    pub session_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: "1.0.0".to_string(),
            default_address: DEFAULT_ADDRESS.to_string(),
            rpc_port: DEFAULT_RPC_PORT,
            bind_host: DEFAULT_BIND_HOST.to_string(),
            session_timeout_secs: DEFAULT_SESSION_TIMEOUT_SECS,
        }
    }
}

impl Settings {
    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs.max(1))
    }

    /// Check that the default address would be accepted by `create_portal`
    pub fn validate(&self) -> Result<(), InvalidAddress> {
        validate_address(&self.default_address).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.default_address, "localhost:10000");
        assert_eq!(settings.rpc_port, 16810);
        assert_eq!(settings.session_timeout(), Duration::from_secs(30));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let settings: Settings = serde_json::from_str(r#"{"rpc_port": 17000}"#).unwrap();
        assert_eq!(settings.rpc_port, 17000);
        assert_eq!(settings.bind_host, "127.0.0.1");
        assert_eq!(settings.default_address, DEFAULT_ADDRESS);
    }

    #[test]
    fn test_invalid_default_address() {
        let settings = Settings {
            default_address: "localhost".to_string(),
            ..Settings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(InvalidAddress::MissingPort(_))
        ));
    }
}

//! Portal types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a portal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortalState {
    Pending,
    Active,
    Stopping,
    Stopped,
    Failed { reason: String },
}

impl PortalState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PortalState::Pending => "pending",
            PortalState::Active => "active",
            PortalState::Stopping => "stopping",
            PortalState::Stopped => "stopped",
            PortalState::Failed { .. } => "failed",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, PortalState::Active)
    }

    /// Whether the lifecycle allows moving from `self` to `next`
    pub fn can_transition_to(&self, next: &PortalState) -> bool {
        matches!(
            (self, next),
            (PortalState::Pending, PortalState::Active)
                | (PortalState::Pending, PortalState::Failed { .. })
                | (PortalState::Active, PortalState::Stopping)
                | (PortalState::Active, PortalState::Failed { .. })
                | (PortalState::Stopping, PortalState::Stopped)
        )
    }
}

impl std::fmt::Display for PortalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortalState::Failed { reason } => write!(f, "failed ({})", reason),
            other => write!(f, "{}", other.as_str()),
        }
    }
}

/// Validated `host:port` pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortalAddress {
    pub host: String,
    pub port: u16,
}

impl PortalAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl std::fmt::Display for PortalAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A named local service exposed through a forwarding session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Portal {
    pub name: String,
    /// Advisory URL scheme, recorded verbatim
    pub scheme: Option<String>,
    pub address: PortalAddress,
    pub state: PortalState,
    pub created_at: DateTime<Utc>,
    /// Transport session id, present while active
    #[serde(default)]
    pub session_id: Option<String>,
    /// Where the transport exposes the service, present while active
    #[serde(default)]
    pub listen_address: Option<String>,
}

impl Portal {
    pub fn new(name: impl Into<String>, scheme: Option<String>, address: PortalAddress) -> Self {
        Self {
            name: name.into(),
            scheme,
            address,
            state: PortalState::Pending,
            created_at: Utc::now(),
            session_id: None,
            listen_address: None,
        }
    }

    /// `scheme://host:port` when a scheme is set, the bare address otherwise
    pub fn url(&self) -> String {
        match self.scheme.as_deref() {
            Some(scheme) if !scheme.is_empty() => format!("{}://{}", scheme, self.address),
            _ => self.address.to_string(),
        }
    }

    pub fn summary(&self) -> PortalSummary {
        PortalSummary::from(self)
    }
}

/// Flat view of a portal for status displays
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalSummary {
    pub name: String,
    pub scheme: Option<String>,
    pub address: String,
    pub state: PortalState,
}

impl From<&Portal> for PortalSummary {
    fn from(portal: &Portal) -> Self {
        Self {
            name: portal.name.clone(),
            scheme: portal.scheme.clone(),
            address: portal.address.to_string(),
            state: portal.state.clone(),
        }
    }
}

/// Portal definition as written to disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalRecord {
    pub name: String,
    pub scheme: Option<String>,
    pub address: String,
    pub created_at: DateTime<Utc>,
    /// Cleared by an explicit stop, so recovery leaves the portal stopped
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl From<&Portal> for PortalRecord {
    fn from(portal: &Portal) -> Self {
        Self {
            name: portal.name.clone(),
            scheme: portal.scheme.clone(),
            address: portal.address.to_string(),
            created_at: portal.created_at,
            enabled: true,
        }
    }
}

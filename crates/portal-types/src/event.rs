//! Portal change notifications

use super::{Portal, PortalState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Event published whenever the portal registry changes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PortalEvent {
    Created {
        portal: Portal,
        at: DateTime<Utc>,
    },
    StateChanged {
        name: String,
        from: PortalState,
        to: PortalState,
        at: DateTime<Utc>,
    },
    Removed {
        name: String,
        at: DateTime<Utc>,
    },
}

impl PortalEvent {
    pub fn created(portal: Portal) -> Self {
        PortalEvent::Created {
            portal,
            at: Utc::now(),
        }
    }

    pub fn state_changed(name: impl Into<String>, from: PortalState, to: PortalState) -> Self {
        PortalEvent::StateChanged {
            name: name.into(),
            from,
            to,
            at: Utc::now(),
        }
    }

    pub fn removed(name: impl Into<String>) -> Self {
        PortalEvent::Removed {
            name: name.into(),
            at: Utc::now(),
        }
    }

    /// Name of the portal the event refers to
    pub fn name(&self) -> &str {
        match self {
            PortalEvent::Created { portal, .. } => &portal.name,
            PortalEvent::StateChanged { name, .. } => name,
            PortalEvent::Removed { name, .. } => name,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            PortalEvent::Created { at, .. }
            | PortalEvent::StateChanged { at, .. }
            | PortalEvent::Removed { at, .. } => *at,
        }
    }
}

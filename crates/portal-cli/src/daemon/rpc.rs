use portal_core::PortalSummary;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DaemonRequest {
    CreatePortal {
        name: String,
        scheme: Option<String>,
        address: String,
    },
    StopPortal {
        name: String,
    },
    DestroyPortal {
        name: String,
    },
    ListPortals,
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DaemonResponse {
    Ok,
    PortalCreated(PortalSummary),
    Portals(Vec<PortalSummary>),
    Error(String),
}

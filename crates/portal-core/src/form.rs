//! Boundary for the UI layer
//!
//! Front ends deal in plain values: a success flag with a message, flat
//! summaries and booleans. Everything richer stays inside the engine.

use crate::lifecycle::PortalLifecycleManager;
use portal_types::{PortalSummary, DEFAULT_ADDRESS};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

/// Whether the create action should be enabled
pub fn can_create(name: &str, address: &str) -> bool {
    !name.trim().is_empty() && !address.trim().is_empty()
}

/// Result of a create request as seen by a front end
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOutcome {
    pub success: bool,
    /// Empty iff `success`
    pub error_message: String,
}

impl CreateOutcome {
    pub fn ok() -> Self {
        Self {
            success: true,
            error_message: String::new(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        let mut message = message.into();
        if message.is_empty() {
            message = "portal could not be created".to_string();
        }
        Self {
            success: false,
            error_message: message,
        }
    }
}

#[derive(Clone)]
pub struct PortalFacade {
    manager: Arc<PortalLifecycleManager>,
}

impl PortalFacade {
    pub fn new(manager: Arc<PortalLifecycleManager>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &Arc<PortalLifecycleManager> {
        &self.manager
    }

    pub async fn create_portal(
        &self,
        name: &str,
        scheme: Option<&str>,
        address: &str,
    ) -> CreateOutcome {
        match self.manager.create_portal(name, scheme, address).await {
            Ok(_) => CreateOutcome::ok(),
            Err(e) => CreateOutcome::failed(e.to_string()),
        }
    }

    pub fn list_portals(&self) -> Vec<PortalSummary> {
        self.manager
            .list_portals()
            .iter()
            .map(PortalSummary::from)
            .collect()
    }

    pub async fn destroy_portal(&self, name: &str) -> bool {
        match self.manager.destroy_portal(name).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to destroy portal {}: {}", name, e);
                false
            }
        }
    }
}

/// Field state of a "new portal" form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalForm {
    pub name: String,
    pub scheme: String,
    pub address: String,
}

impl Default for PortalForm {
    fn default() -> Self {
        Self {
            name: String::new(),
            scheme: String::new(),
            address: DEFAULT_ADDRESS.to_string(),
        }
    }
}

impl PortalForm {
    pub fn can_submit(&self) -> bool {
        can_create(&self.name, &self.address)
    }

    /// Completions for the scheme field
    pub fn scheme_suggestions(&self, facade: &PortalFacade) -> Vec<&'static str> {
        facade.manager().schemes().suggest(self.scheme.trim())
    }

    /// Submit the form. Fields reset to their defaults on success and are
    /// kept for correction on failure.
    pub async fn submit(&mut self, facade: &PortalFacade) -> CreateOutcome {
        let scheme = self.scheme.trim();
        let scheme = (!scheme.is_empty()).then_some(scheme);

        let outcome = facade
            .create_portal(&self.name, scheme, &self.address)
            .await;
        if outcome.success {
            *self = Self::default();
        }
        outcome
    }
}

//! Portal lifecycle management
//!
//! Orchestrates validation, name reservation, session establishment and
//! teardown. Session establishment runs in its own task: a caller that stops
//! waiting does not cancel it, and its outcome is always applied to the
//! registry. Shutdown waits for establishments already in flight, so no
//! session opened by a racing create outlives it.

use crate::address::validate_address;
use crate::bus::{NotificationBus, Subscription};
use crate::error::{CreateError, DestroyError, RegistryError, StopError, StoreError};
use crate::registry::{PortalRegistry, Reservation};
use crate::scheme::SchemeRegistry;
use crate::store::PortalStore;
use crate::transport::{SessionRequest, Transport};
use portal_types::{Portal, PortalAddress, PortalRecord, PortalState};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, OwnedRwLockReadGuard, RwLock};
use tracing::{debug, error, info, warn};

pub struct PortalLifecycleManager {
    registry: PortalRegistry,
    transport: Arc<dyn Transport>,
    schemes: SchemeRegistry,
    shutting_down: Arc<AtomicBool>,
    /// Held for reading by every establishment, for writing by shutdown
    establishing: Arc<RwLock<()>>,
}

impl PortalLifecycleManager {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<dyn PortalStore>,
        bus: NotificationBus,
    ) -> Self {
        Self {
            registry: PortalRegistry::new(store, bus),
            transport,
            schemes: SchemeRegistry::new(),
            shutting_down: Arc::new(AtomicBool::new(false)),
            establishing: Arc::new(RwLock::new(())),
        }
    }

    pub fn registry(&self) -> &PortalRegistry {
        &self.registry
    }

    pub fn schemes(&self) -> SchemeRegistry {
        self.schemes
    }

    pub fn bus(&self) -> &NotificationBus {
        self.registry.bus()
    }

    pub fn subscribe(&self) -> Subscription {
        self.registry.bus().subscribe()
    }

    /// Validate, reserve the name, open a forwarding session and register the
    /// portal as `Active`.
    ///
    /// On any error the registry is left as it was before the call.
    pub async fn create_portal(
        &self,
        name: &str,
        scheme: Option<&str>,
        address: &str,
    ) -> Result<Portal, CreateError> {
        let in_flight = self.establishing.clone().read_owned().await;
        if self.is_shutting_down() {
            return Err(CreateError::ShuttingDown);
        }

        if name.trim().is_empty() {
            return Err(CreateError::InvalidInput("name required".to_string()));
        }
        let address = validate_address(address.trim())?;

        let scheme = scheme.filter(|s| !s.is_empty()).map(str::to_string);
        if let Some(scheme) = &scheme {
            if !self.schemes.is_known(scheme) {
                debug!("Portal {} uses unlisted scheme {}", name, scheme);
            }
        }

        let reservation = self.registry.reserve(name)?;
        let portal = Portal::new(name, scheme, address);

        let task = tokio::spawn(establish(
            self.registry.clone(),
            self.transport.clone(),
            self.shutting_down.clone(),
            in_flight,
            reservation,
            portal,
        ));

        match task.await {
            Ok(result) => result,
            Err(e) => {
                error!("Session task for portal {} failed: {}", name, e);
                Err(CreateError::SessionFailed(format!(
                    "session task failed: {}",
                    e
                )))
            }
        }
    }

    /// Stop an active portal and keep it stopped across restarts.
    ///
    /// Stopping a `Stopped` or `Failed` portal succeeds without doing anything
    /// else.
    pub async fn stop_portal(&self, name: &str) -> Result<(), StopError> {
        self.stop_inner(name, true).await
    }

    /// Stop the portal if needed, then remove it from the registry and store
    pub async fn destroy_portal(&self, name: &str) -> Result<(), DestroyError> {
        self.stop_inner(name, true).await?;
        self.registry.remove(name).await?;
        Ok(())
    }

    pub fn list_portals(&self) -> Vec<Portal> {
        self.registry.list()
    }

    pub fn get_portal(&self, name: &str) -> Option<Portal> {
        self.registry.get(name)
    }

    /// Restore persisted portals, re-opening sessions for enabled ones.
    ///
    /// Returns how many portals came back `Active`. Portals whose session
    /// cannot be re-opened are restored as `Failed`. Records whose address no
    /// longer parses are held unlisted and saved back unchanged.
    ///
    /// If the store cannot be read nothing is restored and the registry
    /// refuses to save until a later load succeeds.
    pub async fn recover(&self) -> Result<usize, StoreError> {
        let records = self.registry.load_records().await?;
        let mut reopened = 0;

        for record in records {
            let reservation = match self.registry.reserve(&record.name) {
                Ok(reservation) => reservation,
                Err(e) => {
                    warn!("Skipping stored portal {}: {}", record.name, e);
                    continue;
                }
            };

            let address = match validate_address(&record.address) {
                Ok(address) => address,
                Err(e) => {
                    error!(
                        "Stored portal {} has an unusable address {:?}: {}",
                        record.name, record.address, e
                    );
                    let name = record.name.clone();
                    if let Err(e) = self.registry.hold(reservation, record, e.to_string()) {
                        warn!("Failed to hold stored portal {}: {}", name, e);
                    }
                    continue;
                }
            };

            match self.restore_record(reservation, record, address).await {
                Ok(portal) if portal.state.is_active() => reopened += 1,
                Ok(_) => {}
                Err(e) => warn!("Failed to restore portal: {}", e),
            }
        }

        info!("Recovered {} active portals", reopened);
        Ok(reopened)
    }

    async fn restore_record(
        &self,
        reservation: Reservation,
        record: PortalRecord,
        address: PortalAddress,
    ) -> Result<Portal, RegistryError> {
        let mut portal = record_portal(&record, address);
        if !record.enabled {
            portal.state = PortalState::Stopped;
            return self.registry.restore(reservation, portal, false, None);
        }

        let request = SessionRequest {
            name: portal.name.clone(),
            scheme: portal.scheme.clone(),
            address: portal.address.clone(),
        };
        match self.transport.open_session(request).await {
            Ok(session) => {
                let exit = session.exit_signal();
                let session_id = session.id().to_string();
                portal.state = PortalState::Active;
                let portal = self
                    .registry
                    .restore(reservation, portal, true, Some(session))?;
                supervise(self.registry.clone(), portal.name.clone(), session_id, exit);
                Ok(portal)
            }
            Err(e) => {
                warn!("Could not reopen portal {}: {}", portal.name, e);
                portal.state = PortalState::Failed {
                    reason: e.to_string(),
                };
                self.registry.restore(reservation, portal, true, None)
            }
        }
    }

    /// Close every active session and refuse further creates.
    ///
    /// Stored records keep their `enabled` flag, so the next `recover` brings
    /// the same portals back.
    pub async fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }

        info!("Shutting down portal engine");
        // Wait out establishments that passed the flag check before the swap
        drop(self.establishing.write().await);

        for portal in self.registry.list() {
            if !portal.state.is_active() {
                continue;
            }
            if let Err(e) = self.stop_inner(&portal.name, false).await {
                error!("Failed to stop portal {}: {}", portal.name, e);
            }
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    async fn stop_inner(&self, name: &str, disable: bool) -> Result<(), StopError> {
        match self.registry.begin_stop(name, disable).await {
            Ok(session) => {
                session.close().await;
                self.registry.finish_stop(name)?;
                Ok(())
            }
            Err(RegistryError::InvalidTransition {
                from: PortalState::Stopped | PortalState::Failed { .. },
                ..
            }) => {
                if disable {
                    self.registry.set_enabled(name, false).await?;
                }
                debug!("Portal {} is not running", name);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn record_portal(record: &PortalRecord, address: PortalAddress) -> Portal {
    let mut portal = Portal::new(record.name.clone(), record.scheme.clone(), address);
    portal.created_at = record.created_at;
    portal
}

/// Open the session and apply the outcome to the registry
async fn establish(
    registry: PortalRegistry,
    transport: Arc<dyn Transport>,
    shutting_down: Arc<AtomicBool>,
    _in_flight: OwnedRwLockReadGuard<()>,
    reservation: Reservation,
    portal: Portal,
) -> Result<Portal, CreateError> {
    let request = SessionRequest {
        name: portal.name.clone(),
        scheme: portal.scheme.clone(),
        address: portal.address.clone(),
    };

    let session = match transport.open_session(request).await {
        Ok(session) => session,
        Err(e) => {
            warn!("Session for portal {} failed: {}", portal.name, e);
            registry.release(reservation);
            return Err(e.into());
        }
    };

    if shutting_down.load(Ordering::SeqCst) {
        session.close().await;
        registry.release(reservation);
        return Err(CreateError::ShuttingDown);
    }

    let name = portal.name.clone();
    if let Err(e) = registry.commit(reservation, portal).await {
        session.close().await;
        return Err(e.into());
    }

    let exit = session.exit_signal();
    let session_id = session.id().to_string();
    let portal = match registry.activate(&name, session) {
        Ok(portal) => portal,
        Err((e, session)) => {
            session.close().await;
            return Err(e.into());
        }
    };

    supervise(registry, name, session_id, exit);
    Ok(portal)
}

/// Watch a session's exit signal and mark the portal failed if it fires
fn supervise(
    registry: PortalRegistry,
    name: String,
    session_id: String,
    mut exit: watch::Receiver<Option<String>>,
) {
    tokio::spawn(async move {
        let reason = loop {
            if let Some(reason) = exit.borrow_and_update().clone() {
                break reason;
            }
            // Sender gone: the session was closed normally
            if exit.changed().await.is_err() {
                return;
            }
        };

        if let Some(session) = registry.fail_session(&name, &session_id, &reason) {
            session.close().await;
        }
    });
}

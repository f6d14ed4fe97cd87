//! Portal registry
//!
//! The name -> portal table. Names are claimed with [`PortalRegistry::reserve`],
//! which is an atomic per-key insert on a `DashMap` shard: two reservations of
//! the same name can never both succeed, and reservations of different names
//! never wait on each other.
//!
//! Mutations that change what is on disk are serialized on the store lock,
//! persisted, and only then published on the [`NotificationBus`]. A failed
//! save rolls the in-memory change back. After a failed load nothing is
//! persisted at all, so an unreadable store is never overwritten.

use crate::bus::NotificationBus;
use crate::error::{RegistryError, StoreError};
use crate::store::PortalStore;
use crate::transport::ForwardingSession;
use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use portal_types::{Portal, PortalEvent, PortalRecord, PortalState};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct PortalRegistry {
    inner: Arc<Inner>,
}

struct Inner {
    entries: DashMap<String, RegistryEntry>,
    next_seq: AtomicU64,
    store: Arc<dyn PortalStore>,
    store_lock: Mutex<()>,
    /// Set while the last load from the store failed
    load_failed: AtomicBool,
    bus: NotificationBus,
}

struct RegistryEntry {
    /// Insertion order for listing
    seq: u64,
    slot: Slot,
}

enum Slot {
    Reserved,
    Stored(StoredPortal),
    /// Stored record that cannot be turned into a portal, kept verbatim
    Held(HeldRecord),
}

struct HeldRecord {
    record: PortalRecord,
    reason: String,
}

struct StoredPortal {
    portal: Portal,
    enabled: bool,
    /// Present iff `portal.state` is `Active`
    session: Option<Box<dyn ForwardingSession>>,
}

impl StoredPortal {
    fn attach(&mut self, session: Box<dyn ForwardingSession>) {
        self.portal.session_id = Some(session.id().to_string());
        self.portal.listen_address = session.listen_address();
        self.session = Some(session);
    }

    fn detach(&mut self) -> Option<Box<dyn ForwardingSession>> {
        self.portal.session_id = None;
        self.portal.listen_address = None;
        self.session.take()
    }
}

/// Claim on a name between validation and commit.
///
/// Dropping a reservation that was neither committed nor restored frees the
/// name again, so an abandoned create never leaves an orphaned claim.
#[must_use = "an unused reservation releases its name when dropped"]
pub struct Reservation {
    name: String,
    inner: Arc<Inner>,
    armed: bool,
}

impl Reservation {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if self.armed {
            self.inner
                .entries
                .remove_if(&self.name, |_, entry| matches!(entry.slot, Slot::Reserved));
            debug!("Released reservation for {}", self.name);
        }
    }
}

impl std::fmt::Debug for Reservation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reservation")
            .field("name", &self.name)
            .field("armed", &self.armed)
            .finish()
    }
}

impl PortalRegistry {
    pub fn new(store: Arc<dyn PortalStore>, bus: NotificationBus) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: DashMap::new(),
                next_seq: AtomicU64::new(0),
                store,
                store_lock: Mutex::new(()),
                load_failed: AtomicBool::new(false),
                bus,
            }),
        }
    }

    pub fn bus(&self) -> &NotificationBus {
        &self.inner.bus
    }

    /// Atomically claim `name`
    pub fn reserve(&self, name: &str) -> Result<Reservation, RegistryError> {
        match self.inner.entries.entry(name.to_string()) {
            MapEntry::Occupied(_) => Err(RegistryError::NameTaken(name.to_string())),
            MapEntry::Vacant(vacant) => {
                vacant.insert(RegistryEntry {
                    seq: self.inner.next_seq.fetch_add(1, Ordering::SeqCst),
                    slot: Slot::Reserved,
                });
                debug!("Reserved portal name {}", name);
                Ok(Reservation {
                    name: name.to_string(),
                    inner: self.inner.clone(),
                    armed: true,
                })
            }
        }
    }

    /// Roll back a reservation
    pub fn release(&self, reservation: Reservation) {
        drop(reservation);
    }

    /// Store the portal under its reserved name in state `Pending` and persist it
    pub async fn commit(
        &self,
        mut reservation: Reservation,
        mut portal: Portal,
    ) -> Result<Portal, RegistryError> {
        portal.name = reservation.name.clone();
        portal.state = PortalState::Pending;
        portal.session_id = None;
        portal.listen_address = None;

        let _guard = self.inner.store_lock.lock().await;

        match self.inner.entries.get_mut(&reservation.name) {
            Some(mut entry) => {
                entry.slot = Slot::Stored(StoredPortal {
                    portal: portal.clone(),
                    enabled: true,
                    session: None,
                });
            }
            None => return Err(RegistryError::NotFound(reservation.name.clone())),
        }

        if let Err(e) = self.persist().await {
            if let Some(mut entry) = self.inner.entries.get_mut(&reservation.name) {
                entry.slot = Slot::Reserved;
            }
            // The reservation drops on return and frees the name
            return Err(e.into());
        }

        reservation.armed = false;
        info!("Committed portal {} ({})", portal.name, portal.address);
        self.inner.bus.publish(PortalEvent::created(portal.clone()));
        Ok(portal)
    }

    /// Insert a portal loaded from the store, without persisting it again.
    ///
    /// The session, if any, must belong to an `Active` portal.
    pub fn restore(
        &self,
        mut reservation: Reservation,
        mut portal: Portal,
        enabled: bool,
        session: Option<Box<dyn ForwardingSession>>,
    ) -> Result<Portal, RegistryError> {
        portal.name = reservation.name.clone();

        let mut stored = StoredPortal {
            portal,
            enabled,
            session: None,
        };
        match session {
            Some(session) if stored.portal.state.is_active() => stored.attach(session),
            Some(_) => {
                return Err(RegistryError::InvalidTransition {
                    name: reservation.name.clone(),
                    from: stored.portal.state.clone(),
                    to: PortalState::Active,
                })
            }
            None => {
                stored.detach();
            }
        }
        let portal = stored.portal.clone();

        match self.inner.entries.get_mut(&reservation.name) {
            Some(mut entry) => entry.slot = Slot::Stored(stored),
            None => return Err(RegistryError::NotFound(reservation.name.clone())),
        }

        reservation.armed = false;
        self.inner.bus.publish(PortalEvent::created(portal.clone()));
        Ok(portal)
    }

    /// Keep a stored record that cannot be restored as a portal.
    ///
    /// The name stays taken and the record is written back unchanged on every
    /// save until the portal is destroyed. Held records are not listed.
    pub fn hold(
        &self,
        mut reservation: Reservation,
        record: PortalRecord,
        reason: impl Into<String>,
    ) -> Result<(), RegistryError> {
        let held = HeldRecord {
            record,
            reason: reason.into(),
        };
        match self.inner.entries.get_mut(&reservation.name) {
            Some(mut entry) => entry.slot = Slot::Held(held),
            None => return Err(RegistryError::NotFound(reservation.name.clone())),
        }

        reservation.armed = false;
        Ok(())
    }

    /// `Pending -> Active`, attaching the session.
    ///
    /// On failure the session is handed back so the caller can close it.
    pub fn activate(
        &self,
        name: &str,
        session: Box<dyn ForwardingSession>,
    ) -> Result<Portal, (RegistryError, Box<dyn ForwardingSession>)> {
        let (portal, from) = {
            let Some(mut entry) = self.inner.entries.get_mut(name) else {
                return Err((RegistryError::NotFound(name.to_string()), session));
            };
            let Slot::Stored(stored) = &mut entry.slot else {
                return Err((RegistryError::NotFound(name.to_string()), session));
            };
            if !stored.portal.state.can_transition_to(&PortalState::Active) {
                let error = RegistryError::InvalidTransition {
                    name: name.to_string(),
                    from: stored.portal.state.clone(),
                    to: PortalState::Active,
                };
                return Err((error, session));
            }

            let from = std::mem::replace(&mut stored.portal.state, PortalState::Active);
            stored.attach(session);
            (stored.portal.clone(), from)
        };

        info!("Portal {} is active", name);
        self.inner
            .bus
            .publish(PortalEvent::state_changed(name, from, PortalState::Active));
        Ok(portal)
    }

    /// `Active -> Failed` for the portal currently bound to `session_id`.
    ///
    /// Returns the detached session, or `None` when the portal has since moved
    /// on (stopped, destroyed, or recreated with a new session).
    pub fn fail_session(
        &self,
        name: &str,
        session_id: &str,
        reason: &str,
    ) -> Option<Box<dyn ForwardingSession>> {
        let failed = PortalState::Failed {
            reason: reason.to_string(),
        };

        let session = {
            let mut entry = self.inner.entries.get_mut(name)?;
            let Slot::Stored(stored) = &mut entry.slot else {
                return None;
            };
            if !stored.portal.state.is_active()
                || stored.portal.session_id.as_deref() != Some(session_id)
            {
                return None;
            }

            stored.portal.state = failed.clone();
            stored.detach()
        };

        warn!("Portal {} failed: {}", name, reason);
        self.inner
            .bus
            .publish(PortalEvent::state_changed(name, PortalState::Active, failed));
        session
    }

    /// `Active -> Stopping`, handing the session to the caller to close.
    ///
    /// With `disable`, the stored record is marked disabled so recovery leaves
    /// the portal stopped; that change is persisted before anything is
    /// published.
    pub async fn begin_stop(
        &self,
        name: &str,
        disable: bool,
    ) -> Result<Box<dyn ForwardingSession>, RegistryError> {
        let _guard = self.inner.store_lock.lock().await;

        let (session, was_enabled) = {
            let Some(mut entry) = self.inner.entries.get_mut(name) else {
                return Err(RegistryError::NotFound(name.to_string()));
            };
            let stored = match &mut entry.slot {
                Slot::Stored(stored) => stored,
                Slot::Held(held) => {
                    return Err(RegistryError::InvalidTransition {
                        name: name.to_string(),
                        from: PortalState::Failed {
                            reason: held.reason.clone(),
                        },
                        to: PortalState::Stopping,
                    })
                }
                Slot::Reserved => return Err(RegistryError::NotFound(name.to_string())),
            };
            let invalid = RegistryError::InvalidTransition {
                name: name.to_string(),
                from: stored.portal.state.clone(),
                to: PortalState::Stopping,
            };
            if !stored.portal.state.can_transition_to(&PortalState::Stopping) {
                return Err(invalid);
            }
            let Some(session) = stored.detach() else {
                return Err(invalid);
            };

            stored.portal.state = PortalState::Stopping;
            let was_enabled = stored.enabled;
            if disable {
                stored.enabled = false;
            }
            (session, was_enabled)
        };

        if disable && was_enabled {
            if let Err(e) = self.persist().await {
                if let Some(mut entry) = self.inner.entries.get_mut(name) {
                    if let Slot::Stored(stored) = &mut entry.slot {
                        stored.portal.state = PortalState::Active;
                        stored.enabled = was_enabled;
                        stored.attach(session);
                    }
                }
                return Err(e.into());
            }
        }

        self.inner.bus.publish(PortalEvent::state_changed(
            name,
            PortalState::Active,
            PortalState::Stopping,
        ));
        Ok(session)
    }

    /// `Stopping -> Stopped`
    pub fn finish_stop(&self, name: &str) -> Result<Portal, RegistryError> {
        let portal = {
            let Some(mut entry) = self.inner.entries.get_mut(name) else {
                return Err(RegistryError::NotFound(name.to_string()));
            };
            let Slot::Stored(stored) = &mut entry.slot else {
                return Err(RegistryError::NotFound(name.to_string()));
            };
            if !stored.portal.state.can_transition_to(&PortalState::Stopped) {
                return Err(RegistryError::InvalidTransition {
                    name: name.to_string(),
                    from: stored.portal.state.clone(),
                    to: PortalState::Stopped,
                });
            }
            stored.portal.state = PortalState::Stopped;
            stored.portal.clone()
        };

        info!("Portal {} stopped", name);
        self.inner.bus.publish(PortalEvent::state_changed(
            name,
            PortalState::Stopping,
            PortalState::Stopped,
        ));
        Ok(portal)
    }

    /// Change whether recovery re-opens the portal
    pub async fn set_enabled(&self, name: &str, enabled: bool) -> Result<(), RegistryError> {
        let _guard = self.inner.store_lock.lock().await;

        let previous = {
            let Some(mut entry) = self.inner.entries.get_mut(name) else {
                return Err(RegistryError::NotFound(name.to_string()));
            };
            match &mut entry.slot {
                Slot::Stored(stored) => std::mem::replace(&mut stored.enabled, enabled),
                Slot::Held(held) => std::mem::replace(&mut held.record.enabled, enabled),
                Slot::Reserved => return Err(RegistryError::NotFound(name.to_string())),
            }
        };

        if previous == enabled {
            return Ok(());
        }

        if let Err(e) = self.persist().await {
            if let Some(mut entry) = self.inner.entries.get_mut(name) {
                match &mut entry.slot {
                    Slot::Stored(stored) => stored.enabled = previous,
                    Slot::Held(held) => held.record.enabled = previous,
                    Slot::Reserved => {}
                }
            }
            return Err(e.into());
        }
        Ok(())
    }

    /// Delete a stopped, failed or held portal
    pub async fn remove(&self, name: &str) -> Result<(), RegistryError> {
        let _guard = self.inner.store_lock.lock().await;

        let (key, entry) = match self.inner.entries.entry(name.to_string()) {
            MapEntry::Vacant(_) => return Err(RegistryError::NotFound(name.to_string())),
            MapEntry::Occupied(occupied) => {
                match &occupied.get().slot {
                    Slot::Reserved => return Err(RegistryError::NotFound(name.to_string())),
                    Slot::Stored(stored)
                        if !matches!(
                            stored.portal.state,
                            PortalState::Stopped | PortalState::Failed { .. }
                        ) =>
                    {
                        return Err(RegistryError::StillRunning {
                            name: name.to_string(),
                            state: stored.portal.state.clone(),
                        });
                    }
                    Slot::Stored(_) | Slot::Held(_) => {}
                }
                occupied.remove_entry()
            }
        };

        if let Err(e) = self.persist().await {
            self.inner.entries.insert(key, entry);
            return Err(e.into());
        }

        info!("Removed portal {}", name);
        self.inner.bus.publish(PortalEvent::removed(name));
        Ok(())
    }

    /// Whether `name` is committed or reserved
    pub fn contains(&self, name: &str) -> bool {
        self.inner.entries.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<Portal> {
        let entry = self.inner.entries.get(name)?;
        match &entry.slot {
            Slot::Stored(stored) => Some(stored.portal.clone()),
            Slot::Reserved | Slot::Held(_) => None,
        }
    }

    /// All committed portals in insertion order
    pub fn list(&self) -> Vec<Portal> {
        self.sorted(|slot| match slot {
            Slot::Stored(stored) => Some(stored.portal.clone()),
            _ => None,
        })
    }

    /// Held records with the reason they could not be restored
    pub fn held(&self) -> Vec<(PortalRecord, String)> {
        self.sorted(|slot| match slot {
            Slot::Held(held) => Some((held.record.clone(), held.reason.clone())),
            _ => None,
        })
    }

    /// Persisted view of all committed and held portals, in insertion order
    pub fn records(&self) -> Vec<PortalRecord> {
        self.sorted(|slot| match slot {
            Slot::Stored(stored) => Some(PortalRecord {
                enabled: stored.enabled,
                ..PortalRecord::from(&stored.portal)
            }),
            Slot::Held(held) => Some(held.record.clone()),
            Slot::Reserved => None,
        })
    }

    /// Records currently in the store.
    ///
    /// A failed load blocks every later save until a load succeeds.
    pub async fn load_records(&self) -> Result<Vec<PortalRecord>, StoreError> {
        let result = self.inner.store.load().await;
        self.inner
            .load_failed
            .store(result.is_err(), Ordering::SeqCst);
        result
    }

    fn sorted<T>(&self, f: impl Fn(&Slot) -> Option<T>) -> Vec<T> {
        let mut items: Vec<(u64, T)> = self
            .inner
            .entries
            .iter()
            .filter_map(|entry| f(&entry.slot).map(|item| (entry.seq, item)))
            .collect();
        items.sort_by_key(|(seq, _)| *seq);
        items.into_iter().map(|(_, item)| item).collect()
    }

    /// Must be called with the store lock held
    async fn persist(&self) -> Result<(), StoreError> {
        if self.inner.load_failed.load(Ordering::SeqCst) {
            return Err(StoreError::Other(
                "stored portals could not be read; refusing to overwrite them".to_string(),
            ));
        }
        let records = self.records();
        self.inner.store.save(&records).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::transport::{InMemoryTransport, SessionRequest, Transport};
    use portal_types::PortalAddress;

    fn registry() -> (PortalRegistry, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (
            PortalRegistry::new(store.clone(), NotificationBus::new()),
            store,
        )
    }

    fn portal(name: &str) -> Portal {
        Portal::new(name, None, PortalAddress::new("localhost", 8080))
    }

    async fn session(transport: &InMemoryTransport, name: &str) -> Box<dyn ForwardingSession> {
        transport
            .open_session(SessionRequest {
                name: name.to_string(),
                scheme: None,
                address: PortalAddress::new("localhost", 8080),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_reserve_is_exclusive() {
        let (registry, _) = registry();
        let reservation = registry.reserve("web").unwrap();
        assert!(matches!(
            registry.reserve("web"),
            Err(RegistryError::NameTaken(_))
        ));

        // Reserved names are not listed
        assert!(registry.contains("web"));
        assert!(registry.list().is_empty());
        assert!(registry.get("web").is_none());

        registry.release(reservation);
        assert!(!registry.contains("web"));
        assert!(registry.reserve("web").is_ok());
    }

    #[tokio::test]
    async fn test_dropped_reservation_frees_name() {
        let (registry, _) = registry();
        {
            let _reservation = registry.reserve("web").unwrap();
        }
        assert!(registry.reserve("web").is_ok());
    }

    #[tokio::test]
    async fn test_commit_persists_and_publishes() {
        let (registry, store) = registry();
        let mut sub = registry.bus().subscribe();

        let reservation = registry.reserve("web").unwrap();
        let committed = registry.commit(reservation, portal("web")).await.unwrap();
        assert_eq!(committed.state, PortalState::Pending);

        assert_eq!(store.records().len(), 1);
        assert!(store.records()[0].enabled);
        assert!(matches!(sub.try_recv(), Some(PortalEvent::Created { .. })));

        // Committed names stay taken
        assert!(registry.reserve("web").is_err());
    }

    #[tokio::test]
    async fn test_failed_commit_rolls_back() {
        let (registry, store) = registry();
        store.set_fail_saves(true);

        let reservation = registry.reserve("web").unwrap();
        assert!(matches!(
            registry.commit(reservation, portal("web")).await,
            Err(RegistryError::Store(_))
        ));

        assert!(registry.list().is_empty());
        assert!(registry.reserve("web").is_ok());
    }

    #[tokio::test]
    async fn test_list_keeps_insertion_order() {
        let (registry, _) = registry();
        for name in ["zeta", "alpha", "mid"] {
            let reservation = registry.reserve(name).unwrap();
            registry.commit(reservation, portal(name)).await.unwrap();
        }

        let names: Vec<String> = registry.list().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    }

    #[tokio::test]
    async fn test_full_lifecycle() {
        let (registry, store) = registry();
        let transport = InMemoryTransport::new();

        let reservation = registry.reserve("web").unwrap();
        registry.commit(reservation, portal("web")).await.unwrap();

        let active = registry
            .activate("web", session(&transport, "web").await)
            .map_err(|(e, _)| e)
            .unwrap();
        assert_eq!(active.state, PortalState::Active);
        assert!(active.session_id.is_some());

        // Active portals cannot be removed
        assert!(matches!(
            registry.remove("web").await,
            Err(RegistryError::StillRunning { .. })
        ));

        let session = registry.begin_stop("web", true).await.unwrap();
        assert_eq!(registry.get("web").unwrap().state, PortalState::Stopping);
        assert!(registry.get("web").unwrap().session_id.is_none());
        assert!(!store.records()[0].enabled);
        session.close().await;

        registry.finish_stop("web").unwrap();
        assert_eq!(registry.get("web").unwrap().state, PortalState::Stopped);

        registry.remove("web").await.unwrap();
        assert!(registry.get("web").is_none());
        assert!(store.records().is_empty());
        assert!(matches!(
            registry.remove("web").await,
            Err(RegistryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_pending_cannot_stop() {
        let (registry, _) = registry();
        let reservation = registry.reserve("web").unwrap();
        registry.commit(reservation, portal("web")).await.unwrap();

        assert!(matches!(
            registry.begin_stop("web", true).await,
            Err(RegistryError::InvalidTransition { .. })
        ));
        assert!(matches!(
            registry.finish_stop("web"),
            Err(RegistryError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_stop_rolls_back_on_save_failure() {
        let (registry, store) = registry();
        let transport = InMemoryTransport::new();

        let reservation = registry.reserve("web").unwrap();
        registry.commit(reservation, portal("web")).await.unwrap();
        registry
            .activate("web", session(&transport, "web").await)
            .map_err(|(e, _)| e)
            .unwrap();

        store.set_fail_saves(true);
        assert!(registry.begin_stop("web", true).await.is_err());

        let portal = registry.get("web").unwrap();
        assert_eq!(portal.state, PortalState::Active);
        assert!(portal.session_id.is_some());
    }

    #[tokio::test]
    async fn test_fail_session_ignores_stale_ids() {
        let (registry, _) = registry();
        let transport = InMemoryTransport::new();

        let reservation = registry.reserve("web").unwrap();
        registry.commit(reservation, portal("web")).await.unwrap();
        let active = registry
            .activate("web", session(&transport, "web").await)
            .map_err(|(e, _)| e)
            .unwrap();

        assert!(registry.fail_session("web", "other-session", "gone").is_none());
        assert!(registry.get("web").unwrap().state.is_active());

        let session_id = active.session_id.unwrap();
        let detached = registry.fail_session("web", &session_id, "gone").unwrap();
        detached.close().await;

        let portal = registry.get("web").unwrap();
        assert_eq!(
            portal.state,
            PortalState::Failed {
                reason: "gone".to_string()
            }
        );
        assert!(portal.session_id.is_none());
    }

    #[tokio::test]
    async fn test_held_record_is_saved_verbatim() {
        let (registry, store) = registry();
        let record = PortalRecord {
            name: "garbled".to_string(),
            scheme: Some("redis".to_string()),
            address: "nonsense".to_string(),
            created_at: chrono::Utc::now(),
            enabled: true,
        };

        let reservation = registry.reserve("garbled").unwrap();
        registry
            .hold(reservation, record.clone(), "invalid address")
            .unwrap();
        assert!(registry.contains("garbled"));
        assert!(registry.get("garbled").is_none());
        assert!(registry.list().is_empty());
        assert_eq!(registry.held().len(), 1);

        let reservation = registry.reserve("web").unwrap();
        registry.commit(reservation, portal("web")).await.unwrap();

        let saved = store.records();
        assert_eq!(saved.len(), 2);
        assert_eq!(saved[0].name, "garbled");
        assert_eq!(saved[0].address, "nonsense");
        assert_eq!(saved[0].scheme.as_deref(), Some("redis"));

        // Stopping a held record only disables it
        assert!(matches!(
            registry.begin_stop("garbled", true).await,
            Err(RegistryError::InvalidTransition { .. })
        ));
        registry.set_enabled("garbled", false).await.unwrap();
        assert!(!store.records()[0].enabled);

        registry.remove("garbled").await.unwrap();
        assert!(!registry.contains("garbled"));
        assert_eq!(store.records().len(), 1);
        assert_eq!(store.records()[0].name, "web");
    }

    #[tokio::test]
    async fn test_failed_load_blocks_saves() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("portals.json");
        std::fs::write(&path, b"[{\"name\": \"db\"").unwrap();

        let store = Arc::new(crate::store::JsonFileStore::new(&path));
        let registry = PortalRegistry::new(store, NotificationBus::new());
        assert!(registry.load_records().await.is_err());

        let reservation = registry.reserve("web").unwrap();
        assert!(matches!(
            registry.commit(reservation, portal("web")).await,
            Err(RegistryError::Store(_))
        ));
        assert!(!registry.contains("web"));
        assert_eq!(std::fs::read(&path).unwrap(), b"[{\"name\": \"db\"");

        // A successful load lifts the block
        std::fs::write(&path, b"[]").unwrap();
        assert!(registry.load_records().await.unwrap().is_empty());
        let reservation = registry.reserve("web").unwrap();
        assert!(registry.commit(reservation, portal("web")).await.is_ok());
    }
}

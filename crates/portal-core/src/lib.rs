//! Portal Core - registration and lifecycle engine
//!
//! Validates, creates, tracks and tears down named portals: local network
//! services exposed through forwarding sessions opened by a transport layer.
//! Every front end (form, CLI, status UI) talks to a single
//! [`PortalLifecycleManager`] and observes changes through the
//! [`NotificationBus`].

pub mod address;
pub mod bus;
pub mod config;
pub mod error;
pub mod form;
pub mod lifecycle;
pub mod registry;
pub mod scheme;
pub mod store;
pub mod transport;

pub use address::validate_address;
pub use bus::{NotificationBus, Subscription};
pub use config::Settings;
pub use error::*;
pub use form::{can_create, CreateOutcome, PortalFacade, PortalForm};
pub use lifecycle::PortalLifecycleManager;
pub use registry::{PortalRegistry, Reservation};
pub use scheme::SchemeRegistry;
pub use store::{JsonFileStore, MemoryStore, PortalStore};
pub use transport::{ForwardingSession, SessionRequest, Transport};

pub use portal_types::*;

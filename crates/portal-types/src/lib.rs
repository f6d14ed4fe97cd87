//! Portal Types - Pure type definitions
//!
//! This crate contains only plain data types shared by the engine, the daemon
//! RPC protocol and any front end that lists portals. It carries no async
//! runtime dependencies.

pub mod event;
pub mod portal;

pub use event::*;
pub use portal::*;

/// Address suggested to the user when a new portal form opens
pub const DEFAULT_ADDRESS: &str = "localhost:10000";

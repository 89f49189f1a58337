//! Collaborative kanban board client core.
//!
//! Keeps the loaded board in sync with the server, turns drag gestures into
//! reorder/move requests, and propagates advisory edit locks over the push
//! channel.

pub mod api;
pub mod config;
pub mod drag;
pub mod gateway;
pub mod locks;
pub mod push;
pub mod session;
pub mod store;

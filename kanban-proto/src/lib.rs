//! Shared wire definitions for the kanban board client and server.
//!
//! The REST contract exchanges camelCase JSON documents; the push channel
//! exchanges `{"event": ..., "data": ...}` JSON text frames.

pub mod api;
pub mod board;
pub mod push;

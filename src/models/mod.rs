//! Data models representing database entities.
//!
//! This module contains all data structures that map to database tables,
//! plus the request and response bodies built from them.

/// Lock verification audit and request/response bodies
pub mod access_event;
/// Bearer token authentication model
pub mod api_token;
/// Pass delivery requests and reports
pub mod delivery;
/// Digital key entity and status
pub mod digital_key;
/// Lifecycle and delivery audit events
pub mod key_event;
/// Read-only reservation view
pub mod reservation;

//! HTTP request handlers (route handlers).
//!
//! Each handler is an async function that:
//! 1. Receives HTTP request data (JSON body, URL params, etc.)
//! 2. Calls the matching service with the caller's `AuthContext` and the current time
//! 3. Returns HTTP response (JSON, status code)

/// Service health endpoint
pub mod health;
/// Digital key endpoints
pub mod keys;
/// Lock verification endpoint
pub mod verify;

//! Business logic services.
//!
//! Services contain core business logic separated from HTTP handlers.
//! They are generic over the [`KeyStore`](crate::store::KeyStore) port and
//! take the current time explicitly, so the same code runs against
//! PostgreSQL in production and in-memory stores in tests.

pub mod delivery;
pub mod lifecycle;
pub mod pass;
pub mod validity;
pub mod verification;

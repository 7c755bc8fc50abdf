//! Shared application state.

use std::sync::Arc;

use crate::{
    config::Config, services::delivery::HttpTransport, services::pass::PassIssuer,
    store::PgKeyStore,
};

/// State cloned into every handler via `State<AppState>`.
#[derive(Debug, Clone)]
pub struct AppState {
    pub store: PgKeyStore,
    pub transport: HttpTransport,
    pub passes: PassIssuer,
    pub config: Arc<Config>,
}

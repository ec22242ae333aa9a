//! Shared application state of the HTTP handlers.

use std::sync::Arc;

use relayer::{RelayerContext, Role};

pub struct AppState {
    pub ctx: Arc<RelayerContext>,
    pub role: Role,
}

pub type SharedState = Arc<AppState>;

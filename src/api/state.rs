//! Application state - Dependency injection container.

use crate::config::Config;
use crate::services::Services;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub services: Services,
    pub config: Config,
}

impl AppState {
    pub fn new(services: Services, config: Config) -> Self {
        Self { services, config }
    }
}

//! Application state for the API server

use crate::{Config, ReportService};
use std::sync::Arc;

/// Shared application state accessible to all route handlers
///
/// Cloned for each request (cheap Arc clone).
#[derive(Clone)]
pub struct AppState {
    /// The report service handling every request
    pub service: Arc<ReportService>,

    /// Configuration the router was built with
    pub config: Arc<Config>,
}

impl AppState {
    /// Create a new AppState
    pub fn new(service: Arc<ReportService>, config: Arc<Config>) -> Self {
        Self { service, config }
    }
}

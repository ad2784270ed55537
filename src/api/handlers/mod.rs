pub mod query;

use std::sync::Arc;

use crate::services::QueryService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub query_service: Arc<QueryService>,
}

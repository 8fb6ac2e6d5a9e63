use std::sync::Arc;

use crate::db::Database;
use crate::transfer_case::TransferCaseService;

/// Gateway shared state
#[derive(Clone)]
pub struct AppState {
    /// Transfer case service
    pub cases: Arc<TransferCaseService>,
    /// PostgreSQL pool when the postgres backend is configured, pinged by the health check
    pub pg_db: Option<Arc<Database>>,
}

impl AppState {
    pub fn new(cases: Arc<TransferCaseService>, pg_db: Option<Arc<Database>>) -> Self {
        Self { cases, pg_db }
    }
}

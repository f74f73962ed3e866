use std::sync::Arc;

use crate::engine::CorrelationEngine;
use crate::storage::Pool;

#[derive(Clone)]
pub struct AppState {
    pub pool: Pool,
    pub engine: Arc<CorrelationEngine>,
}

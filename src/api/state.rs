//! Application state for the API server

use crate::{Config, Retriever};
use std::sync::Arc;

/// State shared by every route handler (cloned per request)
#[derive(Clone)]
pub struct AppState {
    /// The retriever driving runs and exports
    pub retriever: Arc<Retriever>,

    /// Configuration the server was started with
    pub config: Arc<Config>,
}

impl AppState {
    /// Create a new AppState
    pub fn new(retriever: Arc<Retriever>, config: Arc<Config>) -> Self {
        Self { retriever, config }
    }
}

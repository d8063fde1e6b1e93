//! Search service
//!
//! Thin orchestration over a [`SearchBackend`]: queries run on the search
//! pool and resolve into `SearchComplete` / `SearchFailed` events. The UI
//! never calls the backend directly.

use std::sync::Arc;

use tracing::{info, warn};

use crate::app::events::{EventBus, EventPayload};
use crate::app::fetch::{SearchBackend, SearchFilters};
use crate::app::pools::PoolRegistry;

/// Submits search queries to the search pool
pub struct SearchService {
    pools: Arc<PoolRegistry>,
    bus: EventBus,
    backend: Arc<dyn SearchBackend>,
}

impl SearchService {
    /// Wire the service to its pool, bus, and backend
    pub fn new(pools: Arc<PoolRegistry>, bus: EventBus, backend: Arc<dyn SearchBackend>) -> Self {
        Self {
            pools,
            bus,
            backend,
        }
    }

    /// Run a query on the search pool.
    ///
    /// Returns whether the query was submitted; the outcome arrives as a
    /// `SearchComplete` or `SearchFailed` event.
    pub fn search(&self, query: impl Into<String>, filters: SearchFilters) -> bool {
        let query = query.into();

        let pool = match self.pools.search_pool() {
            Ok(pool) => pool,
            Err(e) => {
                warn!(%query, error = %e, "search pool unavailable");
                return false;
            }
        };

        let bus = self.bus.clone();
        let backend = Arc::clone(&self.backend);
        let submitted = pool.spawn(async move {
            info!(%query, "search started");
            match backend.search(&query, &filters).await {
                Ok(results) => {
                    info!(%query, result_count = results.len(), "search completed");
                    bus.emit(EventPayload::SearchComplete {
                        query,
                        result_count: results.len(),
                        results,
                    });
                }
                Err(e) => {
                    let error = e.to_string();
                    warn!(%query, %error, "search failed");
                    bus.emit(EventPayload::SearchFailed { query, error });
                }
            }
        });

        match submitted {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "could not submit search");
                false
            }
        }
    }
}

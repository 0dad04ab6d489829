//! The query execution seam.

use crate::csv::ResultRow;
use crate::error::Result;
use async_trait::async_trait;

/// Anything that can run a Flux query and hand back rows in store order.
///
/// [`crate::InfluxClient`] talks to a real server; tests substitute an
/// in-memory implementation.
#[async_trait]
pub trait FluxStore: Send + Sync {
    /// Run `flux` and return its rows.
    ///
    /// Errors caused by the query text itself are reported as
    /// [`crate::StoreError::Query`].
    async fn query(&self, flux: &str) -> Result<Vec<ResultRow>>;

    /// Check if the store is reachable.
    ///
    /// Default implementation returns `Ok(true)`, assuming availability.
    async fn is_available(&self) -> Result<bool> {
        Ok(true)
    }
}

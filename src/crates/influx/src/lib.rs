//! Flux query execution against InfluxDB 2.x.
//!
//! - [`FluxStore`] is the seam callers depend on.
//! - [`InfluxClient`] implements it over the `/api/v2/query` HTTP endpoint.
//! - [`csv`] decodes the annotated CSV the server answers with into
//!   [`ResultRow`]s, dropping Flux bookkeeping columns.

pub mod client;
pub mod csv;
pub mod error;
pub mod store;

pub use client::{InfluxClient, InfluxConfig};
pub use csv::{decode_annotated_csv, ResultRow, METADATA_COLUMNS};
pub use error::{reduce_error_message, Result, StoreError};
pub use store::FluxStore;

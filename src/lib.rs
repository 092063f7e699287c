//! Uniform search-backend abstraction for a document-management service.
//!
//! See [`search`] for the provider contract, [`adapters`] for the
//! Meilisearch and Algolia implementations and [`context`] for per-call
//! deadlines and cancellation.

pub mod adapters;
pub mod config;
pub mod context;
pub mod metrics;
pub mod search;

pub use context::{CallContext, Interrupted};
pub use search::{
    create_provider, Document, ErrorKind, SearchError, SearchProvider, SearchQuery, SearchResult,
};

//! Uniform search contract over interchangeable backends.
//!
//! A caller obtains one [`SearchProvider`] and works with its four
//! collections:
//!
//! - **documents** and **drafts**: typed [`Document`] records with facets
//! - **projects**: freeform [`Project`] records
//! - **links**: [`Link`] redirect mappings, key/value only
//!
//! ```text
//! caller ──► SearchProvider ──► Collection ──► filter compiler ──► backend REST API
//!                                   ▲                                   │
//!                                   └──────── decoded records ◄─────────┘
//! ```
//!
//! Writes return only after the backend has applied them, bounded by
//! [`wait::SINGLE_WRITE_WAIT`] / [`wait::BATCH_WRITE_WAIT`] and the caller's
//! [`CallContext`](crate::context::CallContext) deadline. Failures carry an
//! [`ErrorKind`] except for unclassified search failures, which pass through.
//!
//! # Example
//!
//! ```no_run
//! use docsearch::context::CallContext;
//! use docsearch::search::{create_provider, SearchConfig, SearchQuery, MeilisearchConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SearchConfig {
//!         meilisearch: Some(MeilisearchConfig::new("http://localhost:7700")),
//!         ..Default::default()
//!     };
//!     let ctx = CallContext::with_timeout(std::time::Duration::from_secs(10));
//!     let provider = create_provider(&ctx, &config).await?;
//!
//!     let query = SearchQuery::new("terraform")
//!         .with_filter("status", vec!["approved"])
//!         .with_facets(vec!["product"]);
//!     let results = provider.documents().search(&ctx, &query).await?;
//!     println!("Found {} documents", results.total_hits);
//!     Ok(())
//! }
//! ```

mod config;
mod document;
mod error;
mod factory;
pub mod facets;
pub mod filter;
mod provider;
pub mod query;
pub mod wait;

pub use config::{AlgoliaConfig, IndexNames, MeilisearchConfig, SearchBackend, SearchConfig};
pub use document::{Document, Link, Project, RecordKind, SearchRecord, OBJECT_ID_FIELD};
pub use error::{BackendError, Cause, ErrorKind, SearchError, SearchResult};
pub use facets::Facets;
pub use factory::create_provider;
pub use provider::{Collection, DocumentCollection, LinkCollection, SearchProvider};
pub use query::{
    total_pages, FilterGroup, FilterOperator, Highlight, SearchQuery, SearchResponse, SortOrder,
};

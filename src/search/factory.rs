use std::sync::Arc;

use crate::adapters::{AlgoliaProvider, MeilisearchProvider};
use crate::context::CallContext;
use crate::search::{SearchBackend, SearchConfig, SearchError, SearchProvider, SearchResult};

/// Create a search provider based on configuration
pub async fn create_provider(
    ctx: &CallContext,
    config: &SearchConfig,
) -> SearchResult<Arc<dyn SearchProvider>> {
    match config.backend {
        SearchBackend::Meilisearch => {
            let meili = config.meilisearch.clone().ok_or_else(|| {
                SearchError::configuration(
                    "new",
                    "Meilisearch backend requires a 'meilisearch' section",
                )
            })?;

            tracing::info!(host = %meili.host, "Initializing Meilisearch search backend");

            let provider = MeilisearchProvider::connect(ctx, meili).await?;
            Ok(Arc::new(provider))
        }

        SearchBackend::Algolia => {
            let algolia = config.algolia.clone().ok_or_else(|| {
                SearchError::configuration("new", "Algolia backend requires an 'algolia' section")
            })?;

            tracing::info!(
                application_id = %algolia.application_id,
                "Initializing Algolia search backend"
            );

            let provider = AlgoliaProvider::new(algolia)?;
            Ok(Arc::new(provider))
        }
    }
}

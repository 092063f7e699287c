//! HTTP plumbing shared by the REST-based adapters.

use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::{Client, Method, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::context::CallContext;
use crate::search::{BackendError, SearchError, SearchResult};

/// Error body shape returned by both Meilisearch and Algolia.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

/// A configured HTTP client bound to one backend base URL.
#[derive(Debug, Clone)]
pub(crate) struct RestClient {
    client: Client,
    base: Url,
    backend: &'static str,
}

impl RestClient {
    pub(crate) fn new(
        backend: &'static str,
        base_url: &str,
        timeout: Duration,
        headers: HeaderMap,
    ) -> SearchResult<Self> {
        let base = Url::parse(base_url).map_err(|e| {
            SearchError::configuration("new", format!("invalid {} url {}: {}", backend, base_url, e))
        })?;
        if base.cannot_be_a_base() {
            return Err(SearchError::configuration(
                "new",
                format!("{} url {} cannot carry a path", backend, base_url),
            ));
        }

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| {
                SearchError::configuration("new", format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            base,
            backend,
        })
    }

    /// Base URL joined with percent-encoded path segments.
    pub(crate) fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    pub(crate) fn request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        self.client.request(method, self.url(segments))
    }

    /// Send a request under the caller's context and decode the JSON body.
    ///
    /// Non-2xx responses become [`BackendError::Status`] carrying the
    /// backend's error code when it sent one.
    pub(crate) async fn send<T: DeserializeOwned>(
        &self,
        ctx: &CallContext,
        request: RequestBuilder,
    ) -> Result<T, BackendError> {
        let exchange = async {
            let response = request.send().await?;
            let status = response.status();
            let body = response.bytes().await?;
            Ok::<_, BackendError>((status, body))
        };
        let (status, body) = ctx.run(exchange).await??;

        if !status.is_success() {
            let parsed: ErrorBody = serde_json::from_slice(&body).unwrap_or_default();
            let err = BackendError::Status {
                status: status.as_u16(),
                code: parsed
                    .code
                    .unwrap_or_else(|| format!("http_{}", status.as_u16())),
                message: parsed
                    .message
                    .unwrap_or_else(|| String::from_utf8_lossy(&body).into_owned()),
            };
            debug!(backend = self.backend, error = %err, "Backend request rejected");
            return Err(err);
        }

        if body.is_empty() {
            return Ok(serde_json::from_slice(b"null")?);
        }
        Ok(serde_json::from_slice(&body)?)
    }
}

//! Search backend configuration

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use validator::Validate;

use super::wait::POLL_INTERVAL;

/// Which backend the provider factory builds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SearchBackend {
    #[default]
    Meilisearch,
    Algolia,
}

/// Top-level search configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default)]
    pub backend: SearchBackend,

    #[serde(default)]
    pub meilisearch: Option<MeilisearchConfig>,

    #[serde(default)]
    pub algolia: Option<AlgoliaConfig>,
}

/// Backing index names for the four collections
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct IndexNames {
    #[serde(default = "default_docs_index")]
    #[validate(length(min = 1, message = "docs index name is required"))]
    pub docs: String,

    #[serde(default = "default_drafts_index")]
    #[validate(length(min = 1, message = "drafts index name is required"))]
    pub drafts: String,

    #[serde(default = "default_projects_index")]
    #[validate(length(min = 1, message = "projects index name is required"))]
    pub projects: String,

    #[serde(default = "default_links_index")]
    #[validate(length(min = 1, message = "links index name is required"))]
    pub links: String,
}

impl Default for IndexNames {
    fn default() -> Self {
        Self {
            docs: default_docs_index(),
            drafts: default_drafts_index(),
            projects: default_projects_index(),
            links: default_links_index(),
        }
    }
}

impl IndexNames {
    /// Same names with a common prefix, handy for isolating test runs.
    pub fn prefixed(prefix: &str) -> Self {
        let base = Self::default();
        Self {
            docs: format!("{}{}", prefix, base.docs),
            drafts: format!("{}{}", prefix, base.drafts),
            projects: format!("{}{}", prefix, base.projects),
            links: format!("{}{}", prefix, base.links),
        }
    }
}

/// Meilisearch connection settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct MeilisearchConfig {
    #[validate(url(message = "meilisearch host must be a URL"))]
    pub host: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default)]
    #[validate(nested)]
    pub indexes: IndexNames,

    /// Per-request HTTP timeout
    #[serde(default = "default_request_timeout_secs")]
    #[validate(range(min = 1))]
    pub request_timeout_secs: u64,

    #[serde(default = "default_poll_interval_ms")]
    #[validate(range(min = 1))]
    pub task_poll_interval_ms: u64,
}

impl MeilisearchConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            api_key: None,
            indexes: IndexNames::default(),
            request_timeout_secs: default_request_timeout_secs(),
            task_poll_interval_ms: default_poll_interval_ms(),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_indexes(mut self, indexes: IndexNames) -> Self {
        self.indexes = indexes;
        self
    }
}

/// Algolia connection settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AlgoliaConfig {
    #[validate(length(min = 1, message = "algolia application id is required"))]
    pub application_id: String,

    #[validate(length(min = 1, message = "algolia write api key is required"))]
    pub write_api_key: String,

    /// Overrides `https://<application_id>.algolia.net`
    #[serde(default)]
    #[validate(url)]
    pub host: Option<String>,

    #[serde(default)]
    #[validate(nested)]
    pub indexes: IndexNames,

    #[serde(default = "default_request_timeout_secs")]
    #[validate(range(min = 1))]
    pub request_timeout_secs: u64,

    #[serde(default = "default_poll_interval_ms")]
    #[validate(range(min = 1))]
    pub task_poll_interval_ms: u64,
}

impl AlgoliaConfig {
    pub fn new(application_id: impl Into<String>, write_api_key: impl Into<String>) -> Self {
        Self {
            application_id: application_id.into(),
            write_api_key: write_api_key.into(),
            host: None,
            indexes: IndexNames::default(),
            request_timeout_secs: default_request_timeout_secs(),
            task_poll_interval_ms: default_poll_interval_ms(),
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_indexes(mut self, indexes: IndexNames) -> Self {
        self.indexes = indexes;
        self
    }

    /// API host for this application
    pub fn base_url(&self) -> String {
        self.host
            .clone()
            .unwrap_or_else(|| format!("https://{}.algolia.net", self.application_id))
    }
}

fn default_docs_index() -> String {
    "docs".to_string()
}

fn default_drafts_index() -> String {
    "drafts".to_string()
}

fn default_projects_index() -> String {
    "projects".to_string()
}

fn default_links_index() -> String {
    "links".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_poll_interval_ms() -> u64 {
    POLL_INTERVAL.as_millis() as u64
}

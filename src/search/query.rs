//! Query and result types

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::facets::Facets;

/// Sort direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// How the expressions inside a [`FilterGroup`] are joined
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum FilterOperator {
    #[default]
    And,
    Or,
}

/// Raw backend filter expressions joined by one operator.
///
/// Groups express what the flat field map cannot, for example
/// `owners = "a" OR contributors = "a"`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterGroup {
    pub operator: FilterOperator,
    pub expressions: Vec<String>,
}

impl FilterGroup {
    pub fn and(expressions: Vec<impl Into<String>>) -> Self {
        Self {
            operator: FilterOperator::And,
            expressions: expressions.into_iter().map(Into::into).collect(),
        }
    }

    pub fn or(expressions: Vec<impl Into<String>>) -> Self {
        Self {
            operator: FilterOperator::Or,
            expressions: expressions.into_iter().map(Into::into).collect(),
        }
    }
}

/// Markers wrapped around matched terms
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Highlight {
    pub pre_tag: String,
    pub post_tag: String,
}

/// Search query description.
///
/// Values listed for one field are OR'd, separate fields are AND'd.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchQuery {
    pub query: String,
    /// Zero-based page number
    pub page: usize,
    pub per_page: usize,
    pub filters: BTreeMap<String, Vec<String>>,
    pub filter_groups: Vec<FilterGroup>,
    pub facets: Vec<String>,
    pub sort_by: Option<String>,
    pub sort_order: SortOrder,
    pub highlight: Option<Highlight>,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            query: String::new(),
            page: 0,
            per_page: 20,
            filters: BTreeMap::new(),
            filter_groups: Vec::new(),
            facets: Vec::new(),
            sort_by: None,
            sort_order: SortOrder::Asc,
            highlight: None,
        }
    }
}

impl SearchQuery {
    /// Create a new search query
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn with_page(mut self, page: usize, per_page: usize) -> Self {
        self.page = page;
        self.per_page = per_page;
        self
    }

    /// Require `field` to equal one of `values`
    pub fn with_filter(mut self, field: impl Into<String>, values: Vec<impl Into<String>>) -> Self {
        self.filters
            .entry(field.into())
            .or_default()
            .extend(values.into_iter().map(Into::into));
        self
    }

    pub fn with_filter_group(mut self, group: FilterGroup) -> Self {
        self.filter_groups.push(group);
        self
    }

    pub fn with_facets(mut self, facets: Vec<impl Into<String>>) -> Self {
        self.facets = facets.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_sort(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort_by = Some(field.into());
        self.sort_order = order;
        self
    }

    pub fn with_highlight(mut self, pre_tag: impl Into<String>, post_tag: impl Into<String>) -> Self {
        self.highlight = Some(Highlight {
            pre_tag: pre_tag.into(),
            post_tag: post_tag.into(),
        });
        self
    }

    /// Number of hits to skip for the requested page
    pub fn offset(&self) -> usize {
        self.page.saturating_mul(self.per_page)
    }

    /// `field:asc` / `field:desc`, when a sort field is set
    pub fn sort_expression(&self) -> Option<String> {
        self.sort_by
            .as_deref()
            .filter(|field| !field.is_empty())
            .map(|field| format!("{}:{}", field, self.sort_order))
    }
}

/// One page of search results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse<R> {
    pub hits: Vec<R>,
    pub total_hits: u64,
    pub page: usize,
    pub per_page: usize,
    pub total_pages: u64,
    pub facets: Facets,
    #[serde(with = "duration_ms")]
    pub query_time: Duration,
}

impl<R> SearchResponse<R> {
    /// An empty page echoing the query's paging
    pub fn empty(query: &SearchQuery) -> Self {
        Self {
            hits: Vec::new(),
            total_hits: 0,
            page: query.page,
            per_page: query.per_page,
            total_pages: 0,
            facets: Facets::default(),
            query_time: Duration::ZERO,
        }
    }
}

/// Ceiling of `total_hits / per_page`, zero when `per_page` is zero.
pub fn total_pages(total_hits: u64, per_page: usize) -> u64 {
    if per_page == 0 {
        return 0;
    }
    total_hits.div_ceil(per_page as u64)
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

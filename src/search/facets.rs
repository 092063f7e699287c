//! Facet summaries.
//!
//! Backends report facets as `dimension -> value -> count`. Only four
//! dimensions are surfaced; the routing lives in [`FACET_DIMENSIONS`] so a new
//! dimension is one more table row.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Value counts for one facet dimension
pub type FacetCounts = BTreeMap<String, u64>;

/// Counts for the four dimensions the UI filters on
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Facets {
    pub products: FacetCounts,
    pub doc_types: FacetCounts,
    pub statuses: FacetCounts,
    pub owners: FacetCounts,
}

type Accumulator = fn(&mut Facets) -> &mut FacetCounts;

/// Backend dimension name to summary field.
pub const FACET_DIMENSIONS: &[(&str, Accumulator)] = &[
    ("product", |f| &mut f.products),
    ("docType", |f| &mut f.doc_types),
    ("status", |f| &mut f.statuses),
    ("owners", |f| &mut f.owners),
];

impl Facets {
    /// Route a raw distribution into the fixed summary. Unknown dimensions are
    /// dropped.
    pub fn from_distribution(distribution: BTreeMap<String, FacetCounts>) -> Self {
        let mut facets = Facets::default();
        for (dimension, counts) in distribution {
            if let Some((_, slot)) = FACET_DIMENSIONS.iter().find(|(name, _)| *name == dimension) {
                slot(&mut facets).extend(counts);
            }
        }
        facets
    }

    /// Decode a raw JSON distribution. `null` or a missing value is an empty
    /// summary.
    pub fn from_json(value: Value) -> Result<Self, serde_json::Error> {
        if value.is_null() {
            return Ok(Facets::default());
        }
        serde_json::from_value::<BTreeMap<String, FacetCounts>>(value).map(Self::from_distribution)
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
            && self.doc_types.is_empty()
            && self.statuses.is_empty()
            && self.owners.is_empty()
    }
}

/// Whether `name` is one of the summarized dimensions
pub fn is_known_dimension(name: &str) -> bool {
    FACET_DIMENSIONS.iter().any(|(known, _)| *known == name)
}

//! Filter expression compiler.
//!
//! Turns the flat field map and the ordered filter groups of a
//! [`SearchQuery`] into one backend filter string. The algorithm is the same
//! for every backend; only the clause syntax differs, and that lives in
//! [`FilterDialect`].

use serde_json::Value;

use super::query::{FilterOperator, SearchQuery};

/// Backend-specific clause syntax
pub trait FilterDialect {
    /// Clause for a field that must equal one of `values` (non-empty).
    fn field_clause(&self, field: &str, values: &[String]) -> String;
}

/// `field = "v"` and `field IN ["a", "b"]`
#[derive(Debug, Clone, Copy, Default)]
pub struct MeilisearchDialect;

impl FilterDialect for MeilisearchDialect {
    fn field_clause(&self, field: &str, values: &[String]) -> String {
        match values {
            [single] => format!("{} = {}", field, quote(single)),
            _ => {
                let quoted: Vec<String> = values.iter().map(|v| quote(v)).collect();
                format!("{} IN [{}]", field, quoted.join(", "))
            }
        }
    }
}

/// `field:"v"` and `(field:"a" OR field:"b")`
#[derive(Debug, Clone, Copy, Default)]
pub struct AlgoliaDialect;

impl FilterDialect for AlgoliaDialect {
    fn field_clause(&self, field: &str, values: &[String]) -> String {
        let terms: Vec<String> = values
            .iter()
            .map(|v| format!("{}:{}", field, quote(v)))
            .collect();
        match terms.as_slice() {
            [single] => single.clone(),
            _ => format!("({})", terms.join(" OR ")),
        }
    }
}

/// Double-quote a value as a JSON string literal.
pub fn quote(value: &str) -> String {
    Value::from(value).to_string()
}

/// Compile the query's filters. `None` means no constraint at all.
pub fn compile(dialect: &dyn FilterDialect, query: &SearchQuery) -> Option<String> {
    let flat: Vec<String> = query
        .filters
        .iter()
        .filter(|(_, values)| !values.is_empty())
        .map(|(field, values)| dialect.field_clause(field, values))
        .collect();

    let groups: Vec<String> = query
        .filter_groups
        .iter()
        .filter(|group| !group.expressions.is_empty())
        .map(|group| {
            let joiner = match group.operator {
                FilterOperator::And => " AND ",
                FilterOperator::Or => " OR ",
            };
            let joined = group.expressions.join(joiner);
            if group.expressions.len() > 1 {
                format!("({})", joined)
            } else {
                joined
            }
        })
        .collect();

    match (flat.is_empty(), groups.is_empty()) {
        (true, true) => None,
        (false, true) => Some(flat.join(" AND ")),
        (true, false) => Some(groups.join(" AND ")),
        (false, false) => Some(format!("{} AND {}", flat.join(" AND "), groups.join(" AND "))),
    }
}

//! Record shapes stored in the search backends.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Primary key field name shared by every collection.
pub const OBJECT_ID_FIELD: &str = "objectID";

/// How a collection's records are shaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// Fixed schema ([`Document`])
    Typed,
    /// Caller-defined field map ([`Project`])
    Freeform,
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::Document {}
    impl Sealed for super::Project {}
}

/// A record that can live in a searchable collection.
///
/// Sealed: documents and projects are the only two kinds of searchable record.
pub trait SearchRecord:
    sealed::Sealed + Serialize + serde::de::DeserializeOwned + Clone + Send + Sync + 'static
{
    const KIND: RecordKind;

    /// Primary key, if the record carries a usable one.
    fn object_id(&self) -> Option<&str>;
}

/// The fixed-schema document shape, shared by the documents and drafts
/// collections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Document {
    #[serde(rename = "objectID")]
    pub object_id: String,
    #[serde(rename = "docID")]
    pub doc_id: String,
    pub title: String,
    pub doc_number: String,
    pub doc_type: String,
    pub product: String,
    pub status: String,
    pub owners: Vec<String>,
    pub contributors: Vec<String>,
    pub approvers: Vec<String>,
    pub summary: String,
    pub content: String,
    /// Unix seconds
    pub created_time: i64,
    /// Unix seconds
    pub modified_time: i64,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub custom_fields: Map<String, Value>,

    /// When the caller last converted this record for indexing. Never sent to
    /// the backend.
    #[serde(skip)]
    pub indexed_at: Option<DateTime<Utc>>,
}

impl Document {
    pub fn new(object_id: impl Into<String>) -> Self {
        Self {
            object_id: object_id.into(),
            ..Default::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_product(mut self, product: impl Into<String>) -> Self {
        self.product = product.into();
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }

    pub fn with_doc_type(mut self, doc_type: impl Into<String>) -> Self {
        self.doc_type = doc_type.into();
        self
    }

    pub fn with_owners(mut self, owners: Vec<impl Into<String>>) -> Self {
        self.owners = owners.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_custom_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.custom_fields.insert(name.into(), value.into());
        self
    }

    /// Stamp the local observation time.
    pub fn touch(mut self) -> Self {
        self.indexed_at = Some(Utc::now());
        self
    }
}

// indexed_at is local bookkeeping and not part of record identity.
impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.object_id == other.object_id
            && self.doc_id == other.doc_id
            && self.title == other.title
            && self.doc_number == other.doc_number
            && self.doc_type == other.doc_type
            && self.product == other.product
            && self.status == other.status
            && self.owners == other.owners
            && self.contributors == other.contributors
            && self.approvers == other.approvers
            && self.summary == other.summary
            && self.content == other.content
            && self.created_time == other.created_time
            && self.modified_time == other.modified_time
            && self.custom_fields == other.custom_fields
    }
}

impl SearchRecord for Document {
    const KIND: RecordKind = RecordKind::Typed;

    fn object_id(&self) -> Option<&str> {
        Some(self.object_id.as_str()).filter(|id| !id.is_empty())
    }
}

/// A project record. Projects have a looser schema than documents, so they
/// are kept as an open JSON object keyed by `objectID`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Project(pub Map<String, Value>);

impl Project {
    pub fn new(object_id: impl Into<String>) -> Self {
        let mut fields = Map::new();
        fields.insert(OBJECT_ID_FIELD.to_string(), Value::String(object_id.into()));
        Self(fields)
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for Project {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

impl SearchRecord for Project {
    const KIND: RecordKind = RecordKind::Freeform;

    fn object_id(&self) -> Option<&str> {
        self.0
            .get(OBJECT_ID_FIELD)
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
    }
}

/// A redirect mapping stored in the links collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Link(pub BTreeMap<String, String>);

impl Link {
    /// Canonical redirect from a legacy document path to a document id.
    ///
    /// The key is `/<doc type>/<doc number>`, lower-cased.
    pub fn redirect(doc_type: &str, doc_number: &str, document_id: impl Into<String>) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(
            OBJECT_ID_FIELD.to_string(),
            format!("/{}/{}", doc_type.to_lowercase(), doc_number.to_lowercase()),
        );
        fields.insert("documentID".to_string(), document_id.into());
        Self(fields)
    }

    pub fn object_id(&self) -> Option<&str> {
        self.0
            .get(OBJECT_ID_FIELD)
            .map(String::as_str)
            .filter(|id| !id.is_empty())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Keep only the string-valued fields of a stored object.
    pub fn from_object(object: Map<String, Value>) -> Self {
        Self(
            object
                .into_iter()
                .filter_map(|(k, v)| match v {
                    Value::String(s) => Some((k, s)),
                    _ => None,
                })
                .collect(),
        )
    }
}

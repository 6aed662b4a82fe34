//! Document store contract.
//!
//! The remote store is an opaque networked service holding JSON documents in
//! named collections. Everything above this module talks to it through
//! [`DocumentStore`], so the backend can be chosen at runtime:
//!
//! - [`MemoryStore`] - in-process store used in development mode and tests
//! - [`PgDocumentStore`] - `PostgreSQL` JSONB table with `LISTEN/NOTIFY` push
//!
//! # Collections
//!
//! - `clients` - global, filtered by the `ownerIdentity` field
//! - `codes` - global, keyed by 6-digit client code (reservations + lookup index)
//! - `users/{owner}/orders`, `users/{owner}/employees`,
//!   `users/{owner}/services`, `users/{owner}/templates` - per owner

pub mod memory;
pub mod postgres;

use core::fmt;
use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

use atelier_core::OwnerId;

pub use memory::MemoryStore;
pub use postgres::PgDocumentStore;

/// Top-level fields of a document.
pub type Fields = Map<String, Value>;

/// Shared handle to the store used by every component.
pub type SharedStore = Arc<dyn DocumentStore>;

/// Push channel of full collection snapshots.
///
/// Every item is the complete, ordered result of the subscribed query at one
/// commit. Dropping the stream unsubscribes.
pub type SnapshotStream = BoxStream<'static, Result<Vec<Document>, StoreError>>;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached or dropped the request.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The store rejected the request for the current principal.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The target document does not exist.
    #[error("document {collection}/{id} not found")]
    NotFound {
        /// Collection path.
        collection: String,
        /// Document id.
        id: String,
    },

    /// The request does not fit the stored data (e.g., appending to a non-array).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Stored data is not a valid document.
    #[error("corrupted document: {0}")]
    Corrupted(String),

    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration failed.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A document could not be encoded.
    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Result of a create-only write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    /// The document did not exist and was written.
    Created,
    /// A document with this id already exists; nothing was written.
    AlreadyExists,
}

/// Path of a collection, e.g. `clients` or `users/{owner}/orders`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionPath(String);

impl CollectionPath {
    /// Global clients collection.
    pub const CLIENTS: &'static str = "clients";
    /// Global code reservation / lookup collection.
    pub const CODES: &'static str = "codes";

    /// Create a path from a raw string.
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// The global `clients` collection.
    #[must_use]
    pub fn clients() -> Self {
        Self::new(Self::CLIENTS)
    }

    /// The global `codes` collection.
    #[must_use]
    pub fn codes() -> Self {
        Self::new(Self::CODES)
    }

    /// A collection scoped under `users/{owner}`.
    #[must_use]
    pub fn owned(owner: &OwnerId, collection: &str) -> Self {
        Self(format!("users/{owner}/{collection}"))
    }

    /// Returns the path as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A stored document: its id plus top-level fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Store-assigned (or caller-chosen) id.
    pub id: String,
    /// Document body.
    pub fields: Fields,
}

impl Document {
    /// Create a document.
    #[must_use]
    pub const fn new(id: String, fields: Fields) -> Self {
        Self { id, fields }
    }

    /// Get a top-level field.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Decode into a record, injecting the document id as the `id` field.
    ///
    /// # Errors
    ///
    /// Returns `serde_json::Error` if the fields do not match `T`.
    pub fn decode<T: DeserializeOwned>(self) -> Result<T, serde_json::Error> {
        let mut fields = self.fields;
        fields.insert("id".to_string(), Value::String(self.id));
        serde_json::from_value(Value::Object(fields))
    }
}

/// Serialize a value into document fields.
///
/// # Errors
///
/// Returns `serde_json::Error` if serialization fails or the value is not a
/// JSON object.
pub fn to_fields<T: Serialize + ?Sized>(value: &T) -> Result<Fields, serde_json::Error> {
    match serde_json::to_value(value)? {
        Value::Object(fields) => Ok(fields),
        other => Err(<serde_json::Error as serde::ser::Error>::custom(format!(
            "expected a JSON object, got {other}"
        ))),
    }
}

/// Sort direction of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Ordering of a query by a timestamp field (RFC 3339 strings).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    /// Field holding the timestamp.
    pub field: String,
    /// Sort direction.
    pub direction: Direction,
}

/// Equality filter on a top-level field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    /// Field name.
    pub field: String,
    /// Required value.
    pub value: Value,
}

/// A subscription query: one collection, an optional equality filter, and
/// an ordering.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// Collection to read.
    pub path: CollectionPath,
    /// Optional equality filter.
    pub filter: Option<FieldFilter>,
    /// Result ordering.
    pub order_by: OrderBy,
}

impl Query {
    /// Field every record carries its creation time in.
    pub const CREATED_AT: &'static str = "createdAt";

    /// Query a whole collection, newest `createdAt` first.
    #[must_use]
    pub fn collection(path: CollectionPath) -> Self {
        Self {
            path,
            filter: None,
            order_by: OrderBy {
                field: Self::CREATED_AT.to_string(),
                direction: Direction::Descending,
            },
        }
    }

    /// Restrict the query to documents whose `field` equals `value`.
    #[must_use]
    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter = Some(FieldFilter {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    /// Order by a timestamp field.
    #[must_use]
    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = OrderBy {
            field: field.into(),
            direction,
        };
        self
    }

    /// Whether a document passes the filter.
    #[must_use]
    pub fn matches(&self, document: &Document) -> bool {
        self.filter
            .as_ref()
            .is_none_or(|filter| document.get(&filter.field) == Some(&filter.value))
    }

    /// Sort documents by the query ordering.
    ///
    /// The sort is stable; documents without a parseable timestamp go last.
    pub fn sort(&self, documents: &mut [Document]) {
        let field = self.order_by.field.as_str();
        let direction = self.order_by.direction;
        documents.sort_by(|a, b| {
            match (timestamp(a, field), timestamp(b, field)) {
                (Some(x), Some(y)) => match direction {
                    Direction::Ascending => x.cmp(&y),
                    Direction::Descending => y.cmp(&x),
                },
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            }
        });
    }
}

fn timestamp(document: &Document, field: &str) -> Option<DateTime<Utc>> {
    let raw = document.get(field)?.as_str()?;
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Operations the remote document store exposes.
///
/// Implementations must make [`create_only`](Self::create_only) atomic: of
/// several concurrent calls for the same id, exactly one observes
/// [`CreateOutcome::Created`].
#[async_trait]
pub trait DocumentStore: Send + Sync + fmt::Debug {
    /// Read one document.
    async fn get(&self, path: &CollectionPath, id: &str) -> Result<Option<Document>, StoreError>;

    /// Write a document only if no document with `id` exists.
    async fn create_only(
        &self,
        path: &CollectionPath,
        id: &str,
        fields: Fields,
    ) -> Result<CreateOutcome, StoreError>;

    /// Write a new document under a store-assigned id and return the id.
    async fn create(&self, path: &CollectionPath, fields: Fields) -> Result<String, StoreError>;

    /// Merge top-level fields into an existing document.
    ///
    /// Fails with [`StoreError::NotFound`] if the document does not exist.
    async fn update(&self, path: &CollectionPath, id: &str, fields: Fields)
    -> Result<(), StoreError>;

    /// Atomically append values to an array field (missing or null counts as
    /// empty). No de-duplication is performed.
    async fn append(
        &self,
        path: &CollectionPath,
        id: &str,
        field: &str,
        values: Vec<Value>,
    ) -> Result<(), StoreError>;

    /// Delete a document. Deleting a missing document is not an error.
    async fn delete(&self, path: &CollectionPath, id: &str) -> Result<(), StoreError>;

    /// Open a push channel of full snapshots for `query`.
    ///
    /// The first item is the current snapshot; a new one follows every
    /// committed change to the collection, in commit order.
    async fn subscribe(&self, query: Query) -> Result<SnapshotStream, StoreError>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn doc(id: &str, fields: Value) -> Document {
        let Value::Object(fields) = fields else {
            panic!("fields must be an object");
        };
        Document::new(id.to_string(), fields)
    }

    #[test]
    fn test_owned_path() {
        let owner = OwnerId::parse("uid-1").unwrap();
        assert_eq!(
            CollectionPath::owned(&owner, "orders").as_str(),
            "users/uid-1/orders"
        );
    }

    #[test]
    fn test_to_fields_rejects_non_objects() {
        assert!(to_fields(&json!({"a": 1})).is_ok());
        assert!(to_fields(&json!([1, 2])).is_err());
        assert!(to_fields("text").is_err());
    }

    #[test]
    fn test_decode_injects_id() {
        #[derive(serde::Deserialize)]
        struct Named {
            id: String,
            name: String,
        }

        let named: Named = doc("d1", json!({"name": "x"})).decode().unwrap();
        assert_eq!(named.id, "d1");
        assert_eq!(named.name, "x");
    }

    #[test]
    fn test_query_matches_filter() {
        let query = Query::collection(CollectionPath::clients()).where_eq("ownerIdentity", "a");
        assert!(query.matches(&doc("1", json!({"ownerIdentity": "a"}))));
        assert!(!query.matches(&doc("2", json!({"ownerIdentity": "b"}))));
        assert!(!query.matches(&doc("3", json!({}))));
    }

    #[test]
    fn test_sort_newest_first_missing_last() {
        let query = Query::collection(CollectionPath::clients());
        let mut docs = vec![
            doc("old", json!({"createdAt": "2026-01-01T00:00:00Z"})),
            doc("none", json!({})),
            doc("new", json!({"createdAt": "2026-01-01T00:00:00.500Z"})),
        ];
        query.sort(&mut docs);
        let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, ["new", "old", "none"]);
    }

    #[test]
    fn test_sort_ascending() {
        let query = Query::collection(CollectionPath::clients())
            .order_by(Query::CREATED_AT, Direction::Ascending);
        let mut docs = vec![
            doc("b", json!({"createdAt": "2026-02-01T00:00:00Z"})),
            doc("a", json!({"createdAt": "2026-01-01T00:00:00Z"})),
        ];
        query.sort(&mut docs);
        assert_eq!(docs[0].id, "a");
    }
}

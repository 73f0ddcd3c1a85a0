//! The document store seam.
//!
//! Everything the service persists goes through [`DocumentStore`]: a
//! schemaless collection-of-records store that only understands equality
//! lookups. Filtering and scoring beyond that happens in the services.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};

pub type Fields = Map<String, Value>;

pub mod collections {
    pub const USERS: &str = "users";
    pub const CONNECTIONS: &str = "connections";
    pub const MESSAGES: &str = "messages";
    pub const IDENTITIES: &str = "identities";
    pub const REFRESH_TOKENS: &str = "refresh_tokens";
    /// Claimed usernames, keyed by lowercased name.
    pub const USERNAMES: &str = "usernames";

    /// Every collection, in the order the copy utility moves them.
    pub const ALL: [&str; 6] = [
        IDENTITIES,
        USERNAMES,
        USERS,
        CONNECTIONS,
        MESSAGES,
        REFRESH_TOKENS,
    ];
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{collection}/{id} not found")]
    Missing { collection: String, id: String },

    #[error("{collection}/{id} is malformed: {source}")]
    Malformed {
        collection: String,
        id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("cannot store a value that is not a JSON object")]
    NotAnObject,

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// One stored document: its key and its fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: String,
    pub fields: Fields,
}

impl Record {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Decodes the document into a model. The key is injected as `id`, and
    /// missing optional fields fall back to the model's serde defaults.
    pub fn decode<T: DeserializeOwned>(self, collection: &str) -> Result<T, StoreError> {
        let Record { id, mut fields } = self;
        fields.insert("id".to_string(), Value::String(id.clone()));
        serde_json::from_value(Value::Object(fields)).map_err(|source| StoreError::Malformed {
            collection: collection.to_string(),
            id,
            source,
        })
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }
}

/// Serializes a model into document fields. The `id` field is dropped since
/// it is the document key.
pub fn encode<T: Serialize>(value: &T) -> Result<Fields, StoreError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(mut fields)) => {
            fields.remove("id");
            Ok(fields)
        }
        Ok(_) => Err(StoreError::NotAnObject),
        Err(e) => Err(StoreError::Unavailable(format!("encode failed: {e}"))),
    }
}

/// Builds a partial update from `(field, value)` pairs.
pub fn fields<I, K>(pairs: I) -> Fields
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Creates or replaces a document.
    async fn put(&self, collection: &str, id: &str, fields: Fields) -> Result<(), StoreError>;

    /// Creates a document only if `id` is free. Returns `false`, leaving the
    /// existing document untouched, when the key is already taken.
    async fn create(&self, collection: &str, id: &str, fields: Fields) -> Result<bool, StoreError>;

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Record>, StoreError>;

    /// Documents whose `field` equals `value`, in store order.
    async fn query_equals(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Record>, StoreError>;

    /// Merges `partial` into an existing document. Fails with
    /// [`StoreError::Missing`] when there is no such document.
    async fn update_fields(
        &self,
        collection: &str,
        id: &str,
        partial: Fields,
    ) -> Result<(), StoreError>;

    /// Removes a document. Returns whether it existed; removing a missing
    /// document is not an error.
    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError>;

    /// Every document in a collection, in store order.
    async fn list(&self, collection: &str) -> Result<Vec<Record>, StoreError>;
}

pub async fn insert<T: Serialize>(
    store: &dyn DocumentStore,
    collection: &str,
    id: &str,
    value: &T,
) -> Result<(), StoreError> {
    store.put(collection, id, encode(value)?).await
}

/// Stores `value` under a fresh key. `false` means the key was taken.
pub async fn insert_new<T: Serialize>(
    store: &dyn DocumentStore,
    collection: &str,
    id: &str,
    value: &T,
) -> Result<bool, StoreError> {
    store.create(collection, id, encode(value)?).await
}

pub async fn fetch<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    collection: &str,
    id: &str,
) -> Result<Option<T>, StoreError> {
    store
        .get(collection, id)
        .await?
        .map(|record| record.decode(collection))
        .transpose()
}

pub async fn query<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    collection: &str,
    field: &str,
    value: impl Into<Value>,
) -> Result<Vec<T>, StoreError> {
    store
        .query_equals(collection, field, &value.into())
        .await?
        .into_iter()
        .map(|record| record.decode(collection))
        .collect()
}

pub async fn list_all<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    collection: &str,
) -> Result<Vec<T>, StoreError> {
    store
        .list(collection)
        .await?
        .into_iter()
        .map(|record| record.decode(collection))
        .collect()
}

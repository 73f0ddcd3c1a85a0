use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::store::{DocumentStore, Fields, Record, StoreError};

type Collection = BTreeMap<String, (u64, Fields)>;

/// Process-local document store. Documents keep their insertion order so
/// `list` and `query_equals` behave like a real store's default ordering.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    collections: HashMap<String, Collection>,
    next_seq: u64,
}

fn ordered<'a>(docs: impl Iterator<Item = (&'a String, &'a (u64, Fields))>) -> Vec<Record> {
    let mut rows: Vec<_> = docs.collect();
    rows.sort_by_key(|(_, (seq, _))| *seq);
    rows.into_iter()
        .map(|(id, (_, fields))| Record::new(id.clone(), fields.clone()))
        .collect()
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from a `{collection: {id: fields}}` JSON snapshot.
    pub fn from_snapshot(snapshot: Value) -> Result<Self, StoreError> {
        let Value::Object(collections) = snapshot else {
            return Err(StoreError::NotAnObject);
        };

        let mut inner = Inner::default();
        for (name, docs) in collections {
            let Value::Object(docs) = docs else {
                return Err(StoreError::NotAnObject);
            };
            let collection = inner.collections.entry(name).or_default();
            for (id, fields) in docs {
                let Value::Object(fields) = fields else {
                    return Err(StoreError::NotAnObject);
                };
                inner.next_seq += 1;
                collection.insert(id, (inner.next_seq, fields));
            }
        }

        Ok(Self {
            inner: RwLock::new(inner),
        })
    }

    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = tokio::fs::read_to_string(path).await?;
        let snapshot: Value = serde_json::from_str(&contents)?;
        Ok(Self::from_snapshot(snapshot)?)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn put(&self, collection: &str, id: &str, fields: Fields) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.next_seq += 1;
        let seq = inner.next_seq;
        let docs = inner.collections.entry(collection.to_string()).or_default();
        // Replacing keeps the original position.
        let seq = docs.get(id).map(|(s, _)| *s).unwrap_or(seq);
        docs.insert(id.to_string(), (seq, fields));
        Ok(())
    }

    async fn create(&self, collection: &str, id: &str, fields: Fields) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        inner.next_seq += 1;
        let seq = inner.next_seq;
        let docs = inner.collections.entry(collection.to_string()).or_default();
        match docs.entry(id.to_string()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert((seq, fields));
                Ok(true)
            }
        }
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Record>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|(_, fields)| Record::new(id, fields.clone())))
    }

    async fn query_equals(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Record>, StoreError> {
        let inner = self.inner.read().await;
        let Some(docs) = inner.collections.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(ordered(
            docs.iter()
                .filter(|(_, (_, fields))| fields.get(field) == Some(value)),
        ))
    }

    async fn update_fields(
        &self,
        collection: &str,
        id: &str,
        partial: Fields,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let Some((_, fields)) = inner
            .collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
        else {
            return Err(StoreError::Missing {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        };
        fields.extend(partial);
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        Ok(inner
            .collections
            .get_mut(collection)
            .and_then(|docs| docs.remove(id))
            .is_some())
    }

    async fn list(&self, collection: &str) -> Result<Vec<Record>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .collections
            .get(collection)
            .map(|docs| ordered(docs.iter()))
            .unwrap_or_default())
    }
}

//! Out-of-band operator tasks: duplicate cleanup, snapshot export and
//! store-to-store copies.

use std::collections::HashMap;

use cofound_shared::{ConnectionRequest, ConnectionStatus};
use serde_json::{Map, Value};

use crate::db::store::{collections, DocumentStore, StoreError};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DedupeReport {
    /// Pairs that had more than one request.
    pub groups: usize,
    pub removed: usize,
}

fn keep_rank(status: ConnectionStatus) -> u8 {
    match status {
        ConnectionStatus::Accepted => 0,
        ConnectionStatus::Pending => 1,
        ConnectionStatus::Rejected => 2,
    }
}

fn pair_key(request: &ConnectionRequest, symmetric: bool) -> (String, String) {
    if symmetric && request.to < request.from {
        (request.to.clone(), request.from.clone())
    } else {
        (request.from.clone(), request.to.clone())
    }
}

/// Collapses duplicate requests for the same pair down to one. The
/// survivor is the most advanced request (accepted, then pending, then
/// rejected), earliest first. With `symmetric` set, A->B and B->A count as
/// the same pair.
pub async fn merge_duplicate_requests(
    db: &dyn DocumentStore,
    symmetric: bool,
) -> Result<DedupeReport, StoreError> {
    let mut groups: HashMap<(String, String), Vec<ConnectionRequest>> = HashMap::new();
    for record in db.list(collections::CONNECTIONS).await? {
        let id = record.id.clone();
        match record.decode::<ConnectionRequest>(collections::CONNECTIONS) {
            Ok(request) => groups
                .entry(pair_key(&request, symmetric))
                .or_default()
                .push(request),
            Err(e) => tracing::warn!("Skipping connection {}: {}", id, e),
        }
    }

    let mut report = DedupeReport::default();
    for ((a, b), mut requests) in groups {
        if requests.len() < 2 {
            continue;
        }
        report.groups += 1;
        requests.sort_by_key(|r| (keep_rank(r.status), r.created_at));

        for duplicate in &requests[1..] {
            db.delete(collections::CONNECTIONS, &duplicate.id.to_string())
                .await?;
            report.removed += 1;
        }
        tracing::info!(
            "Merged {} requests between {} and {}, kept {}",
            requests.len(),
            a,
            b,
            requests[0].id
        );
    }
    Ok(report)
}

/// Dumps every collection as `{collection: {id: fields}}`.
pub async fn export_snapshot(db: &dyn DocumentStore) -> Result<Value, StoreError> {
    let mut snapshot = Map::new();
    for collection in collections::ALL {
        let docs: Map<String, Value> = db
            .list(collection)
            .await?
            .into_iter()
            .map(|record| (record.id, Value::Object(record.fields)))
            .collect();
        snapshot.insert(collection.to_string(), Value::Object(docs));
    }
    Ok(Value::Object(snapshot))
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CopyReport {
    pub copied: usize,
    pub failed: usize,
}

/// Copies every document from `source` into `target`. Failures are counted
/// and logged; the copy carries on.
pub async fn copy_documents(source: &dyn DocumentStore, target: &dyn DocumentStore) -> CopyReport {
    let mut report = CopyReport::default();
    for collection in collections::ALL {
        let records = match source.list(collection).await {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!("Could not read {}: {}", collection, e);
                report.failed += 1;
                continue;
            }
        };

        for record in records {
            match target.put(collection, &record.id, record.fields).await {
                Ok(()) => report.copied += 1,
                Err(e) => {
                    tracing::warn!("Could not copy {}/{}: {}", collection, record.id, e);
                    report.failed += 1;
                }
            }
        }
    }

    tracing::info!(
        "Copy finished: {} copied, {} failed",
        report.copied,
        report.failed
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::store::{self, fields};
    use crate::db::MemoryStore;
    use chrono::{Duration, Utc};
    use serde_json::json;
    use uuid::Uuid;

    async fn add(db: &MemoryStore, from: &str, to: &str, status: ConnectionStatus, age: i64) -> Uuid {
        let request = ConnectionRequest {
            id: Uuid::new_v4(),
            from: from.into(),
            to: to.into(),
            status,
            created_at: Utc::now() - Duration::minutes(age),
        };
        store::insert(db, collections::CONNECTIONS, &request.id.to_string(), &request)
            .await
            .unwrap();
        request.id
    }

    #[tokio::test]
    async fn test_merge_keeps_most_advanced() {
        let db = MemoryStore::new();
        add(&db, "alice", "bob", ConnectionStatus::Pending, 30).await;
        let accepted = add(&db, "alice", "bob", ConnectionStatus::Accepted, 10).await;
        add(&db, "alice", "bob", ConnectionStatus::Rejected, 40).await;
        add(&db, "bob", "alice", ConnectionStatus::Pending, 5).await;
        add(&db, "alice", "carol", ConnectionStatus::Pending, 5).await;

        let report = merge_duplicate_requests(&db, false).await.unwrap();
        assert_eq!(report, DedupeReport { groups: 1, removed: 2 });

        let left: Vec<ConnectionRequest> =
            store::list_all(&db, collections::CONNECTIONS).await.unwrap();
        assert_eq!(left.len(), 3);
        assert!(left.iter().any(|r| r.id == accepted));
    }

    #[tokio::test]
    async fn test_symmetric_merge() {
        let db = MemoryStore::new();
        let older = add(&db, "bob", "alice", ConnectionStatus::Pending, 20).await;
        add(&db, "alice", "bob", ConnectionStatus::Pending, 5).await;

        let report = merge_duplicate_requests(&db, true).await.unwrap();
        assert_eq!(report.removed, 1);
        let left: Vec<ConnectionRequest> =
            store::list_all(&db, collections::CONNECTIONS).await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].id, older);
    }

    #[tokio::test]
    async fn test_export_then_copy() {
        let source = MemoryStore::new();
        source
            .put(collections::USERS, "u1", fields([("username", json!("alice"))]))
            .await
            .unwrap();
        add(&source, "alice", "bob", ConnectionStatus::Pending, 1).await;

        let snapshot = export_snapshot(&source).await.unwrap();
        assert_eq!(snapshot["users"]["u1"]["username"], "alice");
        assert_eq!(snapshot["connections"].as_object().unwrap().len(), 1);

        let restored = MemoryStore::from_snapshot(snapshot).unwrap();
        let target = MemoryStore::new();
        let report = copy_documents(&restored, &target).await;
        assert_eq!(report, CopyReport { copied: 2, failed: 0 });
        assert!(target.get(collections::USERS, "u1").await.unwrap().is_some());
    }
}

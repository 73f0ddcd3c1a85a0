//! Connection requests between users and the relationship state derived
//! from them.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use cofound_shared::{api::Notice, ConnectionRequest, ConnectionStatus, RelationshipStatus};
use serde_json::json;
use uuid::Uuid;

use super::profiles::ProfileRepository;
use crate::auth::Session;
use crate::db::store::{self, collections, fields, DocumentStore};
use crate::error::AppError;

const PAIR_NAMESPACE: Uuid = Uuid::from_u128(0x6c0f_04d1_9a3e_4b7f_8e21_5d3c_a7b0_19e4);

/// Document id of the request between `from` and `to`. Derived from the pair
/// so the store rejects a second request for it. Under symmetric dedup both
/// directions share one id.
pub fn pair_id(from: &str, to: &str, symmetric: bool) -> Uuid {
    let (a, b) = if symmetric && to < from { (to, from) } else { (from, to) };
    Uuid::new_v5(&PAIR_NAMESPACE, format!("{}\n{}", a, b).as_bytes())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RelationshipPolicy {
    /// Treat a request in either direction as a duplicate.
    pub symmetric_dedup: bool,
}

#[derive(Clone)]
pub struct RelationshipEngine {
    db: Arc<dyn DocumentStore>,
    policy: RelationshipPolicy,
}

impl RelationshipEngine {
    pub fn new(db: Arc<dyn DocumentStore>, policy: RelationshipPolicy) -> Self {
        Self { db, policy }
    }

    pub async fn send_request(&self, from: &str, to: &str) -> Result<Notice, AppError> {
        let to = to.trim();
        if to.is_empty() {
            return Err(AppError::validation("Recipient is required"));
        }
        if from == to {
            return Err(AppError::validation("You cannot connect with yourself"));
        }

        ProfileRepository::new(self.db.clone())
            .get_by_username(to)
            .await?;

        let sent: Vec<ConnectionRequest> =
            store::query(self.db.as_ref(), collections::CONNECTIONS, "from", from).await?;
        if sent.iter().any(|r| r.to == to) {
            return Err(AppError::DuplicateRequest);
        }
        if self.policy.symmetric_dedup {
            let received: Vec<ConnectionRequest> =
                store::query(self.db.as_ref(), collections::CONNECTIONS, "from", to).await?;
            if received.iter().any(|r| r.to == from) {
                return Err(AppError::DuplicateRequest);
            }
        }

        let request = ConnectionRequest {
            id: pair_id(from, to, self.policy.symmetric_dedup),
            from: from.to_string(),
            to: to.to_string(),
            status: ConnectionStatus::Pending,
            created_at: Utc::now(),
        };
        let created = store::insert_new(
            self.db.as_ref(),
            collections::CONNECTIONS,
            &request.id.to_string(),
            &request,
        )
        .await?;
        if !created {
            return Err(AppError::DuplicateRequest);
        }

        tracing::info!("{} sent a connection request to {}", from, to);
        Ok(Notice::new("Connection request sent!"))
    }

    /// Every request the user sent or received.
    pub async fn list_requests(&self, username: &str) -> Result<Vec<ConnectionRequest>, AppError> {
        let db = self.db.as_ref();
        let (mut sent, received) = tokio::try_join!(
            store::query::<ConnectionRequest>(db, collections::CONNECTIONS, "from", username),
            store::query::<ConnectionRequest>(db, collections::CONNECTIONS, "to", username),
        )?;

        for request in received {
            if !sent.iter().any(|r| r.id == request.id) {
                sent.push(request);
            }
        }
        Ok(sent)
    }

    pub async fn list_all(&self) -> Result<Vec<ConnectionRequest>, AppError> {
        Ok(store::list_all(self.db.as_ref(), collections::CONNECTIONS).await?)
    }

    pub async fn get(&self, id: Uuid) -> Result<ConnectionRequest, AppError> {
        store::fetch(self.db.as_ref(), collections::CONNECTIONS, &id.to_string())
            .await?
            .ok_or_else(|| AppError::not_found("Connection request"))
    }

    /// Accepts or rejects a pending request. Only the recipient (or an
    /// admin) may answer, and only once.
    pub async fn update_status(
        &self,
        actor: &Session,
        id: Uuid,
        status: ConnectionStatus,
    ) -> Result<Notice, AppError> {
        if status == ConnectionStatus::Pending {
            return Err(AppError::validation("Status must be accepted or rejected"));
        }

        let request = self.get(id).await?;
        if request.to != actor.username && !actor.is_admin() {
            return Err(AppError::Forbidden);
        }
        if !request.status.can_transition_to(status) {
            return Err(AppError::InvalidTransition {
                from: request.status,
                to: status,
            });
        }

        self.db
            .update_fields(
                collections::CONNECTIONS,
                &id.to_string(),
                fields([("status", json!(status))]),
            )
            .await?;

        tracing::info!(
            "{} {} the request from {}",
            actor.username,
            status,
            request.from
        );
        Ok(Notice::new(format!("Request {}", status)))
    }

    pub async fn count_accepted(&self, username: &str) -> Result<usize, AppError> {
        Ok(self
            .list_requests(username)
            .await?
            .iter()
            .filter(|r| r.status == ConnectionStatus::Accepted)
            .count())
    }

    pub async fn relationship_status(
        &self,
        viewer: &str,
        other: &str,
    ) -> Result<RelationshipStatus, AppError> {
        let requests = self.list_requests(viewer).await?;
        Ok(relationship_between(viewer, other, &requests))
    }

    pub async fn are_matched(&self, a: &str, b: &str) -> Result<bool, AppError> {
        Ok(self.relationship_status(a, b).await? == RelationshipStatus::Connected)
    }
}

fn precedence(status: RelationshipStatus) -> u8 {
    match status {
        RelationshipStatus::Connected => 4,
        RelationshipStatus::RequestReceived => 3,
        RelationshipStatus::RequestSent => 2,
        RelationshipStatus::Declined => 1,
        RelationshipStatus::None => 0,
    }
}

fn status_for(viewer: &str, request: &ConnectionRequest) -> RelationshipStatus {
    match request.status {
        ConnectionStatus::Accepted => RelationshipStatus::Connected,
        ConnectionStatus::Rejected => RelationshipStatus::Declined,
        ConnectionStatus::Pending if request.from == viewer => RelationshipStatus::RequestSent,
        ConnectionStatus::Pending => RelationshipStatus::RequestReceived,
    }
}

/// Relationship between `viewer` and `other`. When several requests link
/// the pair, the strongest one wins.
pub fn relationship_between(
    viewer: &str,
    other: &str,
    requests: &[ConnectionRequest],
) -> RelationshipStatus {
    requests
        .iter()
        .filter(|r| r.is_between(viewer, other))
        .map(|r| status_for(viewer, r))
        .max_by_key(|s| precedence(*s))
        .unwrap_or_default()
}

/// Relationship to every partner appearing in `requests`.
pub fn relationship_map(
    viewer: &str,
    requests: &[ConnectionRequest],
) -> HashMap<String, RelationshipStatus> {
    let mut map: HashMap<String, RelationshipStatus> = HashMap::new();
    for request in requests {
        let Some(partner) = request.partner_of(viewer) else {
            continue;
        };
        let status = status_for(viewer, request);
        let entry = map.entry(partner.to_string()).or_default();
        if precedence(status) > precedence(*entry) {
            *entry = status;
        }
    }
    map
}

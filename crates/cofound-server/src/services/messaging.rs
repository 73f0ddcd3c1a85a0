use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use cofound_shared::{api::UnreadCounts, Message};
use serde_json::json;
use uuid::Uuid;

use super::relationships::RelationshipEngine;
use crate::auth::Session;
use crate::db::store::{self, collections, fields, DocumentStore};
use crate::error::AppError;

const MAX_MESSAGE_LEN: usize = 2000;

/// Append-only message log between pairs of users.
#[derive(Clone)]
pub struct MessagingLog {
    db: Arc<dyn DocumentStore>,
    relationships: RelationshipEngine,
}

impl MessagingLog {
    pub fn new(db: Arc<dyn DocumentStore>, relationships: RelationshipEngine) -> Self {
        Self { db, relationships }
    }

    /// Sends a message to a matched partner. Admins may message anyone.
    pub async fn send(&self, sender: &Session, to: &str, text: &str) -> Result<Message, AppError> {
        if sender.username == to {
            return Err(AppError::validation("You cannot message yourself"));
        }
        if !sender.is_admin() && !self.relationships.are_matched(&sender.username, to).await? {
            return Err(AppError::Forbidden);
        }
        self.append(&sender.username, to, text).await
    }

    /// Writes a message without checking the relationship.
    pub async fn append(&self, from: &str, to: &str, text: &str) -> Result<Message, AppError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::validation("Message text is required"));
        }
        if text.chars().count() > MAX_MESSAGE_LEN {
            return Err(AppError::validation(format!(
                "Message must be at most {} characters",
                MAX_MESSAGE_LEN
            )));
        }

        let message = Message {
            id: Uuid::new_v4(),
            from: from.to_string(),
            to: to.to_string(),
            text: text.to_string(),
            read: false,
            timestamp: Utc::now(),
        };
        store::insert(
            self.db.as_ref(),
            collections::MESSAGES,
            &message.id.to_string(),
            &message,
        )
        .await?;

        tracing::debug!("{} -> {}: message {}", from, to, message.id);
        Ok(message)
    }

    /// Both directions of the conversation, oldest first.
    pub async fn thread(&self, a: &str, b: &str) -> Result<Vec<Message>, AppError> {
        let db = self.db.as_ref();
        let (from_a, from_b) = tokio::try_join!(
            store::query::<Message>(db, collections::MESSAGES, "from", a),
            store::query::<Message>(db, collections::MESSAGES, "from", b),
        )?;

        let mut messages: Vec<Message> = from_a
            .into_iter()
            .filter(|m| m.to == b)
            .chain(from_b.into_iter().filter(|m| m.to == a && a != b))
            .collect();
        messages.sort_by_key(|m| m.timestamp);
        Ok(messages)
    }

    /// Marks everything `partner` sent to `reader` as read.
    pub async fn mark_read(&self, reader: &str, partner: &str) -> Result<usize, AppError> {
        let inbox: Vec<Message> =
            store::query(self.db.as_ref(), collections::MESSAGES, "to", reader).await?;

        let mut marked = 0;
        for message in inbox.iter().filter(|m| m.from == partner && !m.read) {
            self.db
                .update_fields(
                    collections::MESSAGES,
                    &message.id.to_string(),
                    fields([("read", json!(true))]),
                )
                .await?;
            marked += 1;
        }

        if marked > 0 {
            tracing::debug!("{} read {} messages from {}", reader, marked, partner);
        }
        Ok(marked)
    }

    pub async fn unread_counts(&self, username: &str) -> Result<UnreadCounts, AppError> {
        let inbox: Vec<Message> =
            store::query(self.db.as_ref(), collections::MESSAGES, "to", username).await?;

        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for message in inbox.into_iter().filter(|m| !m.read) {
            *counts.entry(message.from).or_default() += 1;
        }
        Ok(UnreadCounts::from_counts(counts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::services::profiles::ProfileRepository;
    use crate::services::relationships::RelationshipPolicy;
    use cofound_shared::{ConnectionStatus, Role, ADMIN_SENDER};

    fn session(username: &str, role: Role) -> Session {
        Session {
            user_id: Uuid::new_v4(),
            username: username.into(),
            email: format!("{}@example.com", username),
            role,
        }
    }

    async fn matched_pair() -> MessagingLog {
        let db: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let profiles = ProfileRepository::new(db.clone());
        for name in ["alice", "bob", "carol"] {
            profiles
                .create(Uuid::new_v4(), name, &format!("{}@example.com", name), Role::User)
                .await
                .unwrap();
        }
        let relationships = RelationshipEngine::new(db.clone(), RelationshipPolicy::default());
        relationships.send_request("alice", "bob").await.unwrap();
        let id = relationships.list_requests("bob").await.unwrap()[0].id;
        relationships
            .update_status(&session("bob", Role::User), id, ConnectionStatus::Accepted)
            .await
            .unwrap();
        MessagingLog::new(db, relationships)
    }

    #[tokio::test]
    async fn test_unread_accounting() {
        let log = matched_pair().await;
        let alice = session("alice", Role::User);
        for text in ["hi", "are you there?", "ping"] {
            log.send(&alice, "bob", text).await.unwrap();
        }

        assert_eq!(log.unread_counts("bob").await.unwrap().get("alice"), 3);
        assert_eq!(log.mark_read("bob", "alice").await.unwrap(), 3);
        assert_eq!(log.unread_counts("bob").await.unwrap().get("alice"), 0);
        assert_eq!(log.mark_read("bob", "alice").await.unwrap(), 0);
        assert_eq!(log.unread_counts("bob").await.unwrap().total, 0);

        log.send(&alice, "bob", "one more").await.unwrap();
        assert_eq!(log.unread_counts("bob").await.unwrap().get("alice"), 1);
    }

    #[tokio::test]
    async fn test_thread_is_ordered_both_ways() {
        let log = matched_pair().await;
        log.send(&session("alice", Role::User), "bob", "first").await.unwrap();
        log.send(&session("bob", Role::User), "alice", "second").await.unwrap();
        log.send(&session("alice", Role::User), "bob", "third").await.unwrap();

        let thread = log.thread("bob", "alice").await.unwrap();
        let texts: Vec<&str> = thread.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, ["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_only_matches_can_message() {
        let log = matched_pair().await;
        assert!(matches!(
            log.send(&session("carol", Role::User), "alice", "hello").await,
            Err(AppError::Forbidden)
        ));
        assert!(matches!(
            log.send(&session("alice", Role::User), "bob", "   ").await,
            Err(AppError::Validation(_))
        ));

        log.append(ADMIN_SENDER, "carol", "Welcome").await.unwrap();
        let thread = log.thread("carol", ADMIN_SENDER).await.unwrap();
        assert!(thread[0].is_system());
        assert_eq!(log.unread_counts("carol").await.unwrap().get(ADMIN_SENDER), 1);
    }
}

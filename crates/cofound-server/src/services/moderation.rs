//! Admin review of certificates and profiles.

use std::sync::Arc;

use cofound_shared::{
    api::Notice, AdminStats, ConnectionStatus, Message, PendingReview, ReviewKind, ReviewState,
    ADMIN_SENDER,
};
use serde_json::json;

use super::messaging::MessagingLog;
use super::profiles::ProfileRepository;
use super::relationships::RelationshipEngine;
use crate::db::store::{self, collections, fields, DocumentStore};
use crate::error::AppError;

#[derive(Debug, Clone, Copy)]
pub struct ModerationPolicy {
    /// Reject without notifying the user when no reason is given.
    pub silent_rejection: bool,
}

impl Default for ModerationPolicy {
    fn default() -> Self {
        Self {
            silent_rejection: true,
        }
    }
}

fn label(kind: ReviewKind) -> &'static str {
    match kind {
        ReviewKind::Certificate => "Certificate",
        ReviewKind::Profile => "Profile",
    }
}

#[derive(Clone)]
pub struct ModerationWorkflow {
    db: Arc<dyn DocumentStore>,
    profiles: ProfileRepository,
    relationships: RelationshipEngine,
    messaging: MessagingLog,
    policy: ModerationPolicy,
}

impl ModerationWorkflow {
    pub fn new(
        db: Arc<dyn DocumentStore>,
        relationships: RelationshipEngine,
        messaging: MessagingLog,
        policy: ModerationPolicy,
    ) -> Self {
        Self {
            profiles: ProfileRepository::new(db.clone()),
            db,
            relationships,
            messaging,
            policy,
        }
    }

    pub async fn approve(&self, username: &str, kind: ReviewKind) -> Result<Notice, AppError> {
        self.set_review(username, kind, true).await?;
        tracing::info!("Approved {} of {}", kind, username);

        self.notify(
            username,
            &format!("Your {} has been approved.", kind.as_str()),
        )
        .await;
        Ok(Notice::new(format!("{} approved", label(kind))))
    }

    pub async fn reject(
        &self,
        username: &str,
        kind: ReviewKind,
        reason: Option<&str>,
    ) -> Result<Notice, AppError> {
        self.set_review(username, kind, false).await?;
        tracing::info!("Rejected {} of {}", kind, username);

        match reason.map(str::trim).filter(|r| !r.is_empty()) {
            Some(reason) => {
                self.notify(
                    username,
                    &format!("Your {} was rejected: {}", kind.as_str(), reason),
                )
                .await
            }
            None if !self.policy.silent_rejection => {
                self.notify(username, &format!("Your {} was rejected.", kind.as_str()))
                    .await
            }
            None => {}
        }
        Ok(Notice::new(format!("{} rejected", label(kind))))
    }

    async fn set_review(
        &self,
        username: &str,
        kind: ReviewKind,
        approved: bool,
    ) -> Result<(), AppError> {
        let user = self.profiles.get_by_username(username).await?;
        let (approved_field, rejected_field) = kind.flag_fields();
        self.profiles
            .set_fields(
                user.id,
                fields([
                    (approved_field, json!(approved)),
                    (rejected_field, json!(!approved)),
                ]),
            )
            .await
    }

    /// Notification failures are logged and never fail the review.
    async fn notify(&self, username: &str, text: &str) {
        if let Err(e) = self.messaging.append(ADMIN_SENDER, username, text).await {
            tracing::warn!("Could not notify {}: {}", username, e);
        }
    }

    pub async fn pending_reviews(&self) -> Result<Vec<PendingReview>, AppError> {
        let users = self.profiles.list_all().await?;
        let mut pending = Vec::new();

        for user in &users {
            if user.certificate_url.is_some()
                && user.review_state(ReviewKind::Certificate) == ReviewState::Pending
            {
                pending.push(PendingReview {
                    username: user.username.clone(),
                    kind: ReviewKind::Certificate,
                    certificate_url: user.certificate_url.clone(),
                });
            }
            if user.completion().is_complete()
                && user.review_state(ReviewKind::Profile) == ReviewState::Pending
            {
                pending.push(PendingReview {
                    username: user.username.clone(),
                    kind: ReviewKind::Profile,
                    certificate_url: None,
                });
            }
        }
        Ok(pending)
    }

    pub async fn stats(&self) -> Result<AdminStats, AppError> {
        let db = self.db.as_ref();
        let (users, requests, messages) = tokio::try_join!(
            self.profiles.list_all(),
            self.relationships.list_all(),
            async {
                store::list_all::<Message>(db, collections::MESSAGES)
                    .await
                    .map_err(AppError::from)
            },
        )?;

        let mut stats = AdminStats {
            total_users: users.len(),
            total_messages: messages.len(),
            ..Default::default()
        };
        for user in &users {
            if user.verified {
                stats.verified_users += 1;
            }
            match user.review_state(ReviewKind::Certificate) {
                ReviewState::Approved => stats.certificates_approved += 1,
                ReviewState::Rejected => stats.certificates_rejected += 1,
                ReviewState::Pending if user.certificate_url.is_some() => {
                    stats.certificates_pending += 1
                }
                ReviewState::Pending => {}
            }
            if user.profile_approved {
                stats.profiles_approved += 1;
            }
        }
        for request in &requests {
            match request.status {
                ConnectionStatus::Pending => stats.connections_pending += 1,
                ConnectionStatus::Accepted => stats.connections_accepted += 1,
                ConnectionStatus::Rejected => stats.connections_rejected += 1,
            }
        }
        Ok(stats)
    }
}

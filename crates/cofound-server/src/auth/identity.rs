//! Account directory: identities, credentials and email verification.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use super::password::{hash_password, verify_password};
use super::tokens::revoke_all;
use crate::db::store::{self, collections, fields, DocumentStore};
use crate::error::AppError;

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Fails with `Conflict` when the email is already registered.
    async fn create_identity(&self, email: &str, password: &str) -> Result<Uuid, AppError>;

    /// Fails with `Unauthorized` on an unknown email or a wrong password.
    async fn authenticate(&self, email: &str, password: &str) -> Result<Uuid, AppError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<Uuid>, AppError>;

    async fn send_verification_challenge(&self, id: Uuid) -> Result<(), AppError>;

    /// Checks a challenge code and marks the identity verified.
    async fn confirm_challenge(&self, email: &str, code: &str) -> Result<Uuid, AppError>;

    async fn is_challenge_satisfied(&self, id: Uuid) -> Result<bool, AppError>;

    /// Deletes every refresh token held by the identity.
    async fn destroy_session(&self, id: Uuid) -> Result<(), AppError>;

    /// Removes the identity and its sessions, freeing the email address.
    async fn delete_identity(&self, id: Uuid) -> Result<(), AppError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Identity {
    id: Uuid,
    email: String,
    password_hash: String,
    #[serde(default)]
    email_verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    verification_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    verification_expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    created_at: DateTime<Utc>,
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Identity provider that keeps its accounts in the document store.
pub struct StoreIdentityProvider {
    store: Arc<dyn DocumentStore>,
    code_ttl: Duration,
}

impl StoreIdentityProvider {
    pub fn new(store: Arc<dyn DocumentStore>, code_ttl_secs: i64) -> Self {
        Self {
            store,
            code_ttl: Duration::seconds(code_ttl_secs),
        }
    }

    async fn by_email(&self, email: &str) -> Result<Option<Identity>, AppError> {
        let found: Vec<Identity> = store::query(
            self.store.as_ref(),
            collections::IDENTITIES,
            "email",
            normalize_email(email),
        )
        .await?;
        Ok(found.into_iter().next())
    }

    async fn by_id(&self, id: Uuid) -> Result<Identity, AppError> {
        store::fetch(self.store.as_ref(), collections::IDENTITIES, &id.to_string())
            .await?
            .ok_or_else(|| AppError::not_found("Identity"))
    }
}

fn generate_code() -> String {
    format!("{:06}", rand::thread_rng().gen_range(0..1_000_000))
}

#[async_trait]
impl IdentityProvider for StoreIdentityProvider {
    async fn create_identity(&self, email: &str, password: &str) -> Result<Uuid, AppError> {
        if self.by_email(email).await?.is_some() {
            return Err(AppError::Conflict("Email already registered".to_string()));
        }

        let identity = Identity {
            id: Uuid::new_v4(),
            email: normalize_email(email),
            password_hash: hash_password(password)?,
            email_verified: false,
            verification_code: None,
            verification_expires_at: None,
            created_at: Utc::now(),
        };

        store::insert(
            self.store.as_ref(),
            collections::IDENTITIES,
            &identity.id.to_string(),
            &identity,
        )
        .await?;

        tracing::info!("Created identity {} for {}", identity.id, identity.email);
        Ok(identity.id)
    }

    async fn authenticate(&self, email: &str, password: &str) -> Result<Uuid, AppError> {
        let identity = self.by_email(email).await?.ok_or(AppError::Unauthorized)?;

        if !verify_password(password, &identity.password_hash)? {
            tracing::debug!("Wrong password for {}", identity.email);
            return Err(AppError::Unauthorized);
        }

        Ok(identity.id)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Uuid>, AppError> {
        Ok(self.by_email(email).await?.map(|identity| identity.id))
    }

    async fn send_verification_challenge(&self, id: Uuid) -> Result<(), AppError> {
        let identity = self.by_id(id).await?;
        if identity.email_verified {
            return Ok(());
        }

        let code = generate_code();
        let expires_at = Utc::now() + self.code_ttl;

        self.store
            .update_fields(
                collections::IDENTITIES,
                &id.to_string(),
                fields([
                    ("verificationCode", json!(code)),
                    ("verificationExpiresAt", json!(expires_at)),
                ]),
            )
            .await?;

        // No mailer is wired up; the code goes to the operator log.
        tracing::info!(email = %identity.email, %code, "Verification code issued");
        Ok(())
    }

    async fn confirm_challenge(&self, email: &str, code: &str) -> Result<Uuid, AppError> {
        let identity = self
            .by_email(email)
            .await?
            .ok_or_else(|| AppError::not_found("Account"))?;

        if identity.email_verified {
            return Ok(identity.id);
        }

        let valid = match (&identity.verification_code, identity.verification_expires_at) {
            (Some(expected), Some(expires_at)) => expected == code.trim() && expires_at > Utc::now(),
            _ => false,
        };
        if !valid {
            return Err(AppError::validation("Invalid or expired verification code"));
        }

        self.store
            .update_fields(
                collections::IDENTITIES,
                &identity.id.to_string(),
                fields([
                    ("emailVerified", json!(true)),
                    ("verificationCode", json!(null)),
                    ("verificationExpiresAt", json!(null)),
                ]),
            )
            .await?;

        tracing::info!("Email verified for {}", identity.email);
        Ok(identity.id)
    }

    async fn is_challenge_satisfied(&self, id: Uuid) -> Result<bool, AppError> {
        Ok(self.by_id(id).await?.email_verified)
    }

    async fn destroy_session(&self, id: Uuid) -> Result<(), AppError> {
        let removed = revoke_all(self.store.as_ref(), id).await?;
        tracing::debug!("Ended {} sessions for {}", removed, id);
        Ok(())
    }

    async fn delete_identity(&self, id: Uuid) -> Result<(), AppError> {
        revoke_all(self.store.as_ref(), id).await?;
        self.store
            .delete(collections::IDENTITIES, &id.to_string())
            .await?;
        tracing::info!("Deleted identity {}", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;

    fn provider() -> (Arc<dyn DocumentStore>, StoreIdentityProvider) {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        (store.clone(), StoreIdentityProvider::new(store, 900))
    }

    async fn issued_code(store: &Arc<dyn DocumentStore>, id: Uuid) -> String {
        let record = store
            .get(collections::IDENTITIES, &id.to_string())
            .await
            .unwrap()
            .unwrap();
        record.get_str("verificationCode").unwrap().to_string()
    }

    #[tokio::test]
    async fn test_create_and_authenticate() {
        let (_, provider) = provider();
        let id = provider
            .create_identity(" Alice@Example.com ", "password123")
            .await
            .unwrap();

        assert_eq!(
            provider.authenticate("alice@example.com", "password123").await.unwrap(),
            id
        );
        assert!(matches!(
            provider.authenticate("alice@example.com", "nope").await,
            Err(AppError::Unauthorized)
        ));
        assert!(matches!(
            provider.authenticate("bob@example.com", "password123").await,
            Err(AppError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn test_email_in_use() {
        let (_, provider) = provider();
        provider.create_identity("a@example.com", "password123").await.unwrap();
        assert!(matches!(
            provider.create_identity("A@example.com", "password456").await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_verification_challenge() {
        let (store, provider) = provider();
        let id = provider.create_identity("a@example.com", "password123").await.unwrap();
        assert!(!provider.is_challenge_satisfied(id).await.unwrap());

        provider.send_verification_challenge(id).await.unwrap();
        let code = issued_code(&store, id).await;

        let wrong = if code == "000000" { "111111" } else { "000000" };
        assert!(matches!(
            provider.confirm_challenge("a@example.com", wrong).await,
            Err(AppError::Validation(_))
        ));

        assert_eq!(provider.confirm_challenge("a@example.com", &code).await.unwrap(), id);
        assert!(provider.is_challenge_satisfied(id).await.unwrap());
    }

    #[tokio::test]
    async fn test_deleted_identity_frees_email() {
        let (_, provider) = provider();
        let id = provider.create_identity("a@example.com", "password123").await.unwrap();
        provider.delete_identity(id).await.unwrap();

        assert!(provider.find_by_email("a@example.com").await.unwrap().is_none());
        provider.create_identity("a@example.com", "password456").await.unwrap();
    }

    #[tokio::test]
    async fn test_expired_code_rejected() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let provider = StoreIdentityProvider::new(store.clone(), -1);
        let id = provider.create_identity("a@example.com", "password123").await.unwrap();
        provider.send_verification_challenge(id).await.unwrap();
        let code = issued_code(&store, id).await;

        assert!(provider.confirm_challenge("a@example.com", &code).await.is_err());
        assert!(!provider.is_challenge_satisfied(id).await.unwrap());
    }
}

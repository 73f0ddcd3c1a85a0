use std::sync::Arc;

use chrono::Utc;
use cofound_shared::{api::Notice, api::UpdateProfileRequest, Role, User, ADMIN_SENDER};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::db::store::{self, collections, fields, DocumentStore, Fields};
use crate::error::AppError;
use crate::storage::ObjectStorage;

const MAX_FIELD_LEN: usize = 200;
const MAX_ABOUT_LEN: usize = 2000;

const USERNAME_LEN: std::ops::RangeInclusive<usize> = 3..=32;

pub fn validate_username(username: &str) -> Result<(), AppError> {
    let well_formed = USERNAME_LEN.contains(&username.len())
        && username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if !well_formed {
        return Err(AppError::validation(
            "Username must be 3-32 characters of letters, digits, '.', '_' or '-'",
        ));
    }
    if username.eq_ignore_ascii_case(ADMIN_SENDER) {
        return Err(AppError::validation("Username is reserved"));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    Certificate,
    ProfilePicture,
}

impl UploadKind {
    fn prefix(&self) -> &'static str {
        match self {
            Self::Certificate => "certificates",
            Self::ProfilePicture => "profiles",
        }
    }

    fn accepts(&self, content_type: &str) -> bool {
        match self {
            Self::Certificate => {
                content_type == "application/pdf" || content_type.starts_with("image/")
            }
            Self::ProfilePicture => content_type.starts_with("image/"),
        }
    }
}

/// One user record per identity, looked up by id or by username.
#[derive(Clone)]
pub struct ProfileRepository {
    db: Arc<dyn DocumentStore>,
}

impl ProfileRepository {
    pub fn new(db: Arc<dyn DocumentStore>) -> Self {
        Self { db }
    }

    pub async fn create(
        &self,
        id: Uuid,
        username: &str,
        email: &str,
        role: Role,
    ) -> Result<User, AppError> {
        validate_username(username)?;
        let taken = || AppError::Conflict("Username already taken".to_string());
        if self.find_by_username(username).await?.is_some() {
            return Err(taken());
        }
        let claim = fields([("userId", json!(id))]);
        if !self.db.create(collections::USERNAMES, username, claim).await? {
            return Err(taken());
        }

        let user = User::new(id, username, email, role, Utc::now());
        if let Err(e) =
            store::insert(self.db.as_ref(), collections::USERS, &id.to_string(), &user).await
        {
            if let Err(release) = self.release_username(username, id).await {
                tracing::warn!("Could not release username {}: {}", username, release);
            }
            return Err(e.into());
        }

        tracing::info!("Created profile for {} ({})", username, role);
        Ok(user)
    }

    /// Deletes a profile and frees its username. Missing profiles are ignored.
    pub async fn remove(&self, id: Uuid) -> Result<(), AppError> {
        let key = id.to_string();
        let Some(user) = store::fetch::<User>(self.db.as_ref(), collections::USERS, &key).await?
        else {
            return Ok(());
        };
        self.db.delete(collections::USERS, &key).await?;
        self.release_username(&user.username, id).await?;
        tracing::info!("Removed profile {}", user.username);
        Ok(())
    }

    async fn release_username(&self, username: &str, owner: Uuid) -> Result<(), AppError> {
        let owned = self
            .db
            .get(collections::USERNAMES, username)
            .await?
            .is_some_and(|claim| claim.get_str("userId") == Some(owner.to_string().as_str()));
        if owned {
            self.db.delete(collections::USERNAMES, username).await?;
        }
        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> Result<User, AppError> {
        store::fetch(self.db.as_ref(), collections::USERS, &id.to_string())
            .await?
            .ok_or_else(|| AppError::not_found("Profile"))
    }

    pub async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        let found: Vec<User> =
            store::query(self.db.as_ref(), collections::USERS, "username", username).await?;
        Ok(found.into_iter().next())
    }

    pub async fn get_by_username(&self, username: &str) -> Result<User, AppError> {
        self.find_by_username(username)
            .await?
            .ok_or_else(|| AppError::not_found("Profile"))
    }

    pub async fn list_all(&self) -> Result<Vec<User>, AppError> {
        Ok(store::list_all(self.db.as_ref(), collections::USERS).await?)
    }

    /// Writes raw document fields onto a user record.
    pub async fn set_fields(&self, user_id: Uuid, partial: Fields) -> Result<(), AppError> {
        self.db
            .update_fields(collections::USERS, &user_id.to_string(), partial)
            .await
            .map_err(|e| match AppError::from(e) {
                AppError::NotFound(_) => AppError::not_found("Profile"),
                other => other,
            })
    }

    /// Merges the user-editable fields of `update` into the profile.
    pub async fn save(
        &self,
        username: &str,
        update: UpdateProfileRequest,
    ) -> Result<Notice, AppError> {
        let user = self.get_by_username(username).await?;
        let partial = editable_fields(update)?;
        if partial.is_empty() {
            return Ok(Notice::new("Nothing to save"));
        }

        self.set_fields(user.id, partial).await?;
        tracing::debug!("Saved profile for {}", username);
        Ok(Notice::new("Profile saved"))
    }

    /// Uploads a certificate or picture and records its URL on the profile.
    pub async fn upload(
        &self,
        objects: &dyn ObjectStorage,
        username: &str,
        kind: UploadKind,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, AppError> {
        if bytes.is_empty() {
            return Err(AppError::validation("Upload is empty"));
        }
        if !kind.accepts(content_type) {
            return Err(AppError::validation(format!(
                "Unsupported content type: {}",
                content_type
            )));
        }

        let user = self.get_by_username(username).await?;
        let path = format!(
            "{}/{}_{}",
            kind.prefix(),
            username,
            Utc::now().timestamp_millis()
        );
        let url = objects.upload(&path, bytes, content_type).await?;

        let partial = match kind {
            // A new certificate goes back into the review queue.
            UploadKind::Certificate => fields([
                ("certificateUrl", json!(url)),
                ("certificateApproved", json!(false)),
                ("certificateRejected", json!(false)),
            ]),
            UploadKind::ProfilePicture => fields([("profilePicUrl", json!(url))]),
        };
        self.set_fields(user.id, partial).await?;

        tracing::info!("Stored {} for {} at {}", kind.prefix(), username, path);
        Ok(url)
    }
}

fn editable_fields(update: UpdateProfileRequest) -> Result<Fields, AppError> {
    let UpdateProfileRequest {
        full_name,
        skills,
        domain,
        experience,
        availability,
        location,
        about,
        whatsapp,
        linkedin,
        github,
    } = update;

    let candidates = [
        ("fullName", full_name, MAX_FIELD_LEN),
        ("skills", skills, MAX_FIELD_LEN),
        ("domain", domain, MAX_FIELD_LEN),
        ("experience", experience, MAX_FIELD_LEN),
        ("availability", availability, MAX_FIELD_LEN),
        ("location", location, MAX_FIELD_LEN),
        ("about", about, MAX_ABOUT_LEN),
        ("whatsapp", whatsapp, MAX_FIELD_LEN),
        ("linkedin", linkedin, MAX_FIELD_LEN),
        ("github", github, MAX_FIELD_LEN),
    ];

    let mut partial = Fields::new();
    for (name, value, max_len) in candidates {
        let Some(value) = value else { continue };
        let value = value.trim();
        if value.chars().count() > max_len {
            return Err(AppError::validation(format!(
                "{} must be at most {} characters",
                name, max_len
            )));
        }
        let stored = if value.is_empty() {
            Value::Null
        } else {
            Value::String(value.to_string())
        };
        partial.insert(name.to_string(), stored);
    }
    Ok(partial)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::storage::MemoryObjectStorage;

    fn repo() -> ProfileRepository {
        ProfileRepository::new(Arc::new(MemoryStore::new()))
    }

    fn full_update() -> UpdateProfileRequest {
        UpdateProfileRequest {
            full_name: Some("Alice Liddell".into()),
            skills: Some("React, Node".into()),
            domain: Some("Fintech".into()),
            experience: Some("Expert".into()),
            availability: Some("Full-time".into()),
            location: Some("Pune".into()),
            about: Some("Building a payments startup".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_validate_username() {
        assert!(validate_username("alice_01").is_ok());
        assert!(validate_username("al").is_err());
        assert!(validate_username("alice smith").is_err());
        assert!(validate_username("admin").is_err());
    }

    #[tokio::test]
    async fn test_signup_to_complete_profile() {
        let repo = repo();
        let user = repo
            .create(Uuid::new_v4(), "alice", "alice@example.com", Role::Founder)
            .await
            .unwrap();
        assert_eq!(user.role, Role::Founder);
        assert_eq!(user.completion().filled, 0);
        assert_eq!(user.completion().percent, 0);

        let notice = repo.save("alice", full_update()).await.unwrap();
        assert_eq!(notice.message, "Profile saved");

        let user = repo.get_by_username("alice").await.unwrap();
        assert_eq!(user.completion().filled, 7);
        assert_eq!(user.completion().percent, 100);
    }

    #[tokio::test]
    async fn test_username_is_unique() {
        let repo = repo();
        repo.create(Uuid::new_v4(), "alice", "a@example.com", Role::User)
            .await
            .unwrap();
        assert!(matches!(
            repo.create(Uuid::new_v4(), "alice", "b@example.com", Role::User).await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_signups_claim_username_once() {
        let repo = repo();
        let attempts: Vec<_> = (0..8)
            .map(|i| {
                let repo = repo.clone();
                tokio::spawn(async move {
                    repo.create(Uuid::new_v4(), "alice", &format!("a{}@example.com", i), Role::User)
                        .await
                })
            })
            .collect();

        let mut created = 0;
        for attempt in attempts {
            if attempt.await.unwrap().is_ok() {
                created += 1;
            }
        }
        assert_eq!(created, 1);
        assert_eq!(repo.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_remove_frees_username() {
        let repo = repo();
        let first = repo
            .create(Uuid::new_v4(), "alice", "a@example.com", Role::User)
            .await
            .unwrap();
        repo.remove(first.id).await.unwrap();
        assert!(repo.find_by_username("alice").await.unwrap().is_none());

        let second = repo
            .create(Uuid::new_v4(), "alice", "b@example.com", Role::User)
            .await
            .unwrap();
        // Removing an unknown id leaves the new owner's claim alone.
        repo.remove(first.id).await.unwrap();
        repo.remove(Uuid::new_v4()).await.unwrap();
        assert!(matches!(
            repo.create(Uuid::new_v4(), "alice", "c@example.com", Role::User).await,
            Err(AppError::Conflict(_))
        ));
        assert_eq!(repo.get_by_username("alice").await.unwrap().id, second.id);
    }

    #[tokio::test]
    async fn test_save_clears_with_empty_string_and_validates_length() {
        let repo = repo();
        repo.create(Uuid::new_v4(), "alice", "a@example.com", Role::User)
            .await
            .unwrap();
        repo.save("alice", full_update()).await.unwrap();

        let clear = UpdateProfileRequest {
            location: Some("  ".into()),
            ..Default::default()
        };
        repo.save("alice", clear).await.unwrap();
        let user = repo.get_by_username("alice").await.unwrap();
        assert_eq!(user.location, None);
        assert_eq!(user.skills(), "React, Node");

        let too_long = UpdateProfileRequest {
            skills: Some("x".repeat(MAX_FIELD_LEN + 1)),
            ..Default::default()
        };
        assert!(matches!(
            repo.save("alice", too_long).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_save_unknown_user() {
        assert!(matches!(
            repo().save("ghost", full_update()).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_certificate_upload_resets_review() {
        let repo = repo();
        let objects = MemoryObjectStorage::new();
        let user = repo
            .create(Uuid::new_v4(), "bob", "bob@example.com", Role::CoFounder)
            .await
            .unwrap();
        repo.set_fields(
            user.id,
            fields([("certificateRejected", json!(true))]),
        )
        .await
        .unwrap();

        let url = repo
            .upload(&objects, "bob", UploadKind::Certificate, vec![1], "application/pdf")
            .await
            .unwrap();
        assert!(url.starts_with("memory://certificates/bob_"));

        let user = repo.get_by_username("bob").await.unwrap();
        assert_eq!(user.certificate_url.as_deref(), Some(url.as_str()));
        assert!(!user.certificate_rejected);
        assert!(!user.certificate_approved);
    }

    #[tokio::test]
    async fn test_upload_rejects_wrong_type() {
        let repo = repo();
        let objects = MemoryObjectStorage::new();
        repo.create(Uuid::new_v4(), "bob", "bob@example.com", Role::User)
            .await
            .unwrap();
        assert!(matches!(
            repo.upload(&objects, "bob", UploadKind::ProfilePicture, vec![1], "application/pdf")
                .await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            repo.upload(&objects, "bob", UploadKind::ProfilePicture, vec![], "image/png")
                .await,
            Err(AppError::Validation(_))
        ));
    }
}

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use super::jwt::{create_access_token, create_refresh_token, verify_refresh_token, TokenSubject};
use super::password::{hash_password, verify_password};
use crate::config::Config;
use crate::db::store::{self, collections, DocumentStore};
use crate::error::AppError;

/// A live refresh token, stored under its `jti`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshTokenRecord {
    id: Uuid,
    user_id: Uuid,
    token_hash: String,
    expires_at: DateTime<Utc>,
}

pub struct IssuedTokens {
    pub access_token: String,
    pub refresh_token: String,
}

/// Issues an access/refresh pair and stores the refresh token hash. The
/// user's expired refresh tokens are dropped on the way.
pub async fn issue_tokens(
    db: &dyn DocumentStore,
    config: &Config,
    subject: TokenSubject<'_>,
) -> Result<IssuedTokens, AppError> {
    prune_expired(db, subject.user_id).await?;

    let jti = Uuid::new_v4();
    let access_token =
        create_access_token(subject, &config.jwt_secret, config.jwt_expires_in)?;
    let refresh_token = create_refresh_token(
        subject,
        jti,
        &config.jwt_secret,
        config.refresh_token_expires_in,
    )?;

    let record = RefreshTokenRecord {
        id: jti,
        user_id: subject.user_id,
        token_hash: hash_password(&refresh_token)?,
        expires_at: Utc::now() + Duration::seconds(config.refresh_token_expires_in),
    };
    store::insert(db, collections::REFRESH_TOKENS, &jti.to_string(), &record).await?;

    Ok(IssuedTokens {
        access_token,
        refresh_token,
    })
}

/// Validates a refresh token and deletes it. Returns the owning user id.
pub async fn consume_refresh_token(
    db: &dyn DocumentStore,
    config: &Config,
    refresh_token: &str,
) -> Result<Uuid, AppError> {
    let claims = verify_refresh_token(refresh_token, &config.jwt_secret)?;
    let key = claims.jti.to_string();

    let record: RefreshTokenRecord = store::fetch(db, collections::REFRESH_TOKENS, &key)
        .await?
        .ok_or(AppError::Unauthorized)?;

    if record.user_id != claims.sub
        || record.expires_at <= Utc::now()
        || !verify_password(refresh_token, &record.token_hash)?
    {
        return Err(AppError::Unauthorized);
    }

    // Whoever removes the record owns the rotation.
    if !db.delete(collections::REFRESH_TOKENS, &key).await? {
        return Err(AppError::Unauthorized);
    }

    Ok(claims.sub)
}

/// Deletes every refresh token the user holds.
pub async fn revoke_all(db: &dyn DocumentStore, user_id: Uuid) -> Result<usize, AppError> {
    let records = db
        .query_equals(collections::REFRESH_TOKENS, "userId", &json!(user_id))
        .await?;

    let mut removed = 0;
    for record in records {
        if db.delete(collections::REFRESH_TOKENS, &record.id).await? {
            removed += 1;
        }
    }
    Ok(removed)
}

async fn prune_expired(db: &dyn DocumentStore, user_id: Uuid) -> Result<(), AppError> {
    let records: Vec<RefreshTokenRecord> =
        store::query(db, collections::REFRESH_TOKENS, "userId", json!(user_id)).await?;

    let now = Utc::now();
    for record in records.iter().filter(|r| r.expires_at <= now) {
        db.delete(collections::REFRESH_TOKENS, &record.id.to_string())
            .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use cofound_shared::Role;

    fn subject() -> TokenSubject<'static> {
        TokenSubject {
            user_id: Uuid::nil(),
            email: "alice@example.com",
            username: "alice",
            role: Role::Founder,
        }
    }

    async fn stored(db: &MemoryStore) -> usize {
        db.list(collections::REFRESH_TOKENS).await.unwrap().len()
    }

    #[tokio::test]
    async fn test_refresh_token_is_single_use() {
        let db = MemoryStore::new();
        let config = Config::for_tests();
        let issued = issue_tokens(&db, &config, subject()).await.unwrap();
        assert_eq!(stored(&db).await, 1);

        let user_id = consume_refresh_token(&db, &config, &issued.refresh_token)
            .await
            .unwrap();
        assert_eq!(user_id, Uuid::nil());
        assert_eq!(stored(&db).await, 0);

        assert!(matches!(
            consume_refresh_token(&db, &config, &issued.refresh_token).await,
            Err(AppError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn test_access_token_cannot_refresh() {
        let db = MemoryStore::new();
        let config = Config::for_tests();
        let issued = issue_tokens(&db, &config, subject()).await.unwrap();

        assert!(consume_refresh_token(&db, &config, &issued.access_token)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_expired_records_are_pruned() {
        let db = MemoryStore::new();
        let expired = Config {
            refresh_token_expires_in: -60,
            ..Config::for_tests()
        };
        for _ in 0..3 {
            issue_tokens(&db, &expired, subject()).await.unwrap();
        }
        // Each issue drops the previous expired record.
        assert_eq!(stored(&db).await, 1);

        let config = Config::for_tests();
        issue_tokens(&db, &config, subject()).await.unwrap();
        issue_tokens(&db, &config, subject()).await.unwrap();
        assert_eq!(stored(&db).await, 2);
    }

    #[tokio::test]
    async fn test_revoke_all_deletes_records() {
        let db = MemoryStore::new();
        let config = Config::for_tests();
        let first = issue_tokens(&db, &config, subject()).await.unwrap();
        issue_tokens(&db, &config, subject()).await.unwrap();

        assert_eq!(revoke_all(&db, Uuid::nil()).await.unwrap(), 2);
        assert_eq!(stored(&db).await, 0);
        assert!(consume_refresh_token(&db, &config, &first.refresh_token)
            .await
            .is_err());
    }
}

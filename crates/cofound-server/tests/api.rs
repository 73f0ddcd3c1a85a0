use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use cofound_server::{
    db::{collections, DocumentStore, Fields, MemoryStore, Record, StoreError},
    storage::MemoryObjectStorage,
    AppState, Config,
};
use serde_json::{json, Value};
use tower::ServiceExt;

struct TestApp {
    router: Router,
    db: Arc<dyn DocumentStore>,
}

/// Memory store whose `users` collection can be switched off.
struct UsersOutage {
    inner: MemoryStore,
    down: Arc<AtomicBool>,
}

impl UsersOutage {
    fn check(&self, collection: &str) -> Result<(), StoreError> {
        if collection == collections::USERS && self.down.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("users offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for UsersOutage {
    async fn put(&self, collection: &str, id: &str, fields: Fields) -> Result<(), StoreError> {
        self.check(collection)?;
        self.inner.put(collection, id, fields).await
    }

    async fn create(&self, collection: &str, id: &str, fields: Fields) -> Result<bool, StoreError> {
        self.check(collection)?;
        self.inner.create(collection, id, fields).await
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Record>, StoreError> {
        self.inner.get(collection, id).await
    }

    async fn query_equals(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Record>, StoreError> {
        self.inner.query_equals(collection, field, value).await
    }

    async fn update_fields(
        &self,
        collection: &str,
        id: &str,
        partial: Fields,
    ) -> Result<(), StoreError> {
        self.inner.update_fields(collection, id, partial).await
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        self.inner.delete(collection, id).await
    }

    async fn list(&self, collection: &str) -> Result<Vec<Record>, StoreError> {
        self.inner.list(collection).await
    }
}

impl TestApp {
    fn new() -> Self {
        Self::with_store(Arc::new(MemoryStore::new()))
    }

    fn with_store(db: Arc<dyn DocumentStore>) -> Self {
        let state = AppState::new(
            db.clone(),
            Arc::new(MemoryObjectStorage::new()),
            Config::for_tests(),
        );
        Self {
            router: cofound_server::create_router(state),
            db,
        }
    }

    async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn verification_code(&self, email: &str) -> String {
        let records = self
            .db
            .query_equals(collections::IDENTITIES, "email", &json!(email))
            .await
            .unwrap();
        records[0].get_str("verificationCode").unwrap().to_string()
    }

    /// Registers, verifies and logs in. Returns the access token.
    async fn signup(&self, username: &str, email: &str, role: Option<&str>) -> String {
        let (status, _) = self
            .call(
                Method::POST,
                "/api/v1/auth/register",
                None,
                Some(json!({
                    "username": username,
                    "email": email,
                    "password": "password123",
                    "role": role,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let code = self.verification_code(email).await;
        let (status, _) = self
            .call(
                Method::POST,
                "/api/v1/auth/verify-email",
                None,
                Some(json!({ "email": email, "code": code })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = self
            .call(
                Method::POST,
                "/api/v1/auth/login",
                None,
                Some(json!({ "email": email, "password": "password123" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        body["access_token"].as_str().unwrap().to_string()
    }
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::new();
    let response = app
        .router
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_login_requires_verified_email() {
    let app = TestApp::new();
    let (status, _) = app
        .call(
            Method::POST,
            "/api/v1/auth/register",
            None,
            Some(json!({
                "username": "alice",
                "email": "alice@example.com",
                "password": "password123",
                "role": "Founder",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .call(
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({ "email": "alice@example.com", "password": "password123" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body["error"].as_str().unwrap().contains("Email not verified"));
}

#[tokio::test]
async fn test_register_validation() {
    let app = TestApp::new();
    let (status, _) = app
        .call(
            Method::POST,
            "/api/v1/auth/register",
            None,
            Some(json!({ "username": "alice", "email": "a@example.com", "password": "short" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .call(
            Method::POST,
            "/api/v1/auth/register",
            None,
            Some(json!({
                "username": "alice",
                "email": "a@example.com",
                "password": "password123",
                "role": "admin",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_protected_routes_need_a_token() {
    let app = TestApp::new();
    let (status, _) = app.call(Method::GET, "/api/v1/dashboard", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let token = app.signup("alice", "alice@example.com", Some("Founder")).await;
    let (status, _) = app
        .call(Method::GET, "/api/v1/admin/stats", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_refresh_rotates_tokens() {
    let app = TestApp::new();
    app.signup("alice", "alice@example.com", None).await;
    let (_, login) = app
        .call(
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({ "email": "alice@example.com", "password": "password123" })),
        )
        .await;
    let refresh_token = login["refresh_token"].as_str().unwrap();

    let (status, body) = app
        .call(
            Method::POST,
            "/api/v1/auth/refresh",
            None,
            Some(json!({ "refresh_token": refresh_token })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "alice");

    let (status, _) = app
        .call(
            Method::POST,
            "/api/v1/auth/refresh",
            None,
            Some(json!({ "refresh_token": refresh_token })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_match_and_message_flow() {
    let app = TestApp::new();
    let admin = app.signup("root", "admin@example.com", None).await;
    let alice = app.signup("alice", "alice@example.com", Some("Founder")).await;
    let bob = app.signup("bob", "bob@example.com", Some("Co-Founder")).await;

    // Search is closed until the certificate is approved.
    let (status, _) = app.call(Method::GET, "/api/v1/search", Some(&alice), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    for user in ["alice", "bob"] {
        let (status, body) = app
            .call(
                Method::POST,
                &format!("/api/v1/admin/users/{}/approve", user),
                Some(&admin),
                Some(json!({ "kind": "certificate" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Certificate approved");
    }

    let (status, _) = app
        .call(
            Method::PATCH,
            "/api/v1/profile",
            Some(&bob),
            Some(json!({ "skills": "React, Node", "domain": "Fintech" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .call(Method::GET, "/api/v1/search?skill=react", Some(&alice), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["results"][0]["profile"]["username"], "bob");
    assert_eq!(body["results"][0]["score"], 40);

    let (status, body) = app
        .call(
            Method::POST,
            "/api/v1/connections",
            Some(&alice),
            Some(json!({ "to": "bob" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Connection request sent!");

    let (status, _) = app
        .call(
            Method::POST,
            "/api/v1/connections",
            Some(&alice),
            Some(json!({ "to": "bob" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Not matched yet.
    let (status, _) = app
        .call(
            Method::POST,
            "/api/v1/messages/bob",
            Some(&alice),
            Some(json!({ "text": "hi" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, body) = app.call(Method::GET, "/api/v1/connections", Some(&bob), None).await;
    assert_eq!(body["incoming"].as_array().unwrap().len(), 1);
    let id = body["incoming"][0]["id"].as_str().unwrap().to_string();

    let (status, body) = app
        .call(
            Method::PATCH,
            &format!("/api/v1/connections/{}", id),
            Some(&bob),
            Some(json!({ "status": "accepted" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Request accepted");

    let (status, _) = app
        .call(
            Method::PATCH,
            &format!("/api/v1/connections/{}", id),
            Some(&bob),
            Some(json!({ "status": "rejected" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    for text in ["hi", "want to build something?"] {
        let (status, _) = app
            .call(
                Method::POST,
                "/api/v1/messages/bob",
                Some(&alice),
                Some(json!({ "text": text })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (_, body) = app.call(Method::GET, "/api/v1/dashboard", Some(&bob), None).await;
    assert_eq!(body["accepted_matches"], 1);
    assert_eq!(body["unread_messages"], 2);

    let (_, body) = app.call(Method::GET, "/api/v1/users/alice", Some(&bob), None).await;
    assert_eq!(body["relationship"], "connected");
    assert_eq!(body["profile"]["contacts"]["email"], "alice@example.com");

    let (_, body) = app
        .call(Method::POST, "/api/v1/messages/alice/read", Some(&bob), None)
        .await;
    assert_eq!(body["marked"], 2);

    let (_, body) = app.call(Method::GET, "/api/v1/messages/unread", Some(&bob), None).await;
    assert_eq!(body["total"], 0);

    let (_, body) = app.call(Method::GET, "/api/v1/messages/alice", Some(&bob), None).await;
    assert_eq!(body["messages"].as_array().unwrap().len(), 2);
    assert_eq!(body["messages"][0]["text"], "hi");
}

#[tokio::test]
async fn test_admin_reject_notifies_user() {
    let app = TestApp::new();
    let admin = app.signup("root", "admin@example.com", None).await;
    let bob = app.signup("bob", "bob@example.com", Some("Co-Founder")).await;

    let (status, body) = app
        .call(
            Method::POST,
            "/api/v1/admin/users/bob/reject",
            Some(&admin),
            Some(json!({ "kind": "certificate", "reason": "blurry scan" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Certificate rejected");

    let (_, me) = app.call(Method::GET, "/api/v1/auth/me", Some(&bob), None).await;
    assert_eq!(me["certificateRejected"], true);
    assert_eq!(me["certificateApproved"], false);

    let (_, thread) = app.call(Method::GET, "/api/v1/messages/Admin", Some(&bob), None).await;
    assert!(thread["messages"][0]["text"]
        .as_str()
        .unwrap()
        .contains("blurry scan"));

    let (_, stats) = app.call(Method::GET, "/api/v1/admin/stats", Some(&admin), None).await;
    assert_eq!(stats["total_users"], 2);
    assert_eq!(stats["certificates_rejected"], 1);
}

#[tokio::test]
async fn test_failed_signup_can_be_retried() {
    let down = Arc::new(AtomicBool::new(true));
    let app = TestApp::with_store(Arc::new(UsersOutage {
        inner: MemoryStore::new(),
        down: down.clone(),
    }));
    let register = json!({
        "username": "alice",
        "email": "alice@example.com",
        "password": "password123",
    });

    let (status, _) = app
        .call(Method::POST, "/api/v1/auth/register", None, Some(register.clone()))
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let identities = app.db.list(collections::IDENTITIES).await.unwrap();
    assert!(identities.is_empty());

    down.store(false, Ordering::SeqCst);
    let (status, body) = app
        .call(Method::POST, "/api/v1/auth/register", None, Some(register))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "alice");
}

use anyhow::Result;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use cofound_shared::{
    api::{
        ApproveRequest, AuthResponse, ConnectionsResponse, DashboardResponse, LoginRequest,
        MarkReadResponse, Notice, RefreshRequest, RegisterRequest, RegisterResponse,
        RejectRequest, ResendVerificationRequest, SearchParams, SearchResponse,
        SendConnectionRequest, SendMessageRequest, ThreadResponse, UnreadCounts,
        UpdateConnectionRequest, UpdateProfileRequest, UploadResponse, VerifyEmailRequest,
    },
    AdminStats, ConnectionRequest, ConnectionStatus, Message, PendingReview, ProfileCompletion,
    PublicProfile, RelationshipStatus, ReviewKind, Role, User,
};
use reqwest::{header, Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use uuid::Uuid;

use super::auth::AuthTokens;

/// JWT payload claims we need for expiry checking
#[derive(Deserialize)]
struct JwtClaims {
    exp: i64,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Deserialize)]
pub struct UserView {
    pub profile: PublicProfile,
    pub relationship: RelationshipStatus,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Not authenticated")]
    Unauthorized,
    #[error("Access forbidden")]
    Forbidden,
    #[error("Email not verified")]
    EmailNotVerified,
    #[error("Certificate not approved")]
    NotApproved,
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Service unavailable: {0}")]
    Unavailable(String),
    #[error("Server error: {0}")]
    Server(String),
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Maps a failed response onto [`ApiError`] using the server's
/// `{"error": ...}` body.
fn error_for(status: StatusCode, body: &str) -> ApiError {
    let message = serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.error)
        .unwrap_or_else(|_| body.to_string());

    match status {
        StatusCode::UNAUTHORIZED => ApiError::Unauthorized,
        StatusCode::FORBIDDEN if message.contains("Email not verified") => {
            ApiError::EmailNotVerified
        }
        StatusCode::FORBIDDEN if message.contains("Certificate not approved") => {
            ApiError::NotApproved
        }
        StatusCode::FORBIDDEN => ApiError::Forbidden,
        StatusCode::NOT_FOUND => ApiError::NotFound(message),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => ApiError::Validation(message),
        StatusCode::CONFLICT => ApiError::Conflict(message),
        StatusCode::SERVICE_UNAVAILABLE => ApiError::Unavailable(message),
        _ => ApiError::Server(format!("{}: {}", status, message)),
    }
}

fn search_query(params: &SearchParams) -> String {
    let relationship = params
        .relationship
        .and_then(|r| serde_json::to_value(r).ok())
        .and_then(|v| v.as_str().map(str::to_string));

    let pairs = [
        ("skill", params.skill.clone()),
        ("domain", params.domain.clone()),
        ("experience", params.experience.clone()),
        ("availability", params.availability.clone()),
        ("relationship", relationship),
    ];

    let query: Vec<String> = pairs
        .iter()
        .filter_map(|(key, value)| {
            value
                .as_deref()
                .filter(|v| !v.trim().is_empty())
                .map(|v| format!("{}={}", key, urlencoding::encode(v)))
        })
        .collect();

    if query.is_empty() {
        String::new()
    } else {
        format!("?{}", query.join("&"))
    }
}

pub struct ApiClient {
    client: Client,
    base_url: String,
    tokens: Option<AuthTokens>,
    persist: bool,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            tokens: None,
            persist: true,
        }
    }

    /// A client that keeps its tokens in memory only.
    pub fn ephemeral(base_url: &str) -> Self {
        Self {
            persist: false,
            ..Self::new(base_url)
        }
    }

    /// Load tokens from disk
    pub fn load_tokens(&mut self) -> Result<bool> {
        self.tokens = AuthTokens::load()?;
        Ok(self.tokens.is_some())
    }

    pub fn is_authenticated(&self) -> bool {
        self.tokens.is_some()
    }

    pub fn username(&self) -> Option<&str> {
        self.tokens.as_ref().map(|t| t.username.as_str())
    }

    pub fn role(&self) -> Option<Role> {
        self.tokens.as_ref().map(|t| t.role)
    }

    /// Build URL for endpoint
    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base_url, path)
    }

    fn store_tokens(&mut self, auth: AuthResponse) -> Result<(), ApiError> {
        let tokens = AuthTokens {
            access_token: auth.access_token,
            refresh_token: auth.refresh_token,
            user_id: auth.user_id,
            username: auth.username,
            role: auth.role,
        };
        if self.persist {
            tokens.save().map_err(ApiError::Other)?;
        }
        self.tokens = Some(tokens);
        Ok(())
    }

    /// Decode JWT payload and extract expiration time
    fn decode_token_exp(token: &str) -> Option<i64> {
        // JWT format: header.payload.signature
        let parts: Vec<&str> = token.split('.').collect();
        if parts.len() != 3 {
            return None;
        }

        let payload = URL_SAFE_NO_PAD.decode(parts[1]).ok()?;
        let claims: JwtClaims = serde_json::from_slice(&payload).ok()?;

        Some(claims.exp)
    }

    /// Check if the access token is expiring soon (within 60 seconds)
    fn is_token_expiring_soon(&self) -> bool {
        let Some(tokens) = &self.tokens else {
            return true;
        };

        let Some(exp) = Self::decode_token_exp(&tokens.access_token) else {
            return false; // Can't decode = don't refresh proactively
        };

        exp < chrono::Utc::now().timestamp() + 60
    }

    /// Returns the bearer header, refreshing the access token first when it
    /// is about to expire.
    async fn bearer(&mut self) -> Result<String, ApiError> {
        if self.tokens.is_some() && self.is_token_expiring_soon() {
            if let Err(e) = self.refresh().await {
                tracing::debug!("Token refresh failed: {}", e);
                return Err(ApiError::Unauthorized);
            }
        }

        self.tokens
            .as_ref()
            .map(|t| format!("Bearer {}", t.access_token))
            .ok_or(ApiError::Unauthorized)
    }

    // ============ Request Helpers ============

    async fn send(&mut self, request: RequestBuilder) -> Result<reqwest::Response, ApiError> {
        let auth = self.bearer().await?;
        request
            .header(header::AUTHORIZATION, auth)
            .send()
            .await
            .map_err(ApiError::Network)
    }

    async fn authed_get<T: serde::de::DeserializeOwned>(&mut self, path: &str) -> Result<T, ApiError> {
        let request = self.client.get(self.url(path));
        let response = self.send(request).await?;
        handle_response(response).await
    }

    async fn authed_post<B, T>(&mut self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: serde::Serialize,
        T: serde::de::DeserializeOwned,
    {
        let request = self.client.post(self.url(path)).json(body);
        let response = self.send(request).await?;
        handle_response(response).await
    }

    async fn authed_post_empty<T: serde::de::DeserializeOwned>(
        &mut self,
        path: &str,
    ) -> Result<T, ApiError> {
        let request = self.client.post(self.url(path));
        let response = self.send(request).await?;
        handle_response(response).await
    }

    async fn authed_patch<B, T>(&mut self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: serde::Serialize,
        T: serde::de::DeserializeOwned,
    {
        let request = self.client.patch(self.url(path)).json(body);
        let response = self.send(request).await?;
        handle_response(response).await
    }

    async fn authed_upload(
        &mut self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<UploadResponse, ApiError> {
        let request = self
            .client
            .post(self.url(path))
            .header(header::CONTENT_TYPE, content_type)
            .body(bytes);
        let response = self.send(request).await?;
        handle_response(response).await
    }

    async fn public_post<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: serde::Serialize,
        T: serde::de::DeserializeOwned,
    {
        let response = self.client.post(self.url(path)).json(body).send().await?;
        handle_response(response).await
    }

    // ============ Auth ============

    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
        role: Option<Role>,
    ) -> Result<RegisterResponse, ApiError> {
        let req = RegisterRequest {
            username: username.to_string(),
            email: email.to_string(),
            password: password.to_string(),
            role,
        };
        self.public_post("/auth/register", &req).await
    }

    pub async fn verify_email(&self, email: &str, code: &str) -> Result<Notice, ApiError> {
        let req = VerifyEmailRequest {
            email: email.to_string(),
            code: code.to_string(),
        };
        self.public_post("/auth/verify-email", &req).await
    }

    pub async fn resend_verification(&self, email: &str) -> Result<Notice, ApiError> {
        let req = ResendVerificationRequest {
            email: email.to_string(),
        };
        self.public_post("/auth/resend-verification", &req).await
    }

    pub async fn login(&mut self, email: &str, password: &str) -> Result<User, ApiError> {
        let req = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let auth: AuthResponse = self.public_post("/auth/login", &req).await?;
        self.store_tokens(auth)?;

        self.me().await
    }

    pub async fn logout(&mut self) -> Result<(), ApiError> {
        if let Some(tokens) = &self.tokens {
            let result = self
                .client
                .post(self.url("/auth/logout"))
                .header(header::AUTHORIZATION, format!("Bearer {}", tokens.access_token))
                .send()
                .await;
            if let Err(e) = result {
                tracing::debug!("Logout request failed: {}", e);
            }
        }

        self.tokens = None;
        if self.persist {
            AuthTokens::delete().map_err(ApiError::Other)?;
        }
        Ok(())
    }

    pub async fn refresh(&mut self) -> Result<(), ApiError> {
        let refresh_token = self
            .tokens
            .as_ref()
            .map(|t| t.refresh_token.clone())
            .ok_or(ApiError::Unauthorized)?;

        let auth: AuthResponse = self
            .public_post("/auth/refresh", &RefreshRequest { refresh_token })
            .await?;
        self.store_tokens(auth)
    }

    pub async fn me(&mut self) -> Result<User, ApiError> {
        self.authed_get("/auth/me").await
    }

    // ============ Profile ============

    pub async fn profile(&mut self) -> Result<User, ApiError> {
        self.authed_get("/profile").await
    }

    pub async fn update_profile(&mut self, update: &UpdateProfileRequest) -> Result<Notice, ApiError> {
        self.authed_patch("/profile", update).await
    }

    pub async fn completion(&mut self) -> Result<ProfileCompletion, ApiError> {
        self.authed_get("/profile/completion").await
    }

    pub async fn upload_certificate(
        &mut self,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<UploadResponse, ApiError> {
        self.authed_upload("/profile/certificate", bytes, content_type).await
    }

    pub async fn upload_picture(
        &mut self,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<UploadResponse, ApiError> {
        self.authed_upload("/profile/picture", bytes, content_type).await
    }

    pub async fn view_user(&mut self, username: &str) -> Result<UserView, ApiError> {
        self.authed_get(&format!("/users/{}", urlencoding::encode(username)))
            .await
    }

    pub async fn dashboard(&mut self) -> Result<DashboardResponse, ApiError> {
        self.authed_get("/dashboard").await
    }

    // ============ Search ============

    pub async fn search(&mut self, params: &SearchParams) -> Result<SearchResponse, ApiError> {
        self.authed_get(&format!("/search{}", search_query(params)))
            .await
    }

    // ============ Connections ============

    pub async fn connections(&mut self) -> Result<ConnectionsResponse, ApiError> {
        self.authed_get("/connections").await
    }

    pub async fn send_request(&mut self, to: &str) -> Result<Notice, ApiError> {
        let req = SendConnectionRequest { to: to.to_string() };
        self.authed_post("/connections", &req).await
    }

    pub async fn update_request(
        &mut self,
        id: Uuid,
        status: ConnectionStatus,
    ) -> Result<Notice, ApiError> {
        let req = UpdateConnectionRequest { status };
        self.authed_patch(&format!("/connections/{}", id), &req).await
    }

    // ============ Messages ============

    pub async fn unread_counts(&mut self) -> Result<UnreadCounts, ApiError> {
        self.authed_get("/messages/unread").await
    }

    pub async fn thread(&mut self, partner: &str) -> Result<ThreadResponse, ApiError> {
        self.authed_get(&format!("/messages/{}", urlencoding::encode(partner)))
            .await
    }

    pub async fn send_message(&mut self, partner: &str, text: &str) -> Result<Message, ApiError> {
        let req = SendMessageRequest {
            text: text.to_string(),
        };
        self.authed_post(&format!("/messages/{}", urlencoding::encode(partner)), &req)
            .await
    }

    pub async fn mark_read(&mut self, partner: &str) -> Result<MarkReadResponse, ApiError> {
        self.authed_post_empty(&format!("/messages/{}/read", urlencoding::encode(partner)))
            .await
    }

    // ============ Admin ============

    pub async fn admin_users(&mut self) -> Result<Vec<User>, ApiError> {
        self.authed_get("/admin/users").await
    }

    pub async fn pending_reviews(&mut self) -> Result<Vec<PendingReview>, ApiError> {
        self.authed_get("/admin/pending").await
    }

    pub async fn admin_stats(&mut self) -> Result<AdminStats, ApiError> {
        self.authed_get("/admin/stats").await
    }

    pub async fn all_connections(&mut self) -> Result<Vec<ConnectionRequest>, ApiError> {
        self.authed_get("/admin/connections").await
    }

    pub async fn approve(&mut self, username: &str, kind: ReviewKind) -> Result<Notice, ApiError> {
        let path = format!("/admin/users/{}/approve", urlencoding::encode(username));
        self.authed_post(&path, &ApproveRequest { kind }).await
    }

    pub async fn reject(
        &mut self,
        username: &str,
        kind: ReviewKind,
        reason: Option<&str>,
    ) -> Result<Notice, ApiError> {
        let path = format!("/admin/users/{}/reject", urlencoding::encode(username));
        let req = RejectRequest {
            kind,
            reason: reason.map(str::to_string),
        };
        self.authed_post(&path, &req).await
    }
}

/// Handle API response
async fn handle_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ApiError> {
    let status = response.status();
    if status.is_success() {
        return response.json().await.map_err(ApiError::Network);
    }

    let text = response.text().await.unwrap_or_default();
    Err(error_for(status, &text))
}

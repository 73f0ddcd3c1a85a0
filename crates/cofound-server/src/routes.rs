use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, patch, post},
    Router,
};
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, services::ServeDir, trace::TraceLayer,
};

use crate::auth::{admin_middleware, auth_middleware, IdentityProvider, StoreIdentityProvider};
use crate::db::DocumentStore;
use crate::handlers::{
    admin as admin_handlers, auth as auth_handlers, connections as connection_handlers,
    messages as message_handlers, profiles as profile_handlers, search as search_handlers,
};
use crate::services::{
    DirectoryService, MessagingLog, ModerationPolicy, ModerationWorkflow, ProfileRepository,
    RelationshipEngine, RelationshipPolicy,
};
use crate::storage::ObjectStorage;
use crate::Config;

const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn DocumentStore>,
    pub identity: Arc<dyn IdentityProvider>,
    pub objects: Arc<dyn ObjectStorage>,
    pub config: Config,
}

impl AppState {
    /// State with the identity provider kept in the same document store.
    pub fn new(db: Arc<dyn DocumentStore>, objects: Arc<dyn ObjectStorage>, config: Config) -> Self {
        let identity = Arc::new(StoreIdentityProvider::new(
            db.clone(),
            config.verification_code_ttl,
        ));
        Self {
            db,
            identity,
            objects,
            config,
        }
    }

    pub fn profiles(&self) -> ProfileRepository {
        ProfileRepository::new(self.db.clone())
    }

    pub fn relationships(&self) -> RelationshipEngine {
        RelationshipEngine::new(
            self.db.clone(),
            RelationshipPolicy {
                symmetric_dedup: self.config.symmetric_dedup,
            },
        )
    }

    pub fn directory(&self) -> DirectoryService {
        DirectoryService::new(self.profiles(), self.relationships())
    }

    pub fn messaging(&self) -> MessagingLog {
        MessagingLog::new(self.db.clone(), self.relationships())
    }

    pub fn moderation(&self) -> ModerationWorkflow {
        ModerationWorkflow::new(
            self.db.clone(),
            self.relationships(),
            self.messaging(),
            ModerationPolicy {
                silent_rejection: self.config.silent_rejection,
            },
        )
    }
}

pub fn create_router(state: AppState) -> Router {
    let upload_dir = state.config.upload_dir.clone();

    // Public auth routes (no middleware)
    let public_auth_routes = Router::new()
        .route("/register", post(auth_handlers::register))
        .route("/login", post(auth_handlers::login))
        .route("/refresh", post(auth_handlers::refresh))
        .route("/verify-email", post(auth_handlers::verify_email))
        .route("/resend-verification", post(auth_handlers::resend_verification));

    // Protected auth routes (need auth)
    let protected_auth_routes = Router::new()
        .route("/logout", post(auth_handlers::logout))
        .route("/me", get(auth_handlers::me))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let auth_routes = Router::new()
        .merge(public_auth_routes)
        .merge(protected_auth_routes);

    let upload_routes = Router::new()
        .route("/certificate", post(profile_handlers::upload_certificate))
        .route("/picture", post(profile_handlers::upload_picture))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES));

    let profile_routes = Router::new()
        .route(
            "/",
            get(profile_handlers::get_profile).patch(profile_handlers::update_profile),
        )
        .route("/completion", get(profile_handlers::completion))
        .merge(upload_routes);

    let connection_routes = Router::new()
        .route(
            "/",
            get(connection_handlers::list_connections).post(connection_handlers::send_request),
        )
        .route("/:id", patch(connection_handlers::update_request));

    let message_routes = Router::new()
        .route("/unread", get(message_handlers::unread_counts))
        .route(
            "/:partner",
            get(message_handlers::thread).post(message_handlers::send_message),
        )
        .route("/:partner/read", post(message_handlers::mark_read));

    let admin_routes = Router::new()
        .route("/users", get(admin_handlers::list_users))
        .route("/pending", get(admin_handlers::pending_reviews))
        .route("/stats", get(admin_handlers::stats))
        .route("/connections", get(admin_handlers::list_connections))
        .route("/users/:username/approve", post(admin_handlers::approve))
        .route("/users/:username/reject", post(admin_handlers::reject))
        .layer(middleware::from_fn(admin_middleware));

    // Protected routes with auth middleware
    let protected_routes = Router::new()
        .nest("/profile", profile_routes)
        .nest("/connections", connection_routes)
        .nest("/messages", message_routes)
        .nest("/admin", admin_routes)
        .route("/users/:username", get(profile_handlers::view_user))
        .route("/dashboard", get(profile_handlers::dashboard))
        .route("/search", get(search_handlers::search))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1/auth", auth_routes)
        .nest("/api/v1", protected_routes)
        .nest_service("/uploads", ServeDir::new(upload_dir))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

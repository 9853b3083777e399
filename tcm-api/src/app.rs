/// Application state and router builder
///
/// This module defines the shared application state and provides
/// a function to build the Axum router with all routes and middleware.
///
/// # Example
///
/// ```no_run
/// use tcm_api::{app::AppState, config::Config};
/// use sqlx::PgPool;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let pool = PgPool::connect(&config.database.url).await?;
/// let state = AppState::new(pool, config);
/// let app = tcm_api::app::build_router(state);
/// # Ok(())
/// # }
/// ```

use crate::{config::Config, error::ApiError, middleware::security::SecurityHeadersLayer};
use axum::{
    extract::{DefaultBodyLimit, Request, State},
    http::{header, HeaderValue, Method},
    middleware::Next,
    response::Response,
    routing::{delete, get, post, put},
    Router,
};
use sqlx::PgPool;
use std::sync::Arc;
use tcm_shared::auth::middleware::{authenticate, CookieOptions};
use tcm_shared::mail::{LogMailer, Mailer};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Shared application state
///
/// This is cloned for each request handler via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: PgPool,

    /// Application configuration
    pub config: Arc<Config>,

    /// Delivers invitation and verification mail
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    /// Creates application state that logs outgoing mail
    pub fn new(db: PgPool, config: Config) -> Self {
        Self::with_mailer(db, config, Arc::new(LogMailer))
    }

    pub fn with_mailer(db: PgPool, config: Config, mailer: Arc<dyn Mailer>) -> Self {
        Self {
            db,
            config: Arc::new(config),
            mailer,
        }
    }

    /// Gets JWT secret for token operations
    pub fn jwt_secret(&self) -> &str {
        &self.config.jwt.secret
    }

    /// Attributes for session cookies
    pub fn cookie_options(&self) -> CookieOptions {
        CookieOptions {
            secure: self.config.api.production,
            ..Default::default()
        }
    }
}

/// Builds the complete Axum router with all routes and middleware
///
/// # Architecture
///
/// ```text
/// /
/// ├── /health                               # Health check (public)
/// └── /v1/
///     ├── /auth/                            # public
///     │   ├── POST /register, /login, /refresh, /logout
///     │   └── POST /verify-email, /accept-invitation
///     └── (session required)
///         ├── /me, /me/resend-verification
///         ├── /organization, /users, /invitations
///         ├── /projects/:id/{users,modules,analytics}
///         ├── /modules/:id/{users,suites,analytics,export}
///         ├── /suites/:id/{test-cases,import,export}
///         ├── /test-cases/:id/executions
///         └── /executions/{assigned,:id,:id/assignee}
/// ```
///
/// # Middleware Stack
///
/// Applied in order (outermost first):
/// 1. Security headers
/// 2. CORS (tower-http CorsLayer)
/// 3. Logging (tower-http TraceLayer)
/// 4. Session authentication (everything under /v1 except /v1/auth)
pub fn build_router(state: AppState) -> Router {
    use crate::routes;

    // Health check (public, no auth)
    let health_routes = Router::new().route("/health", get(routes::health::health_check));

    // Auth routes (public, no auth required)
    let auth_routes = Router::new()
        .route("/register", post(routes::auth::register))
        .route("/login", post(routes::auth::login))
        .route("/refresh", post(routes::auth::refresh))
        .route("/logout", post(routes::auth::logout))
        .route("/verify-email", post(routes::auth::verify_email))
        .route("/accept-invitation", post(routes::invitations::accept_invitation));

    let import_limit = DefaultBodyLimit::max(state.config.api.max_upload_bytes);

    // Everything else requires a session
    let protected_routes = Router::new()
        .route("/me", get(routes::me::me))
        .route("/me/resend-verification", post(routes::me::resend_verification))
        .route(
            "/organization",
            get(routes::organization::get_organization).patch(routes::organization::update_organization),
        )
        .route("/users", get(routes::users::list_users))
        .route("/users/:id", delete(routes::users::delete_user))
        .route("/users/:id/roles", put(routes::users::set_roles))
        .route(
            "/invitations",
            post(routes::invitations::create_invitation).get(routes::invitations::list_invitations),
        )
        .route("/invitations/:id", delete(routes::invitations::revoke_invitation))
        .route(
            "/projects",
            post(routes::projects::create_project).get(routes::projects::list_projects),
        )
        .route(
            "/projects/:id",
            get(routes::projects::get_project)
                .patch(routes::projects::update_project)
                .delete(routes::projects::delete_project),
        )
        .route(
            "/projects/:id/users",
            get(routes::projects::list_project_users).put(routes::projects::assign_project_users),
        )
        .route(
            "/projects/:id/modules",
            post(routes::modules::create_module).get(routes::modules::list_modules),
        )
        .route("/projects/:id/analytics", get(routes::analytics::project_analytics))
        .route(
            "/modules/:id",
            get(routes::modules::get_module)
                .patch(routes::modules::update_module)
                .delete(routes::modules::delete_module),
        )
        .route(
            "/modules/:id/users",
            get(routes::modules::list_module_users).put(routes::modules::assign_module_users),
        )
        .route("/modules/:id/users/:user_id", delete(routes::modules::unassign_module_user))
        .route(
            "/modules/:id/suites",
            post(routes::suites::create_suite).get(routes::suites::list_suites),
        )
        .route("/modules/:id/analytics", get(routes::analytics::module_analytics))
        .route("/modules/:id/export", get(routes::transfer::export_module))
        .route(
            "/suites/:id",
            get(routes::suites::get_suite)
                .patch(routes::suites::update_suite)
                .delete(routes::suites::delete_suite),
        )
        .route(
            "/suites/:id/test-cases",
            post(routes::test_cases::create_test_case).get(routes::test_cases::list_test_cases),
        )
        .route(
            "/suites/:id/import",
            post(routes::transfer::import_suite).layer(import_limit),
        )
        .route("/suites/:id/export", get(routes::transfer::export_suite))
        .route(
            "/test-cases/:id",
            get(routes::test_cases::get_test_case)
                .put(routes::test_cases::update_test_case)
                .delete(routes::test_cases::delete_test_case),
        )
        .route(
            "/test-cases/:id/executions",
            post(routes::executions::create_execution).get(routes::executions::list_executions),
        )
        .route("/executions/assigned", get(routes::executions::list_assigned))
        .route(
            "/executions/:id",
            get(routes::executions::get_execution)
                .put(routes::executions::update_execution)
                .delete(routes::executions::delete_execution),
        )
        .route("/executions/:id/assignee", put(routes::executions::assign_execution))
        .layer(axum::middleware::from_fn_with_state(state.clone(), jwt_auth_layer));

    // Build complete v1 API
    let v1_routes = Router::new()
        .nest("/auth", auth_routes)
        .merge(protected_routes);

    Router::new()
        .merge(health_routes)
        .nest("/v1", v1_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_layer(&state.config))
        .layer(SecurityHeadersLayer::new(state.config.api.production))
        .with_state(state)
}

/// CORS for the frontend
///
/// `*` is permissive and can't carry cookies; a list of origins allows
/// credentials so the session cookie is sent cross-origin.
fn cors_layer(config: &Config) -> CorsLayer {
    if config.allows_any_origin() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = config
        .api
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .expose_headers([header::CONTENT_DISPOSITION])
        .allow_credentials(true)
        .max_age(std::time::Duration::from_secs(3600))
}

/// Session authentication middleware layer
///
/// Validates the session cookie (or Bearer token), loads the caller and
/// injects `AuthContext` into request extensions.
async fn jwt_auth_layer(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_context = authenticate(
        &state.db,
        state.jwt_secret(),
        &state.config.auth.session_cookie,
        req.headers(),
    )
    .await?;

    tracing::debug!(
        user_id = %auth_context.user_id,
        organization_id = %auth_context.organization_id,
        method = ?auth_context.method,
        "Authenticated request"
    );
    req.extensions_mut().insert(auth_context);

    Ok(next.run(req).await)
}

/// Application state and router builder
///
/// # Example
///
/// ```no_run
/// use taskmate_api::{app::AppState, config::Config};
/// use sqlx::PgPool;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let pool = PgPool::connect(&config.database.url).await?;
/// let state = AppState::new(pool, config);
/// let app = taskmate_api::app::build_router(state);
/// # Ok(())
/// # }
/// ```

use crate::{
    assistant::ChatModel,
    config::Config,
    error::ApiError,
    middleware::{rate_limit::chat_rate_limit_layer, security::SecurityHeadersLayer},
};
use axum::{
    extract::{Request, State},
    http::{header, HeaderName, HeaderValue, Method},
    middleware::{from_fn_with_state, Next},
    response::Response,
    routing::{get, patch, post},
    Router,
};
use sqlx::PgPool;
use std::sync::Arc;
use taskmate_shared::{
    auth::session::validate_session,
    email::{EmailSender, LogEmailSender},
    redis::client::RedisClient,
};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Time zone side channel for completions
pub const TIMEZONE_HEADER: &str = "x-timezone";

/// Shared application state
///
/// Cloned for each request handler via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<Config>,

    /// Present when `REDIS_URL` is set; enables completion rate limiting
    pub redis: Option<RedisClient>,

    pub email: Arc<dyn EmailSender>,

    /// Present when an LLM API key is configured
    pub model: Option<Arc<dyn ChatModel>>,

    /// Outbound client for OAuth code exchange
    pub http: reqwest::Client,
}

impl AppState {
    /// State with a log-only email sender, no Redis and no model
    pub fn new(db: PgPool, config: Config) -> Self {
        Self {
            db,
            config: Arc::new(config),
            redis: None,
            email: Arc::new(LogEmailSender),
            model: None,
            http: reqwest::Client::new(),
        }
    }

    pub fn with_redis(mut self, redis: RedisClient) -> Self {
        self.redis = Some(redis);
        self
    }

    pub fn with_email(mut self, email: Arc<dyn EmailSender>) -> Self {
        self.email = email;
        self
    }

    pub fn with_model(mut self, model: Arc<dyn ChatModel>) -> Self {
        self.model = Some(model);
        self
    }
}

/// Builds the complete Axum router with all routes and middleware
///
/// ```text
/// /health                                  public
/// /v1/auth/...                             public
/// /v1/me, /v1/profile, /v1/account         session
/// /v1/tasks[/:id[/subtasks]]               session
/// /v1/subtasks/:id                         session
/// /v1/chat/history                         session
/// /v1/chat/completions                     session + rate limit
/// ```
pub fn build_router(state: AppState) -> Router {
    use crate::routes;

    let auth_routes = Router::new()
        .route("/register", post(routes::auth::register))
        .route("/login", post(routes::auth::login))
        .route("/logout", post(routes::auth::logout).route_layer(
            from_fn_with_state(state.clone(), session_auth_layer),
        ))
        .route("/magic-link", post(routes::auth::request_magic_link))
        .route("/magic-link/verify", get(routes::auth::verify_magic_link))
        .route("/verify-email", get(routes::auth::verify_email))
        .route("/forgot-password", post(routes::auth::forgot_password))
        .route("/reset-password", post(routes::auth::reset_password))
        .route("/oauth/:provider", get(routes::oauth::authorize))
        .route("/oauth/:provider/callback", get(routes::oauth::callback));

    let chat_routes = Router::new()
        .route("/history", get(routes::chat::history))
        .route(
            "/completions",
            post(routes::chat::completions)
                .layer(from_fn_with_state(state.clone(), chat_rate_limit_layer)),
        );

    let protected_routes = Router::new()
        .route("/me", get(routes::account::me))
        .route("/profile", patch(routes::account::update_profile))
        .route("/account", axum::routing::delete(routes::account::delete_account))
        .route(
            "/tasks",
            get(routes::tasks::list_tasks).post(routes::tasks::create_task),
        )
        .route(
            "/tasks/:id",
            get(routes::tasks::get_task)
                .patch(routes::tasks::update_task)
                .delete(routes::tasks::delete_task),
        )
        .route("/tasks/:id/subtasks", post(routes::tasks::create_subtask))
        .route(
            "/subtasks/:id",
            patch(routes::tasks::update_subtask).delete(routes::tasks::delete_subtask),
        )
        .nest("/chat", chat_routes)
        .route_layer(from_fn_with_state(state.clone(), session_auth_layer));

    let v1_routes = Router::new()
        .nest("/auth", auth_routes)
        .merge(protected_routes);

    let cors = if state.config.api.cors_origins.iter().any(|o| o == "*") {
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = state
            .config
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
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([
                header::AUTHORIZATION,
                header::CONTENT_TYPE,
                HeaderName::from_static(TIMEZONE_HEADER),
            ])
            .allow_credentials(true)
            .max_age(std::time::Duration::from_secs(3600))
    };

    Router::new()
        .route("/health", get(routes::health::health_check))
        .nest("/v1", v1_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors)
        .layer(SecurityHeadersLayer::new(state.config.api.production))
        .with_state(state)
}

/// Extracts the bearer token from an `Authorization` header value
pub fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Session authentication middleware
///
/// Resolves the bearer token to a session and injects `AuthContext` into
/// the request extensions.
async fn session_auth_layer(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("Missing authorization header".to_string()))?;

    let token = bearer_token(token)
        .ok_or_else(|| ApiError::Unauthorized("Expected Bearer token".to_string()))?;

    let auth = validate_session(&state.db, token, state.config.auth.session_ttl()).await?;

    req.extensions_mut().insert(auth);

    Ok(next.run(req).await)
}

/// Authentication endpoints
///
/// Every successful sign-in returns an opaque session token to be sent as
/// `Authorization: Bearer <token>`.
///
/// # Endpoints
///
/// - `POST /v1/auth/register` - Email + password registration
/// - `POST /v1/auth/login` - Email + password login
/// - `POST /v1/auth/logout` - Ends the current session
/// - `POST /v1/auth/magic-link` - Mails a one-time sign-in link
/// - `GET  /v1/auth/magic-link/verify?token=` - Redeems a sign-in link
/// - `GET  /v1/auth/verify-email?token=` - Confirms an email address
/// - `POST /v1/auth/forgot-password` - Mails a password reset link
/// - `POST /v1/auth/reset-password` - Sets a new password from a reset link

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use taskmate_shared::{
    auth::{
        password,
        session::{create_session, invalidate_session, AuthContext},
        token::{generate_email_token, hash_token},
    },
    email::{magic_link_email, password_reset_email, verify_email_email},
    models::{
        account::{Account, AccountType},
        profile::Profile,
        session::Session,
        token::{MagicLink, UserToken, UserTokenKind},
        user::{normalize_email, User},
    },
};
use validator::Validate;

/// Front-end paths that receive emailed tokens
pub const MAGIC_LINK_PATH: &str = "/auth/magic-link";
pub const RESET_PASSWORD_PATH: &str = "/auth/reset-password";
pub const VERIFY_EMAIL_PATH: &str = "/auth/verify-email";

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,

    #[validate(length(max = 100, message = "Name must be at most 100 characters"))]
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct EmailRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResetPasswordRequest {
    #[validate(length(min = 1, message = "Token is required"))]
    pub token: String,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    pub token: String,
}

/// A newly started session
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub token: String,
    pub user_id: i32,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    fn new(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            message: message.into(),
        })
    }
}

/// How a new user signs in
pub(crate) enum Credential<'a> {
    /// Email account; `None` for magic-link users without a password
    Password(Option<String>),
    OAuth(AccountType, &'a str),
}

/// Fields of a new user
pub(crate) struct NewIdentity<'a> {
    pub email: Option<&'a str>,
    pub email_verified: Option<DateTime<Utc>>,
    pub credential: Credential<'a>,
    pub display_name: Option<&'a str>,
    pub image: Option<&'a str>,
}

/// Creates user, account and profile in one transaction
pub(crate) async fn create_identity(
    pool: &PgPool,
    identity: NewIdentity<'_>,
) -> Result<User, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let user = User::create(&mut *tx, identity.email, identity.email_verified).await?;

    match identity.credential {
        Credential::Password(hash) => {
            Account::create_email(&mut *tx, user.id, hash).await?;
        }
        Credential::OAuth(provider, provider_id) => {
            Account::create_oauth(&mut *tx, user.id, provider, provider_id).await?;
        }
    }

    Profile::create(&mut *tx, user.id, identity.display_name, identity.image).await?;

    tx.commit().await?;

    tracing::info!(user_id = user.id, "User created");
    Ok(user)
}

/// Issues a session for `user_id`
pub(crate) async fn start_session(state: &AppState, user_id: i32) -> ApiResult<SessionResponse> {
    let issued = create_session(&state.db, user_id, state.config.auth.session_ttl()).await?;

    Ok(SessionResponse {
        token: issued.token,
        user_id: issued.user_id,
        expires_at: issued.expires_at,
    })
}

fn require_token(token: &str) -> ApiResult<&str> {
    let token = token.trim();
    if token.is_empty() {
        return Err(ApiError::BadRequest("Missing token".to_string()));
    }
    Ok(token)
}

fn invalid_token() -> ApiError {
    ApiError::BadRequest("Invalid or expired token".to_string())
}

/// Mails an email-verification link
///
/// Best effort: a failed send is logged and the user can ask again.
async fn send_verification(state: &AppState, user_id: i32, email: &str) -> ApiResult<()> {
    let (token, hash) = generate_email_token();
    UserToken::issue(
        &state.db,
        UserTokenKind::EmailVerification,
        user_id,
        &hash,
        Utc::now() + state.config.auth.token_ttl(),
    )
    .await?;

    let link = state.config.public_link(VERIFY_EMAIL_PATH, &token);
    if let Err(e) = state.email.send(verify_email_email(email, &link)).await {
        tracing::warn!(error = %e, user_id = user_id, "Verification email not sent");
    }
    Ok(())
}

/// Registers an email + password user and signs them in
///
/// # Errors
///
/// - `422`: Invalid email or weak password
/// - `409`: Email already exists
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<SessionResponse>)> {
    req.validate()?;
    password::validate_password_strength(&req.password)
        .map_err(|e| ApiError::field("password", e))?;

    let email = normalize_email(&req.email);
    let hash = password::hash_password(&req.password)?;
    let display_name = req
        .display_name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty());

    let user = create_identity(
        &state.db,
        NewIdentity {
            email: Some(&email),
            email_verified: None,
            credential: Credential::Password(Some(hash)),
            display_name,
            image: None,
        },
    )
    .await?;

    send_verification(&state, user.id, &email).await?;

    let session = start_session(&state, user.id).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// Email + password login
///
/// # Errors
///
/// - `401`: Unknown email, wrong password, or an account without a password
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<SessionResponse>> {
    req.validate()?;

    let invalid = || ApiError::Unauthorized("Invalid email or password".to_string());

    let user = User::find_by_email(&state.db, &normalize_email(&req.email))
        .await?
        .ok_or_else(invalid)?;

    let hash = Account::find_by_user_id(&state.db, user.id)
        .await?
        .filter(|a| a.account_type == AccountType::Email)
        .and_then(|a| a.password_hash)
        .ok_or_else(invalid)?;

    if !password::verify_password(&req.password, &hash)? {
        tracing::info!(user_id = user.id, "Failed login attempt");
        return Err(invalid());
    }

    tracing::info!(user_id = user.id, "User logged in");
    Ok(Json(start_session(&state, user.id).await?))
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<StatusCode> {
    invalidate_session(&state.db, &auth.session_id).await?;
    tracing::debug!(user_id = auth.user_id, "User logged out");
    Ok(StatusCode::NO_CONTENT)
}

/// Mails a one-time sign-in link; works for new and existing users
pub async fn request_magic_link(
    State(state): State<AppState>,
    Json(req): Json<EmailRequest>,
) -> ApiResult<Json<MessageResponse>> {
    req.validate()?;

    let email = normalize_email(&req.email);
    let (token, hash) = generate_email_token();
    MagicLink::issue(&state.db, &email, &hash, Utc::now() + state.config.auth.token_ttl()).await?;

    let link = state.config.public_link(MAGIC_LINK_PATH, &token);
    state.email.send(magic_link_email(&email, &link)).await?;

    Ok(MessageResponse::new("Check your email for a sign-in link"))
}

/// Redeems a magic link, creating the user on first sign-in
pub async fn verify_magic_link(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
) -> ApiResult<Json<SessionResponse>> {
    let token = require_token(&query.token)?;
    let now = Utc::now();

    let email = MagicLink::redeem(&state.db, &hash_token(token), now)
        .await?
        .ok_or_else(invalid_token)?;

    let user = match User::find_by_email(&state.db, &email).await? {
        Some(user) => {
            if !user.is_verified() {
                User::mark_email_verified(&state.db, user.id).await?;
            }
            user
        }
        None => {
            create_identity(
                &state.db,
                NewIdentity {
                    email: Some(&email),
                    email_verified: Some(now),
                    credential: Credential::Password(None),
                    display_name: None,
                    image: None,
                },
            )
            .await?
        }
    };

    tracing::info!(user_id = user.id, "User signed in with magic link");
    Ok(Json(start_session(&state, user.id).await?))
}

pub async fn verify_email(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
) -> ApiResult<Json<MessageResponse>> {
    let token = require_token(&query.token)?;

    let user_id = UserToken::redeem(
        &state.db,
        UserTokenKind::EmailVerification,
        &hash_token(token),
        Utc::now(),
    )
    .await?
    .ok_or_else(invalid_token)?;

    User::mark_email_verified(&state.db, user_id).await?;
    tracing::info!(user_id = user_id, "Email verified");

    Ok(MessageResponse::new("Email verified"))
}

/// Mails a reset link if an email account exists
///
/// Always answers the same way so the endpoint can't be used to probe for
/// registered addresses.
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(req): Json<EmailRequest>,
) -> ApiResult<Json<MessageResponse>> {
    req.validate()?;

    let reply = MessageResponse::new("If that address has an account, a reset link is on its way");
    let email = normalize_email(&req.email);

    let Some(user) = User::find_by_email(&state.db, &email).await? else {
        return Ok(reply);
    };

    let has_email_account = Account::find_by_user_id(&state.db, user.id)
        .await?
        .is_some_and(|a| a.account_type == AccountType::Email);
    if !has_email_account {
        return Ok(reply);
    }

    let (token, hash) = generate_email_token();
    UserToken::issue(
        &state.db,
        UserTokenKind::PasswordReset,
        user.id,
        &hash,
        Utc::now() + state.config.auth.token_ttl(),
    )
    .await?;

    let link = state.config.public_link(RESET_PASSWORD_PATH, &token);
    if let Err(e) = state.email.send(password_reset_email(&email, &link)).await {
        tracing::error!(error = %e, user_id = user.id, "Password reset email not sent");
    }

    Ok(reply)
}

/// Sets a new password and signs out every session of the user
pub async fn reset_password(
    State(state): State<AppState>,
    Json(req): Json<ResetPasswordRequest>,
) -> ApiResult<Json<MessageResponse>> {
    req.validate()?;
    password::validate_password_strength(&req.password)
        .map_err(|e| ApiError::field("password", e))?;

    let user_id = UserToken::redeem(
        &state.db,
        UserTokenKind::PasswordReset,
        &hash_token(req.token.trim()),
        Utc::now(),
    )
    .await?
    .ok_or_else(invalid_token)?;

    let hash = password::hash_password(&req.password)?;
    if !Account::update_password(&state.db, user_id, &hash).await? {
        return Err(ApiError::BadRequest(
            "This account signs in with an external provider".to_string(),
        ));
    }

    let ended = Session::delete_all_for_user(&state.db, user_id).await?;
    tracing::info!(user_id = user_id, sessions_ended = ended, "Password reset");

    Ok(MessageResponse::new("Password updated, please sign in again"))
}

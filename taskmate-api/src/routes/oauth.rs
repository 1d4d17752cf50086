/// Google and GitHub sign-in
///
/// `GET /v1/auth/oauth/:provider` returns the provider's authorization URL
/// together with a random `state` the client should compare on return.
/// The provider redirects to `/v1/auth/oauth/:provider/callback?code=`,
/// where the code is exchanged for the provider profile and the user is
/// found or created.

use super::auth::{create_identity, start_session, Credential, NewIdentity, SessionResponse};
use crate::{
    app::AppState,
    config::OAuthClient,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use taskmate_shared::{
    auth::token::generate_email_token,
    models::{
        account::{Account, AccountType},
        user::{normalize_email, User},
    },
};

const GOOGLE_AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";

const GITHUB_AUTHORIZE_URL: &str = "https://github.com/login/oauth/authorize";
const GITHUB_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const GITHUB_USER_URL: &str = "https://api.github.com/user";
const GITHUB_EMAILS_URL: &str = "https://api.github.com/user/emails";

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthorizeResponse {
    pub url: String,
    pub state: String,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// What we keep from a provider's user profile
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderProfile {
    pub provider_id: String,
    pub email: Option<String>,
    pub email_verified: bool,
    pub name: Option<String>,
    pub image: Option<String>,
}

fn parse_provider(raw: &str) -> ApiResult<AccountType> {
    match raw.parse::<AccountType>() {
        Ok(provider @ (AccountType::Google | AccountType::Github)) => Ok(provider),
        _ => Err(ApiError::NotFound(format!("Unknown sign-in provider: {}", raw))),
    }
}

fn client_for(state: &AppState, provider: AccountType) -> ApiResult<&OAuthClient> {
    let client = match provider {
        AccountType::Google => state.config.oauth.google.as_ref(),
        AccountType::Github => state.config.oauth.github.as_ref(),
        AccountType::Email => None,
    };

    client.ok_or_else(|| {
        ApiError::ServiceUnavailable(format!("{} sign-in is not configured", provider))
    })
}

/// Callback URL registered with the provider
pub fn redirect_uri(redirect_base: &str, provider: AccountType) -> String {
    format!("{}/v1/auth/oauth/{}/callback", redirect_base, provider)
}

/// Provider authorization URL
pub fn authorization_url(
    provider: AccountType,
    client_id: &str,
    redirect_uri: &str,
    state: &str,
) -> ApiResult<Url> {
    let (base, scope) = match provider {
        AccountType::Github => (GITHUB_AUTHORIZE_URL, "read:user user:email"),
        _ => (GOOGLE_AUTHORIZE_URL, "openid email profile"),
    };

    Url::parse_with_params(
        base,
        &[
            ("client_id", client_id),
            ("redirect_uri", redirect_uri),
            ("response_type", "code"),
            ("scope", scope),
            ("state", state),
        ],
    )
    .map_err(|e| ApiError::InternalError(format!("Invalid OAuth URL: {}", e)))
}

fn non_empty(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Reads a Google OpenID Connect userinfo document
pub fn google_profile(info: &Value) -> Option<ProviderProfile> {
    Some(ProviderProfile {
        provider_id: non_empty(info, "sub")?,
        email: non_empty(info, "email"),
        email_verified: info
            .get("email_verified")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        name: non_empty(info, "name"),
        image: non_empty(info, "picture"),
    })
}

/// Reads a GitHub `/user` document
///
/// GitHub only returns public emails here; the verified flag is set once a
/// primary verified address is known.
pub fn github_profile(user: &Value) -> Option<ProviderProfile> {
    let provider_id = user.get("id").and_then(Value::as_i64)?.to_string();

    Some(ProviderProfile {
        provider_id,
        email: non_empty(user, "email"),
        email_verified: false,
        name: non_empty(user, "name").or_else(|| non_empty(user, "login")),
        image: non_empty(user, "avatar_url"),
    })
}

/// Picks the primary verified address from GitHub `/user/emails`
pub fn github_primary_email(emails: &Value) -> Option<String> {
    emails.as_array()?.iter().find_map(|entry| {
        let primary = entry.get("primary").and_then(Value::as_bool) == Some(true);
        let verified = entry.get("verified").and_then(Value::as_bool) == Some(true);
        (primary && verified).then(|| non_empty(entry, "email")).flatten()
    })
}

fn provider_error(provider: AccountType, e: impl std::fmt::Display) -> ApiError {
    tracing::warn!(provider = %provider, error = %e, "OAuth exchange failed");
    ApiError::Unauthorized(format!("{} sign-in failed", provider))
}

async fn fetch_json(
    http: &reqwest::Client,
    provider: AccountType,
    url: &str,
    access_token: &str,
) -> ApiResult<Value> {
    http.get(url)
        .bearer_auth(access_token)
        .header(reqwest::header::USER_AGENT, "taskmate")
        .header(reqwest::header::ACCEPT, "application/json")
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| provider_error(provider, e))?
        .json::<Value>()
        .await
        .map_err(|e| provider_error(provider, e))
}

async fn exchange_code(
    state: &AppState,
    provider: AccountType,
    client: &OAuthClient,
    code: &str,
) -> ApiResult<ProviderProfile> {
    let redirect = redirect_uri(&state.config.oauth.redirect_base, provider);
    let token_url = match provider {
        AccountType::Github => GITHUB_TOKEN_URL,
        _ => GOOGLE_TOKEN_URL,
    };

    let token: TokenResponse = state
        .http
        .post(token_url)
        .header(reqwest::header::ACCEPT, "application/json")
        .form(&[
            ("client_id", client.client_id.as_str()),
            ("client_secret", client.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", redirect.as_str()),
            ("grant_type", "authorization_code"),
        ])
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| provider_error(provider, e))?
        .json()
        .await
        .map_err(|e| provider_error(provider, e))?;

    match provider {
        AccountType::Github => {
            let user = fetch_json(&state.http, provider, GITHUB_USER_URL, &token.access_token).await?;
            let mut profile = github_profile(&user)
                .ok_or_else(|| provider_error(provider, "profile without id"))?;

            let emails =
                fetch_json(&state.http, provider, GITHUB_EMAILS_URL, &token.access_token).await;
            if let Some(primary) = emails.ok().as_ref().and_then(github_primary_email) {
                profile.email = Some(primary);
                profile.email_verified = true;
            }
            Ok(profile)
        }
        _ => {
            let info =
                fetch_json(&state.http, provider, GOOGLE_USERINFO_URL, &token.access_token).await?;
            google_profile(&info).ok_or_else(|| provider_error(provider, "profile without sub"))
        }
    }
}

pub async fn authorize(
    State(state): State<AppState>,
    Path(provider): Path<String>,
) -> ApiResult<Json<AuthorizeResponse>> {
    let provider = parse_provider(&provider)?;
    let client = client_for(&state, provider)?;

    let (csrf_state, _) = generate_email_token();
    let url = authorization_url(
        provider,
        &client.client_id,
        &redirect_uri(&state.config.oauth.redirect_base, provider),
        &csrf_state,
    )?;

    Ok(Json(AuthorizeResponse {
        url: url.to_string(),
        state: csrf_state,
    }))
}

/// Finds the user linked to the provider account, or creates one
///
/// # Errors
///
/// - `409`: The provider's email already belongs to a different sign-in method
pub async fn callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<CallbackQuery>,
) -> ApiResult<Json<SessionResponse>> {
    let provider = parse_provider(&provider)?;
    let client = client_for(&state, provider)?;

    if let Some(error) = query.error {
        return Err(ApiError::Unauthorized(format!("Sign-in was cancelled: {}", error)));
    }
    let code = query
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Missing authorization code".to_string()))?;

    let profile = exchange_code(&state, provider, client, &code).await?;

    if let Some(account) =
        Account::find_by_provider_id(&state.db, provider, &profile.provider_id).await?
    {
        tracing::info!(user_id = account.user_id, provider = %provider, "User signed in");
        return Ok(Json(start_session(&state, account.user_id).await?));
    }

    let email = profile.email.as_deref().map(normalize_email);
    if let Some(email) = email.as_deref() {
        if User::find_by_email(&state.db, email).await?.is_some() {
            return Err(ApiError::Conflict(
                "An account with this email already exists, sign in with your original method"
                    .to_string(),
            ));
        }
    }

    let user = create_identity(
        &state.db,
        NewIdentity {
            email: email.as_deref(),
            email_verified: profile.email_verified.then(Utc::now),
            credential: Credential::OAuth(provider, &profile.provider_id),
            display_name: profile.name.as_deref(),
            image: profile.image.as_deref(),
        },
    )
    .await?;

    tracing::info!(user_id = user.id, provider = %provider, "User signed up");
    Ok(Json(start_session(&state, user.id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_provider() {
        assert_eq!(parse_provider("google").unwrap(), AccountType::Google);
        assert_eq!(parse_provider("GitHub").unwrap(), AccountType::Github);
        assert!(matches!(parse_provider("email"), Err(ApiError::NotFound(_))));
        assert!(matches!(parse_provider("myspace"), Err(ApiError::NotFound(_))));
    }

    #[test]
    fn test_authorization_url_encodes_params() {
        let redirect = redirect_uri("http://localhost:8080", AccountType::Github);
        assert_eq!(redirect, "http://localhost:8080/v1/auth/oauth/github/callback");

        let url = authorization_url(AccountType::Github, "abc", &redirect, "xyz").unwrap();
        assert_eq!(url.host_str(), Some("github.com"));

        let params: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(params.contains(&("redirect_uri".to_string(), redirect.clone())));
        assert!(params.contains(&("scope".to_string(), "read:user user:email".to_string())));
        assert!(params.contains(&("state".to_string(), "xyz".to_string())));
    }

    #[test]
    fn test_google_profile() {
        let profile = google_profile(&json!({
            "sub": "1089",
            "email": "Ada@Example.com",
            "email_verified": true,
            "name": "Ada",
            "picture": "https://img/ada.png"
        }))
        .unwrap();

        assert_eq!(profile.provider_id, "1089");
        assert!(profile.email_verified);
        assert_eq!(profile.image.as_deref(), Some("https://img/ada.png"));
        assert!(google_profile(&json!({"email": "x@y.z"})).is_none());
    }

    #[test]
    fn test_github_profile_falls_back_to_login() {
        let profile = github_profile(&json!({
            "id": 583231,
            "login": "octocat",
            "name": null,
            "email": null
        }))
        .unwrap();

        assert_eq!(profile.provider_id, "583231");
        assert_eq!(profile.name.as_deref(), Some("octocat"));
        assert!(profile.email.is_none());
        assert!(!profile.email_verified);
    }

    #[test]
    fn test_github_primary_email() {
        let emails = json!([
            {"email": "old@example.com", "primary": false, "verified": true},
            {"email": "me@example.com", "primary": true, "verified": true}
        ]);
        assert_eq!(github_primary_email(&emails).as_deref(), Some("me@example.com"));

        let unverified = json!([{"email": "me@example.com", "primary": true, "verified": false}]);
        assert_eq!(github_primary_email(&unverified), None);
    }
}

/// Current user, profile and account deletion
///
/// - `GET    /v1/me`
/// - `PATCH  /v1/profile`
/// - `DELETE /v1/account` (cascades to every task, session and message)

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{extract::State, http::StatusCode, Extension, Json};
use serde::{Deserialize, Serialize};
use taskmate_shared::{
    auth::session::AuthContext,
    models::{
        account::{Account, AccountType},
        double_option,
        profile::{Profile, UpdateProfile},
        user::User,
    },
};

pub const MAX_DISPLAY_NAME_LENGTH: usize = 100;
pub const MAX_BIO_LENGTH: usize = 500;

#[derive(Debug, Serialize, Deserialize)]
pub struct MeResponse {
    pub user: User,
    pub profile: Option<Profile>,
    pub account_type: Option<AccountType>,
}

/// `null` clears `display_name` / `image`; absent fields are left alone
#[derive(Debug, Default, Deserialize)]
pub struct UpdateProfileRequest {
    #[serde(default, deserialize_with = "double_option")]
    pub display_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub image: Option<Option<String>>,
    pub bio: Option<String>,
}

impl UpdateProfileRequest {
    /// Trims and checks the request
    pub fn into_update(self) -> ApiResult<UpdateProfile> {
        let display_name = self.display_name.map(|name| {
            name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty())
        });
        if let Some(Some(name)) = &display_name {
            if name.chars().count() > MAX_DISPLAY_NAME_LENGTH {
                return Err(ApiError::field(
                    "display_name",
                    format!("Name must be at most {} characters", MAX_DISPLAY_NAME_LENGTH),
                ));
            }
        }

        let bio = self.bio.map(|b| b.trim().to_string());
        if bio.as_ref().is_some_and(|b| b.chars().count() > MAX_BIO_LENGTH) {
            return Err(ApiError::field(
                "bio",
                format!("Bio must be at most {} characters", MAX_BIO_LENGTH),
            ));
        }

        let image = self
            .image
            .map(|image| image.map(|i| i.trim().to_string()).filter(|i| !i.is_empty()));

        Ok(UpdateProfile {
            display_name,
            image,
            bio,
        })
    }
}

pub async fn me(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<MeResponse>> {
    let user = User::find_by_id(&state.db, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("User no longer exists".to_string()))?;

    let profile = Profile::find_by_user_id(&state.db, user.id).await?;
    let account_type = Account::find_by_user_id(&state.db, user.id)
        .await?
        .map(|a| a.account_type);

    Ok(Json(MeResponse {
        user,
        profile,
        account_type,
    }))
}

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<UpdateProfileRequest>,
) -> ApiResult<Json<Profile>> {
    let update = req.into_update()?;

    let profile = Profile::update(&state.db, auth.user_id, update)
        .await?
        .ok_or_else(|| ApiError::NotFound("Profile not found".to_string()))?;

    Ok(Json(profile))
}

pub async fn delete_account(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<StatusCode> {
    if !User::delete(&state.db, auth.user_id).await? {
        return Err(ApiError::NotFound("User not found".to_string()));
    }

    tracing::info!(user_id = auth.user_id, "Account deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> UpdateProfileRequest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_profile_update_distinguishes_null_from_absent() {
        let update = parse(json!({"display_name": null, "bio": "  Hi  "}))
            .into_update()
            .unwrap();

        assert_eq!(update.display_name, Some(None));
        assert_eq!(update.image, None);
        assert_eq!(update.bio.as_deref(), Some("Hi"));
    }

    #[test]
    fn test_blank_display_name_clears_it() {
        let update = parse(json!({"display_name": "   "})).into_update().unwrap();
        assert_eq!(update.display_name, Some(None));
    }

    #[test]
    fn test_profile_update_limits() {
        let long_name = "x".repeat(MAX_DISPLAY_NAME_LENGTH + 1);
        assert!(matches!(
            parse(json!({"display_name": long_name})).into_update(),
            Err(ApiError::ValidationError(_))
        ));

        let long_bio = "x".repeat(MAX_BIO_LENGTH + 1);
        assert!(matches!(
            parse(json!({"bio": long_bio})).into_update(),
            Err(ApiError::ValidationError(_))
        ));
    }
}

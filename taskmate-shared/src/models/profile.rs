/// Profile model
///
/// One profile per user, created alongside the account. OAuth sign-ups seed
/// `display_name` and `image` from the provider.

use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgExecutor, PgPool};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Profile {
    pub id: i32,
    pub user_id: i32,
    pub display_name: Option<String>,
    pub image: Option<String>,
    pub bio: String,
}

/// Input for a profile update; `None` leaves a field unchanged
#[derive(Debug, Clone, Default)]
pub struct UpdateProfile {
    pub display_name: Option<Option<String>>,
    pub image: Option<Option<String>>,
    pub bio: Option<String>,
}

impl UpdateProfile {
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none() && self.image.is_none() && self.bio.is_none()
    }
}

impl Profile {
    pub async fn create<'e, E>(
        executor: E,
        user_id: i32,
        display_name: Option<&str>,
        image: Option<&str>,
    ) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Profile>(
            r#"
            INSERT INTO profiles (user_id, display_name, image)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, display_name, image, bio
            "#,
        )
        .bind(user_id)
        .bind(display_name)
        .bind(image)
        .fetch_one(executor)
        .await
    }

    pub async fn find_by_user_id(pool: &PgPool, user_id: i32) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Profile>(
            "SELECT id, user_id, display_name, image, bio FROM profiles WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    /// Applies a partial update, returning the updated profile
    pub async fn update(
        pool: &PgPool,
        user_id: i32,
        data: UpdateProfile,
    ) -> Result<Option<Self>, sqlx::Error> {
        if data.is_empty() {
            return Self::find_by_user_id(pool, user_id).await;
        }

        let mut sets: Vec<String> = Vec::new();
        let mut bind_count = 1;

        if data.display_name.is_some() {
            bind_count += 1;
            sets.push(format!("display_name = ${}", bind_count));
        }
        if data.image.is_some() {
            bind_count += 1;
            sets.push(format!("image = ${}", bind_count));
        }
        if data.bio.is_some() {
            bind_count += 1;
            sets.push(format!("bio = ${}", bind_count));
        }

        let query = format!(
            "UPDATE profiles SET {} WHERE user_id = $1 \
             RETURNING id, user_id, display_name, image, bio",
            sets.join(", ")
        );

        let mut q = sqlx::query_as::<_, Profile>(&query).bind(user_id);

        if let Some(display_name) = data.display_name {
            q = q.bind(display_name);
        }
        if let Some(image) = data.image {
            q = q.bind(image);
        }
        if let Some(bio) = data.bio {
            q = q.bind(bio);
        }

        q.fetch_optional(pool).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_profile_is_empty() {
        assert!(UpdateProfile::default().is_empty());
        assert!(!UpdateProfile {
            bio: Some("hi".to_string()),
            ..Default::default()
        }
        .is_empty());
        assert!(!UpdateProfile {
            image: Some(None),
            ..Default::default()
        }
        .is_empty());
    }
}

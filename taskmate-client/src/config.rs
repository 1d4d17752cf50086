/// Client configuration
///
/// - `TASKMATE_API_URL`: API base URL (default: http://localhost:8080)
/// - `TASKMATE_TOKEN`: Session token from `/v1/auth/login` (required)
/// - `TZ_NAME`: IANA time zone sent with each chat turn (default: UTC)

use std::env;

pub const DEFAULT_API_URL: &str = "http://localhost:8080";
pub const DEFAULT_TIME_ZONE: &str = "UTC";

#[derive(Clone)]
pub struct ClientConfig {
    pub api_url: String,
    pub token: String,
    pub time_zone: String,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_url", &self.api_url)
            .field("token", &"[redacted]")
            .field("time_zone", &self.time_zone)
            .finish()
    }
}

impl ClientConfig {
    /// Loads configuration from the environment, reading `.env` first
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let token = var("TASKMATE_TOKEN")
            .ok_or_else(|| anyhow::anyhow!("TASKMATE_TOKEN environment variable is required"))?;

        Ok(Self {
            api_url: var("TASKMATE_API_URL")
                .unwrap_or_else(|| DEFAULT_API_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            token,
            time_zone: var("TZ_NAME").unwrap_or_else(|| DEFAULT_TIME_ZONE.to_string()),
        })
    }
}

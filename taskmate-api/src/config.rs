/// Configuration management for the API server
///
/// Configuration comes from environment variables (optionally loaded from a
/// `.env` file) and is parsed once at startup into typed sections.
///
/// # Environment Variables
///
/// - `API_HOST` / `API_PORT`: Bind address (default: 0.0.0.0:8080)
/// - `CORS_ORIGINS`: Comma-separated origins, `*` for permissive (default: *)
/// - `PRODUCTION`: Enables HSTS (default: false)
/// - `PUBLIC_BASE_URL`: Front-end origin used in emailed links
/// - `DATABASE_URL`: PostgreSQL connection string (required)
/// - `DATABASE_MAX_CONNECTIONS`: Pool size (default: 10)
/// - `REDIS_URL`: Enables completion rate limiting when set
/// - `CHAT_RATE_LIMIT_PER_MINUTE`: Completion requests per user per minute (default: 20)
/// - `SESSION_TTL_DAYS` (default: 30), `TOKEN_TTL_MINUTES` (default: 15)
/// - `LLM_API_URL`, `LLM_API_KEY`, `LLM_MODEL`, `LLM_MAX_STEPS`
/// - `EMAIL_API_URL`, `EMAIL_API_KEY`, `EMAIL_FROM`
/// - `GOOGLE_CLIENT_ID` / `GOOGLE_CLIENT_SECRET`,
///   `GITHUB_CLIENT_ID` / `GITHUB_CLIENT_SECRET`, `OAUTH_REDIRECT_BASE`
///
/// # Example
///
/// ```no_run
/// use taskmate_api::config::Config;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.bind_address());
/// # Ok(())
/// # }
/// ```

use anyhow::Context;
use chrono::Duration;
use std::env;
use std::str::FromStr;

/// Complete application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub api: ApiConfig,
    pub database: DatabaseConfig,
    pub redis: RedisSettings,
    pub auth: AuthConfig,
    pub llm: LlmConfig,
    pub email: EmailConfig,
    pub oauth: OAuthConfig,
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub production: bool,
    /// Origin of the web front end, without trailing slash
    pub public_base_url: String,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct RedisSettings {
    pub url: Option<String>,
    pub chat_requests_per_minute: u32,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub session_ttl_days: i64,
    pub token_ttl_minutes: i64,
}

impl AuthConfig {
    pub fn session_ttl(&self) -> Duration {
        Duration::days(self.session_ttl_days)
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::minutes(self.token_ttl_minutes)
    }
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible API, e.g. `https://api.openai.com/v1`
    pub api_url: String,
    pub api_key: Option<String>,
    pub model: String,
    /// Model rounds per completion request
    pub max_steps: usize,
}

#[derive(Debug, Clone)]
pub struct EmailConfig {
    /// Unset means emails are only logged
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub from: String,
}

#[derive(Debug, Clone)]
pub struct OAuthClient {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub google: Option<OAuthClient>,
    pub github: Option<OAuthClient>,
    /// Base for provider callback URLs (`{base}/v1/auth/oauth/{provider}/callback`)
    pub redirect_base: String,
}

fn var_or<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse::<T>()
            .with_context(|| format!("{} has an invalid value: {}", name, value)),
        _ => Ok(default),
    }
}

fn optional_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn oauth_client(prefix: &str) -> Option<OAuthClient> {
    Some(OAuthClient {
        client_id: optional_var(&format!("{}_CLIENT_ID", prefix))?,
        client_secret: optional_var(&format!("{}_CLIENT_SECRET", prefix))?,
    })
}

/// Splits a comma-separated origin list
pub fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().trim_end_matches('/').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl Config {
    /// Loads configuration from environment variables
    ///
    /// # Errors
    ///
    /// Fails if `DATABASE_URL` is missing or a numeric variable doesn't parse.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?;

        let max_steps: usize = var_or("LLM_MAX_STEPS", 5)?;
        if max_steps == 0 {
            anyhow::bail!("LLM_MAX_STEPS must be at least 1");
        }

        let public_base_url = env::var("PUBLIC_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:3000".to_string())
            .trim_end_matches('/')
            .to_string();

        let port: u16 = var_or("API_PORT", 8080)?;

        Ok(Self {
            api: ApiConfig {
                host: env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port,
                cors_origins: parse_origins(
                    &env::var("CORS_ORIGINS").unwrap_or_else(|_| "*".to_string()),
                ),
                production: var_or("PRODUCTION", false)?,
                public_base_url,
            },
            database: DatabaseConfig {
                url: database_url,
                max_connections: var_or("DATABASE_MAX_CONNECTIONS", 10)?,
            },
            redis: RedisSettings {
                url: optional_var("REDIS_URL"),
                chat_requests_per_minute: var_or("CHAT_RATE_LIMIT_PER_MINUTE", 20)?,
            },
            auth: AuthConfig {
                session_ttl_days: var_or("SESSION_TTL_DAYS", 30)?,
                token_ttl_minutes: var_or("TOKEN_TTL_MINUTES", 15)?,
            },
            llm: LlmConfig {
                api_url: env::var("LLM_API_URL")
                    .unwrap_or_else(|_| "https://api.openai.com/v1".to_string())
                    .trim_end_matches('/')
                    .to_string(),
                api_key: optional_var("LLM_API_KEY"),
                model: env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
                max_steps,
            },
            email: EmailConfig {
                api_url: optional_var("EMAIL_API_URL"),
                api_key: optional_var("EMAIL_API_KEY"),
                from: env::var("EMAIL_FROM")
                    .unwrap_or_else(|_| "Taskmate <noreply@localhost>".to_string()),
            },
            oauth: OAuthConfig {
                google: oauth_client("GOOGLE"),
                github: oauth_client("GITHUB"),
                redirect_base: env::var("OAUTH_REDIRECT_BASE")
                    .unwrap_or_else(|_| format!("http://localhost:{}", port))
                    .trim_end_matches('/')
                    .to_string(),
            },
        })
    }

    /// A configuration with defaults, for tests and tooling
    pub fn for_database(url: impl Into<String>) -> Self {
        Self {
            api: ApiConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                cors_origins: vec!["*".to_string()],
                production: false,
                public_base_url: "http://localhost:3000".to_string(),
            },
            database: DatabaseConfig {
                url: url.into(),
                max_connections: 5,
            },
            redis: RedisSettings {
                url: None,
                chat_requests_per_minute: 20,
            },
            auth: AuthConfig {
                session_ttl_days: 30,
                token_ttl_minutes: 15,
            },
            llm: LlmConfig {
                api_url: "https://api.openai.com/v1".to_string(),
                api_key: None,
                model: "gpt-4o-mini".to_string(),
                max_steps: 5,
            },
            email: EmailConfig {
                api_url: None,
                api_key: None,
                from: "Taskmate <noreply@localhost>".to_string(),
            },
            oauth: OAuthConfig {
                google: None,
                github: None,
                redirect_base: "http://localhost:8080".to_string(),
            },
        }
    }

    /// Returns the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }

    /// Absolute front-end link for an emailed token
    pub fn public_link(&self, path: &str, token: &str) -> String {
        format!("{}{}?token={}", self.api.public_base_url, path, token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_address() {
        let config = Config::for_database("postgresql://localhost/test");
        assert_eq!(config.bind_address(), "127.0.0.1:8080");
    }

    #[test]
    fn test_parse_origins() {
        assert_eq!(
            parse_origins("https://a.app/, https://b.app ,,"),
            vec!["https://a.app".to_string(), "https://b.app".to_string()]
        );
        assert_eq!(parse_origins("*"), vec!["*".to_string()]);
    }

    #[test]
    fn test_public_link() {
        let config = Config::for_database("postgresql://localhost/test");
        assert_eq!(
            config.public_link("/auth/reset-password", "abc"),
            "http://localhost:3000/auth/reset-password?token=abc"
        );
    }

    #[test]
    fn test_ttls() {
        let config = Config::for_database("postgresql://localhost/test");
        assert_eq!(config.auth.session_ttl(), Duration::days(30));
        assert_eq!(config.auth.token_ttl(), Duration::minutes(15));
    }
}

/// Per-user rate limiting for chat completions
///
/// Each completion request drives a paid model call, so requests are
/// throttled per user with a token bucket kept in Redis. The bucket holds
/// `CHAT_RATE_LIMIT_PER_MINUTE` tokens and refills continuously over one
/// minute. Without Redis the limiter is disabled.
///
/// # Storage
///
/// Key: `ratelimit:chat:{user_id}`, a hash of `tokens` and `last_refill`
/// (milliseconds), expiring after two idle windows.
///
/// # Headers
///
/// - `X-RateLimit-Limit`: Bucket capacity
/// - `X-RateLimit-Remaining`: Tokens left after this request
/// - `Retry-After`: Seconds to wait (429 responses only)
///
/// Redis failures are logged and the request is let through.

use crate::app::AppState;
use crate::error::ApiError;
use axum::{
    extract::{Extension, Request, State},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use std::sync::OnceLock;
use taskmate_shared::auth::session::AuthContext;

const WINDOW_MS: i64 = 60_000;

const TOKEN_BUCKET_LUA: &str = r#"
local key = KEYS[1]
local capacity = tonumber(ARGV[1])
local window_ms = tonumber(ARGV[2])
local now = tonumber(ARGV[3])
local refill_per_ms = capacity / window_ms

local bucket = redis.call('HMGET', key, 'tokens', 'last_refill')
local tokens = tonumber(bucket[1])
local last_refill = tonumber(bucket[2])

if not tokens then
    tokens = capacity
    last_refill = now
end

local elapsed = math.max(0, now - last_refill)
tokens = math.min(capacity, tokens + elapsed * refill_per_ms)

local allowed = 0
if tokens >= 1 then
    tokens = tokens - 1
    allowed = 1
end

redis.call('HSET', key, 'tokens', tostring(tokens), 'last_refill', now)
redis.call('PEXPIRE', key, window_ms * 2)

local retry_after = 0
if allowed == 0 then
    retry_after = math.ceil((1 - tokens) / refill_per_ms / 1000)
end

return {allowed, math.floor(tokens), retry_after}
"#;

fn token_bucket_script() -> &'static redis::Script {
    static SCRIPT: OnceLock<redis::Script> = OnceLock::new();
    SCRIPT.get_or_init(|| redis::Script::new(TOKEN_BUCKET_LUA))
}

/// Outcome of a bucket check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub retry_after: u64,
}

impl RateLimitDecision {
    /// Interprets the `{allowed, remaining, retry_after}` script reply
    pub fn from_reply(reply: &[i64]) -> Option<Self> {
        match reply {
            [allowed, remaining, retry_after] => Some(Self {
                allowed: *allowed == 1,
                remaining: (*remaining).max(0) as u32,
                retry_after: (*retry_after).max(1) as u64,
            }),
            _ => None,
        }
    }
}

/// Throttles completion requests per authenticated user
///
/// Must run after the session layer so `AuthContext` is present.
pub async fn chat_rate_limit_layer(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(redis) = state.redis.as_ref() else {
        return Ok(next.run(request).await);
    };

    let capacity = state.config.redis.chat_requests_per_minute.max(1);
    let key = format!("ratelimit:chat:{}", auth.user_id);
    let now_ms = chrono::Utc::now().timestamp_millis();

    let reply: Result<Vec<i64>, _> = redis
        .eval_script(
            token_bucket_script(),
            &[key.as_str()],
            &[i64::from(capacity), WINDOW_MS, now_ms],
        )
        .await;

    let decision = match reply.map(|r| RateLimitDecision::from_reply(&r)) {
        Ok(Some(decision)) => decision,
        Ok(None) => {
            tracing::warn!(user_id = auth.user_id, "Unexpected rate limit reply, allowing request");
            return Ok(next.run(request).await);
        }
        Err(e) => {
            tracing::warn!(error = %e, user_id = auth.user_id, "Rate limit check failed, allowing request");
            return Ok(next.run(request).await);
        }
    };

    if !decision.allowed {
        tracing::info!(user_id = auth.user_id, retry_after = decision.retry_after, "Chat rate limit exceeded");
        return Err(ApiError::RateLimitExceeded {
            retry_after: decision.retry_after,
            message: format!(
                "Too many chat requests. Try again in {} seconds",
                decision.retry_after
            ),
        });
    }

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert("X-RateLimit-Limit", HeaderValue::from(capacity));
    headers.insert("X-RateLimit-Remaining", HeaderValue::from(decision.remaining));

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_from_reply() {
        assert_eq!(
            RateLimitDecision::from_reply(&[1, 19, 0]),
            Some(RateLimitDecision {
                allowed: true,
                remaining: 19,
                retry_after: 1
            })
        );

        let denied = RateLimitDecision::from_reply(&[0, 0, 3]).unwrap();
        assert!(!denied.allowed);
        assert_eq!(denied.retry_after, 3);

        assert_eq!(RateLimitDecision::from_reply(&[1, 2]), None);
    }

    #[test]
    fn test_script_is_reused() {
        let a = token_bucket_script() as *const redis::Script;
        let b = token_bucket_script() as *const redis::Script;
        assert_eq!(a, b);
    }
}

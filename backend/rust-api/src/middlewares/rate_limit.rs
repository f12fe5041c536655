use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use redis::aio::ConnectionManager;
use std::net::SocketAddr;
use std::sync::Arc;

use super::auth::JwtClaims;
use crate::metrics::track_cache_operation;
use crate::services::AppState;

/// One fixed-window limit. `env_override` names the variable that can replace `limit`.
#[derive(Debug, Clone, Copy)]
struct Rule {
    scope: &'static str,
    limit: u32,
    window_seconds: u64,
    env_override: &'static str,
}

impl Rule {
    fn effective_limit(&self) -> u32 {
        std::env::var(self.env_override)
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(self.limit)
    }
}

const PER_USER: Rule = Rule {
    scope: "user",
    limit: 100,
    window_seconds: 60,
    env_override: "RATE_LIMIT_PER_USER",
};
const PER_IP: Rule = Rule {
    scope: "ip",
    limit: 200,
    window_seconds: 60,
    env_override: "RATE_LIMIT_PER_IP",
};
// 10 attempts per 5 minutes
const LOGIN: Rule = Rule {
    scope: "login",
    limit: 10,
    window_seconds: 300,
    env_override: "RATE_LIMIT_LOGIN_ATTEMPTS",
};
// 5 registrations per hour
const REGISTER: Rule = Rule {
    scope: "register",
    limit: 5,
    window_seconds: 3600,
    env_override: "RATE_LIMIT_REGISTER_ATTEMPTS",
};

const WINDOW_SCRIPT: &str = r#"
    local key = KEYS[1]
    local limit = tonumber(ARGV[1])
    local window = tonumber(ARGV[2])

    local current = redis.call('GET', key)

    if current == false then
        redis.call('SET', key, 1, 'EX', window)
        return 1
    end

    current = tonumber(current)

    if current >= limit then
        return 0
    end

    redis.call('INCR', key)
    return 1
"#;

fn rate_limit_disabled() -> bool {
    std::env::var("RATE_LIMIT_DISABLED").unwrap_or_default() == "1"
}

pub(crate) fn extract_client_ip_from(
    headers: &HeaderMap,
    extensions: &axum::http::Extensions,
) -> String {
    // Preferred order: X-Forwarded-For, Forwarded, X-Real-IP, ConnectInfo
    if let Some(v) = headers.get("x-forwarded-for") {
        if let Ok(s) = v.to_str() {
            // comma separated list, the client comes first
            return s.split(',').next().unwrap_or(s).trim().to_string();
        }
    }

    if let Some(v) = headers.get("forwarded") {
        if let Ok(s) = v.to_str() {
            for part in s.split(';') {
                if let Some(val) = part.trim().strip_prefix("for=") {
                    return val.trim().trim_matches('"').to_string();
                }
            }
        }
    }

    if let Some(v) = headers.get("x-real-ip") {
        if let Ok(s) = v.to_str() {
            return s.trim().to_string();
        }
    }

    if let Some(ci) = extensions.get::<ConnectInfo<SocketAddr>>() {
        return ci.0.ip().to_string();
    }

    "unknown".to_string()
}

/// Increments the window counter for `subject`; false once the limit is reached.
async fn check(redis: &ConnectionManager, rule: Rule, subject: &str) -> Result<bool, StatusCode> {
    let key = format!("ratelimit:{}:{}", rule.scope, subject);
    let limit = rule.effective_limit();
    let mut conn = redis.clone();

    let allowed: u32 = track_cache_operation("rate_limit", async {
        redis::Script::new(WINDOW_SCRIPT)
            .key(&key)
            .arg(limit)
            .arg(rule.window_seconds)
            .invoke_async(&mut conn)
            .await
            .map_err(anyhow::Error::from)
    })
    .await
    .map_err(|e| {
        tracing::error!("Rate limit check failed for {}: {}", key, e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    if allowed != 1 {
        tracing::warn!("Rate limit exceeded ({}): {}", rule.scope, subject);
    }
    Ok(allowed == 1)
}

/// Per-user (when authenticated) and per-IP limits for the API.
pub async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if rate_limit_disabled() {
        tracing::debug!("Rate limiting disabled via RATE_LIMIT_DISABLED=1");
        return Ok(next.run(request).await);
    }

    let client_ip = extract_client_ip_from(request.headers(), request.extensions());
    let user_id = request
        .extensions()
        .get::<JwtClaims>()
        .map(|claims| claims.sub.clone());

    if let Some(uid) = &user_id {
        if !check(&state.redis, PER_USER, uid).await? {
            return Err(StatusCode::TOO_MANY_REQUESTS);
        }
    }

    if !check(&state.redis, PER_IP, &client_ip).await? {
        return Err(StatusCode::TOO_MANY_REQUESTS);
    }

    Ok(next.run(request).await)
}

async fn ip_rule_middleware(
    state: &AppState,
    rule: Rule,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if !rate_limit_disabled() {
        let client_ip = extract_client_ip_from(request.headers(), request.extensions());
        if !check(&state.redis, rule, &client_ip).await? {
            return Err(StatusCode::TOO_MANY_REQUESTS);
        }
    }
    Ok(next.run(request).await)
}

pub async fn login_rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    ip_rule_middleware(&state, LOGIN, request, next).await
}

pub async fn register_rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    ip_rule_middleware(&state, REGISTER, request, next).await
}

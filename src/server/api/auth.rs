//! Bearer-token auth. Device and UI tokens are disjoint spaces; the SSE
//! stream additionally accepts a `?token=` query parameter since
//! `EventSource` cannot set headers.

use axum::http::{header::AUTHORIZATION, HeaderMap};

use super::errors::ApiError;
use crate::server::config::ServerConfig;

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    scheme
        .eq_ignore_ascii_case("bearer")
        .then(|| token.trim())
        .filter(|token| !token.is_empty())
}

pub fn require_device_auth(config: &ServerConfig, headers: &HeaderMap) -> Result<(), ApiError> {
    let token = bearer_token(headers);
    if !config.device_tokens.is_empty() {
        return match token {
            Some(token) if config.device_tokens.iter().any(|t| t == token) => Ok(()),
            _ => Err(ApiError::Unauthorized("Invalid device token".into())),
        };
    }
    if config.allow_unauth {
        return Ok(());
    }
    Err(ApiError::Unauthorized(
        "Device auth required; set INVENTORY_DEVICE_TOKENS or INVENTORY_ALLOW_UNAUTH=true".into(),
    ))
}

pub fn require_ui_auth(
    config: &ServerConfig,
    headers: &HeaderMap,
    query_token: Option<&str>,
) -> Result<(), ApiError> {
    let token = bearer_token(headers).or(query_token);
    if let Some(expected) = &config.ui_token {
        return match token {
            Some(token) if token == expected => Ok(()),
            _ => Err(ApiError::Unauthorized("Invalid UI token".into())),
        };
    }
    if config.allow_unauth {
        return Ok(());
    }
    Err(ApiError::Unauthorized(
        "UI auth required; set INVENTORY_UI_TOKEN or INVENTORY_ALLOW_UNAUTH=true".into(),
    ))
}

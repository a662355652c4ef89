//! Dashboard credential gate
//!
//! Read endpoints take a `DashboardAccess` extractor. The shared secret is
//! accepted as `Authorization: Bearer <secret>` or as a `password` query
//! parameter. Rejections carry one fixed message whatever the cause.

use axum::{
    async_trait,
    extract::{FromRequestParts, Query},
    http::{header, request::Parts},
};
use serde::Deserialize;
use std::sync::Arc;

use crate::api::error::ApiError;
use crate::api::state::AppState;

/// Proof that the request carried the dashboard secret
#[derive(Debug, Clone, Copy)]
pub struct DashboardAccess;

#[derive(Debug, Deserialize)]
struct PasswordParam {
    password: Option<String>,
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for DashboardAccess {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.config.dashboard_secret.as_deref() else {
            tracing::warn!("No dashboard secret configured, rejecting read request");
            return Err(ApiError::Unauthorized);
        };

        let presented = bearer_token(parts).or_else(|| query_password(parts));
        match presented {
            Some(given) if secrets_match(given.as_bytes(), expected.as_bytes()) => {
                Ok(DashboardAccess)
            }
            _ => Err(ApiError::Unauthorized),
        }
    }
}

fn bearer_token(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(|token| token.trim().to_string())
}

fn query_password(parts: &Parts) -> Option<String> {
    Query::<PasswordParam>::try_from_uri(&parts.uri)
        .ok()?
        .0
        .password
}

/// Compare without short-circuiting on the first differing byte
fn secrets_match(given: &[u8], expected: &[u8]) -> bool {
    if given.len() != expected.len() {
        return false;
    }
    given
        .iter()
        .zip(expected)
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

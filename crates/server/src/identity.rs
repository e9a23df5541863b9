//! Bearer-token identity: resolves the current profile for a request.

use std::sync::Arc;

use anyhow::Context;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap, StatusCode},
    Json,
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use shared::{
    domain::{Profile, ProfileId},
    error::ApiError,
};
use tracing::debug;

use crate::{app_state::AppState, routes::error_response};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Claims {
    pub(crate) sub: ProfileId,
    pub(crate) exp: u64,
}

pub(crate) fn issue_token(
    secret: &str,
    profile_id: &ProfileId,
    ttl_seconds: i64,
) -> anyhow::Result<String> {
    anyhow::ensure!(ttl_seconds > 0, "token ttl must be positive, got {ttl_seconds}");
    let expires_at = chrono::Duration::try_seconds(ttl_seconds)
        .and_then(|ttl| chrono::Utc::now().checked_add_signed(ttl))
        .ok_or_else(|| anyhow::anyhow!("token ttl of {ttl_seconds}s is out of range"))?;
    let claims = Claims {
        sub: profile_id.clone(),
        exp: u64::try_from(expires_at.timestamp()).context("token expiry precedes the epoch")?,
    };
    Ok(encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?)
}

/// Profile id carried by a valid `Authorization: Bearer` token, if any.
pub(crate) fn profile_id_from_headers(headers: &HeaderMap, secret: &str) -> Option<ProfileId> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))?;

    match decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    ) {
        Ok(data) => Some(data.claims.sub),
        Err(err) => {
            debug!(%err, "rejecting bearer token");
            None
        }
    }
}

/// The requesting profile, or `None` when the request is anonymous. Handlers
/// decide what anonymity means for them.
pub(crate) struct CurrentProfile(pub(crate) Option<Profile>);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for CurrentProfile {
    type Rejection = (StatusCode, Json<ApiError>);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let Some(profile_id) = profile_id_from_headers(&parts.headers, &state.jwt_secret) else {
            return Ok(Self(None));
        };

        let profile = state
            .api
            .storage
            .profile(&profile_id)
            .await
            .map_err(|e| error_response(ApiError::internal(e)))?;
        Ok(Self(profile))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn issued_token_round_trips_through_headers() {
        let profile_id = ProfileId::from("p1");
        let token = issue_token("secret", &profile_id, 60).expect("token");

        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).expect("header"),
        );
        assert_eq!(profile_id_from_headers(&headers, "secret"), Some(profile_id));
        assert_eq!(profile_id_from_headers(&headers, "other-secret"), None);
    }

    #[test]
    fn token_ttl_must_be_positive_and_in_range() {
        let profile_id = ProfileId::from("p1");
        assert!(issue_token("secret", &profile_id, 0).is_err());
        assert!(issue_token("secret", &profile_id, -60).is_err());
        assert!(issue_token("secret", &profile_id, i64::MAX).is_err());
    }

    #[test]
    fn missing_or_malformed_header_is_anonymous() {
        let mut headers = HeaderMap::new();
        assert_eq!(profile_id_from_headers(&headers, "secret"), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Token abc"));
        assert_eq!(profile_id_from_headers(&headers, "secret"), None);
    }
}

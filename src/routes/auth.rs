//! Bearer-token users and the compute worker's shared-secret header.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app_state::AppState;
use crate::error::JobError;

pub const WORKER_TOKEN_HEADER: &str = "x-worker-token";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: Uuid,
    pub exp: i64,
    pub iat: i64,
}

/// Secrets used to authenticate callers.
#[derive(Clone)]
pub struct AuthConfig {
    jwt_secret: String,
    worker_token: String,
}

impl AuthConfig {
    pub fn new(jwt_secret: impl Into<String>, worker_token: impl Into<String>) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            worker_token: worker_token.into(),
        }
    }

    /// Sign an HS256 token for `user_id` valid for `ttl`.
    pub fn issue_token(
        &self,
        user_id: Uuid,
        ttl: chrono::Duration,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let now = chrono::Utc::now();
        let claims = Claims {
            sub: user_id,
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
    }

    pub fn validate_token(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(data.claims)
    }

    pub fn is_worker_token(&self, presented: &str) -> bool {
        !self.worker_token.is_empty() && presented == self.worker_token
    }
}

/// The authenticated end user.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub user_id: Uuid,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = JobError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or(JobError::Unauthenticated)?;

        let claims = state.auth.validate_token(token).map_err(|e| {
            tracing::debug!(error = %e, "Rejected bearer token");
            JobError::Unauthenticated
        })?;

        Ok(AuthUser {
            user_id: claims.sub,
        })
    }
}

/// Marker for requests made by the compute worker.
#[derive(Debug, Clone, Copy)]
pub struct WorkerAuth;

impl FromRequestParts<AppState> for WorkerAuth {
    type Rejection = JobError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let presented = parts
            .headers
            .get(WORKER_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(JobError::Unauthenticated)?;

        if state.auth.is_worker_token(presented) {
            Ok(WorkerAuth)
        } else {
            tracing::warn!("Compute worker callback with wrong token");
            Err(JobError::NotAuthorized)
        }
    }
}

/*!
 * # Actor identity and authorization
 *
 * Tokens are issued by the external authentication module; this crate only
 * verifies them (HS256, shared secret) and turns the claims into an [`Actor`].
 * What an actor may do is decided by [`policy::authorize`].
 */

use crate::errors::ServiceError;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

pub mod policy;

pub use crate::entities::user::Role;
pub use policy::{authorize, Decision, Operation};

/// Claim structure for JWT tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,                // User ID
    pub role: Role,               // Actor role
    pub branch_id: Option<Uuid>,  // Home branch, absent for central staff
    pub exp: i64,                 // Expiration time
    pub iss: String,              // Issuer
}

/// The authenticated caller of a core operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: Uuid,
    pub role: Role,
    pub branch_id: Option<Uuid>,
}

impl Actor {
    pub fn new(id: Uuid, role: Role, branch_id: Option<Uuid>) -> Self {
        Self {
            id,
            role,
            branch_id,
        }
    }

    /// Branch filter to apply on list queries: branch admins always see only
    /// their own branch, everyone else sees what they asked for.
    pub fn scope_branch(&self, requested: Option<Uuid>) -> Option<Uuid> {
        match self.role {
            Role::CentralAdmin => requested,
            Role::BranchAdmin | Role::Courier => self.branch_id,
        }
    }
}

impl From<Claims> for Actor {
    fn from(claims: Claims) -> Self {
        Actor::new(claims.sub, claims.role, claims.branch_id)
    }
}

/// Verifies bearer tokens against the shared secret and expected issuer.
#[derive(Clone)]
pub struct TokenVerifier {
    secret: String,
    issuer: String,
}

impl TokenVerifier {
    pub fn new(secret: impl Into<String>, issuer: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            issuer: issuer.into(),
        }
    }

    pub fn verify(&self, token: &str) -> Result<Claims, ServiceError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.issuer.as_str()]);

        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|e| {
            debug!(error = %e, "bearer token rejected");
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    ServiceError::Unauthorized("token expired".to_string())
                }
                _ => ServiceError::Unauthorized("invalid token".to_string()),
            }
        })
    }

    /// Signs a token for the given actor. Used by operational tooling and tests;
    /// production tokens come from the authentication module.
    pub fn issue(&self, actor: &Actor, ttl: Duration) -> Result<String, ServiceError> {
        let claims = Claims {
            sub: actor.id,
            role: actor.role,
            branch_id: actor.branch_id,
            exp: (Utc::now() + ttl).timestamp(),
            iss: self.issuer.clone(),
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| ServiceError::InternalError(format!("failed to sign token: {}", e)))
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for Actor
where
    Arc<TokenVerifier>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let verifier = Arc::<TokenVerifier>::from_ref(state);

        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ServiceError::Unauthorized("missing bearer token".to_string()))?;

        verifier.verify(token).map(Actor::from)
    }
}

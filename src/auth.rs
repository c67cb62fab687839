use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

/// Lifetime of every issued token. There is no refresh; expiry is the only invalidation.
pub const TOKEN_TTL: Duration = Duration::hours(1);

/// Claims
///
/// The payload signed into every bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (sub): the id of the authenticated user.
    pub sub: Uuid,
    /// The user's normalized email at the time the token was issued.
    pub email: String,
    /// Issued At (iat), seconds since the epoch.
    pub iat: u64,
    /// Expiration Time (exp), seconds since the epoch.
    pub exp: u64,
}

/// TokenError
///
/// Distinguishes why a token was refused. Only used for logging: callers see a
/// single `AppError::Unauthorized` whatever the variant.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,
    #[error("token signature does not match")]
    BadSignature,
    #[error("token has expired")]
    Expired,
    #[error("token could not be signed: {0}")]
    Signing(String),
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(error: jsonwebtoken::errors::Error) -> Self {
        match error.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::InvalidSignature => TokenError::BadSignature,
            _ => TokenError::Malformed,
        }
    }
}

/// TokenService
///
/// Issues and verifies HS256 bearer tokens with the single process-wide secret.
#[derive(Clone)]
pub struct TokenService {
    encoding: Arc<EncodingKey>,
    decoding: Arc<DecodingKey>,
    ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: Arc::new(EncodingKey::from_secret(secret.as_bytes())),
            decoding: Arc::new(DecodingKey::from_secret(secret.as_bytes())),
            ttl: TOKEN_TTL,
        }
    }

    /// issue
    ///
    /// Signs a token for the given user that expires `TOKEN_TTL` from now.
    pub fn issue(&self, user_id: Uuid, email: &str) -> Result<String, TokenError> {
        self.issue_at(user_id, email, Utc::now())
    }

    /// issue_at
    ///
    /// Same as `issue` with an explicit issue time.
    pub fn issue_at(
        &self,
        user_id: Uuid,
        email: &str,
        issued_at: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let expires_at = issued_at + self.ttl;
        let claims = Claims {
            sub: user_id,
            email: email.to_string(),
            iat: to_epoch_seconds(issued_at)?,
            exp: to_epoch_seconds(expires_at)?,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// verify
    ///
    /// Checks the signature and that the token has not expired. No leeway is
    /// granted: a token is dead the second its `exp` passes.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        Ok(data.claims)
    }
}

fn to_epoch_seconds(at: DateTime<Utc>) -> Result<u64, TokenError> {
    u64::try_from(at.timestamp())
        .map_err(|_| TokenError::Signing("timestamp before the unix epoch".to_string()))
}

/// AuthUser
///
/// The verified identity attached to a request by the authorization gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            id: claims.sub,
            email: claims.email,
        }
    }
}

/// Pulls the token out of an `Authorization: Bearer <token>` header. The scheme
/// name is matched case-insensitively.
pub fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim_start().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    Some(token.trim()).filter(|token| !token.is_empty())
}

/// authenticate
///
/// Resolves the identity for a request. Every failure (no header, malformed,
/// forged, expired) becomes the same `Unauthorized`.
pub fn authenticate(parts: &Parts, tokens: &TokenService) -> Result<AuthUser, AppError> {
    let token = bearer_token(parts).ok_or(AppError::Unauthorized)?;

    match tokens.verify(token) {
        Ok(claims) => Ok(claims.into()),
        Err(reason) => {
            tracing::debug!(reason = %reason, "rejected bearer token");
            Err(AppError::Unauthorized)
        }
    }
}

/// AuthUser Extractor Implementation
///
/// Reuses the identity the gate already attached when present; otherwise
/// verifies the bearer token itself, so a handler can never run with an
/// unverified identity even if it is mounted outside the gate.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    TokenService: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthUser>() {
            return Ok(user.clone());
        }

        let tokens = TokenService::from_ref(state);
        authenticate(parts, &tokens)
    }
}

/// require_auth
///
/// The authorization gate for protected routes. Verifies the bearer token before
/// the handler runs and stores the resulting `AuthUser` in the request extensions.
pub async fn require_auth(
    State(tokens): State<TokenService>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let (mut parts, body) = request.into_parts();
    let user = authenticate(&parts, &tokens)?;

    tracing::Span::current().record("user_id", tracing::field::display(user.id));
    parts.extensions.insert(user);

    Ok(next.run(Request::from_parts(parts, body)).await)
}

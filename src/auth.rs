use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use zeroize::Zeroizing;

use crate::application::handlers::ledger_handler::ApiError;
use crate::domain::errors::{LedgerError, LedgerResult};

/// Minimum signing secret length in bytes
pub const MIN_SECRET_LENGTH: usize = 16;

/// Default token lifetime
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(3600);

/// JWT payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: i64,
    pub iat: i64,
    pub exp: i64,
}

/// Issues and verifies HS256 bearer tokens
pub struct TokenIssuer {
    secret: Zeroizing<Vec<u8>>,
    ttl: Duration,
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("secret", &"<redacted>")
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl TokenIssuer {
    pub fn new(secret: impl Into<Vec<u8>>, ttl: Duration) -> LedgerResult<Self> {
        let secret = Zeroizing::new(secret.into());
        if secret.len() < MIN_SECRET_LENGTH {
            return Err(LedgerError::invalid(format!(
                "token secret must be at least {} bytes",
                MIN_SECRET_LENGTH
            )));
        }
        Ok(Self { secret, ttl })
    }

    pub fn issue(&self, user_id: i64) -> LedgerResult<String> {
        let iat = Utc::now().timestamp();
        let claims = Claims {
            user_id,
            iat,
            exp: iat.saturating_add(i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX)),
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(&self.secret),
        )
        .map_err(|e| {
            tracing::error!("Failed to sign token for user {}: {}", user_id, e);
            LedgerError::dependency("could not issue token")
        })
    }

    pub fn verify(&self, token: &str) -> LedgerResult<Claims> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(&self.secret),
            &Validation::new(Algorithm::HS256),
        )
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => LedgerError::Unauthorized("token expired".to_string()),
            ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Json(_) => {
                LedgerError::Unauthorized("malformed token".to_string())
            }
            _ => LedgerError::Unauthorized("invalid token".to_string()),
        })
    }
}

/// Middleware to require a valid bearer token.
///
/// On success the verified [`Claims`] are stored in the request extensions.
pub async fn require_auth(
    State(tokens): State<Arc<TokenIssuer>>,
    mut request: Request,
    next: Next,
) -> Response {
    let auth_header = request
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok());

    let token = match auth_header {
        Some(auth) if auth.starts_with("Bearer ") => auth[7..].trim().to_string(),
        Some(_) => {
            tracing::warn!("Invalid Authorization header format (expected Bearer token)");
            return unauthorized("expected a Bearer token");
        }
        None => {
            tracing::warn!("Missing Authorization header");
            return unauthorized("missing Authorization header");
        }
    };

    match tokens.verify(&token) {
        Ok(claims) => {
            request.extensions_mut().insert(claims);
            next.run(request).await
        }
        Err(e) => {
            tracing::warn!("Rejected bearer token: {}", e);
            ApiError(e).into_response()
        }
    }
}

fn unauthorized(message: &str) -> Response {
    ApiError(LedgerError::Unauthorized(message.to_string())).into_response()
}

use std::time::Duration;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    async_trait,
    extract::{FromRequestParts, State},
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    Json,
};
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use metrics::counter;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use skillz_core::types::UserView;

use crate::problem::{observe, ProblemResponse, ServiceError};
use crate::router::AppState;
use crate::users::NewAccount;

/// Issues and verifies the HS256 bearer tokens handed out at login.
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        let mut validation = Validation::new(jsonwebtoken::Algorithm::HS256);
        validation.validate_aud = false;
        // expiry is checked against the injected clock in `verify`
        validation.validate_exp = false;
        validation.validate_nbf = false;
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            ttl,
        }
    }

    pub fn issue(&self, user_id: i64, name: &str, now: DateTime<Utc>) -> Result<String, AuthError> {
        let iat = now.timestamp().max(0) as u64;
        let exp = iat
            .checked_add(self.ttl.as_secs())
            .filter(|exp| i64::try_from(*exp).is_ok())
            .ok_or(AuthError::LifetimeOverflow)?;
        let claims = TokenClaims {
            sub: user_id.to_string(),
            name: name.to_string(),
            iat,
            exp,
        };
        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|err| AuthError::Invalid(format!("{err}")))
    }

    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<AuthUser, AuthError> {
        let claims = decode::<TokenClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|err| AuthError::Invalid(format!("{err}")))?
            .claims;

        let exp = i64::try_from(claims.exp)
            .map_err(|_| AuthError::Invalid("exp_out_of_range".to_string()))?;
        if now.timestamp() >= exp {
            return Err(AuthError::Expired);
        }
        let id = claims
            .sub
            .parse()
            .map_err(|_| AuthError::Invalid("subject_not_a_user_id".to_string()))?;
        Ok(AuthUser {
            id,
            name: claims.name,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    pub name: String,
    pub iat: u64,
    pub exp: u64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("invalid token: {0}")]
    Invalid(String),
    #[error("token expired")]
    Expired,
    #[error("token lifetime exceeds the representable range")]
    LifetimeOverflow,
}

impl AuthError {
    fn reason(&self) -> &'static str {
        match self {
            Self::Invalid(_) => "invalid_token",
            Self::Expired => "expired_token",
            Self::LifetimeOverflow => "lifetime_overflow",
        }
    }
}

/// The caller identified by the bearer token of the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: i64,
    pub name: String,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ProblemResponse;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(header) = parts.headers.get(AUTHORIZATION) else {
            counter!("auth_failures_total", "reason" => "missing_token").increment(1);
            return Err(ProblemResponse::unauthorized("missing bearer token"));
        };
        let token = header
            .to_str()
            .ok()
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| {
                counter!("auth_failures_total", "reason" => "malformed_header").increment(1);
                ProblemResponse::unauthorized("authorization header must be 'Bearer <token>'")
            })?;

        state.tokens().verify(token, state.now()).map_err(|err| {
            counter!("auth_failures_total", "reason" => err.reason()).increment(1);
            warn!(stage = "auth", error = %err, "rejected bearer token");
            ProblemResponse::unauthorized(err.to_string())
        })
    }
}

pub fn hash_password(password: &str) -> Result<String, ServiceError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| ServiceError::PasswordHash(err.to_string()))
}

/// Returns `true` when `password` matches the stored PHC string.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    PasswordHash::new(stored_hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub diploma: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub token: String,
    pub user: UserView,
}

pub async fn signup(
    State(state): State<AppState>,
    Json(request): Json<SignupRequest>,
) -> Result<(StatusCode, Json<SessionResponse>), ProblemResponse> {
    let account = NewAccount {
        name: request.name,
        email: request.email,
        password: request.password,
        diploma: request.diploma,
    };
    let user = observe("signup", state.users().signup(account).await)?;
    let session = observe("signup", open_session(&state, user))?;
    info!(stage = "auth", user_id = session.user.id, "user signed up");
    Ok((StatusCode::CREATED, Json(session)))
}

pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<SessionResponse>, ProblemResponse> {
    let result = state.users().login(&request.email, &request.password).await;
    if matches!(result, Err(ServiceError::InvalidCredentials)) {
        counter!("auth_failures_total", "reason" => "invalid_credentials").increment(1);
    }
    let user = observe("login", result)?;
    Ok(Json(observe("login", open_session(&state, user))?))
}

fn open_session(state: &AppState, user: UserView) -> Result<SessionResponse, ServiceError> {
    let token = state
        .tokens()
        .issue(user.id, &user.name, state.now())
        .map_err(|err| ServiceError::Token(err.to_string()))?;
    Ok(SessionResponse { token, user })
}

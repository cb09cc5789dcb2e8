use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use metrics::counter;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use skillz_core::validation::ValidationError;
use skillz_storage::{DomainError, SkillError, UserError};

#[derive(Debug, Serialize)]
struct ProblemDetails {
    #[serde(rename = "type")]
    problem_type: &'static str,
    title: &'static str,
    detail: String,
}

pub struct ProblemResponse {
    status: StatusCode,
    body: ProblemDetails,
}

impl ProblemResponse {
    pub fn new<S: Into<String>>(status: StatusCode, problem_type: &'static str, detail: S) -> Self {
        Self {
            status,
            body: ProblemDetails {
                problem_type,
                title: status.canonical_reason().unwrap_or("error"),
                detail: detail.into(),
            },
        }
    }

    pub fn unauthorized<S: Into<String>>(detail: S) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", detail)
    }
}

impl IntoResponse for ProblemResponse {
    fn into_response(self) -> Response {
        let mut response = Json(self.body).into_response();
        *response.status_mut() = self.status;
        response.headers_mut().insert(
            axum::http::header::CONTENT_TYPE,
            axum::http::HeaderValue::from_static("application/problem+json"),
        );
        response
    }
}

/// Failures surfaced by the service layer.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{0}")]
    Conflict(&'static str),
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("failed to hash password: {0}")]
    PasswordHash(String),
    #[error("failed to issue token: {0}")]
    Token(String),
    #[error("database error: {0}")]
    Database(sqlx::Error),
}

impl From<UserError> for ServiceError {
    fn from(err: UserError) -> Self {
        match err {
            UserError::NotFound => Self::NotFound("user"),
            UserError::UnknownManager => Self::NotFound("manager"),
            UserError::DuplicateEmail => Self::Conflict("a user with this email already exists"),
            UserError::Database(err) => Self::Database(err),
        }
    }
}

impl From<DomainError> for ServiceError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::NotFound => Self::NotFound("domain"),
            DomainError::UnknownSkill => Self::NotFound("skill"),
            DomainError::DuplicateName => Self::Conflict("a domain with this name already exists"),
            DomainError::Database(err) => Self::Database(err),
        }
    }
}

impl From<SkillError> for ServiceError {
    fn from(err: SkillError) -> Self {
        match err {
            SkillError::NotFound => Self::NotFound("skill"),
            SkillError::UnknownUser => Self::NotFound("user"),
            SkillError::Database(err) => Self::Database(err),
        }
    }
}

impl From<ServiceError> for ProblemResponse {
    fn from(err: ServiceError) -> Self {
        let detail = err.to_string();
        match err {
            ServiceError::NotFound(_) => Self::new(StatusCode::NOT_FOUND, "not_found", detail),
            ServiceError::Validation(_) => {
                Self::new(StatusCode::BAD_REQUEST, "validation_failed", detail)
            }
            ServiceError::Conflict(_) => Self::new(StatusCode::CONFLICT, "conflict", detail),
            ServiceError::InvalidCredentials => {
                Self::new(StatusCode::FORBIDDEN, "invalid_credentials", detail)
            }
            ServiceError::PasswordHash(_) | ServiceError::Token(_) | ServiceError::Database(_) => {
                error!(stage = "service", error = %detail, "request failed");
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "unexpected error while processing the request",
                )
            }
        }
    }
}

/// Counts the outcome of an API operation and converts failures to problem responses.
pub fn observe<T>(op: &'static str, result: Result<T, ServiceError>) -> Result<T, ProblemResponse> {
    let outcome = match &result {
        Ok(_) => "ok",
        Err(ServiceError::NotFound(_)) => "not_found",
        Err(ServiceError::Validation(_)) => "invalid",
        Err(ServiceError::Conflict(_)) => "conflict",
        Err(ServiceError::InvalidCredentials) => "denied",
        Err(_) => "error",
    };
    counter!("api_requests_total", "op" => op, "result" => outcome).increment(1);
    result.map_err(ProblemResponse::from)
}

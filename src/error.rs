use std::collections::BTreeMap;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// A single field-scoped error with a machine-readable code.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FieldError {
    pub message: String,
    pub code: String,
}

/// Errors keyed by the offending field. Errors that don't belong to a single
/// field live under `non_field_errors`.
pub type FieldErrors = BTreeMap<String, Vec<FieldError>>;

pub const NON_FIELD: &str = "non_field_errors";

/// Application error kinds. The core services only ever construct kinds;
/// HTTP status codes are assigned in [`IntoResponse`] and nowhere else.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No valid caller identity (401). Detail is deliberately terse.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Caller is not the owner/author of the resource (403).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Malformed or missing input fields (400).
    #[error("validation failed")]
    Validation(FieldErrors),

    /// Syntactically valid input that violates a domain rule (422):
    /// wrong entry date, immutable-field change, duplicate entry,
    /// unknown timezone, protected invite batch.
    #[error("unprocessable input")]
    Business(FieldErrors),

    /// Missing entity or invalid/expired token (404). Kept generic so the
    /// response shape never reveals which emails or tokens are real.
    #[error("not found: {0}")]
    NotFound(String),

    /// Anything unexpected (500). Logged, never echoed to the client.
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn unauthorized(detail: impl Into<String>) -> Self {
        Self::Unauthorized(detail.into())
    }

    pub fn forbidden(detail: impl Into<String>) -> Self {
        Self::Forbidden(detail.into())
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::NotFound(detail.into())
    }

    /// A 400 structural validation error scoped to one field.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation(single(field, message, "invalid"))
    }

    /// A 422 business-rule error scoped to one field, carrying a
    /// machine-readable code (`invalid`, `unique`, ...).
    pub fn business(
        field: impl Into<String>,
        message: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        Self::Business(single(field, message, code))
    }

    /// A 422 business-rule error not tied to any particular field.
    pub fn business_detail(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self::Business(single(NON_FIELD, message, code))
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Business(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn single(
    field: impl Into<String>,
    message: impl Into<String>,
    code: impl Into<String>,
) -> FieldErrors {
    let mut errors = FieldErrors::new();
    errors.insert(
        field.into(),
        vec![FieldError {
            message: message.into(),
            code: code.into(),
        }],
    );
    errors
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        Self::Internal(anyhow::Error::new(e))
    }
}

/// Collapse a database error into `unique` when the driver reports a
/// unique-constraint violation; anything else stays an internal error.
pub fn map_unique_violation(e: sqlx::Error, unique: ApiError) -> ApiError {
    if e.as_database_error()
        .map_or(false, |d| d.is_unique_violation())
    {
        unique
    } else {
        ApiError::from(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::Validation(errors) | Self::Business(errors) => {
                json!({ "errors": errors })
            }
            Self::Unauthorized(detail) | Self::Forbidden(detail) | Self::NotFound(detail) => {
                json!({ "detail": detail })
            }
            Self::Internal(e) => {
                error!(error = %e, "internal server error");
                json!({ "detail": "Internal server error" })
            }
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod error_tests {
    use super::*;

    #[test]
    fn kinds_map_to_expected_statuses() {
        let cases: Vec<(ApiError, StatusCode)> = vec![
            (ApiError::unauthorized("x"), StatusCode::UNAUTHORIZED),
            (ApiError::forbidden("x"), StatusCode::FORBIDDEN),
            (ApiError::validation("email", "bad"), StatusCode::BAD_REQUEST),
            (
                ApiError::business("entry_date", "bad", "invalid"),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (ApiError::not_found("x"), StatusCode::NOT_FOUND),
            (
                ApiError::Internal(anyhow::anyhow!("boom")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[test]
    fn business_errors_carry_field_scoped_codes() {
        let err = ApiError::business("entry_date", "Entry date must be today's date (UTC)", "invalid");
        match err {
            ApiError::Business(fields) => {
                let details = fields.get("entry_date").expect("field scoped");
                assert_eq!(details[0].code, "invalid");
            }
            _ => panic!("expected business error"),
        }
    }

    #[derive(Debug)]
    struct StubDbError {
        unique: bool,
    }

    impl std::fmt::Display for StubDbError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("duplicate key value violates unique constraint")
        }
    }

    impl std::error::Error for StubDbError {}

    impl sqlx::error::DatabaseError for StubDbError {
        fn message(&self) -> &str {
            "duplicate key value violates unique constraint"
        }

        fn kind(&self) -> sqlx::error::ErrorKind {
            if self.unique {
                sqlx::error::ErrorKind::UniqueViolation
            } else {
                sqlx::error::ErrorKind::Other
            }
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }
    }

    #[test]
    fn unique_violations_become_the_supplied_business_error() {
        let db_err = sqlx::Error::Database(Box::new(StubDbError { unique: true }));
        let err = map_unique_violation(db_err, ApiError::business_detail("duplicate", "unique"));
        match &err {
            ApiError::Business(fields) => {
                assert_eq!(fields[NON_FIELD][0].code, "unique");
            }
            other => panic!("expected business error, got {other:?}"),
        }
        assert_eq!(
            err.into_response().status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn other_database_errors_stay_internal() {
        let cases = [
            sqlx::Error::Database(Box::new(StubDbError { unique: false })),
            sqlx::Error::RowNotFound,
        ];
        for db_err in cases {
            let err = map_unique_violation(db_err, ApiError::business_detail("duplicate", "unique"));
            assert_eq!(
                err.into_response().status(),
                StatusCode::INTERNAL_SERVER_ERROR
            );
        }
    }

    #[test]
    fn token_failures_share_the_not_found_shape() {
        // Bad token and wrong-state token must be indistinguishable.
        let a = ApiError::not_found("Invalid token");
        let b = ApiError::not_found("Invalid token");
        assert_eq!(a.into_response().status(), b.into_response().status());
    }
}

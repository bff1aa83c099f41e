//! Error responses.
//!
//! # Responsibilities
//! - Map engine and admin errors to HTTP status codes
//! - Render every error as a JSON body with a stable `error` code
//!
//! # Design Decisions
//! - Transient unavailability is 503 so callers know to retry
//! - Never an empty success: a failed fetch always carries an error body

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};

use crate::engine::{CrossValidationError, FetchError};
use crate::load_balancer::PoolError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Validation(#[from] CrossValidationError),
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error("{0}")]
    BadRequest(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Fetch(FetchError::CategoryNotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Fetch(FetchError::InvalidRequest(_)) => StatusCode::BAD_REQUEST,
            ApiError::Fetch(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Validation(CrossValidationError::CategoryNotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Validation(CrossValidationError::InvalidRequest(_)) => StatusCode::BAD_REQUEST,
            ApiError::Validation(
                CrossValidationError::InsufficientSources { .. }
                | CrossValidationError::NoAgreement { .. },
            ) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Pool(
                PoolError::PoolNotFound(_)
                | PoolError::CategoryNotFound(_)
                | PoolError::MemberNotFound { .. },
            ) => StatusCode::NOT_FOUND,
            ApiError::Pool(
                PoolError::PoolAlreadyExists(_)
                | PoolError::CategoryAlreadyServed { .. }
                | PoolError::DuplicateMember { .. },
            ) => StatusCode::CONFLICT,
            ApiError::Pool(PoolError::UnknownProvider(_) | PoolError::CategoryMismatch { .. }) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Fetch(e) => e.code(),
            ApiError::Validation(CrossValidationError::CategoryNotFound(_)) => "category_not_found",
            ApiError::Validation(CrossValidationError::InvalidRequest(_)) => "invalid_request",
            ApiError::Validation(CrossValidationError::InsufficientSources { .. }) => {
                "insufficient_sources"
            }
            ApiError::Validation(CrossValidationError::NoAgreement { .. }) => "no_agreement",
            ApiError::Pool(PoolError::PoolNotFound(_)) => "pool_not_found",
            ApiError::Pool(PoolError::CategoryNotFound(_)) => "category_not_found",
            ApiError::Pool(PoolError::MemberNotFound { .. }) => "member_not_found",
            ApiError::Pool(PoolError::PoolAlreadyExists(_)) => "pool_exists",
            ApiError::Pool(PoolError::CategoryAlreadyServed { .. }) => "category_already_served",
            ApiError::Pool(PoolError::DuplicateMember { .. }) => "duplicate_member",
            ApiError::Pool(PoolError::UnknownProvider(_)) => "unknown_provider",
            ApiError::Pool(PoolError::CategoryMismatch { .. }) => "category_mismatch",
            ApiError::BadRequest(_) => "invalid_request",
        }
    }

    fn body(&self) -> Value {
        let mut body = json!({
            "error": self.code(),
            "message": self.to_string(),
        });
        match self {
            ApiError::Fetch(FetchError::AllProvidersFailed {
                attempts,
                last_error,
                skipped,
                ..
            }) => {
                body["attempts"] = json!(attempts);
                body["last_error"] = json!(last_error);
                body["skipped"] = json!(skipped);
            }
            ApiError::Fetch(FetchError::PoolExhausted { skipped, .. }) => {
                body["skipped"] = json!(skipped);
            }
            ApiError::Validation(CrossValidationError::NoAgreement {
                agreeing, responders, median, ..
            }) => {
                body["agreeing"] = json!(agreeing);
                body["responders"] = json!(responders);
                body["median"] = json!(median);
            }
            _ => {}
        }
        body
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(error = %self, status = status.as_u16(), "Request failed");
        }
        (status, Json(self.body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::AttemptError;
    use crate::health::passive::AttemptOutcome;
    use crate::registry::Category;

    #[test]
    fn unavailable_maps_to_503_with_details() {
        let error = ApiError::from(FetchError::AllProvidersFailed {
            pool: "prices".into(),
            attempts: 2,
            last_error: AttemptError {
                provider: "beta".into(),
                outcome: AttemptOutcome::HttpServerError,
                message: "upstream returned HTTP 502".into(),
            },
            skipped: Vec::new(),
        });
        assert_eq!(error.status(), StatusCode::SERVICE_UNAVAILABLE);

        let body = error.body();
        assert_eq!(body["error"], "temporarily_unavailable");
        assert_eq!(body["attempts"], 2);
        assert_eq!(body["last_error"]["outcome"], "http_server_error");
    }

    #[test]
    fn pool_errors_map_to_client_statuses() {
        let missing = ApiError::from(PoolError::PoolNotFound("x".into()));
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let conflict = ApiError::from(PoolError::CategoryAlreadyServed {
            category: Category::new("news"),
            pool: "news".into(),
        });
        assert_eq!(conflict.status(), StatusCode::CONFLICT);

        let unknown = ApiError::from(PoolError::UnknownProvider("ghost".into()));
        assert_eq!(unknown.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn disagreement_is_unavailable_with_details() {
        let error = ApiError::from(CrossValidationError::NoAgreement {
            required: 2,
            agreeing: 0,
            responders: 2,
            median: 110.0,
        });
        assert_eq!(error.status(), StatusCode::SERVICE_UNAVAILABLE);

        let body = error.body();
        assert_eq!(body["error"], "no_agreement");
        assert_eq!(body["responders"], 2);
        assert_eq!(body["median"], 110.0);
    }
}

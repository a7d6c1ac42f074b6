use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use goods_core::DomainError;
use goods_infra::EngineError;

pub const CODE_NOT_FOUND: u16 = 3;
pub const CODE_INVALID_INPUT: u16 = 4;
pub const CODE_INTERNAL: u16 = 5;

pub const NOT_FOUND_MESSAGE: &str = "errors.common.notFound";
pub const INTERNAL_MESSAGE: &str = "Internal server error";

/// Error response rendered as `{ code, message, details: {} }`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    status: StatusCode,
    code: u16,
    message: String,
}

impl ApiError {
    pub fn not_found() -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code: CODE_NOT_FOUND,
            message: NOT_FOUND_MESSAGE.to_string(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: CODE_INVALID_INPUT,
            message: message.into(),
        }
    }

    pub fn internal() -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: CODE_INTERNAL,
            message: INTERNAL_MESSAGE.to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> u16 {
        self.code
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({
                "code": self.code,
                "message": self.message,
                "details": {},
            })),
        )
            .into_response()
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::NotFound => Self::not_found(),
            other => {
                // Internal details stay in the logs.
                tracing::error!(error = %other, "request failed");
                Self::internal()
            }
        }
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => Self::invalid(msg),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(_: JsonRejection) -> Self {
        Self::invalid("Invalid request payload")
    }
}

impl From<QueryRejection> for ApiError {
    fn from(err: QueryRejection) -> Self {
        Self::invalid(err.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use goods_infra::store::StoreError;

    #[test]
    fn engine_errors_map_to_status_and_code() {
        let not_found = ApiError::from(EngineError::NotFound);
        assert_eq!((not_found.status(), not_found.code()), (StatusCode::NOT_FOUND, 3));

        let store = ApiError::from(EngineError::Store(StoreError::Database("down".into())));
        assert_eq!(
            (store.status(), store.code()),
            (StatusCode::INTERNAL_SERVER_ERROR, 5)
        );
        assert_eq!(store.message, INTERNAL_MESSAGE);
    }

    #[test]
    fn domain_validation_is_invalid_input() {
        let err = ApiError::from(DomainError::validation("name must not be empty"));
        assert_eq!((err.status(), err.code()), (StatusCode::BAD_REQUEST, 4));
        assert_eq!(err.message, "name must not be empty");
    }
}

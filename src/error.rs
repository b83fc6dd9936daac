use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt::Display;
use tracing::error;

use crate::contracts::ContractError;
use crate::store::StoreError;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized")
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "not found")
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn internal<E: Display>(error: E) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, error.to_string())
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status;
        let body = Json(ErrorResponse {
            error: self.message,
        });
        (status, body).into_response()
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl From<ContractError> for AppError {
    fn from(value: ContractError) -> Self {
        match value {
            ContractError::NotFound => AppError::not_found(),
            ContractError::InvalidCredential => {
                AppError::new(StatusCode::UNAUTHORIZED, value.to_string())
            }
            ContractError::Conflict
            | ContractError::OutOfOrder(_)
            | ContractError::NotSignable(_)
            | ContractError::Closed(_)
            | ContractError::TemplateInUse => AppError::conflict(value.to_string()),
            ContractError::InvalidTransition { .. }
            | ContractError::UnknownValue(_)
            | ContractError::NoSigners
            | ContractError::NoSigningSession(_)
            | ContractError::Validation(_) => AppError::bad_request(value.to_string()),
            ContractError::Store(err) => err.into(),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(value: StoreError) -> Self {
        error!(error = %value, "store failure");
        AppError::internal("internal server error")
    }
}

impl From<diesel::result::Error> for AppError {
    fn from(value: diesel::result::Error) -> Self {
        match value {
            diesel::result::Error::NotFound => AppError::not_found(),
            other => StoreError::from(other).into(),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(value: jsonwebtoken::errors::Error) -> Self {
        AppError::internal(value)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        AppError::internal(value)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        AppError::internal(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::ContractStatus;

    #[test]
    fn maps_contract_errors_to_status_codes() {
        let cases = [
            (ContractError::NotFound, StatusCode::NOT_FOUND),
            (ContractError::InvalidCredential, StatusCode::UNAUTHORIZED),
            (ContractError::Conflict, StatusCode::CONFLICT),
            (
                ContractError::NotSignable(ContractStatus::Void),
                StatusCode::CONFLICT,
            ),
            (ContractError::NoSigners, StatusCode::BAD_REQUEST),
            (
                ContractError::InvalidTransition {
                    from: ContractStatus::Signed,
                    to: ContractStatus::Draft,
                },
                StatusCode::BAD_REQUEST,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(AppError::from(err).status(), expected);
        }
    }

    #[test]
    fn credential_failures_use_the_generic_message() {
        let err = AppError::from(ContractError::InvalidCredential);
        assert_eq!(err.message, "verification failed, please request a new link");
    }

    #[test]
    fn store_failures_hide_details() {
        let err = AppError::from(StoreError::Database(
            diesel::result::Error::BrokenTransactionManager,
        ));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, "internal server error");
    }
}

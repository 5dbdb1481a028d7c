//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::{DomainError, OrderError};

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Domain logic or store error.
    Domain(DomainError),
}

impl ApiError {
    /// The status code this error is answered with.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Domain(err) => domain_error_status(err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            ApiError::NotFound(msg) | ApiError::BadRequest(msg) => msg,
            ApiError::Domain(err) => {
                if status.is_server_error() {
                    tracing::error!(error = %err, %status, "order request failed");
                }
                err.to_string()
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn domain_error_status(err: &DomainError) -> StatusCode {
    match err {
        DomainError::Order(order_err) => match order_err {
            OrderError::OrderNotFound(_) => StatusCode::NOT_FOUND,
            OrderError::InvalidCustomer(_)
            | OrderError::InvalidProduct(_)
            | OrderError::EmptyOrder
            | OrderError::InvalidQuantity { .. }
            | OrderError::TotalOverflow => StatusCode::UNPROCESSABLE_ENTITY,
            OrderError::InsufficientStock { .. }
            | OrderError::InvalidStatusTransition { .. }
            | OrderError::OrderCancelled(_) => StatusCode::CONFLICT,
        },
        DomainError::Store(store_err) if store_err.is_transient() => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        DomainError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Domain(err)
    }
}

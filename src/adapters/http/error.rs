//! Maps `SchedulerError` onto HTTP status codes and a JSON body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;

use crate::domain::error::SchedulerError;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: &'static str,
}

pub struct HttpError(pub SchedulerError);

impl From<SchedulerError> for HttpError {
    fn from(err: SchedulerError) -> Self {
        Self(err)
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            SchedulerError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            SchedulerError::Auth(_) => (StatusCode::UNAUTHORIZED, "AUTH_ERROR"),
            SchedulerError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            SchedulerError::Conflict(_) => (StatusCode::BAD_REQUEST, "CONFLICT"),
            SchedulerError::Contention(_) => (StatusCode::CONFLICT, "CONTENTION"),
            SchedulerError::BackendUnavailable(_) | SchedulerError::Database(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "BACKEND_UNAVAILABLE")
            }
            SchedulerError::DeadlineExceeded(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DEADLINE_EXCEEDED"),
            SchedulerError::Serialization(_) => (StatusCode::INTERNAL_SERVER_ERROR, "SERIALIZATION_ERROR"),
        };
        (status, Json(ErrorBody { error: self.0.to_string(), code })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_404() {
        let response = HttpError(SchedulerError::NotFound("task".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn contention_maps_to_409() {
        let response = HttpError(SchedulerError::Contention("row locked".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}

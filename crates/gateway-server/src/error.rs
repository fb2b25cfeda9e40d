use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use control_plane::{ConfigError, StoreError};
use serde::Serialize;

/// Error returned by admin handlers and startup. `code` is stable for
/// clients; `message` is for operators.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    code: &'a str,
    message: &'a str,
}

impl AppError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", message)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            code: self.code,
            message: &self.message,
        });
        (self.status, body).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(_) => AppError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "store_unavailable",
                err.to_string(),
            ),
            StoreError::Mapping(_) => AppError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "store_mapping",
                err.to_string(),
            ),
        }
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "invalid_config", err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "io", err.to_string())
    }
}

/// A refresh task that panicked or was cancelled on the blocking pool.
impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "refresh_task_failed",
            err.to_string(),
        )
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.code, self.status.as_u16(), self.message)
    }
}

impl std::error::Error for AppError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreachable_store_maps_to_service_unavailable() {
        let err = AppError::from(StoreError::Unavailable("database is locked".to_string()));
        assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.code, "store_unavailable");
        assert_eq!(err.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn bad_rows_map_to_internal_error() {
        let err = AppError::from(StoreError::Mapping("invalid column type".to_string()));
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.code, "store_mapping");
    }

    #[test]
    fn config_errors_keep_the_offending_key() {
        let err = AppError::from(ConfigError::UnknownKey("storage.nope".to_string()));
        assert_eq!(err.code, "invalid_config");
        assert!(err.to_string().contains("storage.nope"));
    }

    #[test]
    fn missing_token_is_unauthorized() {
        let response = AppError::unauthorized("invalid admin token").into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}

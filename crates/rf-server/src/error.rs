//! Error-to-HTTP response conversion.
//!
//! Route handlers return `Result<T, AppError>`; any [`rf_core::Error`] converts
//! with `?`. Client errors carry their message. Server errors are logged in
//! full and answered with a generic message so engine stderr, tool paths, and
//! source URLs never reach the client.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Wrapper so we can implement `IntoResponse` for an external type.
#[derive(Debug)]
pub struct AppError {
    inner: rf_core::Error,
    request_id: Option<String>,
}

impl AppError {
    pub fn new(inner: rf_core::Error) -> Self {
        Self {
            inner,
            request_id: None,
        }
    }

    pub fn with_request_id(mut self, id: String) -> Self {
        self.request_id = Some(id);
        self
    }

    pub fn inner(&self) -> &rf_core::Error {
        &self.inner
    }
}

impl From<rf_core::Error> for AppError {
    fn from(e: rf_core::Error) -> Self {
        Self::new(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.inner.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let message = if status.is_server_error() {
            tracing::error!(
                status = %status,
                code = self.inner.code(),
                request_id = self.request_id.as_deref(),
                error = %self.inner,
                "Server error in API handler"
            );
            public_message(&self.inner).to_string()
        } else {
            tracing::debug!(status = %status, error = %self.inner, "Rejected request");
            match &self.inner {
                rf_core::Error::BadRequest(message) => message.clone(),
                other => other.to_string(),
            }
        };

        let body = json!({
            "error": message,
            "code": self.inner.code(),
            "request_id": self.request_id,
        });

        (status, axum::Json(body)).into_response()
    }
}

fn public_message(err: &rf_core::Error) -> &'static str {
    match err {
        rf_core::Error::Busy(_) => "Server busy, try again later",
        rf_core::Error::EngineSpawn { .. } | rf_core::Error::EngineRuntime { .. } => {
            "Error during transcoding"
        }
        rf_core::Error::Tool { .. } | rf_core::Error::Probe(_) => "Error fetching metadata",
        _ => "Internal server error",
    }
}

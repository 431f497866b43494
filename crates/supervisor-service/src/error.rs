//! HTTP error mapping (§6 "Response envelope", §7 error taxonomy).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use supervisor_types::SupervisorError;

/// The `{ success, data, error }` envelope every endpoint responds with
/// (§6). `code` carries the agent-protocol numeric error code on failure.
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,
}

impl<T: Serialize> Envelope<T> {
    /// Wrap a successful payload.
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            code: None,
        }
    }
}

/// Wraps a [`SupervisorError`] so it can be returned directly from an axum
/// handler; maps to the §7 HTTP status and §6 numeric protocol code.
pub struct ApiError(pub SupervisorError);

impl From<SupervisorError> for ApiError {
    fn from(err: SupervisorError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let envelope: Envelope<()> = Envelope {
            success: false,
            data: None,
            error: Some(self.0.to_string()),
            code: Some(self.0.protocol_code()),
        };
        (status, Json(envelope)).into_response()
    }
}

/// Standalone auth-failure response (§6 code `-32003`), since auth errors
/// live in `supervisor-auth`'s own type, not [`SupervisorError`].
pub fn auth_error_response(message: &str) -> Response {
    let envelope: Envelope<()> = Envelope {
        success: false,
        data: None,
        error: Some(message.to_string()),
        code: Some(-32003),
    };
    (StatusCode::UNAUTHORIZED, Json(envelope)).into_response()
}

/// Build a successful `200 OK` envelope.
pub fn ok<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(Envelope::ok(data))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_404_and_dash_32001() {
        let err = ApiError(SupervisorError::NotFound("x".into()));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}

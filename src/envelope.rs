//! Uniform response envelope: `{"msg": ..., "code": ..., "data": ...}`.
//!
//! The integer values of [`StatusCode`] are part of the wire contract.

use axum::Json;
use axum::http;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use tracing::error;

/// Envelope status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StatusCode {
    Ok = 0,
    ValidationFailed = 1,
    ServerError = 2,
    BadRequest = 3,
}

impl StatusCode {
    /// HTTP status line matching this code's class.
    pub fn http_status(self) -> http::StatusCode {
        match self {
            StatusCode::Ok => http::StatusCode::OK,
            StatusCode::ValidationFailed | StatusCode::BadRequest => http::StatusCode::BAD_REQUEST,
            StatusCode::ServerError => http::StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl Serialize for StatusCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

impl<'de> Deserialize<'de> for StatusCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match u8::deserialize(deserializer)? {
            0 => Ok(StatusCode::Ok),
            1 => Ok(StatusCode::ValidationFailed),
            2 => Ok(StatusCode::ServerError),
            3 => Ok(StatusCode::BadRequest),
            other => Err(serde::de::Error::custom(format!(
                "unknown status code {}",
                other
            ))),
        }
    }
}

/// Response body shared by every endpoint except `/jwk`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub msg: String,
    pub code: StatusCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip)]
    http_status: Option<http::StatusCode>,
}

impl ApiResponse {
    fn new(code: StatusCode, msg: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            msg: msg.into(),
            code,
            data,
            http_status: None,
        }
    }

    /// Success with a payload.
    pub fn ok<T: Serialize>(data: T) -> Self {
        match serde_json::to_value(data) {
            Ok(value) => Self::new(StatusCode::Ok, "ok", Some(value)),
            Err(e) => {
                error!("cannot serialize response payload: {}", e);
                Self::server_error("server error")
            }
        }
    }

    /// Success without a payload.
    pub fn ok_empty() -> Self {
        Self::new(StatusCode::Ok, "ok", None)
    }

    pub fn validation_failed(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::ValidationFailed, msg, None)
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BadRequest, msg, None)
    }

    pub fn server_error(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::ServerError, msg, None)
    }

    /// HTTP 401 carrying the `BadRequest` code.
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self {
            http_status: Some(http::StatusCode::UNAUTHORIZED),
            ..Self::new(StatusCode::BadRequest, msg, None)
        }
    }

    pub fn http_status(&self) -> http::StatusCode {
        self.http_status.unwrap_or_else(|| self.code.http_status())
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        (self.http_status(), Json(self)).into_response()
    }
}

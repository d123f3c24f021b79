use crate::error::AppError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use serde_json::json;

pub const LOGIN_PATH: &str = "/accounts/login/";

pub fn ok(result: serde_json::Value) -> Json<serde_json::Value> {
    Json(json!({
        "ok": true,
        "result": result
    }))
}

pub fn err_body(
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "ok": false,
        "error": error,
    })
}

pub fn login_redirect(next: &str) -> Redirect {
    Redirect::to(&format!("{}?next={}", LOGIN_PATH, urlencoding::encode(next)))
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::AuthenticationRequired { next } => login_redirect(&next).into_response(),
            AppError::AuthorizationDenied(message) => (
                StatusCode::FORBIDDEN,
                Json(err_body("permission_denied", message, None)),
            )
                .into_response(),
            AppError::Validation {
                code,
                message,
                details,
            } => (StatusCode::BAD_REQUEST, Json(err_body(code, message, details))).into_response(),
            AppError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                Json(err_body("not_found", format!("{} not found", what), None)),
            )
                .into_response(),
            AppError::Db(e) => {
                tracing::error!(error = %e, "database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(err_body("db_query_failed", e.to_string(), None)),
                )
                    .into_response()
            }
            AppError::Internal(e) => {
                tracing::error!(error = ?e, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(err_body("internal_error", e.to_string(), None)),
                )
                    .into_response()
            }
        }
    }
}

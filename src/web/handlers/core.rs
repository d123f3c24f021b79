use crate::error::AppResult;
use crate::policy;
use crate::web::error::{err_body, ok};
use crate::web::extract::CurrentUser;
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Redirect};
use axum::Json;
use serde_json::json;

pub async fn health() -> impl IntoResponse {
    ok(json!({ "version": env!("CARGO_PKG_VERSION") }))
}

/// Sends the caller to the dashboard that matches its role.
pub async fn dashboard_redirect(CurrentUser(identity): CurrentUser) -> AppResult<Redirect> {
    let target = policy::dashboard_for(&identity)?;
    tracing::debug!(user = %identity.username, target = target.path(), "dashboard dispatch");
    Ok(Redirect::to(target.path()))
}

pub async fn not_found(uri: Uri) -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(err_body(
            "not_found",
            format!("no route for {}", uri.path()),
            None,
        )),
    )
}

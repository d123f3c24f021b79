use crate::accounts::{self, session};
use crate::error::{AppError, AppResult};
use crate::web::error::{ok, LOGIN_PATH};
use crate::web::extract::session_token;
use crate::web::types::{blocking, AppState};
use axum::extract::{Query, State};
use axum::http::header::SET_COOKIE;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Redirect, Response};
use axum::{Form, Json};
use serde::Deserialize;
use serde_json::json;

const DEFAULT_LOGIN_REDIRECT: &str = "/dashboard/";

#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
    next: Option<String>,
}

/// Only same-site absolute paths are honoured as post-login targets.
fn safe_next(next: Option<&str>) -> &str {
    match next {
        Some(n) if n.starts_with('/') && !n.starts_with("//") && !n.contains('\\') => n,
        _ => DEFAULT_LOGIN_REDIRECT,
    }
}

pub async fn login_page(Query(q): Query<LoginQuery>) -> Json<serde_json::Value> {
    ok(json!({
        "action": LOGIN_PATH,
        "fields": ["username", "password"],
        "next": safe_next(q.next.as_deref()),
    }))
}

pub async fn login(State(state): State<AppState>, Form(form): Form<LoginForm>) -> AppResult<Response> {
    let ttl = state.settings.session_ttl;
    let creds = state.with_conn(|conn| Ok(accounts::credentials_for(conn, &form.username)?))?;

    let password = form.password.clone();
    let user_id = blocking(move || {
        let Some(creds) = creds else {
            return Ok(None);
        };
        Ok(creds.verify(&password)?.then_some(creds.user_id))
    })
    .await?;
    let Some(user_id) = user_id else {
        tracing::warn!(user = %form.username.trim(), "login failed");
        return Err(AppError::validation(
            "invalid_login",
            "please enter a correct username and password",
        ));
    };

    let token = state.with_conn(|conn| {
        let identity = accounts::find_identity(conn, &user_id)?.ok_or(AppError::NotFound("user"))?;
        let token = session::create_session(conn, &identity.id, ttl)?;
        tracing::info!(user = %identity.username, "logged in");
        Ok(token)
    })?;

    let cookie = session::set_cookie_value(&token, ttl, state.settings.secure_cookies);
    let target = safe_next(form.next.as_deref()).to_string();
    Ok(([(SET_COOKIE, cookie)], Redirect::to(&target)).into_response())
}

pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Response> {
    if let Some(token) = session_token(&headers) {
        state.with_conn(|conn| Ok(session::delete_session(conn, &token)?))?;
    }
    Ok((
        [(SET_COOKIE, session::clear_cookie_value())],
        Redirect::to(LOGIN_PATH),
    )
        .into_response())
}

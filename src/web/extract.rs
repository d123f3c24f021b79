use super::types::AppState;
use crate::accounts::{self, session, Identity};
use crate::error::AppError;
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::COOKIE;
use axum::http::HeaderMap;
use axum::http::request::Parts;

/// The identity behind the request's session cookie. Rejects with
/// `AuthenticationRequired` so the caller is sent to the login page.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Identity);

pub(crate) fn session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(session::token_from_cookie_header)
        .map(str::to_string)
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let next = parts
            .uri
            .path_and_query()
            .map(|p| p.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());

        let Some(token) = session_token(&parts.headers) else {
            return Err(AppError::AuthenticationRequired { next });
        };

        let identity = state.with_conn(|conn| {
            let Some(user_id) = session::resolve_session(conn, &token)? else {
                return Ok(None);
            };
            Ok(accounts::find_identity(conn, &user_id)?)
        })?;

        match identity {
            Some(identity) => Ok(CurrentUser(identity)),
            None => Err(AppError::AuthenticationRequired { next }),
        }
    }
}

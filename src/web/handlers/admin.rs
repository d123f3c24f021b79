use crate::accounts::{self, NewIdentity};
use crate::courses;
use crate::error::{AppError, AppResult};
use crate::policy::{self, Operation, Role};
use crate::web::error::ok;
use crate::web::extract::CurrentUser;
use crate::web::types::{blocking, AppState};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Form, Json};
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
pub struct CreateUserForm {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    last_name: String,
    role: Option<String>,
    is_superuser: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RoleForm {
    #[serde(default)]
    role: String,
}

fn parse_role(raw: &str) -> AppResult<Role> {
    Role::parse(raw.trim()).ok_or_else(|| {
        AppError::validation("bad_params", format!("unknown role {:?}", raw.trim()))
    })
}

fn checkbox(raw: Option<&str>) -> bool {
    matches!(raw.map(str::trim), Some("on" | "true" | "1"))
}

pub async fn index(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
) -> AppResult<Json<Value>> {
    policy::authorize(Operation::AdminSurface, &identity)?;
    let (counts, users) = state.with_conn(|conn| {
        Ok((
            courses::registry_counts(conn)?,
            accounts::list_identities(conn)?,
        ))
    })?;
    let users: Vec<Value> = users
        .iter()
        .map(|u| {
            json!({
                "id": u.id,
                "username": u.username,
                "displayName": u.display_name(),
                "role": u.role,
                "isSuperuser": u.is_superuser,
            })
        })
        .collect();
    Ok(ok(json!({ "counts": counts, "users": users })))
}

pub async fn create_user(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Form(form): Form<CreateUserForm>,
) -> AppResult<(StatusCode, Json<Value>)> {
    policy::authorize(Operation::AdminSurface, &identity)?;
    let role = match form.role.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(parse_role(raw)?),
    };
    let new = NewIdentity {
        username: form.username,
        password: form.password,
        first_name: form.first_name,
        last_name: form.last_name,
        is_superuser: checkbox(form.is_superuser.as_deref()),
        role,
    };
    let prepared = blocking(move || new.prepare()).await?;
    let created = state.with_conn(|conn| accounts::insert_identity(conn, &prepared))?;
    tracing::info!(by = %identity.username, user = %created.username, "admin created user");
    Ok((StatusCode::CREATED, ok(json!({ "user": created }))))
}

pub async fn set_role(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Path(user_id): Path<String>,
    Form(form): Form<RoleForm>,
) -> AppResult<Json<Value>> {
    policy::authorize(Operation::AdminSurface, &identity)?;
    let role = parse_role(&form.role)?;
    let updated = state.with_conn(|conn| accounts::set_role(conn, &user_id, role))?;
    tracing::info!(by = %identity.username, user = %updated.username, role = %role, "admin set role");
    Ok(ok(json!({ "user": updated })))
}

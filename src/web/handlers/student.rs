use crate::calc;
use crate::error::AppResult;
use crate::policy::{self, Operation};
use crate::web::error::ok;
use crate::web::extract::CurrentUser;
use crate::web::types::AppState;
use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

pub async fn dashboard(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
) -> AppResult<Json<Value>> {
    policy::authorize(Operation::ViewStudentDashboard, &identity)?;
    let reports = state.with_conn(|conn| Ok(calc::student_report(conn, &identity.id)?))?;
    Ok(ok(json!({
        "student": identity,
        "courseData": reports,
    })))
}

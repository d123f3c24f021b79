//! Department-head dashboard. Every POST carries exactly one form, picked
//! by its submit key; the response always carries the whole dashboard so a
//! client can redraw all forms from it.

use crate::accounts::{self, Identity};
use crate::courses;
use crate::error::{AppError, AppResult};
use crate::outcomes;
use crate::policy::{self, Operation, Role};
use crate::web::error::ok;
use crate::web::extract::CurrentUser;
use crate::web::types::AppState;
use axum::extract::State;
use axum::{Form, Json};
use rusqlite::Connection;
use serde_json::{json, Map, Value};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeptForm {
    CourseCreate,
    InstructorAssign,
    StudentAssign,
    ProgramOutcome,
}

impl DeptForm {
    const ALL: [DeptForm; 4] = [
        DeptForm::CourseCreate,
        DeptForm::InstructorAssign,
        DeptForm::StudentAssign,
        DeptForm::ProgramOutcome,
    ];

    fn submit_key(self) -> &'static str {
        match self {
            DeptForm::CourseCreate => "submit_course_create",
            DeptForm::InstructorAssign => "submit_instructor_assign",
            DeptForm::StudentAssign => "submit_student_assign",
            DeptForm::ProgramOutcome => "submit_program_outcome",
        }
    }

    fn name(self) -> &'static str {
        match self {
            DeptForm::CourseCreate => "courseCreate",
            DeptForm::InstructorAssign => "instructorAssign",
            DeptForm::StudentAssign => "studentAssign",
            DeptForm::ProgramOutcome => "programOutcome",
        }
    }

    fn fields(self) -> &'static [&'static str] {
        match self {
            DeptForm::CourseCreate => &["course_code", "course_name"],
            DeptForm::InstructorAssign => &["course", "instructor"],
            DeptForm::StudentAssign => &["course", "student"],
            DeptForm::ProgramOutcome => &["code", "description"],
        }
    }

    fn from_submission(form: &HashMap<String, String>) -> Option<DeptForm> {
        DeptForm::ALL
            .into_iter()
            .find(|f| form.contains_key(f.submit_key()))
    }
}

fn value<'a>(form: &'a HashMap<String, String>, key: &str) -> &'a str {
    form.get(key).map(String::as_str).unwrap_or("")
}

fn choices(people: &[Identity]) -> Vec<Value> {
    people
        .iter()
        .map(|p| json!({ "id": p.id, "label": p.display_name() }))
        .collect()
}

fn blank_form(kind: DeptForm) -> Value {
    let values: Map<String, Value> = kind
        .fields()
        .iter()
        .map(|f| (f.to_string(), Value::String(String::new())))
        .collect();
    json!({ "values": values, "errors": [] })
}

/// `failed` echoes the rejected submission into its own form only.
fn forms(failed: Option<(DeptForm, &HashMap<String, String>, &str)>) -> Value {
    let mut out = Map::new();
    for kind in DeptForm::ALL {
        let mut f = blank_form(kind);
        if let Some((failed_kind, submitted, message)) = failed {
            if failed_kind == kind {
                for field in kind.fields() {
                    f["values"][*field] = Value::String(value(submitted, field).to_string());
                }
                f["errors"] = json!([message]);
            }
        }
        out.insert(kind.name().to_string(), f);
    }
    Value::Object(out)
}

fn dashboard_model(conn: &Connection, forms: Value, notice: Value) -> AppResult<Value> {
    let course_choices: Vec<Value> = courses::list_courses(conn)?
        .iter()
        .map(|c| json!({ "id": c.id, "label": c.label() }))
        .collect();
    Ok(json!({
        "counts": courses::registry_counts(conn)?,
        "courses": course_choices,
        "instructors": choices(&accounts::list_with_role(conn, Role::Instructor)?),
        "students": choices(&accounts::list_with_role(conn, Role::Student)?),
        "programOutcomes": outcomes::list_program_outcomes(conn)?,
        "forms": forms,
        "notice": notice,
    }))
}

fn apply(conn: &Connection, kind: DeptForm, form: &HashMap<String, String>) -> AppResult<String> {
    match kind {
        DeptForm::CourseCreate => {
            let course = courses::create_course(conn, value(form, "course_code"), value(form, "course_name"))?;
            Ok(format!("Course {} created.", course.label()))
        }
        DeptForm::InstructorAssign => {
            let a = courses::assign_instructor(conn, value(form, "course"), value(form, "instructor"))?;
            Ok(assignment_notice(&a))
        }
        DeptForm::StudentAssign => {
            let a = courses::assign_student(conn, value(form, "course"), value(form, "student"))?;
            Ok(assignment_notice(&a))
        }
        DeptForm::ProgramOutcome => {
            let po = outcomes::create_program_outcome(conn, value(form, "code"), value(form, "description"))?;
            Ok(format!("Program outcome {} created.", po.code))
        }
    }
}

fn assignment_notice(a: &courses::Assignment) -> String {
    if a.inserted {
        format!("Assigned {} to {}.", a.member.display_name(), a.course.course_code)
    } else {
        format!(
            "{} is already assigned to {}.",
            a.member.display_name(),
            a.course.course_code
        )
    }
}

pub async fn dashboard(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
) -> AppResult<Json<Value>> {
    policy::authorize(Operation::ViewDepartmentDashboard, &identity)?;
    let model = state.with_conn(|conn| dashboard_model(conn, forms(None), Value::Null))?;
    Ok(ok(model))
}

pub async fn dashboard_submit(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Form(form): Form<HashMap<String, String>>,
) -> AppResult<Json<Value>> {
    policy::authorize(Operation::ManageDepartment, &identity)?;

    let model = state.with_conn(|conn| {
        let Some(kind) = DeptForm::from_submission(&form) else {
            let e = AppError::validation("bad_params", "no recognised submit action");
            let notice = json!({ "level": "error", "message": e.to_string() });
            return Err(e.with_details(dashboard_model(conn, forms(None), notice)?));
        };

        match apply(conn, kind, &form) {
            Ok(message) => {
                let notice = json!({ "level": "success", "message": message });
                dashboard_model(conn, forms(None), notice)
            }
            Err(e) if e.is_validation() => {
                let message = e.to_string();
                let notice = json!({ "level": "error", "message": message });
                let failed = forms(Some((kind, &form, message.as_str())));
                let model = dashboard_model(conn, failed, notice)?;
                Err(e.with_details(model))
            }
            Err(e) => Err(e),
        }
    })?;

    Ok(ok(model))
}

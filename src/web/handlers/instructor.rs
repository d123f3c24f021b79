use crate::courses::{self, Course};
use crate::error::{AppError, AppResult};
use crate::evaluation;
use crate::grades;
use crate::outcomes;
use crate::policy::{self, Operation};
use crate::web::error::ok;
use crate::web::extract::CurrentUser;
use crate::web::types::AppState;
use axum::extract::{Path, State};
use axum::response::Redirect;
use axum::{Form, Json};
use rusqlite::Connection;
use serde_json::{json, Value};

pub async fn dashboard(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
) -> AppResult<Json<Value>> {
    policy::authorize(Operation::ViewInstructorDashboard, &identity)?;
    let courses = state.with_conn(|conn| Ok(courses::courses_taught_by(conn, &identity.id)?))?;
    Ok(ok(json!({
        "instructor": identity,
        "courses": courses,
    })))
}

fn owned_course(conn: &Connection, course_id: &str, instructor_id: &str) -> AppResult<Course> {
    courses::get_course_taught_by(conn, course_id, instructor_id)?.ok_or(AppError::NotFound("course"))
}

fn manage_model(conn: &Connection, course: Course) -> AppResult<Value> {
    let components = evaluation::list_components(conn, &course.id)?;
    let students = courses::students_of(conn, &course.id)?;
    let rows = grades::grade_matrix(conn, &students, &components)?;
    Ok(json!({
        "totalWeight": evaluation::total_weight(&components),
        "outcomes": outcomes::list_learning_outcomes(conn, &course.id)?,
        "instructors": courses::instructors_of(conn, &course.id)?,
        "students": students,
        "components": components,
        "studentGradeRows": rows,
        "course": course,
    }))
}

pub async fn manage_course(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Path(course_id): Path<String>,
) -> AppResult<Json<Value>> {
    policy::authorize(Operation::ManageCourse, &identity)?;
    let model = state.with_conn(|conn| {
        let course = owned_course(conn, &course_id, &identity.id)?;
        manage_model(conn, course)
    })?;
    Ok(ok(model))
}

fn field<'a>(fields: &'a [(String, String)], name: &str) -> &'a str {
    fields
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
        .unwrap_or("")
}

fn has_key(fields: &[(String, String)], name: &str) -> bool {
    fields.iter().any(|(k, _)| k == name)
}

/// One form post per action, selected by its submit key. Every success
/// redirects back to the manage page.
pub async fn manage_course_submit(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Path(course_id): Path<String>,
    Form(fields): Form<Vec<(String, String)>>,
) -> AppResult<Redirect> {
    policy::authorize(Operation::ManageCourse, &identity)?;

    state.with_conn(|conn| {
        let course = owned_course(conn, &course_id, &identity.id)?;
        let result = if has_key(&fields, "submit_evaluation") {
            evaluation::parse_weight(field(&fields, "percentage"))
                .and_then(|weight| {
                    evaluation::create_component(conn, &course.id, field(&fields, "name"), weight)
                })
                .map(|_| ())
        } else if has_key(&fields, "submit_outcome") {
            outcomes::create_learning_outcome(conn, &course.id, field(&fields, "description")).map(|_| ())
        } else if has_key(&fields, "submit_grades") {
            let pairs = fields.iter().map(|(k, v)| (k.as_str(), v.as_str()));
            grades::apply_grade_batch(conn, &course.id, pairs)
                .map(|_| ())
                .map_err(AppError::from)
        } else if has_key(&fields, "submit_syllabus") {
            let syllabus = field(&fields, "syllabus");
            courses::set_syllabus(conn, &course.id, Some(syllabus))
        } else {
            Err(AppError::validation("bad_params", "no recognised submit action"))
        };

        match result {
            Err(e) if e.is_validation() => {
                let submitted: serde_json::Map<String, Value> = fields
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect();
                let mut model = manage_model(conn, course)?;
                model["submitted"] = Value::Object(submitted);
                Err(e.with_details(model))
            }
            other => other,
        }
    })?;

    Ok(Redirect::to(&format!("/course/{}/manage/", course_id)))
}

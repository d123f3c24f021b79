use axum::body::{to_bytes, Body};
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use coursebookd::accounts::{self, session, Identity, NewIdentity};
use coursebookd::courses::{self, Course};
use coursebookd::evaluation::{self, EvaluationComponent};
use coursebookd::grades;
use coursebookd::policy::Role;
use coursebookd::{create_app, db, AppState, Settings};
use rusqlite::Connection;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

struct Harness {
    _dir: TempDir,
    seed: Connection,
    app: Router,
}

fn harness() -> Harness {
    let dir = tempfile::tempdir().expect("tempdir");
    let seed = db::open_db(dir.path()).expect("open seed db");
    let conn = db::open_db(dir.path()).expect("open app db");
    let app = create_app(AppState::new(conn, Settings::default()));
    Harness {
        _dir: dir,
        seed,
        app,
    }
}

fn user(seed: &Connection, username: &str, last_name: &str, role: Role) -> Identity {
    accounts::create_identity(
        seed,
        &NewIdentity {
            username: username.to_string(),
            password: "pw-123456".to_string(),
            last_name: last_name.to_string(),
            role: Some(role),
            ..Default::default()
        },
    )
    .expect("create user")
}

fn cookie_for(seed: &Connection, who: &Identity) -> String {
    let token = session::create_session(seed, &who.id, chrono::Duration::hours(1)).expect("session");
    format!("sessionid={}", token)
}

fn form_body(fields: &[(&str, &str)]) -> String {
    fields
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    cookie: &str,
    form: Option<&[(&str, &str)]>,
) -> (StatusCode, HeaderMap, Value) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::COOKIE, cookie);
    let req = match form {
        Some(fields) => req
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(form_body(fields))),
        None => req.body(Body::empty()),
    }
    .expect("request");
    let resp = app.clone().oneshot(req).await.expect("response");
    let status = resp.status();
    let headers = resp.headers().clone();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.expect("body");
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (status, headers, body)
}

struct Gradebook {
    instructor: Identity,
    course: Course,
    students: Vec<Identity>,
    components: Vec<EvaluationComponent>,
}

fn gradebook(h: &Harness, student_count: usize) -> Gradebook {
    let instructor = user(&h.seed, "prof", "Turing", Role::Instructor);
    let course = courses::create_course(&h.seed, "CSE311", "Software Engineering").expect("course");
    courses::assign_instructor(&h.seed, &course.id, &instructor.id).expect("assign instructor");
    let students: Vec<Identity> = (0..student_count)
        .map(|i| {
            let s = user(&h.seed, &format!("stu{}", i), &format!("Student{}", i), Role::Student);
            courses::assign_student(&h.seed, &course.id, &s.id).expect("enroll");
            s
        })
        .collect();
    let components = vec![
        evaluation::create_component(&h.seed, &course.id, "Midterm", 40).expect("midterm"),
        evaluation::create_component(&h.seed, &course.id, "Final", 60).expect("final"),
    ];
    Gradebook {
        instructor,
        course,
        students,
        components,
    }
}

fn key(student: &Identity, component: &EvaluationComponent) -> String {
    format!("grade_{}_{}", student.id, component.id)
}

fn stored(seed: &Connection, student: &Identity, component: &EvaluationComponent) -> Option<Option<i64>> {
    grades::get_grade(seed, &student.id, &component.id)
        .expect("get grade")
        .map(|g| g.map(|s| s.hundredths()))
}

async fn submit(h: &Harness, gb: &Gradebook, cells: &[(String, String)]) -> StatusCode {
    let cookie = cookie_for(&h.seed, &gb.instructor);
    let mut fields: Vec<(&str, &str)> = vec![("submit_grades", "Save")];
    fields.extend(cells.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    let url = format!("/course/{}/manage/", gb.course.id);
    let (status, _, _) = send(&h.app, Method::POST, &url, &cookie, Some(fields.as_slice())).await;
    status
}

#[tokio::test]
async fn one_bad_cell_does_not_stop_the_rest() {
    let h = harness();
    let gb = gradebook(&h, 5);
    let mut cells = Vec::new();
    for (i, s) in gb.students.iter().enumerate() {
        for c in &gb.components {
            cells.push((key(s, c), format!("{}.5", 70 + i)));
        }
    }
    let bad = cells[3].0.clone();
    // An existing score must survive a bad resubmission untouched.
    submit(&h, &gb, &[(bad.clone(), "64".to_string())]).await;
    cells[3].1 = "abc".to_string();

    assert_eq!(submit(&h, &gb, &cells).await, StatusCode::SEE_OTHER);

    let mut written = 0;
    for s in &gb.students {
        for c in &gb.components {
            if key(s, c) == bad {
                assert_eq!(stored(&h.seed, s, c), Some(Some(6400)));
            } else {
                assert!(matches!(stored(&h.seed, s, c), Some(Some(_))));
                written += 1;
            }
        }
    }
    assert_eq!(written, 9);
    assert_eq!(stored(&h.seed, &gb.students[0], &gb.components[0]), Some(Some(7050)));
}

#[tokio::test]
async fn resubmitting_keeps_only_the_latest_value() {
    let h = harness();
    let gb = gradebook(&h, 1);
    let (s, c) = (&gb.students[0], &gb.components[0]);

    submit(&h, &gb, &[(key(s, c), "80".to_string())]).await;
    submit(&h, &gb, &[(key(s, c), "80.125".to_string())]).await;
    assert_eq!(stored(&h.seed, s, c), Some(Some(8013)));

    // Blank clears the score but keeps the row.
    submit(&h, &gb, &[(key(s, c), "".to_string())]).await;
    assert_eq!(stored(&h.seed, s, c), Some(None));

    let rows: i64 = h
        .seed
        .query_row("SELECT COUNT(*) FROM grades", [], |r| r.get(0))
        .expect("count");
    assert_eq!(rows, 1);
}

#[tokio::test]
async fn negative_and_exponent_scores_are_stored() {
    let h = harness();
    let gb = gradebook(&h, 2);
    let (a, b) = (&gb.students[0], &gb.students[1]);
    let cells = vec![
        (key(a, &gb.components[0]), "-5".to_string()),
        (key(a, &gb.components[1]), "8e1".to_string()),
        (key(b, &gb.components[0]), "-12.5".to_string()),
        (key(b, &gb.components[1]), "-999.99".to_string()),
    ];
    assert_eq!(submit(&h, &gb, &cells).await, StatusCode::SEE_OTHER);

    assert_eq!(stored(&h.seed, a, &gb.components[0]), Some(Some(-500)));
    assert_eq!(stored(&h.seed, a, &gb.components[1]), Some(Some(8000)));
    assert_eq!(stored(&h.seed, b, &gb.components[0]), Some(Some(-1250)));
    assert_eq!(stored(&h.seed, b, &gb.components[1]), Some(Some(-99_999)));
}

#[tokio::test]
async fn cells_outside_the_course_are_skipped() {
    let h = harness();
    let gb = gradebook(&h, 1);
    let enrolled = &gb.students[0];
    let stranger = user(&h.seed, "stranger", "Nobody", Role::Student);
    let other = courses::create_course(&h.seed, "CSE999", "Elsewhere").expect("other");
    let foreign = evaluation::create_component(&h.seed, &other.id, "Essay", 100).expect("essay");
    courses::assign_student(&h.seed, &other.id, &enrolled.id).expect("enroll other");

    let cells = vec![
        (key(&stranger, &gb.components[0]), "90".to_string()),
        (key(enrolled, &foreign), "90".to_string()),
        ("grade_nonsense".to_string(), "90".to_string()),
        (key(enrolled, &gb.components[1]), "1e4".to_string()),
        (key(enrolled, &gb.components[0]), "55".to_string()),
    ];
    assert_eq!(submit(&h, &gb, &cells).await, StatusCode::SEE_OTHER);

    assert_eq!(stored(&h.seed, &stranger, &gb.components[0]), None);
    assert_eq!(stored(&h.seed, enrolled, &foreign), None);
    assert_eq!(stored(&h.seed, enrolled, &gb.components[1]), None);
    assert_eq!(stored(&h.seed, enrolled, &gb.components[0]), Some(Some(5500)));
}

#[tokio::test]
async fn grade_matrix_shows_missing_cells_as_null() {
    let h = harness();
    let gb = gradebook(&h, 2);
    submit(&h, &gb, &[(key(&gb.students[1], &gb.components[1]), "91.25".to_string())]).await;

    let cookie = cookie_for(&h.seed, &gb.instructor);
    let url = format!("/course/{}/manage/", gb.course.id);
    let (status, _, body) = send(&h.app, Method::GET, &url, &cookie, None).await;
    assert_eq!(status, StatusCode::OK);
    let rows = body["result"]["studentGradeRows"].as_array().expect("rows");
    assert_eq!(rows.len(), 2);
    // Ordered by last name: Student0, Student1.
    assert_eq!(rows[0]["studentId"], gb.students[0].id.as_str());
    assert!(rows[0]["grades"][0]["score"].is_null());
    assert!(rows[1]["grades"][0]["score"].is_null());
    assert_eq!(rows[1]["grades"][1]["score"], "91.25");
}

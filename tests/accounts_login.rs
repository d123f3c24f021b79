use axum::body::{to_bytes, Body};
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use coursebookd::accounts::{self, session, NewIdentity};
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
    accounts::create_identity(
        &seed,
        &NewIdentity {
            username: "ada".to_string(),
            password: "correct horse".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            role: Some(Role::Student),
            ..Default::default()
        },
    )
    .expect("create user");
    Harness {
        _dir: dir,
        seed,
        app,
    }
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
    cookie: Option<&str>,
    form: &[(&str, &str)],
) -> (StatusCode, HeaderMap, Value) {
    let mut req = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(c) = cookie {
        req = req.header(header::COOKIE, c);
    }
    let req = req.body(Body::from(form_body(form))).expect("request");
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

fn header_str<'a>(headers: &'a HeaderMap, name: header::HeaderName) -> &'a str {
    headers.get(name).and_then(|v| v.to_str().ok()).unwrap_or("")
}

fn session_count(seed: &Connection) -> i64 {
    seed.query_row("SELECT COUNT(*) FROM sessions", [], |r| r.get(0))
        .expect("count")
}

#[tokio::test]
async fn login_sets_cookie_and_follows_local_next() {
    let h = harness();
    let (status, headers, _) = send(
        &h.app,
        Method::POST,
        "/accounts/login/",
        None,
        &[
            ("username", "ada"),
            ("password", "correct horse"),
            ("next", "/student/dashboard/"),
        ],
    )
    .await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(header_str(&headers, header::LOCATION), "/student/dashboard/");

    let set_cookie = header_str(&headers, header::SET_COOKIE).to_string();
    assert!(set_cookie.starts_with("sessionid="), "{}", set_cookie);
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("SameSite=Lax"));
    assert!(!set_cookie.contains("Secure"));
    assert_eq!(session_count(&h.seed), 1);

    let cookie = set_cookie.split(';').next().expect("cookie pair").to_string();
    let (status, _, body) = send(&h.app, Method::GET, "/student/dashboard/", Some(&cookie), &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["student"]["username"], "ada");
}

#[tokio::test]
async fn offsite_next_falls_back_to_dashboard() {
    let h = harness();
    for next in ["https://evil.example/", "//evil.example/", ""] {
        let (status, headers, _) = send(
            &h.app,
            Method::POST,
            "/accounts/login/",
            None,
            &[("username", "ada"), ("password", "correct horse"), ("next", next)],
        )
        .await;
        assert_eq!(status, StatusCode::SEE_OTHER);
        assert_eq!(header_str(&headers, header::LOCATION), "/dashboard/", "{:?}", next);
    }
}

#[tokio::test]
async fn wrong_password_creates_no_session() {
    let h = harness();
    for (username, password) in [("ada", "wrong"), ("nobody", "correct horse")] {
        let (status, headers, body) = send(
            &h.app,
            Method::POST,
            "/accounts/login/",
            None,
            &[("username", username), ("password", password)],
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "invalid_login");
        assert!(headers.get(header::SET_COOKIE).is_none());
    }
    assert_eq!(session_count(&h.seed), 0);
}

#[tokio::test]
async fn logout_removes_session() {
    let h = harness();
    let user = accounts::find_by_username(&h.seed, "ada")
        .expect("lookup")
        .expect("ada");
    let token = session::create_session(&h.seed, &user.id, chrono::Duration::hours(1)).expect("session");
    let cookie = format!("sessionid={}", token);

    let (status, headers, _) = send(&h.app, Method::POST, "/accounts/logout/", Some(&cookie), &[]).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(header_str(&headers, header::LOCATION), "/accounts/login/");
    assert!(header_str(&headers, header::SET_COOKIE).contains("Max-Age=0"));
    assert_eq!(session_count(&h.seed), 0);

    let (status, headers, _) = send(&h.app, Method::GET, "/student/dashboard/", Some(&cookie), &[]).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert!(header_str(&headers, header::LOCATION).starts_with("/accounts/login/?next="));
}

#[tokio::test]
async fn expired_session_is_anonymous() {
    let h = harness();
    let user = accounts::find_by_username(&h.seed, "ada")
        .expect("lookup")
        .expect("ada");
    let token = session::create_session(&h.seed, &user.id, chrono::Duration::hours(-1)).expect("session");
    let cookie = format!("sessionid={}", token);

    let (status, headers, _) = send(&h.app, Method::GET, "/student/dashboard/", Some(&cookie), &[]).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(
        header_str(&headers, header::LOCATION),
        "/accounts/login/?next=%2Fstudent%2Fdashboard%2F"
    );
    assert_eq!(session_count(&h.seed), 0);
}

#[tokio::test]
async fn login_page_describes_the_form() {
    let h = harness();
    let (status, _, body) = send(
        &h.app,
        Method::GET,
        "/accounts/login/?next=%2Finstructor%2Fdashboard%2F",
        None,
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["next"], "/instructor/dashboard/");
    assert_eq!(body["result"]["action"], "/accounts/login/");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn requests_proceed_while_a_login_is_verifying() {
    let h = harness();
    let user = accounts::find_by_username(&h.seed, "ada")
        .expect("lookup")
        .expect("ada");
    let token = session::create_session(&h.seed, &user.id, chrono::Duration::hours(1)).expect("session");
    let cookie = format!("sessionid={}", token);

    let login = send(
        &h.app,
        Method::POST,
        "/accounts/login/",
        None,
        &[("username", "ada"), ("password", "correct horse")],
    );
    let dashboard = send(&h.app, Method::GET, "/student/dashboard/", Some(&cookie), &[]);
    let ((login_status, _, _), (dash_status, _, _)) = tokio::join!(login, dashboard);

    assert_eq!(login_status, StatusCode::SEE_OTHER);
    assert_eq!(dash_status, StatusCode::OK);
    assert_eq!(session_count(&h.seed), 2);
}

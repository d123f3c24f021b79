use super::handlers::{accounts, admin, core, department, instructor, student};
use super::types::AppState;
use axum::response::Redirect;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::{DefaultMakeSpan, TraceLayer};

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { Redirect::to("/dashboard/") }))
        .route("/health", get(core::health))
        .route("/dashboard/", get(core::dashboard_redirect))
        .route(
            "/accounts/login/",
            get(accounts::login_page).post(accounts::login),
        )
        .route("/accounts/logout/", post(accounts::logout))
        .route("/instructor/dashboard/", get(instructor::dashboard))
        .route(
            "/course/:course_id/manage/",
            get(instructor::manage_course).post(instructor::manage_course_submit),
        )
        .route("/student/dashboard/", get(student::dashboard))
        .route(
            "/department/dashboard/",
            get(department::dashboard).post(department::dashboard_submit),
        )
        .route("/admin/", get(admin::index))
        .route("/admin/users/", post(admin::create_user))
        .route("/admin/users/:user_id/role/", post(admin::set_role))
        .fallback(core::not_found)
        .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::default()))
        .with_state(state)
}

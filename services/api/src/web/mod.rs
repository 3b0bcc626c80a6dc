pub mod access;
pub mod activities;
pub mod assignments;
pub mod auth;
pub mod classrooms;
pub mod middleware;
pub mod mini_projects;
pub mod rest;
pub mod state;
pub mod survey;
pub mod work;

use axum::{
    extract::DefaultBodyLimit,
    http::{header::CONTENT_TYPE, HeaderName, HeaderValue, Method},
    middleware as axum_middleware,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::warn;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use middleware::require_user;
use rest::ApiDoc;
use state::AppState;

/// Builds the complete application: public and protected routes, the
/// shared layers, and the Swagger UI.
pub fn router(app_state: Arc<AppState>) -> Router {
    // Public routes (no identity required)
    let public_routes = Router::new()
        .route("/health", get(rest::health_handler))
        .route("/auth/signup", post(auth::signup_handler))
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/google/url", get(auth::google_url_handler))
        .route("/auth/google/callback", post(auth::google_callback_handler));

    // Protected routes (x-user-id required)
    let protected_routes = Router::new()
        .route(
            "/users/me/survey",
            get(survey::get_survey_handler).put(survey::put_survey_handler),
        )
        .route("/mini-projects/me", get(mini_projects::get_record_handler))
        .route(
            "/mini-projects/me/generation/enable",
            post(mini_projects::enable_generation_handler),
        )
        .route(
            "/mini-projects/me/generation/disable",
            post(mini_projects::disable_generation_handler),
        )
        .route("/mini-projects/me/generate", post(mini_projects::generate_handler))
        .route("/mini-projects/me/current", get(mini_projects::current_projects_handler))
        .route(
            "/mini-projects/me/current/{language}",
            delete(mini_projects::clear_projects_handler),
        )
        .route("/mini-projects/me/weeks/{week}", get(mini_projects::week_projects_handler))
        .route("/mini-projects/me/tasks/progress", put(mini_projects::save_progress_handler))
        .route("/mini-projects/me/tasks/submit", post(mini_projects::submit_task_handler))
        .route(
            "/classrooms",
            get(classrooms::list_classrooms_handler).post(classrooms::create_classroom_handler),
        )
        .route("/classrooms/join", post(classrooms::join_classroom_handler))
        .route("/classrooms/{id}", get(classrooms::get_classroom_handler))
        .route(
            "/classrooms/{id}/students/{student_id}",
            delete(classrooms::remove_student_handler),
        )
        .route(
            "/classrooms/{id}/activities",
            get(activities::list_activities_handler).post(activities::create_activity_handler),
        )
        .route("/activities/{id}/publish", post(activities::publish_activity_handler))
        .route("/activities/{id}/submissions", post(activities::submit_activity_handler))
        .route(
            "/activities/{id}/submissions/me",
            delete(activities::withdraw_activity_handler),
        )
        .route(
            "/activities/{id}/submissions/{student_id}/grade",
            post(activities::grade_activity_handler),
        )
        .route(
            "/classrooms/{id}/assignments",
            get(assignments::list_assignments_handler)
                .post(assignments::create_assignment_handler),
        )
        .route(
            "/assignments/{id}",
            get(assignments::get_assignment_handler)
                .delete(assignments::delete_assignment_handler),
        )
        .route("/assignments/{id}/publish", post(assignments::publish_assignment_handler))
        .route("/assignments/{id}/submissions", post(assignments::submit_assignment_handler))
        .route(
            "/assignments/{id}/submissions/me",
            delete(assignments::withdraw_assignment_handler),
        )
        .route(
            "/assignments/{id}/submissions/{student_id}/grade",
            post(assignments::grade_assignment_handler),
        )
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_user,
        ));

    let api_router = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(app_state.config.max_upload_bytes))
        .layer(cors_layer(&app_state.config.cors_origin))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state);

    Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}

fn cors_layer(origin: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, HeaderName::from_static(middleware::USER_HEADER)]);
    match origin.parse::<HeaderValue>() {
        Ok(origin) => layer.allow_origin(origin),
        Err(_) => {
            warn!(%origin, "CORS_ORIGIN is not a valid header value; cross-origin calls are refused");
            layer
        }
    }
}

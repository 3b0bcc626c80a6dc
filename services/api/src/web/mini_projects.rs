//! services/api/src/web/mini_projects.rs
//!
//! Endpoints over the caller's weekly mini-project record.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::Utc;
use classroom_core::domain::{
    CompletedTask, Language, MiniProjectRecord, ProjectRecommendation, WeekEntry,
};
use classroom_core::ports::VersionedStore;
use classroom_core::workflow::{generate_weekly_projects, review_task_submission, update_versioned};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

use crate::error::ApiResult;
use crate::web::state::{AppState, CurrentUser};

#[derive(Deserialize, IntoParams)]
pub struct LanguageQuery {
    /// `java` or `python` (any case). Both when omitted.
    pub language: Option<String>,
}

impl LanguageQuery {
    fn parse(&self) -> ApiResult<Option<Language>> {
        Ok(self
            .language
            .as_deref()
            .filter(|l| !l.trim().is_empty())
            .map(str::parse::<Language>)
            .transpose()?)
    }
}

#[derive(Deserialize, ToSchema)]
pub struct TaskCodeRequest {
    pub title: String,
    pub code: String,
}

/// GET /mini-projects/me
#[utoipa::path(
    get,
    path = "/mini-projects/me",
    tag = "mini-projects",
    responses(
        (status = 200, description = "The caller's record", body = MiniProjectRecord),
        (status = 404, description = "The caller has no record")
    ),
    params(("x-user-id" = String, Header, description = "The caller's user id."))
)]
pub async fn get_record_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> ApiResult<Json<MiniProjectRecord>> {
    Ok(Json(state.mini_projects.load(user.id).await?))
}

/// POST /mini-projects/me/generation/enable
#[utoipa::path(
    post,
    path = "/mini-projects/me/generation/enable",
    tag = "mini-projects",
    responses((status = 200, description = "Generation enabled", body = MiniProjectRecord)),
    params(("x-user-id" = String, Header, description = "The caller's user id."))
)]
pub async fn enable_generation_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> ApiResult<Json<MiniProjectRecord>> {
    let now = Utc::now();
    let (record, ()) = update_versioned(
        state.mini_projects.as_ref(),
        user.id,
        |r: &mut MiniProjectRecord| {
            r.enable_generation(now);
            Ok(())
        },
    )
    .await?;
    Ok(Json(record))
}

/// POST /mini-projects/me/generation/disable
#[utoipa::path(
    post,
    path = "/mini-projects/me/generation/disable",
    tag = "mini-projects",
    responses((status = 200, description = "Generation disabled", body = MiniProjectRecord)),
    params(("x-user-id" = String, Header, description = "The caller's user id."))
)]
pub async fn disable_generation_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> ApiResult<Json<MiniProjectRecord>> {
    let (record, ()) = update_versioned(
        state.mini_projects.as_ref(),
        user.id,
        |r: &mut MiniProjectRecord| {
            r.disable_generation();
            Ok(())
        },
    )
    .await?;
    Ok(Json(record))
}

/// POST /mini-projects/me/generate - Generate this week's projects
#[utoipa::path(
    post,
    path = "/mini-projects/me/generate",
    tag = "mini-projects",
    responses(
        (status = 201, description = "This week's entry", body = WeekEntry),
        (status = 409, description = "Generation is disabled"),
        (status = 502, description = "The LLM could not be reached")
    ),
    params(("x-user-id" = String, Header, description = "The caller's user id."))
)]
pub async fn generate_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> ApiResult<impl IntoResponse> {
    let entry = generate_weekly_projects(
        state.mini_projects.as_ref(),
        state.generator.as_ref(),
        &user,
        state.generation_settings(),
        Utc::now(),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

/// GET /mini-projects/me/current - Projects of the current week
#[utoipa::path(
    get,
    path = "/mini-projects/me/current",
    tag = "mini-projects",
    params(
        LanguageQuery,
        ("x-user-id" = String, Header, description = "The caller's user id.")
    ),
    responses(
        (status = 200, description = "Projects, empty when the week has none", body = [ProjectRecommendation]),
        (status = 400, description = "Unknown language")
    )
)]
pub async fn current_projects_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Query(query): Query<LanguageQuery>,
) -> ApiResult<Json<Vec<ProjectRecommendation>>> {
    let language = query.parse()?;
    let record = state.mini_projects.load(user.id).await?;
    let projects = match language {
        Some(language) => record.current_week_projects(language).to_vec(),
        None => Language::ALL
            .iter()
            .flat_map(|l| record.current_week_projects(*l).iter().cloned())
            .collect(),
    };
    Ok(Json(projects))
}

/// DELETE /mini-projects/me/current/{language}
#[utoipa::path(
    delete,
    path = "/mini-projects/me/current/{language}",
    tag = "mini-projects",
    params(
        ("language" = String, Path, description = "`java` or `python`."),
        ("x-user-id" = String, Header, description = "The caller's user id.")
    ),
    responses(
        (status = 204, description = "Cleared"),
        (status = 400, description = "Unknown language")
    )
)]
pub async fn clear_projects_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(language): Path<String>,
) -> ApiResult<StatusCode> {
    let language: Language = language.parse()?;
    update_versioned(
        state.mini_projects.as_ref(),
        user.id,
        |r: &mut MiniProjectRecord| {
            r.clear_projects_by_language(language);
            Ok(())
        },
    )
    .await?;
    info!(user_id = %user.id, %language, "Cleared current week's projects");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /mini-projects/me/weeks/{week}
#[utoipa::path(
    get,
    path = "/mini-projects/me/weeks/{week}",
    tag = "mini-projects",
    params(
        ("week" = u32, Path, description = "Week key, iso_year * 100 + iso_week."),
        LanguageQuery,
        ("x-user-id" = String, Header, description = "The caller's user id.")
    ),
    responses((status = 200, description = "Projects of that week", body = [ProjectRecommendation]))
)]
pub async fn week_projects_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(week): Path<u32>,
    Query(query): Query<LanguageQuery>,
) -> ApiResult<Json<Vec<ProjectRecommendation>>> {
    let language = query.parse()?;
    let record = state.mini_projects.load(user.id).await?;
    Ok(Json(record.projects_by_week(week, language)))
}

/// PUT /mini-projects/me/tasks/progress - Save work in progress
#[utoipa::path(
    put,
    path = "/mini-projects/me/tasks/progress",
    tag = "mini-projects",
    request_body = TaskCodeRequest,
    responses(
        (status = 200, description = "Saved", body = CompletedTask),
        (status = 409, description = "The task was already handed in")
    ),
    params(("x-user-id" = String, Header, description = "The caller's user id."))
)]
pub async fn save_progress_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(req): Json<TaskCodeRequest>,
) -> ApiResult<Json<CompletedTask>> {
    let now = Utc::now();
    let (_, task) = update_versioned(
        state.mini_projects.as_ref(),
        user.id,
        |r: &mut MiniProjectRecord| {
            r.save_task_progress(&req.title, req.code.clone(), now)
                .map(Clone::clone)
        },
    )
    .await?;
    Ok(Json(task))
}

/// POST /mini-projects/me/tasks/submit - Hand in a task for AI review
#[utoipa::path(
    post,
    path = "/mini-projects/me/tasks/submit",
    tag = "mini-projects",
    request_body = TaskCodeRequest,
    responses(
        (status = 200, description = "Reviewed and completed", body = CompletedTask),
        (status = 409, description = "The task was already completed"),
        (status = 502, description = "The reviewer could not be reached")
    ),
    params(("x-user-id" = String, Header, description = "The caller's user id."))
)]
pub async fn submit_task_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(req): Json<TaskCodeRequest>,
) -> ApiResult<Json<CompletedTask>> {
    let task = review_task_submission(
        state.mini_projects.as_ref(),
        state.reviewer.as_ref(),
        user.id,
        &req.title,
        req.code,
        Utc::now(),
    )
    .await?;
    Ok(Json(task))
}

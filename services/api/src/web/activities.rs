//! services/api/src/web/activities.rs
//!
//! Classroom activities: created by the teacher, answered by students.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::Utc;
use classroom_core::domain::{Activity, ActivityKind, Submission, WorkDraft};
use classroom_core::ports::VersionedStore;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ApiResult;
use crate::web::access::{ensure_owner, is_owner, view_for, visible_classroom};
use crate::web::state::{AppState, CurrentUser};
use crate::web::work::{self, GradeRequest};

#[derive(Deserialize, ToSchema)]
pub struct CreateActivityRequest {
    pub kind: ActivityKind,
    #[serde(flatten)]
    pub draft: WorkDraft,
}

#[derive(Deserialize, ToSchema)]
pub struct ActivitySubmissionRequest {
    pub content: String,
}

/// POST /classrooms/{id}/activities
#[utoipa::path(
    post,
    path = "/classrooms/{id}/activities",
    tag = "activities",
    request_body = CreateActivityRequest,
    params(
        ("id" = Uuid, Path, description = "Classroom id."),
        ("x-user-id" = String, Header, description = "The caller's user id.")
    ),
    responses(
        (status = 201, description = "Created, unpublished", body = Activity),
        (status = 403, description = "Not the classroom's teacher")
    )
)]
pub async fn create_activity_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(classroom_id): Path<Uuid>,
    Json(req): Json<CreateActivityRequest>,
) -> ApiResult<impl IntoResponse> {
    let classroom = state.classrooms.load(classroom_id).await?;
    ensure_owner(&user, classroom.teacher_id)?;

    let activity = Activity::from_draft(
        classroom.id,
        classroom.teacher_id,
        req.kind,
        req.draft,
        Utc::now(),
    )?;
    state.activities.insert_activity(&activity).await?;
    info!(activity_id = %activity.id, %classroom_id, "Created activity");
    Ok((StatusCode::CREATED, Json(activity)))
}

/// GET /classrooms/{id}/activities
#[utoipa::path(
    get,
    path = "/classrooms/{id}/activities",
    tag = "activities",
    params(
        ("id" = Uuid, Path, description = "Classroom id."),
        ("x-user-id" = String, Header, description = "The caller's user id.")
    ),
    responses((status = 200, description = "Newest first; students see published ones", body = [Activity]))
)]
pub async fn list_activities_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(classroom_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Activity>>> {
    let classroom = visible_classroom(state.classrooms.as_ref(), &user, classroom_id).await?;
    let teaching = is_owner(&user, classroom.teacher_id);
    let activities = state
        .activities
        .list_activities(classroom_id, !teaching)
        .await?
        .into_iter()
        .filter_map(|a| view_for(&user, a))
        .collect();
    Ok(Json(activities))
}

/// POST /activities/{id}/publish
#[utoipa::path(
    post,
    path = "/activities/{id}/publish",
    tag = "activities",
    params(
        ("id" = Uuid, Path, description = "Activity id."),
        ("x-user-id" = String, Header, description = "The caller's user id.")
    ),
    responses((status = 200, description = "Published", body = Activity))
)]
pub async fn publish_activity_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(activity_id): Path<Uuid>,
) -> ApiResult<Json<Activity>> {
    let activity: Activity = work::publish(state.activities.as_ref(), &user, activity_id).await?;
    Ok(Json(activity))
}

/// POST /activities/{id}/submissions
#[utoipa::path(
    post,
    path = "/activities/{id}/submissions",
    tag = "activities",
    request_body = ActivitySubmissionRequest,
    params(
        ("id" = Uuid, Path, description = "Activity id."),
        ("x-user-id" = String, Header, description = "The caller's user id.")
    ),
    responses(
        (status = 201, description = "Handed in", body = Submission),
        (status = 400, description = "Unpublished activity or empty answer"),
        (status = 409, description = "Already handed in")
    )
)]
pub async fn submit_activity_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(activity_id): Path<Uuid>,
    Json(req): Json<ActivitySubmissionRequest>,
) -> ApiResult<impl IntoResponse> {
    let submission = work::hand_in::<Activity, _>(
        state.activities.as_ref(),
        state.classrooms.as_ref(),
        &user,
        activity_id,
        Some(req.content),
        Vec::new(),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(submission)))
}

/// DELETE /activities/{id}/submissions/me - Withdraw an ungraded answer
#[utoipa::path(
    delete,
    path = "/activities/{id}/submissions/me",
    tag = "activities",
    params(
        ("id" = Uuid, Path, description = "Activity id."),
        ("x-user-id" = String, Header, description = "The caller's user id.")
    ),
    responses(
        (status = 204, description = "Withdrawn"),
        (status = 409, description = "Already graded")
    )
)]
pub async fn withdraw_activity_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(activity_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    work::withdraw::<Activity, _>(
        state.activities.as_ref(),
        state.storage.as_ref(),
        &user,
        activity_id,
    )
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /activities/{id}/submissions/{student_id}/grade
#[utoipa::path(
    post,
    path = "/activities/{id}/submissions/{student_id}/grade",
    tag = "activities",
    request_body = GradeRequest,
    params(
        ("id" = Uuid, Path, description = "Activity id."),
        ("student_id" = Uuid, Path, description = "Whose submission."),
        ("x-user-id" = String, Header, description = "The caller's user id.")
    ),
    responses(
        (status = 200, description = "Graded", body = Submission),
        (status = 400, description = "Score above max_score"),
        (status = 404, description = "Submission not found")
    )
)]
pub async fn grade_activity_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path((activity_id, student_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<GradeRequest>,
) -> ApiResult<Json<Submission>> {
    let submission = work::grade::<Activity, _>(
        state.activities.as_ref(),
        state.users.as_ref(),
        state.mailer.as_ref(),
        &user,
        activity_id,
        student_id,
        req,
    )
    .await?;
    Ok(Json(submission))
}

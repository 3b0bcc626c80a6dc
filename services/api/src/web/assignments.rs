//! services/api/src/web/assignments.rs
//!
//! Assignments carry teacher attachments and accept file submissions, so
//! creation and hand-in read buffered multipart bodies.

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::Utc;
use classroom_core::domain::{Assignment, Submission};
use classroom_core::ports::{PortError, VersionedStore};
use classroom_core::workflow::discard_files;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ApiResult;
use crate::web::access::{ensure_owner, is_owner, view_for, visible_classroom};
use crate::web::state::{AppState, CurrentUser};
use crate::web::work::{self, read_form, upload_all, GradeRequest};

#[derive(Serialize, ToSchema)]
pub struct DeleteAssignmentResponse {
    pub deleted: Uuid,
    /// Files the host could not delete; the assignment is gone regardless.
    pub cleanup_errors: Vec<String>,
}

/// POST /classrooms/{id}/assignments
///
/// Multipart fields: `title`, `description`, `due_date` (RFC 3339),
/// `max_score`, `allow_late_submission`, and any number of file parts.
#[utoipa::path(
    post,
    path = "/classrooms/{id}/assignments",
    tag = "assignments",
    request_body(content_type = "multipart/form-data", description = "Assignment fields and attachments."),
    params(
        ("id" = Uuid, Path, description = "Classroom id."),
        ("x-user-id" = String, Header, description = "The caller's user id.")
    ),
    responses(
        (status = 201, description = "Created, unpublished", body = Assignment),
        (status = 400, description = "Invalid fields"),
        (status = 403, description = "Not the classroom's teacher"),
        (status = 502, description = "File host unavailable")
    )
)]
pub async fn create_assignment_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(classroom_id): Path<Uuid>,
    multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let classroom = state.classrooms.load(classroom_id).await?;
    ensure_owner(&user, classroom.teacher_id)?;

    let form = read_form(multipart).await?;
    let draft = form.draft()?;
    let attachments = upload_all(state.storage.as_ref(), form.files).await?;

    let created = Assignment::from_draft(
        classroom.id,
        classroom.teacher_id,
        draft,
        attachments.clone(),
        Utc::now(),
    );
    let assignment = match created {
        Ok(assignment) => assignment,
        Err(e) => {
            discard_files(state.storage.as_ref(), &attachments).await;
            return Err(e.into());
        }
    };
    if let Err(e) = state.assignments.insert_assignment(&assignment).await {
        discard_files(state.storage.as_ref(), &attachments).await;
        return Err(e.into());
    }

    info!(
        assignment_id = %assignment.id,
        %classroom_id,
        attachments = assignment.attachments.len(),
        "Created assignment"
    );
    Ok((StatusCode::CREATED, Json(assignment)))
}

/// GET /classrooms/{id}/assignments
#[utoipa::path(
    get,
    path = "/classrooms/{id}/assignments",
    tag = "assignments",
    params(
        ("id" = Uuid, Path, description = "Classroom id."),
        ("x-user-id" = String, Header, description = "The caller's user id.")
    ),
    responses((status = 200, description = "Newest first; students see published ones", body = [Assignment]))
)]
pub async fn list_assignments_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(classroom_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Assignment>>> {
    let classroom = visible_classroom(state.classrooms.as_ref(), &user, classroom_id).await?;
    let teaching = is_owner(&user, classroom.teacher_id);
    let assignments = state
        .assignments
        .list_assignments(classroom_id, !teaching)
        .await?
        .into_iter()
        .filter_map(|a| view_for(&user, a))
        .collect();
    Ok(Json(assignments))
}

/// GET /assignments/{id}
#[utoipa::path(
    get,
    path = "/assignments/{id}",
    tag = "assignments",
    params(
        ("id" = Uuid, Path, description = "Assignment id."),
        ("x-user-id" = String, Header, description = "The caller's user id.")
    ),
    responses(
        (status = 200, description = "The assignment", body = Assignment),
        (status = 404, description = "No such assignment, or not published yet")
    )
)]
pub async fn get_assignment_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(assignment_id): Path<Uuid>,
) -> ApiResult<Json<Assignment>> {
    let assignment: Assignment = state.assignments.load(assignment_id).await?;
    visible_classroom(state.classrooms.as_ref(), &user, assignment.classroom_id).await?;
    let assignment = view_for(&user, assignment)
        .ok_or_else(|| PortError::NotFound(format!("Assignment {}", assignment_id)))?;
    Ok(Json(assignment))
}

/// POST /assignments/{id}/publish
#[utoipa::path(
    post,
    path = "/assignments/{id}/publish",
    tag = "assignments",
    params(
        ("id" = Uuid, Path, description = "Assignment id."),
        ("x-user-id" = String, Header, description = "The caller's user id.")
    ),
    responses((status = 200, description = "Published", body = Assignment))
)]
pub async fn publish_assignment_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(assignment_id): Path<Uuid>,
) -> ApiResult<Json<Assignment>> {
    let assignment: Assignment =
        work::publish(state.assignments.as_ref(), &user, assignment_id).await?;
    Ok(Json(assignment))
}

/// DELETE /assignments/{id}
///
/// Deleting the files is best-effort; failures are reported, not raised.
#[utoipa::path(
    delete,
    path = "/assignments/{id}",
    tag = "assignments",
    params(
        ("id" = Uuid, Path, description = "Assignment id."),
        ("x-user-id" = String, Header, description = "The caller's user id.")
    ),
    responses(
        (status = 200, description = "Deleted", body = DeleteAssignmentResponse),
        (status = 403, description = "Not the classroom's teacher")
    )
)]
pub async fn delete_assignment_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(assignment_id): Path<Uuid>,
) -> ApiResult<Json<DeleteAssignmentResponse>> {
    let assignment: Assignment = state.assignments.load(assignment_id).await?;
    ensure_owner(&user, assignment.teacher_id)?;
    state.assignments.delete_assignment(assignment_id).await?;

    let files: Vec<_> = assignment
        .attachments
        .iter()
        .chain(assignment.submissions.iter().flat_map(|s| s.attachments.iter()))
        .cloned()
        .collect();
    let cleanup_errors = discard_files(state.storage.as_ref(), &files).await;
    if !cleanup_errors.is_empty() {
        warn!(%assignment_id, failed = cleanup_errors.len(), "Some assignment files were left behind");
    }
    info!(%assignment_id, "Deleted assignment");

    Ok(Json(DeleteAssignmentResponse {
        deleted: assignment_id,
        cleanup_errors,
    }))
}

/// POST /assignments/{id}/submissions
///
/// Multipart fields: optional `content` text and any number of file parts.
#[utoipa::path(
    post,
    path = "/assignments/{id}/submissions",
    tag = "assignments",
    request_body(content_type = "multipart/form-data", description = "Answer text and files."),
    params(
        ("id" = Uuid, Path, description = "Assignment id."),
        ("x-user-id" = String, Header, description = "The caller's user id.")
    ),
    responses(
        (status = 201, description = "Handed in", body = Submission),
        (status = 400, description = "Unpublished assignment or empty submission"),
        (status = 409, description = "Already handed in")
    )
)]
pub async fn submit_assignment_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(assignment_id): Path<Uuid>,
    multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let form = read_form(multipart).await?;
    let content = form.text("content");
    work::ensure_can_hand_in::<Assignment, _>(
        state.assignments.as_ref(),
        state.classrooms.as_ref(),
        &user,
        assignment_id,
    )
    .await?;
    let attachments = upload_all(state.storage.as_ref(), form.files).await?;

    let result = work::hand_in::<Assignment, _>(
        state.assignments.as_ref(),
        state.classrooms.as_ref(),
        &user,
        assignment_id,
        content,
        attachments.clone(),
    )
    .await;
    match result {
        Ok(submission) => Ok((StatusCode::CREATED, Json(submission))),
        Err(e) => {
            discard_files(state.storage.as_ref(), &attachments).await;
            Err(e.into())
        }
    }
}

/// DELETE /assignments/{id}/submissions/me - Withdraw an ungraded submission
#[utoipa::path(
    delete,
    path = "/assignments/{id}/submissions/me",
    tag = "assignments",
    params(
        ("id" = Uuid, Path, description = "Assignment id."),
        ("x-user-id" = String, Header, description = "The caller's user id.")
    ),
    responses(
        (status = 204, description = "Withdrawn"),
        (status = 409, description = "Already graded")
    )
)]
pub async fn withdraw_assignment_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(assignment_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let cleanup_errors = work::withdraw::<Assignment, _>(
        state.assignments.as_ref(),
        state.storage.as_ref(),
        &user,
        assignment_id,
    )
    .await?;
    if !cleanup_errors.is_empty() {
        warn!(%assignment_id, failed = cleanup_errors.len(), "Some submission files were left behind");
    }
    Ok(StatusCode::NO_CONTENT)
}

/// POST /assignments/{id}/submissions/{student_id}/grade
#[utoipa::path(
    post,
    path = "/assignments/{id}/submissions/{student_id}/grade",
    tag = "assignments",
    request_body = GradeRequest,
    params(
        ("id" = Uuid, Path, description = "Assignment id."),
        ("student_id" = Uuid, Path, description = "Whose submission."),
        ("x-user-id" = String, Header, description = "The caller's user id.")
    ),
    responses(
        (status = 200, description = "Graded", body = Submission),
        (status = 400, description = "Score above max_score"),
        (status = 404, description = "Submission not found")
    )
)]
pub async fn grade_assignment_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path((assignment_id, student_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<GradeRequest>,
) -> ApiResult<Json<Submission>> {
    let submission = work::grade::<Assignment, _>(
        state.assignments.as_ref(),
        state.users.as_ref(),
        state.mailer.as_ref(),
        &user,
        assignment_id,
        student_id,
        req,
    )
    .await?;
    Ok(Json(submission))
}

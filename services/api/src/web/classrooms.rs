//! services/api/src/web/classrooms.rs
//!
//! Classroom creation, listing and membership endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::Utc;
use classroom_core::domain::{Classroom, Role};
use classroom_core::ports::PortError;
use classroom_core::workflow::{create_classroom, join_classroom, update_versioned};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ApiResult;
use crate::web::access::{ensure_owner, require_teacher, visible_classroom};
use crate::web::state::{AppState, CurrentUser};

#[derive(Deserialize, ToSchema)]
pub struct CreateClassroomRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Deserialize, ToSchema)]
pub struct JoinClassroomRequest {
    pub code: String,
}

/// POST /classrooms
#[utoipa::path(
    post,
    path = "/classrooms",
    tag = "classrooms",
    request_body = CreateClassroomRequest,
    responses(
        (status = 201, description = "Classroom created", body = Classroom),
        (status = 403, description = "Caller is not a teacher"),
        (status = 409, description = "No free join code was found")
    ),
    params(("x-user-id" = String, Header, description = "The caller's user id."))
)]
pub async fn create_classroom_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(req): Json<CreateClassroomRequest>,
) -> ApiResult<impl IntoResponse> {
    require_teacher(&user)?;
    let classroom = create_classroom(
        state.classrooms.as_ref(),
        user.id,
        &req.name,
        req.description,
        Utc::now(),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(classroom)))
}

/// GET /classrooms - Classrooms the caller teaches or attends
#[utoipa::path(
    get,
    path = "/classrooms",
    tag = "classrooms",
    responses((status = 200, description = "Newest first", body = [Classroom])),
    params(("x-user-id" = String, Header, description = "The caller's user id."))
)]
pub async fn list_classrooms_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> ApiResult<Json<Vec<Classroom>>> {
    let classrooms = if user.role.can_teach() {
        state.classrooms.list_by_teacher(user.id).await?
    } else {
        state.classrooms.list_for_student(user.id).await?
    };
    Ok(Json(classrooms))
}

/// GET /classrooms/{id}
#[utoipa::path(
    get,
    path = "/classrooms/{id}",
    tag = "classrooms",
    params(
        ("id" = Uuid, Path, description = "Classroom id."),
        ("x-user-id" = String, Header, description = "The caller's user id.")
    ),
    responses(
        (status = 200, description = "The classroom", body = Classroom),
        (status = 403, description = "Caller is not a member"),
        (status = 404, description = "No such classroom")
    )
)]
pub async fn get_classroom_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(classroom_id): Path<Uuid>,
) -> ApiResult<Json<Classroom>> {
    let classroom = visible_classroom(state.classrooms.as_ref(), &user, classroom_id).await?;
    Ok(Json(classroom))
}

/// POST /classrooms/join - Enroll with a join code
#[utoipa::path(
    post,
    path = "/classrooms/join",
    tag = "classrooms",
    request_body = JoinClassroomRequest,
    responses(
        (status = 200, description = "Enrolled (or already enrolled)", body = Classroom),
        (status = 403, description = "Only students can join"),
        (status = 404, description = "Unknown code")
    ),
    params(("x-user-id" = String, Header, description = "The caller's user id."))
)]
pub async fn join_classroom_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(req): Json<JoinClassroomRequest>,
) -> ApiResult<Json<Classroom>> {
    if user.role != Role::Student {
        return Err(PortError::Forbidden("Only students can join classrooms".to_string()).into());
    }
    let classroom =
        join_classroom(state.classrooms.as_ref(), user.id, &req.code, Utc::now()).await?;
    Ok(Json(classroom))
}

/// DELETE /classrooms/{id}/students/{student_id}
///
/// The teacher removes a student, or a student leaves.
#[utoipa::path(
    delete,
    path = "/classrooms/{id}/students/{student_id}",
    tag = "classrooms",
    params(
        ("id" = Uuid, Path, description = "Classroom id."),
        ("student_id" = Uuid, Path, description = "Student to remove."),
        ("x-user-id" = String, Header, description = "The caller's user id.")
    ),
    responses(
        (status = 204, description = "Removed (or was not enrolled)"),
        (status = 403, description = "Not the teacher or the student")
    )
)]
pub async fn remove_student_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path((classroom_id, student_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    let (_, removed) = update_versioned(
        state.classrooms.as_ref(),
        classroom_id,
        |c: &mut Classroom| {
            if user.id != student_id {
                ensure_owner(&user, c.teacher_id)?;
            }
            Ok(c.remove_student(student_id))
        },
    )
    .await?;
    if removed {
        info!(%classroom_id, %student_id, "Student removed from classroom");
    }
    Ok(StatusCode::NO_CONTENT)
}

//! services/api/src/web/rest.rs
//!
//! The master definition for the OpenAPI specification, plus the
//! unauthenticated health check.

use axum::response::Json;
use serde::Serialize;
use utoipa::{OpenApi, ToSchema};

use crate::web::{activities, assignments, auth, classrooms, mini_projects, survey, work};
use classroom_core::domain::{
    Activity, ActivityKind, Assignment, AuthProvider, Classroom, CompletedTask, ExperienceLevel,
    Language, Membership, MiniProjectRecord, ProjectRecommendation, ResourceType, Role,
    SkillsSurvey, StoredFile, Submission, SubmissionStatus, TaskStatus, User, WeekEntry,
    WorkDraft,
};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        health_handler,
        auth::signup_handler,
        auth::login_handler,
        auth::google_url_handler,
        auth::google_callback_handler,
        survey::get_survey_handler,
        survey::put_survey_handler,
        mini_projects::get_record_handler,
        mini_projects::enable_generation_handler,
        mini_projects::disable_generation_handler,
        mini_projects::generate_handler,
        mini_projects::current_projects_handler,
        mini_projects::clear_projects_handler,
        mini_projects::week_projects_handler,
        mini_projects::save_progress_handler,
        mini_projects::submit_task_handler,
        classrooms::create_classroom_handler,
        classrooms::list_classrooms_handler,
        classrooms::get_classroom_handler,
        classrooms::join_classroom_handler,
        classrooms::remove_student_handler,
        activities::create_activity_handler,
        activities::list_activities_handler,
        activities::publish_activity_handler,
        activities::submit_activity_handler,
        activities::withdraw_activity_handler,
        activities::grade_activity_handler,
        assignments::create_assignment_handler,
        assignments::list_assignments_handler,
        assignments::get_assignment_handler,
        assignments::publish_assignment_handler,
        assignments::delete_assignment_handler,
        assignments::submit_assignment_handler,
        assignments::withdraw_assignment_handler,
        assignments::grade_assignment_handler,
    ),
    components(
        schemas(
            HealthResponse,
            auth::SignupRequest,
            auth::LoginRequest,
            auth::GoogleUrlResponse,
            auth::GoogleCallbackRequest,
            auth::GoogleSignInResponse,
            survey::SurveyRequest,
            mini_projects::TaskCodeRequest,
            classrooms::CreateClassroomRequest,
            classrooms::JoinClassroomRequest,
            activities::CreateActivityRequest,
            activities::ActivitySubmissionRequest,
            assignments::DeleteAssignmentResponse,
            work::GradeRequest,
            User, Role, AuthProvider, SkillsSurvey, ExperienceLevel, Language,
            MiniProjectRecord, WeekEntry, ProjectRecommendation, CompletedTask, TaskStatus,
            Classroom, Membership, Activity, ActivityKind, Assignment, WorkDraft,
            Submission, SubmissionStatus, StoredFile, ResourceType,
        )
    ),
    tags(
        (name = "auth", description = "Accounts and sign-in."),
        (name = "survey", description = "The skills survey that steers project generation."),
        (name = "mini-projects", description = "Weekly AI-generated practice projects."),
        (name = "classrooms", description = "Classrooms and enrollment by join code."),
        (name = "activities", description = "Text activities inside a classroom."),
        (name = "assignments", description = "Assignments with file attachments."),
    )
)]
pub struct ApiDoc;

//=========================================================================================
// Health
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    status: String,
    version: String,
}

/// GET /health
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "The service is up", body = HealthResponse))
)]
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

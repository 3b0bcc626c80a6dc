//! services/api/src/web/survey.rs

use axum::{extract::State, Extension, Json};
use chrono::Utc;
use classroom_core::domain::{ExperienceLevel, Language, SkillsSurvey};
use classroom_core::ports::PortError;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;

use crate::error::ApiResult;
use crate::web::state::{AppState, CurrentUser};

#[derive(Deserialize, ToSchema)]
pub struct SurveyRequest {
    pub languages: Vec<String>,
    pub experience: ExperienceLevel,
    #[serde(default)]
    pub interests: Vec<String>,
    pub weekly_hours: u8,
}

/// GET /users/me/survey
#[utoipa::path(
    get,
    path = "/users/me/survey",
    tag = "survey",
    responses(
        (status = 200, description = "The caller's survey", body = SkillsSurvey),
        (status = 404, description = "No survey submitted yet")
    ),
    params(("x-user-id" = String, Header, description = "The caller's user id."))
)]
pub async fn get_survey_handler(
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> ApiResult<Json<SkillsSurvey>> {
    let survey = user
        .survey
        .ok_or_else(|| PortError::NotFound("No survey submitted yet".to_string()))?;
    Ok(Json(survey))
}

/// PUT /users/me/survey
#[utoipa::path(
    put,
    path = "/users/me/survey",
    tag = "survey",
    request_body = SurveyRequest,
    responses(
        (status = 200, description = "Survey saved", body = SkillsSurvey),
        (status = 400, description = "Invalid answers")
    ),
    params(("x-user-id" = String, Header, description = "The caller's user id."))
)]
pub async fn put_survey_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(req): Json<SurveyRequest>,
) -> ApiResult<Json<SkillsSurvey>> {
    let mut languages: Vec<Language> = Vec::new();
    for raw in &req.languages {
        let language = raw.parse::<Language>()?;
        if !languages.contains(&language) {
            languages.push(language);
        }
    }

    let survey = SkillsSurvey {
        languages,
        experience: req.experience,
        interests: req
            .interests
            .into_iter()
            .map(|i| i.trim().to_string())
            .collect(),
        weekly_hours: req.weekly_hours,
        submitted_at: Utc::now(),
    };
    survey.validate()?;

    state.users.save_survey(user.id, &survey).await?;
    info!(user_id = %user.id, "Saved skills survey");
    Ok(Json(survey))
}

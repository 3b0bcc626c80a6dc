//! crates/classroom_core/src/domain.rs
//!
//! Defines the core data structures for the platform.
//! These structs carry no storage or transport logic; aggregates derive serde
//! only so adapters can persist them as documents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::ports::PortError;

//=========================================================================================
// Shared Enumerations
//=========================================================================================

/// The programming languages mini-projects are generated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Java,
    Python,
}

impl Language {
    pub const ALL: [Language; 2] = [Language::Java, Language::Python];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Java => "java",
            Self::Python => "python",
        }
    }
}

impl FromStr for Language {
    type Err = PortError;

    /// Case-insensitive; anything other than java/python is rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "java" => Ok(Self::Java),
            "python" => Ok(Self::Python),
            _ => Err(PortError::Validation(format!(
                "Unsupported language '{}', expected 'java' or 'python'",
                s
            ))),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Teacher,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Teacher => "teacher",
            Self::Admin => "admin",
        }
    }

    /// Teachers and admins may manage classrooms and grade work.
    pub fn can_teach(&self) -> bool {
        matches!(self, Self::Teacher | Self::Admin)
    }
}

impl FromStr for Role {
    type Err = PortError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(Self::Student),
            "teacher" => Ok(Self::Teacher),
            "admin" => Ok(Self::Admin),
            _ => Err(PortError::Validation(format!("Unknown role '{}'", s))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum AuthProvider {
    Password,
    Google,
}

impl AuthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Password => "password",
            Self::Google => "google",
        }
    }
}

impl FromStr for AuthProvider {
    type Err = PortError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "password" => Ok(Self::Password),
            "google" => Ok(Self::Google),
            _ => Err(PortError::Validation(format!("Unknown provider '{}'", s))),
        }
    }
}

//=========================================================================================
// Users and the Skills Survey
//=========================================================================================

/// Represents a user - used throughout the app.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub provider: AuthProvider,
    pub provider_id: Option<String>,
    pub survey: Option<SkillsSurvey>,
    pub created_at: DateTime<Utc>,
}

// Only used internally for login - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user_id: Uuid,
    pub email: String,
    pub password_hash: Option<String>,
}

/// Everything needed to create an account.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub provider: AuthProvider,
    pub provider_id: Option<String>,
    pub password_hash: Option<String>,
}

/// Where to send the browser to start an external sign-in, and the opaque
/// `state` the provider hands back to the callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRedirect {
    pub url: String,
    pub state: String,
}

/// Profile returned by an external identity provider after a code exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityProfile {
    pub email: String,
    pub display_name: String,
    pub provider_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum ExperienceLevel {
    Beginner,
    Intermediate,
    Advanced,
}

impl ExperienceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Beginner => "beginner",
            Self::Intermediate => "intermediate",
            Self::Advanced => "advanced",
        }
    }
}

/// A student's self-reported skills, used to tailor generated projects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SkillsSurvey {
    pub languages: Vec<Language>,
    pub experience: ExperienceLevel,
    pub interests: Vec<String>,
    pub weekly_hours: u8,
    pub submitted_at: DateTime<Utc>,
}

impl SkillsSurvey {
    pub const MAX_INTERESTS: usize = 10;
    pub const MAX_INTEREST_LEN: usize = 64;

    pub fn validate(&self) -> Result<(), PortError> {
        if self.languages.is_empty() {
            return Err(PortError::Validation(
                "Survey must name at least one language".to_string(),
            ));
        }
        if self.interests.len() > Self::MAX_INTERESTS {
            return Err(PortError::Validation(format!(
                "At most {} interests are allowed",
                Self::MAX_INTERESTS
            )));
        }
        if let Some(interest) = self
            .interests
            .iter()
            .find(|i| i.trim().is_empty() || i.chars().count() > Self::MAX_INTEREST_LEN)
        {
            return Err(PortError::Validation(format!(
                "Invalid interest '{}': must be 1-{} characters",
                interest,
                Self::MAX_INTEREST_LEN
            )));
        }
        if !(1..=40).contains(&self.weekly_hours) {
            return Err(PortError::Validation(
                "weekly_hours must be between 1 and 40".to_string(),
            ));
        }
        Ok(())
    }
}

//=========================================================================================
// Mini-Projects
//=========================================================================================

/// A single AI-recommended coding project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ProjectRecommendation {
    pub title: String,
    pub description: String,
    pub language: Language,
    pub requirements: String,
    pub sample_output: String,
    pub rubric: String,
    pub is_ai_generated: bool,
    pub generated_at: DateTime<Utc>,
    pub week_number: Option<u32>,
    pub created_at: DateTime<Utc>,
}

/// One week's bucket of recommendations, partitioned by language.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct WeekEntry {
    pub week_number: u32,
    pub week_start_date: DateTime<Utc>,
    pub week_end_date: DateTime<Utc>,
    #[serde(default)]
    pub java_projects: Vec<ProjectRecommendation>,
    #[serde(default)]
    pub python_projects: Vec<ProjectRecommendation>,
    pub generated_at: DateTime<Utc>,
}

impl WeekEntry {
    pub fn projects(&self, language: Language) -> &[ProjectRecommendation] {
        match language {
            Language::Java => &self.java_projects,
            Language::Python => &self.python_projects,
        }
    }

    pub fn projects_mut(&mut self, language: Language) -> &mut Vec<ProjectRecommendation> {
        match language {
            Language::Java => &mut self.java_projects,
            Language::Python => &mut self.python_projects,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Paused,
    Submitted,
    Completed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Paused => "paused",
            Self::Submitted => "submitted",
            Self::Completed => "completed",
        }
    }
}

/// A mini-project task a student has worked on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CompletedTask {
    pub title: String,
    pub score: Option<u8>,
    pub code: String,
    pub ai_feedback: Option<String>,
    pub status: TaskStatus,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_saved_at: DateTime<Utc>,
}

/// Per-user container for completed tasks and weekly recommendation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct MiniProjectRecord {
    pub user_id: Uuid,
    #[serde(default)]
    pub revision: i64,
    #[serde(default)]
    pub completed_tasks: Vec<CompletedTask>,
    pub week_start_date: DateTime<Utc>,
    #[serde(default)]
    pub last_week_completed_count: u32,
    #[serde(default)]
    pub generation_enabled: bool,
    pub last_generation_date: Option<DateTime<Utc>>,
    pub current_week_number: Option<u32>,
    #[serde(default)]
    pub weekly_project_history: Vec<WeekEntry>,
    /// Flat recommendation list from the pre-history record shape.
    #[serde(default, alias = "recommended_projects", skip_serializing_if = "Vec::is_empty")]
    pub legacy_recommendations: Vec<ProjectRecommendation>,
}

impl MiniProjectRecord {
    /// An empty record, as created alongside a new student account.
    pub fn new(user_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            revision: 0,
            completed_tasks: Vec::new(),
            week_start_date: crate::week::week_start(now),
            last_week_completed_count: 0,
            generation_enabled: false,
            last_generation_date: None,
            current_week_number: None,
            weekly_project_history: Vec::new(),
            legacy_recommendations: Vec::new(),
        }
    }
}

/// Input for the project-generation port.
#[derive(Debug, Clone)]
pub struct ProjectGenerationRequest {
    pub language: Language,
    pub count: usize,
    pub experience: ExperienceLevel,
    pub interests: Vec<String>,
    pub avoid_titles: Vec<String>,
}

/// Input for the code-feedback port.
#[derive(Debug, Clone)]
pub struct CodeReviewRequest {
    pub title: String,
    pub language: Option<Language>,
    pub requirements: Option<String>,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeFeedback {
    pub score: u8,
    pub feedback: String,
}

//=========================================================================================
// Classrooms
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Membership {
    pub student_id: Uuid,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Classroom {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub code: String,
    pub teacher_id: Uuid,
    #[serde(default)]
    pub students: Vec<Membership>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub revision: i64,
}

//=========================================================================================
// Activities, Assignments and Submissions
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Coding,
    Quiz,
    Reading,
    Discussion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Submitted,
    Graded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Submission {
    pub student_id: Uuid,
    pub content: Option<String>,
    #[serde(default)]
    pub attachments: Vec<StoredFile>,
    pub submitted_at: DateTime<Utc>,
    /// Informational only; `allow_late_submission` is not enforced.
    pub late: bool,
    pub status: SubmissionStatus,
    pub score: Option<u32>,
    pub feedback: Option<String>,
    pub graded_at: Option<DateTime<Utc>>,
}

/// Teacher-supplied fields shared by activities and assignments.
#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct WorkDraft {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub due_date: Option<DateTime<Utc>>,
    pub max_score: u32,
    #[serde(default)]
    pub allow_late_submission: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Activity {
    pub id: Uuid,
    pub classroom_id: Uuid,
    pub teacher_id: Uuid,
    pub title: String,
    pub description: String,
    pub kind: ActivityKind,
    pub due_date: Option<DateTime<Utc>>,
    pub max_score: u32,
    pub published: bool,
    pub allow_late_submission: bool,
    #[serde(default)]
    pub submissions: Vec<Submission>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub revision: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Assignment {
    pub id: Uuid,
    pub classroom_id: Uuid,
    pub teacher_id: Uuid,
    pub title: String,
    pub description: String,
    pub due_date: Option<DateTime<Utc>>,
    pub max_score: u32,
    pub published: bool,
    pub allow_late_submission: bool,
    #[serde(default)]
    pub attachments: Vec<StoredFile>,
    #[serde(default)]
    pub submissions: Vec<Submission>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub revision: i64,
}

//=========================================================================================
// Files and Mail
//=========================================================================================

/// How the file host should treat an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Raw,
    Image,
    Video,
    Auto,
}

impl ResourceType {
    /// Documents are stored raw; images and video keep their media type.
    pub fn from_mime(content_type: &str) -> Self {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        let is_document = mime == "application/pdf"
            || mime == "application/msword"
            || mime.starts_with("application/vnd.openxmlformats-officedocument")
            || mime.starts_with("application/vnd.ms-")
            || mime == "application/rtf"
            || mime == "application/zip"
            || mime == "text/csv"
            || mime.starts_with("text/");

        if is_document {
            Self::Raw
        } else if mime.starts_with("video/") {
            Self::Video
        } else if mime.starts_with("image/") {
            Self::Image
        } else {
            Self::Auto
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Image => "image",
            Self::Video => "video",
            Self::Auto => "auto",
        }
    }
}

/// A file held by the external file host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct StoredFile {
    pub public_id: String,
    pub url: String,
    pub resource_type: ResourceType,
    pub file_name: String,
    pub content_type: String,
    pub bytes: u64,
}

/// A buffered upload on its way to the file host.
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub file_name: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_parses_case_insensitively_and_rejects_others() {
        assert_eq!("JAVA".parse::<Language>().unwrap(), Language::Java);
        assert_eq!(" Python ".parse::<Language>().unwrap(), Language::Python);
        assert!(matches!(
            "rust".parse::<Language>(),
            Err(PortError::Validation(_))
        ));
    }

    #[test]
    fn roles_and_providers_parse_their_stored_names() {
        for role in [Role::Student, Role::Teacher, Role::Admin] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert_eq!("google".parse::<AuthProvider>().unwrap(), AuthProvider::Google);
        assert!(matches!("Teacher".parse::<Role>(), Err(PortError::Validation(_))));
        assert!(matches!("github".parse::<AuthProvider>(), Err(PortError::Validation(_))));
    }

    #[test]
    fn resource_type_follows_mime() {
        assert_eq!(ResourceType::from_mime("application/pdf"), ResourceType::Raw);
        assert_eq!(
            ResourceType::from_mime(
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            ),
            ResourceType::Raw
        );
        assert_eq!(ResourceType::from_mime("text/plain; charset=utf-8"), ResourceType::Raw);
        assert_eq!(ResourceType::from_mime("video/mp4"), ResourceType::Video);
        assert_eq!(ResourceType::from_mime("IMAGE/PNG"), ResourceType::Image);
        assert_eq!(ResourceType::from_mime("application/octet-stream"), ResourceType::Auto);
    }

    #[test]
    fn survey_validation_rejects_bad_hours() {
        let survey = SkillsSurvey {
            languages: vec![Language::Python],
            experience: ExperienceLevel::Beginner,
            interests: vec!["games".to_string()],
            weekly_hours: 0,
            submitted_at: Utc::now(),
        };
        assert!(matches!(survey.validate(), Err(PortError::Validation(_))));

        let ok = SkillsSurvey { weekly_hours: 5, ..survey };
        assert!(ok.validate().is_ok());
    }
}

//! crates/classroom_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the platform's core logic.
//! Repositories and external integrations are reached only through these
//! traits, so the core stays independent of Postgres, Cloudinary, Gmail and
//! the LLM host.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{
    Activity, Assignment, AuthorizationRedirect, Classroom, CodeFeedback, CodeReviewRequest,
    FileUpload, IdentityProfile, MiniProjectRecord, NewAccount, OutgoingMail,
    ProjectGenerationRequest, ProjectRecommendation, ResourceType, SkillsSurvey, StoredFile, User,
    UserCredentials,
};

//=========================================================================================
// Port Error and Result Types
//=========================================================================================

/// The error taxonomy shared by every port and domain operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    /// A compare-and-swap save lost against a concurrent writer.
    #[error("Concurrent modification: {0}")]
    StaleRevision(String),
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("External service error: {0}")]
    ExternalService(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Persistence Ports
//=========================================================================================

/// Load and compare-and-swap save for a revisioned aggregate.
///
/// `store` succeeds only when the persisted revision equals `document`'s
/// revision; the returned value carries the incremented revision. A mismatch
/// yields `PortError::StaleRevision`.
#[async_trait]
pub trait VersionedStore<T>: Send + Sync
where
    T: Send + Sync + 'static,
{
    async fn load(&self, id: Uuid) -> PortResult<T>;

    async fn store(&self, document: &T) -> PortResult<T>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Fails with `Conflict` when the e-mail is already registered.
    async fn create_user(&self, account: NewAccount) -> PortResult<User>;

    async fn get_user(&self, user_id: Uuid) -> PortResult<User>;

    async fn find_user_by_email(&self, email: &str) -> PortResult<Option<User>>;

    async fn get_credentials(&self, email: &str) -> PortResult<UserCredentials>;

    async fn save_survey(&self, user_id: Uuid, survey: &SkillsSurvey) -> PortResult<()>;
}

/// Mini-project records are keyed by their owner's user id.
#[async_trait]
pub trait MiniProjectRepository: VersionedStore<MiniProjectRecord> {
    /// Fails with `Conflict` when the user already has a record.
    async fn insert_mini_project(&self, record: &MiniProjectRecord) -> PortResult<()>;
}

#[async_trait]
pub trait ClassroomRepository: VersionedStore<Classroom> {
    /// Fails with `Conflict` when the classroom code is taken.
    async fn insert_classroom(&self, classroom: &Classroom) -> PortResult<()>;

    async fn find_by_code(&self, code: &str) -> PortResult<Option<Classroom>>;

    /// Newest first.
    async fn list_by_teacher(&self, teacher_id: Uuid) -> PortResult<Vec<Classroom>>;

    async fn list_for_student(&self, student_id: Uuid) -> PortResult<Vec<Classroom>>;
}

#[async_trait]
pub trait ActivityRepository: VersionedStore<Activity> {
    async fn insert_activity(&self, activity: &Activity) -> PortResult<()>;

    async fn list_activities(
        &self,
        classroom_id: Uuid,
        published_only: bool,
    ) -> PortResult<Vec<Activity>>;
}

#[async_trait]
pub trait AssignmentRepository: VersionedStore<Assignment> {
    async fn insert_assignment(&self, assignment: &Assignment) -> PortResult<()>;

    async fn list_assignments(
        &self,
        classroom_id: Uuid,
        published_only: bool,
    ) -> PortResult<Vec<Assignment>>;

    async fn delete_assignment(&self, assignment_id: Uuid) -> PortResult<()>;
}

//=========================================================================================
// External Service Ports
//=========================================================================================

#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Uploads a buffered file and returns where the host keeps it.
    async fn upload(&self, file: FileUpload) -> PortResult<StoredFile>;

    async fn delete(&self, public_id: &str, resource_type: ResourceType) -> PortResult<()>;
}

#[async_trait]
pub trait MailService: Send + Sync {
    async fn send(&self, mail: OutgoingMail) -> PortResult<()>;
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Starts a sign-in. The provider remembers the returned `state` until
    /// it is redeemed by `exchange_code`.
    fn begin_sign_in(&self) -> PortResult<AuthorizationRedirect>;

    /// Exchanges an authorization code for the user's verified profile.
    /// Fails with `Unauthorized` when `state` was not issued by
    /// `begin_sign_in` or has already been used.
    async fn exchange_code(&self, code: &str, state: &str) -> PortResult<IdentityProfile>;
}

#[async_trait]
pub trait ProjectGenerationService: Send + Sync {
    async fn generate_projects(
        &self,
        request: &ProjectGenerationRequest,
    ) -> PortResult<Vec<ProjectRecommendation>>;
}

#[async_trait]
pub trait CodeFeedbackService: Send + Sync {
    async fn review_code(&self, request: &CodeReviewRequest) -> PortResult<CodeFeedback>;
}

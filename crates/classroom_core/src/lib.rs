pub mod classroom;
pub mod domain;
pub mod mini_project;
pub mod ports;
pub mod submissions;
pub mod week;
pub mod workflow;

pub use domain::{
    Activity, ActivityKind, Assignment, AuthProvider, AuthorizationRedirect, Classroom,
    CodeFeedback, CodeReviewRequest, CompletedTask, ExperienceLevel, FileUpload, IdentityProfile,
    Language, Membership, MiniProjectRecord, NewAccount, OutgoingMail, ProjectGenerationRequest,
    ProjectRecommendation, ResourceType, Role, SkillsSurvey, StoredFile, Submission,
    SubmissionStatus, TaskStatus, User, UserCredentials, WeekEntry, WorkDraft,
};
pub use ports::{
    ActivityRepository, AssignmentRepository, ClassroomRepository, CodeFeedbackService,
    FileStorage, IdentityProvider, MailService, MiniProjectRepository, PortError, PortResult,
    ProjectGenerationService, UserRepository, VersionedStore,
};
pub use submissions::Submittable;

//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use classroom_core::ports::{
    ActivityRepository, AssignmentRepository, ClassroomRepository, CodeFeedbackService,
    FileStorage, IdentityProvider, MailService, MiniProjectRepository, ProjectGenerationService,
    UserRepository,
};
use classroom_core::workflow::GenerationSettings;
use classroom_core::domain::User;
use std::sync::Arc;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserRepository>,
    pub mini_projects: Arc<dyn MiniProjectRepository>,
    pub classrooms: Arc<dyn ClassroomRepository>,
    pub activities: Arc<dyn ActivityRepository>,
    pub assignments: Arc<dyn AssignmentRepository>,
    pub storage: Arc<dyn FileStorage>,
    pub mailer: Arc<dyn MailService>,
    pub identity: Arc<dyn IdentityProvider>,
    pub generator: Arc<dyn ProjectGenerationService>,
    pub reviewer: Arc<dyn CodeFeedbackService>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn generation_settings(&self) -> GenerationSettings {
        GenerationSettings {
            per_language: self.config.projects_per_language,
            retention_weeks: self.config.retention_weeks,
        }
    }
}

//=========================================================================================
// Per-request State
//=========================================================================================

/// The caller, resolved by the `require_user` middleware.
#[derive(Clone, Debug)]
pub struct CurrentUser(pub User);

//! services/api/src/web/work.rs
//!
//! Flows shared by activities and assignments: publishing, handing in,
//! withdrawing and grading, plus multipart form reading for uploads.

use axum::extract::Multipart;
use chrono::{DateTime, Utc};
use classroom_core::domain::{FileUpload, OutgoingMail, StoredFile, Submission, User, WorkDraft};
use classroom_core::ports::{
    ClassroomRepository, FileStorage, MailService, PortError, PortResult, UserRepository,
    VersionedStore,
};
use classroom_core::workflow::{discard_files, send_best_effort, update_versioned};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::web::access::{ensure_owner, visible_classroom, ClassWork};

#[derive(Deserialize, ToSchema)]
pub struct GradeRequest {
    pub score: u32,
    pub feedback: Option<String>,
}

//=========================================================================================
// Lifecycle Flows
//=========================================================================================

pub async fn publish<T, S>(store: &S, user: &User, id: Uuid) -> PortResult<T>
where
    T: ClassWork + Send + Sync + 'static,
    S: VersionedStore<T> + ?Sized,
{
    let (work, ()) = update_versioned(store, id, |w: &mut T| {
        ensure_owner(user, w.teacher_id())?;
        w.set_published(true);
        Ok(())
    })
    .await?;
    info!(work_id = %id, title = work.title(), "Published class work");
    Ok(work)
}

/// Fails unless `user` is an enrolled student who may still hand in work
/// `id`: the work is published and they have not submitted yet.
pub async fn ensure_can_hand_in<T, S>(
    store: &S,
    classrooms: &dyn ClassroomRepository,
    user: &User,
    id: Uuid,
) -> PortResult<()>
where
    T: ClassWork + Send + Sync + 'static,
    S: VersionedStore<T> + ?Sized,
{
    let work: T = store.load(id).await?;
    let classroom = visible_classroom(classrooms, user, work.classroom_id()).await?;
    if !classroom.has_student(user.id) {
        return Err(PortError::Forbidden(
            "Only enrolled students can hand in work".to_string(),
        ));
    }
    work.ensure_accepting(user.id)
}

/// Hands in work for a student enrolled in the work's classroom.
pub async fn hand_in<T, S>(
    store: &S,
    classrooms: &dyn ClassroomRepository,
    user: &User,
    id: Uuid,
    content: Option<String>,
    attachments: Vec<StoredFile>,
) -> PortResult<Submission>
where
    T: ClassWork + Send + Sync + 'static,
    S: VersionedStore<T> + ?Sized,
{
    ensure_can_hand_in::<T, S>(store, classrooms, user, id).await?;

    let now = Utc::now();
    let (_, submission) = update_versioned(store, id, |w: &mut T| {
        w.submit(user.id, content.clone(), attachments.clone(), now)
    })
    .await?;
    info!(work_id = %id, student_id = %user.id, late = submission.late, "Work handed in");
    Ok(submission)
}

/// Removes the caller's ungraded submission and its files.
pub async fn withdraw<T, S>(
    store: &S,
    storage: &dyn FileStorage,
    user: &User,
    id: Uuid,
) -> PortResult<Vec<String>>
where
    T: ClassWork + Send + Sync + 'static,
    S: VersionedStore<T> + ?Sized,
{
    let (_, removed) = update_versioned(store, id, |w: &mut T| w.withdraw(user.id)).await?;
    Ok(discard_files(storage, &removed.attachments).await)
}

/// Grades a student's submission and tells them about it.
pub async fn grade<T, S>(
    store: &S,
    users: &dyn UserRepository,
    mailer: &dyn MailService,
    user: &User,
    id: Uuid,
    student_id: Uuid,
    request: GradeRequest,
) -> PortResult<Submission>
where
    T: ClassWork + Send + Sync + 'static,
    S: VersionedStore<T> + ?Sized,
{
    let now = Utc::now();
    let feedback = request.feedback.filter(|f| !f.trim().is_empty());
    let (work, submission) = update_versioned(store, id, |w: &mut T| {
        ensure_owner(user, w.teacher_id())?;
        w.grade(student_id, request.score, feedback.clone(), now)
    })
    .await?;
    info!(work_id = %id, %student_id, score = request.score, "Graded submission");

    match users.get_user(student_id).await {
        Ok(student) => {
            let mail = OutgoingMail {
                to: student.email,
                subject: format!("Graded: {}", work.title()),
                body: format!(
                    "Your work on '{}' scored {}/{}.{}",
                    work.title(),
                    request.score,
                    work.max_score(),
                    feedback
                        .map(|f| format!("\n\nFeedback:\n{}", f))
                        .unwrap_or_default()
                ),
            };
            send_best_effort(mailer, mail).await;
        }
        Err(e) => warn!(%student_id, error = %e, "Could not look up graded student"),
    }
    Ok(submission)
}

//=========================================================================================
// Multipart Forms
//=========================================================================================

/// A buffered multipart body: text fields by name and every file part.
#[derive(Default)]
pub struct FormData {
    pub fields: HashMap<String, String>,
    pub files: Vec<FileUpload>,
}

impl FormData {
    pub fn text(&self, name: &str) -> Option<String> {
        self.fields
            .get(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    /// Reads the teacher-supplied fields of an activity or assignment.
    pub fn draft(&self) -> PortResult<WorkDraft> {
        let due_date = self
            .text("due_date")
            .map(|raw| {
                DateTime::parse_from_rfc3339(&raw)
                    .map(|d| d.with_timezone(&Utc))
                    .map_err(|e| PortError::Validation(format!("Invalid due_date '{}': {}", raw, e)))
            })
            .transpose()?;
        let max_score = self
            .text("max_score")
            .ok_or_else(|| PortError::Validation("max_score is required".to_string()))?
            .parse::<u32>()
            .map_err(|e| PortError::Validation(format!("Invalid max_score: {}", e)))?;
        let allow_late_submission = matches!(
            self.text("allow_late_submission").as_deref(),
            Some("true" | "1" | "on" | "yes")
        );

        Ok(WorkDraft {
            title: self.text("title").unwrap_or_default(),
            description: self.text("description").unwrap_or_default(),
            due_date,
            max_score,
            allow_late_submission,
        })
    }
}

pub async fn read_form(mut multipart: Multipart) -> ApiResult<FormData> {
    let mut form = FormData::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Failed to read multipart data: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match field.file_name().map(str::to_string) {
            Some(file_name) => {
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data = field.bytes().await.map_err(|e| {
                    ApiError::BadRequest(format!("Failed to read file bytes: {}", e))
                })?;
                if !data.is_empty() {
                    form.files.push(FileUpload {
                        file_name,
                        content_type,
                        data: data.to_vec(),
                    });
                }
            }
            None => {
                let value = field.text().await.map_err(|e| {
                    ApiError::BadRequest(format!("Failed to read field {}: {}", name, e))
                })?;
                form.fields.insert(name, value);
            }
        }
    }
    Ok(form)
}

/// Uploads every file, removing the ones already stored if any upload fails.
pub async fn upload_all(
    storage: &dyn FileStorage,
    files: Vec<FileUpload>,
) -> PortResult<Vec<StoredFile>> {
    let mut stored = Vec::with_capacity(files.len());
    for file in files {
        match storage.upload(file).await {
            Ok(saved) => stored.push(saved),
            Err(e) => {
                discard_files(storage, &stored).await;
                return Err(e);
            }
        }
    }
    Ok(stored)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(pairs: &[(&str, &str)]) -> FormData {
        FormData {
            fields: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            files: vec![],
        }
    }

    #[test]
    fn drafts_are_read_from_text_fields() {
        let draft = form(&[
            ("title", " Lab 1 "),
            ("max_score", "20"),
            ("due_date", "2026-10-23T17:00:00Z"),
            ("allow_late_submission", "on"),
        ])
        .draft()
        .unwrap();
        assert_eq!(draft.title, "Lab 1");
        assert_eq!(draft.max_score, 20);
        assert!(draft.allow_late_submission);
        assert_eq!(
            draft.due_date.unwrap().to_rfc3339(),
            "2026-10-23T17:00:00+00:00"
        );
    }

    #[test]
    fn bad_numbers_and_dates_are_validation_errors() {
        assert!(matches!(
            form(&[("title", "x")]).draft(),
            Err(PortError::Validation(_))
        ));
        assert!(matches!(
            form(&[("title", "x"), ("max_score", "ten")]).draft(),
            Err(PortError::Validation(_))
        ));
        assert!(matches!(
            form(&[("title", "x"), ("max_score", "1"), ("due_date", "tomorrow")]).draft(),
            Err(PortError::Validation(_))
        ));
    }
}

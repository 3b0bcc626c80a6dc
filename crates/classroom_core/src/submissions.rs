//! crates/classroom_core/src/submissions.rs
//!
//! Submission and grading lifecycle shared by activities and assignments.
//! At most one submission per student is the invariant enforced here.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    Activity, ActivityKind, Assignment, StoredFile, Submission, SubmissionStatus, WorkDraft,
};
use crate::ports::{PortError, PortResult};

pub const MAX_TITLE_LEN: usize = 200;

/// Anything students can hand work in to.
pub trait Submittable {
    fn submissions(&self) -> &[Submission];
    fn submissions_mut(&mut self) -> &mut Vec<Submission>;
    fn max_score(&self) -> u32;
    fn due_date(&self) -> Option<DateTime<Utc>>;
    fn is_published(&self) -> bool;
    /// Stored and reported, but not enforced by `submit`.
    fn allow_late_submission(&self) -> bool;

    fn submission_for(&self, student_id: Uuid) -> Option<&Submission> {
        self.submissions().iter().find(|s| s.student_id == student_id)
    }

    /// Fails unless the work is published and `student_id` has not
    /// submitted yet.
    fn ensure_accepting(&self, student_id: Uuid) -> PortResult<()> {
        if !self.is_published() {
            return Err(PortError::Validation(
                "Submissions are closed until the work is published".to_string(),
            ));
        }
        if self.submission_for(student_id).is_some() {
            return Err(PortError::Conflict(format!(
                "Duplicate submission: student {} has already submitted",
                student_id
            )));
        }
        Ok(())
    }

    /// Appends a submission for `student_id`.
    ///
    /// Fails with `Conflict` if the student already submitted; the
    /// submissions are left untouched on any failure.
    fn submit(
        &mut self,
        student_id: Uuid,
        content: Option<String>,
        attachments: Vec<StoredFile>,
        now: DateTime<Utc>,
    ) -> PortResult<Submission> {
        self.ensure_accepting(student_id)?;

        let content = content.filter(|c| !c.trim().is_empty());
        if content.is_none() && attachments.is_empty() {
            return Err(PortError::Validation(
                "A submission needs text content or at least one attachment".to_string(),
            ));
        }

        let submission = Submission {
            student_id,
            content,
            attachments,
            submitted_at: now,
            late: self.due_date().is_some_and(|due| now > due),
            status: SubmissionStatus::Submitted,
            score: None,
            feedback: None,
            graded_at: None,
        };
        self.submissions_mut().push(submission.clone());
        Ok(submission)
    }

    /// Scores an existing submission. Regrading overwrites the previous grade.
    fn grade(
        &mut self,
        student_id: Uuid,
        score: u32,
        feedback: Option<String>,
        now: DateTime<Utc>,
    ) -> PortResult<Submission> {
        let max_score = self.max_score();
        if score > max_score {
            return Err(PortError::Validation(format!(
                "Score {} exceeds the maximum of {}",
                score, max_score
            )));
        }

        let submission = self
            .submissions_mut()
            .iter_mut()
            .find(|s| s.student_id == student_id)
            .ok_or_else(|| {
                PortError::NotFound(format!("Submission not found for student {}", student_id))
            })?;

        submission.score = Some(score);
        submission.feedback = feedback;
        submission.status = SubmissionStatus::Graded;
        submission.graded_at = Some(now);
        Ok(submission.clone())
    }

    /// Removes an ungraded submission so the student can hand in again.
    fn withdraw(&mut self, student_id: Uuid) -> PortResult<Submission> {
        let index = self
            .submissions()
            .iter()
            .position(|s| s.student_id == student_id)
            .ok_or_else(|| {
                PortError::NotFound(format!("Submission not found for student {}", student_id))
            })?;
        if self.submissions()[index].status == SubmissionStatus::Graded {
            return Err(PortError::Conflict(
                "Graded submissions cannot be withdrawn".to_string(),
            ));
        }
        Ok(self.submissions_mut().remove(index))
    }
}

fn validate_draft(draft: &WorkDraft) -> PortResult<()> {
    let title_len = draft.title.trim().chars().count();
    if title_len == 0 || title_len > MAX_TITLE_LEN {
        return Err(PortError::Validation(format!(
            "Title must be 1-{} characters",
            MAX_TITLE_LEN
        )));
    }
    if draft.max_score == 0 {
        return Err(PortError::Validation(
            "max_score must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

impl Activity {
    pub fn from_draft(
        classroom_id: Uuid,
        teacher_id: Uuid,
        kind: ActivityKind,
        draft: WorkDraft,
        now: DateTime<Utc>,
    ) -> PortResult<Self> {
        validate_draft(&draft)?;
        Ok(Self {
            id: Uuid::new_v4(),
            classroom_id,
            teacher_id,
            title: draft.title.trim().to_string(),
            description: draft.description,
            kind,
            due_date: draft.due_date,
            max_score: draft.max_score,
            published: false,
            allow_late_submission: draft.allow_late_submission,
            submissions: Vec::new(),
            created_at: now,
            revision: 0,
        })
    }
}

impl Assignment {
    pub fn from_draft(
        classroom_id: Uuid,
        teacher_id: Uuid,
        draft: WorkDraft,
        attachments: Vec<StoredFile>,
        now: DateTime<Utc>,
    ) -> PortResult<Self> {
        validate_draft(&draft)?;
        Ok(Self {
            id: Uuid::new_v4(),
            classroom_id,
            teacher_id,
            title: draft.title.trim().to_string(),
            description: draft.description,
            due_date: draft.due_date,
            max_score: draft.max_score,
            published: false,
            allow_late_submission: draft.allow_late_submission,
            attachments,
            submissions: Vec::new(),
            created_at: now,
            revision: 0,
        })
    }
}

macro_rules! impl_submittable {
    ($ty:ty) => {
        impl Submittable for $ty {
            fn submissions(&self) -> &[Submission] {
                &self.submissions
            }

            fn submissions_mut(&mut self) -> &mut Vec<Submission> {
                &mut self.submissions
            }

            fn max_score(&self) -> u32 {
                self.max_score
            }

            fn due_date(&self) -> Option<DateTime<Utc>> {
                self.due_date
            }

            fn is_published(&self) -> bool {
                self.published
            }

            fn allow_late_submission(&self) -> bool {
                self.allow_late_submission
            }
        }
    };
}

impl_submittable!(Activity);
impl_submittable!(Assignment);

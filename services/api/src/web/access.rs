//! services/api/src/web/access.rs
//!
//! Who may see and change classrooms and the work inside them.

use classroom_core::domain::{Activity, Assignment, Classroom, Role, User};
use classroom_core::ports::{ClassroomRepository, PortError, PortResult, VersionedStore};
use classroom_core::Submittable;
use uuid::Uuid;

pub fn require_teacher(user: &User) -> PortResult<()> {
    if user.role.can_teach() {
        Ok(())
    } else {
        Err(PortError::Forbidden(
            "Only teachers can do this".to_string(),
        ))
    }
}

pub fn is_owner(user: &User, teacher_id: Uuid) -> bool {
    user.role == Role::Admin || user.id == teacher_id
}

pub fn ensure_owner(user: &User, teacher_id: Uuid) -> PortResult<()> {
    if is_owner(user, teacher_id) {
        Ok(())
    } else {
        Err(PortError::Forbidden(
            "Only the classroom's teacher can do this".to_string(),
        ))
    }
}

/// Loads a classroom the caller teaches or is enrolled in.
pub async fn visible_classroom(
    classrooms: &dyn ClassroomRepository,
    user: &User,
    classroom_id: Uuid,
) -> PortResult<Classroom> {
    let classroom: Classroom = classrooms.load(classroom_id).await?;
    if is_owner(user, classroom.teacher_id) || classroom.has_student(user.id) {
        Ok(classroom)
    } else {
        Err(PortError::Forbidden(
            "You are not a member of this classroom".to_string(),
        ))
    }
}

/// Activities and assignments, seen from the classroom's side.
pub trait ClassWork: Submittable + Clone {
    fn title(&self) -> &str;
    fn classroom_id(&self) -> Uuid;
    fn teacher_id(&self) -> Uuid;
    fn set_published(&mut self, published: bool);
}

macro_rules! impl_class_work {
    ($ty:ty) => {
        impl ClassWork for $ty {
            fn title(&self) -> &str {
                &self.title
            }

            fn classroom_id(&self) -> Uuid {
                self.classroom_id
            }

            fn teacher_id(&self) -> Uuid {
                self.teacher_id
            }

            fn set_published(&mut self, published: bool) {
                self.published = published;
            }
        }
    };
}

impl_class_work!(Activity);
impl_class_work!(Assignment);

/// What `user` may see of a piece of work: everything for its teacher, the
/// published work with only their own submission for anyone else.
pub fn view_for<T: ClassWork>(user: &User, mut work: T) -> Option<T> {
    if is_owner(user, work.teacher_id()) {
        return Some(work);
    }
    if !work.is_published() {
        return None;
    }
    work.submissions_mut().retain(|s| s.student_id == user.id);
    Some(work)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use classroom_core::domain::{ActivityKind, AuthProvider, WorkDraft};

    fn user(role: Role) -> User {
        User {
            id: Uuid::new_v4(),
            email: "u@example.com".into(),
            display_name: "U".into(),
            role,
            provider: AuthProvider::Password,
            provider_id: None,
            survey: None,
            created_at: Utc::now(),
        }
    }

    fn activity(teacher: &User) -> Activity {
        let draft = WorkDraft {
            title: "Loops".into(),
            description: String::new(),
            due_date: None,
            max_score: 10,
            allow_late_submission: false,
        };
        Activity::from_draft(Uuid::new_v4(), teacher.id, ActivityKind::Coding, draft, Utc::now())
            .unwrap()
    }

    #[test]
    fn students_only_see_published_work_and_their_own_submission() {
        let teacher = user(Role::Teacher);
        let ada = user(Role::Student);
        let bob = user(Role::Student);

        let mut work = activity(&teacher);
        assert!(view_for(&ada, work.clone()).is_none());

        work.set_published(true);
        let now = Utc::now();
        work.submit(ada.id, Some("a".into()), vec![], now).unwrap();
        work.submit(bob.id, Some("b".into()), vec![], now).unwrap();

        let seen = view_for(&ada, work.clone()).unwrap();
        assert_eq!(seen.submissions.len(), 1);
        assert_eq!(seen.submissions[0].student_id, ada.id);

        assert_eq!(view_for(&teacher, work.clone()).unwrap().submissions.len(), 2);
        assert_eq!(view_for(&user(Role::Admin), work).unwrap().submissions.len(), 2);
    }

    #[test]
    fn only_teachers_pass_the_teacher_check() {
        assert!(require_teacher(&user(Role::Teacher)).is_ok());
        assert!(require_teacher(&user(Role::Admin)).is_ok());
        assert!(matches!(
            require_teacher(&user(Role::Student)),
            Err(PortError::Forbidden(_))
        ));
    }
}

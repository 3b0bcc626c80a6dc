//! services/api/src/adapters/memory.rs
//!
//! An in-process implementation of every repository port. It enforces the
//! same uniqueness and revision rules as the Postgres adapter, and backs the
//! integration tests and `STORE=memory` local runs.

use async_trait::async_trait;
use chrono::Utc;
use classroom_core::domain::{
    Activity, Assignment, Classroom, MiniProjectRecord, NewAccount, SkillsSurvey, User,
    UserCredentials,
};
use classroom_core::ports::{
    ActivityRepository, AssignmentRepository, ClassroomRepository, MiniProjectRepository,
    PortError, PortResult, UserRepository, VersionedStore,
};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::document::Revisioned;

struct UserRow {
    user: User,
    password_hash: Option<String>,
}

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, UserRow>,
    mini_projects: HashMap<Uuid, MiniProjectRecord>,
    classrooms: HashMap<Uuid, Classroom>,
    activities: HashMap<Uuid, Activity>,
    assignments: HashMap<Uuid, Assignment>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

//=========================================================================================
// Document Helpers
//=========================================================================================

fn load_from<T: Revisioned>(table: &HashMap<Uuid, T>, id: Uuid) -> PortResult<T> {
    table
        .get(&id)
        .cloned()
        .ok_or_else(|| PortError::NotFound(format!("{} {}", T::KIND, id)))
}

fn insert_into<T: Revisioned>(table: &mut HashMap<Uuid, T>, document: &T) -> PortResult<()> {
    if table.contains_key(&document.key()) {
        return Err(PortError::Conflict(format!(
            "{} {} already exists",
            T::KIND,
            document.key()
        )));
    }
    table.insert(document.key(), document.clone());
    Ok(())
}

fn compare_and_swap<T: Revisioned>(table: &mut HashMap<Uuid, T>, document: &T) -> PortResult<T> {
    let current = table
        .get_mut(&document.key())
        .ok_or_else(|| PortError::NotFound(format!("{} {}", T::KIND, document.key())))?;
    if current.revision() != document.revision() {
        return Err(PortError::StaleRevision(format!(
            "{} {} is at revision {}, not {}",
            T::KIND,
            document.key(),
            current.revision(),
            document.revision()
        )));
    }
    let mut saved = document.clone();
    saved.set_revision(document.revision() + 1);
    *current = saved.clone();
    Ok(saved)
}

fn newest_first<T, F>(mut items: Vec<T>, created_at: F) -> Vec<T>
where
    F: Fn(&T) -> chrono::DateTime<Utc>,
{
    items.sort_by(|a, b| created_at(b).cmp(&created_at(a)));
    items
}

macro_rules! versioned_table {
    ($ty:ty, $table:ident) => {
        #[async_trait]
        impl VersionedStore<$ty> for MemoryStore {
            async fn load(&self, id: Uuid) -> PortResult<$ty> {
                let tables = self.tables.read().await;
                load_from(&tables.$table, id)
            }

            async fn store(&self, document: &$ty) -> PortResult<$ty> {
                let mut tables = self.tables.write().await;
                compare_and_swap(&mut tables.$table, document)
            }
        }
    };
}

versioned_table!(MiniProjectRecord, mini_projects);
versioned_table!(Classroom, classrooms);
versioned_table!(Activity, activities);
versioned_table!(Assignment, assignments);

//=========================================================================================
// Repository Implementations
//=========================================================================================

#[async_trait]
impl UserRepository for MemoryStore {
    async fn create_user(&self, account: NewAccount) -> PortResult<User> {
        let mut tables = self.tables.write().await;
        if tables
            .users
            .values()
            .any(|row| row.user.email == account.email)
        {
            return Err(PortError::Conflict(format!(
                "E-mail {} is already registered",
                account.email
            )));
        }

        let user = User {
            id: Uuid::new_v4(),
            email: account.email,
            display_name: account.display_name,
            role: account.role,
            provider: account.provider,
            provider_id: account.provider_id,
            survey: None,
            created_at: Utc::now(),
        };
        tables.users.insert(
            user.id,
            UserRow {
                user: user.clone(),
                password_hash: account.password_hash,
            },
        );
        Ok(user)
    }

    async fn get_user(&self, user_id: Uuid) -> PortResult<User> {
        let tables = self.tables.read().await;
        tables
            .users
            .get(&user_id)
            .map(|row| row.user.clone())
            .ok_or_else(|| PortError::NotFound(format!("User {}", user_id)))
    }

    async fn find_user_by_email(&self, email: &str) -> PortResult<Option<User>> {
        let email = email.trim().to_lowercase();
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .find(|row| row.user.email == email)
            .map(|row| row.user.clone()))
    }

    async fn get_credentials(&self, email: &str) -> PortResult<UserCredentials> {
        let email = email.trim().to_lowercase();
        let tables = self.tables.read().await;
        tables
            .users
            .values()
            .find(|row| row.user.email == email)
            .map(|row| UserCredentials {
                user_id: row.user.id,
                email: row.user.email.clone(),
                password_hash: row.password_hash.clone(),
            })
            .ok_or_else(|| PortError::NotFound(format!("User with e-mail {}", email)))
    }

    async fn save_survey(&self, user_id: Uuid, survey: &SkillsSurvey) -> PortResult<()> {
        let mut tables = self.tables.write().await;
        let row = tables
            .users
            .get_mut(&user_id)
            .ok_or_else(|| PortError::NotFound(format!("User {}", user_id)))?;
        row.user.survey = Some(survey.clone());
        Ok(())
    }
}

#[async_trait]
impl MiniProjectRepository for MemoryStore {
    async fn insert_mini_project(&self, record: &MiniProjectRecord) -> PortResult<()> {
        let mut tables = self.tables.write().await;
        insert_into(&mut tables.mini_projects, record)
    }
}

#[async_trait]
impl ClassroomRepository for MemoryStore {
    async fn insert_classroom(&self, classroom: &Classroom) -> PortResult<()> {
        let mut tables = self.tables.write().await;
        if tables.classrooms.values().any(|c| c.code == classroom.code) {
            return Err(PortError::Conflict(format!(
                "Classroom code {} is taken",
                classroom.code
            )));
        }
        insert_into(&mut tables.classrooms, classroom)
    }

    async fn find_by_code(&self, code: &str) -> PortResult<Option<Classroom>> {
        let tables = self.tables.read().await;
        Ok(tables
            .classrooms
            .values()
            .find(|c| c.code.eq_ignore_ascii_case(code))
            .cloned())
    }

    async fn list_by_teacher(&self, teacher_id: Uuid) -> PortResult<Vec<Classroom>> {
        let tables = self.tables.read().await;
        let owned = tables
            .classrooms
            .values()
            .filter(|c| c.teacher_id == teacher_id)
            .cloned()
            .collect();
        Ok(newest_first(owned, |c: &Classroom| c.created_at))
    }

    async fn list_for_student(&self, student_id: Uuid) -> PortResult<Vec<Classroom>> {
        let tables = self.tables.read().await;
        let joined = tables
            .classrooms
            .values()
            .filter(|c| c.has_student(student_id))
            .cloned()
            .collect();
        Ok(newest_first(joined, |c: &Classroom| c.created_at))
    }
}

#[async_trait]
impl ActivityRepository for MemoryStore {
    async fn insert_activity(&self, activity: &Activity) -> PortResult<()> {
        let mut tables = self.tables.write().await;
        insert_into(&mut tables.activities, activity)
    }

    async fn list_activities(
        &self,
        classroom_id: Uuid,
        published_only: bool,
    ) -> PortResult<Vec<Activity>> {
        let tables = self.tables.read().await;
        let matching = tables
            .activities
            .values()
            .filter(|a| a.classroom_id == classroom_id && (a.published || !published_only))
            .cloned()
            .collect();
        Ok(newest_first(matching, |a: &Activity| a.created_at))
    }
}

#[async_trait]
impl AssignmentRepository for MemoryStore {
    async fn insert_assignment(&self, assignment: &Assignment) -> PortResult<()> {
        let mut tables = self.tables.write().await;
        insert_into(&mut tables.assignments, assignment)
    }

    async fn list_assignments(
        &self,
        classroom_id: Uuid,
        published_only: bool,
    ) -> PortResult<Vec<Assignment>> {
        let tables = self.tables.read().await;
        let matching = tables
            .assignments
            .values()
            .filter(|a| a.classroom_id == classroom_id && (a.published || !published_only))
            .cloned()
            .collect();
        Ok(newest_first(matching, |a: &Assignment| a.created_at))
    }

    async fn delete_assignment(&self, assignment_id: Uuid) -> PortResult<()> {
        let mut tables = self.tables.write().await;
        tables
            .assignments
            .remove(&assignment_id)
            .map(|_| ())
            .ok_or_else(|| PortError::NotFound(format!("Assignment {}", assignment_id)))
    }
}

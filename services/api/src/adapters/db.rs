//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, the PostgreSQL implementation of
//! every repository port from the `classroom_core` crate. It uses `sqlx`.
//!
//! Aggregates are kept as JSONB documents next to a `revision` column; saves
//! are a compare-and-swap on that column.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use classroom_core::domain::{
    Activity, Assignment, AuthProvider, Classroom, MiniProjectRecord, NewAccount, Role,
    SkillsSurvey, User, UserCredentials,
};
use classroom_core::ports::{
    ActivityRepository, AssignmentRepository, ClassroomRepository, MiniProjectRepository,
    PortError, PortResult, UserRepository, VersionedStore,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use tracing::debug;
use uuid::Uuid;

use super::document::Revisioned;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the repository ports.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

fn db_error(e: sqlx::Error) -> PortError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            PortError::Conflict(db.message().to_string())
        }
        _ => PortError::Unexpected(e.to_string()),
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct UserRecord {
    id: Uuid,
    email: String,
    display_name: String,
    role: String,
    provider: String,
    provider_id: Option<String>,
    survey: Option<Json<SkillsSurvey>>,
    created_at: DateTime<Utc>,
}

/// A value the database holds but the domain no longer recognises.
fn stored_value(e: PortError) -> PortError {
    PortError::Unexpected(e.to_string())
}

impl UserRecord {
    fn into_domain(self) -> PortResult<User> {
        Ok(User {
            id: self.id,
            email: self.email,
            display_name: self.display_name,
            role: self.role.parse::<Role>().map_err(stored_value)?,
            provider: self.provider.parse::<AuthProvider>().map_err(stored_value)?,
            provider_id: self.provider_id,
            survey: self.survey.map(|Json(survey)| survey),
            created_at: self.created_at,
        })
    }
}

const USER_COLUMNS: &str =
    "id, email, display_name, role, provider, provider_id, survey, created_at";

#[derive(FromRow)]
struct CredentialsRecord {
    id: Uuid,
    email: String,
    password_hash: Option<String>,
}

//=========================================================================================
// Document Helpers
//=========================================================================================

/// Where a document type lives.
struct Table {
    name: &'static str,
    key: &'static str,
}

const MINI_PROJECTS: Table = Table { name: "mini_projects", key: "user_id" };
const CLASSROOMS: Table = Table { name: "classrooms", key: "id" };
const ACTIVITIES: Table = Table { name: "activities", key: "id" };
const ASSIGNMENTS: Table = Table { name: "assignments", key: "id" };

/// The stored revision column is authoritative over the copy in the JSON.
fn with_revision<T: Revisioned>((Json(mut document), revision): (Json<T>, i64)) -> T {
    document.set_revision(revision);
    document
}

impl DbAdapter {
    async fn load_document<T>(&self, table: &Table, id: Uuid) -> PortResult<T>
    where
        T: Revisioned + DeserializeOwned + Unpin,
    {
        let sql = format!(
            "SELECT document, revision FROM {} WHERE {} = $1",
            table.name, table.key
        );
        sqlx::query_as::<_, (Json<T>, i64)>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?
            .map(with_revision)
            .ok_or_else(|| PortError::NotFound(format!("{} {}", T::KIND, id)))
    }

    async fn store_document<T>(&self, table: &Table, document: &T) -> PortResult<T>
    where
        T: Revisioned + Serialize,
    {
        let mut next = document.clone();
        next.set_revision(document.revision() + 1);

        let sql = format!(
            "UPDATE {} SET document = $1, revision = $2 WHERE {} = $3 AND revision = $4",
            table.name, table.key
        );
        let result = sqlx::query(&sql)
            .bind(Json(&next))
            .bind(next.revision())
            .bind(document.key())
            .bind(document.revision())
            .execute(&self.pool)
            .await
            .map_err(db_error)?;

        if result.rows_affected() == 1 {
            return Ok(next);
        }

        let exists_sql = format!("SELECT 1 FROM {} WHERE {} = $1", table.name, table.key);
        let exists = sqlx::query(&exists_sql)
            .bind(document.key())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?
            .is_some();
        if exists {
            Err(PortError::StaleRevision(format!(
                "{} {} changed since revision {}",
                T::KIND,
                document.key(),
                document.revision()
            )))
        } else {
            Err(PortError::NotFound(format!("{} {}", T::KIND, document.key())))
        }
    }

    async fn list_documents<T>(&self, sql: &str, id: Uuid, published_only: bool) -> PortResult<Vec<T>>
    where
        T: Revisioned + DeserializeOwned + Unpin,
    {
        let rows = sqlx::query_as::<_, (Json<T>, i64)>(sql)
            .bind(id)
            .bind(published_only)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(rows.into_iter().map(with_revision).collect())
    }
}

//=========================================================================================
// Repository Implementations
//=========================================================================================

#[async_trait]
impl UserRepository for DbAdapter {
    async fn create_user(&self, account: NewAccount) -> PortResult<User> {
        let sql = format!(
            "INSERT INTO users (id, email, display_name, role, provider, provider_id, password_hash) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {}",
            USER_COLUMNS
        );
        let record = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(&account.email)
            .bind(&account.display_name)
            .bind(account.role.as_str())
            .bind(account.provider.as_str())
            .bind(&account.provider_id)
            .bind(&account.password_hash)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match db_error(e) {
                PortError::Conflict(_) => {
                    PortError::Conflict(format!("E-mail {} is already registered", account.email))
                }
                other => other,
            })?;
        record.into_domain()
    }

    async fn get_user(&self, user_id: Uuid) -> PortResult<User> {
        let sql = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        sqlx::query_as::<_, UserRecord>(&sql)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::RowNotFound => PortError::NotFound(format!("User {}", user_id)),
                _ => db_error(e),
            })?
            .into_domain()
    }

    async fn find_user_by_email(&self, email: &str) -> PortResult<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE email = $1", USER_COLUMNS);
        sqlx::query_as::<_, UserRecord>(&sql)
            .bind(email.trim().to_lowercase())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?
            .map(UserRecord::into_domain)
            .transpose()
    }

    async fn get_credentials(&self, email: &str) -> PortResult<UserCredentials> {
        let email = email.trim().to_lowercase();
        let record = sqlx::query_as::<_, CredentialsRecord>(
            "SELECT id, email, password_hash FROM users WHERE email = $1",
        )
        .bind(&email)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?
        .ok_or_else(|| PortError::NotFound(format!("User with e-mail {}", email)))?;

        Ok(UserCredentials {
            user_id: record.id,
            email: record.email,
            password_hash: record.password_hash,
        })
    }

    async fn save_survey(&self, user_id: Uuid, survey: &SkillsSurvey) -> PortResult<()> {
        let result = sqlx::query("UPDATE users SET survey = $1 WHERE id = $2")
            .bind(Json(survey))
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("User {}", user_id)));
        }
        Ok(())
    }
}

#[async_trait]
impl VersionedStore<MiniProjectRecord> for DbAdapter {
    async fn load(&self, id: Uuid) -> PortResult<MiniProjectRecord> {
        let mut record: MiniProjectRecord = self.load_document(&MINI_PROJECTS, id).await?;
        // Rows written before weekly history existed carry a flat list.
        if record.migrate_legacy() {
            debug!(user_id = %id, "Migrated legacy mini-project recommendations on load");
        }
        Ok(record)
    }

    async fn store(&self, document: &MiniProjectRecord) -> PortResult<MiniProjectRecord> {
        self.store_document(&MINI_PROJECTS, document).await
    }
}

#[async_trait]
impl MiniProjectRepository for DbAdapter {
    async fn insert_mini_project(&self, record: &MiniProjectRecord) -> PortResult<()> {
        sqlx::query("INSERT INTO mini_projects (user_id, revision, document) VALUES ($1, $2, $3)")
            .bind(record.user_id)
            .bind(record.revision)
            .bind(Json(record))
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }
}

#[async_trait]
impl VersionedStore<Classroom> for DbAdapter {
    async fn load(&self, id: Uuid) -> PortResult<Classroom> {
        self.load_document(&CLASSROOMS, id).await
    }

    async fn store(&self, document: &Classroom) -> PortResult<Classroom> {
        self.store_document(&CLASSROOMS, document).await
    }
}

#[async_trait]
impl ClassroomRepository for DbAdapter {
    async fn insert_classroom(&self, classroom: &Classroom) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO classrooms (id, code, teacher_id, revision, document, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(classroom.id)
        .bind(&classroom.code)
        .bind(classroom.teacher_id)
        .bind(classroom.revision)
        .bind(Json(classroom))
        .bind(classroom.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn find_by_code(&self, code: &str) -> PortResult<Option<Classroom>> {
        let row = sqlx::query_as::<_, (Json<Classroom>, i64)>(
            "SELECT document, revision FROM classrooms WHERE code = $1",
        )
        .bind(code.trim().to_ascii_uppercase())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(row.map(with_revision))
    }

    async fn list_by_teacher(&self, teacher_id: Uuid) -> PortResult<Vec<Classroom>> {
        let rows = sqlx::query_as::<_, (Json<Classroom>, i64)>(
            "SELECT document, revision FROM classrooms WHERE teacher_id = $1 ORDER BY created_at DESC",
        )
        .bind(teacher_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(rows.into_iter().map(with_revision).collect())
    }

    async fn list_for_student(&self, student_id: Uuid) -> PortResult<Vec<Classroom>> {
        let rows = sqlx::query_as::<_, (Json<Classroom>, i64)>(
            "SELECT document, revision FROM classrooms \
             WHERE document -> 'students' @> $1 ORDER BY created_at DESC",
        )
        .bind(Json(json!([{ "student_id": student_id }])))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(rows.into_iter().map(with_revision).collect())
    }
}

#[async_trait]
impl VersionedStore<Activity> for DbAdapter {
    async fn load(&self, id: Uuid) -> PortResult<Activity> {
        self.load_document(&ACTIVITIES, id).await
    }

    async fn store(&self, document: &Activity) -> PortResult<Activity> {
        self.store_document(&ACTIVITIES, document).await
    }
}

#[async_trait]
impl ActivityRepository for DbAdapter {
    async fn insert_activity(&self, activity: &Activity) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO activities (id, classroom_id, teacher_id, revision, document, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(activity.id)
        .bind(activity.classroom_id)
        .bind(activity.teacher_id)
        .bind(activity.revision)
        .bind(Json(activity))
        .bind(activity.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn list_activities(
        &self,
        classroom_id: Uuid,
        published_only: bool,
    ) -> PortResult<Vec<Activity>> {
        self.list_documents(
            "SELECT document, revision FROM activities \
             WHERE classroom_id = $1 AND (published OR NOT $2) ORDER BY created_at DESC",
            classroom_id,
            published_only,
        )
        .await
    }
}

#[async_trait]
impl VersionedStore<Assignment> for DbAdapter {
    async fn load(&self, id: Uuid) -> PortResult<Assignment> {
        self.load_document(&ASSIGNMENTS, id).await
    }

    async fn store(&self, document: &Assignment) -> PortResult<Assignment> {
        self.store_document(&ASSIGNMENTS, document).await
    }
}

#[async_trait]
impl AssignmentRepository for DbAdapter {
    async fn insert_assignment(&self, assignment: &Assignment) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO assignments (id, classroom_id, teacher_id, revision, document, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(assignment.id)
        .bind(assignment.classroom_id)
        .bind(assignment.teacher_id)
        .bind(assignment.revision)
        .bind(Json(assignment))
        .bind(assignment.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn list_assignments(
        &self,
        classroom_id: Uuid,
        published_only: bool,
    ) -> PortResult<Vec<Assignment>> {
        self.list_documents(
            "SELECT document, revision FROM assignments \
             WHERE classroom_id = $1 AND (published OR NOT $2) ORDER BY created_at DESC",
            classroom_id,
            published_only,
        )
        .await
    }

    async fn delete_assignment(&self, assignment_id: Uuid) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM assignments WHERE id = $1")
            .bind(assignment_id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Assignment {}", assignment_id)));
        }
        Ok(())
    }
}

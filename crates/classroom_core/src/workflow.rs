//! crates/classroom_core/src/workflow.rs
//!
//! Async orchestration over the ports: optimistic-concurrency updates,
//! classroom creation with code-collision retries, account provisioning and
//! the weekly project generation and review flows.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::classroom::{generate_code, normalize_code};
use crate::domain::{
    AuthProvider, Classroom, CodeReviewRequest, CompletedTask, ExperienceLevel, Language,
    MiniProjectRecord, NewAccount, OutgoingMail, ProjectGenerationRequest, Role, StoredFile, User,
    WeekEntry,
};
use crate::mini_project::normalize_title;
use crate::ports::{
    ClassroomRepository, CodeFeedbackService, FileStorage, IdentityProvider, MailService,
    MiniProjectRepository, PortError, PortResult, ProjectGenerationService, UserRepository,
    VersionedStore,
};
use crate::week;

/// Attempts made by `update_versioned` before a stale revision is reported.
pub const MAX_SAVE_ATTEMPTS: usize = 3;
/// Attempts made to find an unused classroom code.
pub const MAX_CODE_ATTEMPTS: usize = 5;

//=========================================================================================
// Optimistic Concurrency
//=========================================================================================

/// Loads the aggregate `id`, applies `mutate`, and saves it with a revision
/// check. A lost race reloads and reapplies `mutate`, up to
/// `MAX_SAVE_ATTEMPTS` times. Errors from `mutate` are returned as-is and
/// nothing is saved.
pub async fn update_versioned<T, S, F, R>(
    store: &S,
    id: Uuid,
    mut mutate: F,
) -> PortResult<(T, R)>
where
    T: Send + Sync + 'static,
    S: VersionedStore<T> + ?Sized,
    F: FnMut(&mut T) -> PortResult<R> + Send,
    R: Send,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        let mut document = store.load(id).await?;
        let outcome = mutate(&mut document)?;
        match store.store(&document).await {
            Ok(saved) => return Ok((saved, outcome)),
            Err(PortError::StaleRevision(reason)) if attempt < MAX_SAVE_ATTEMPTS => {
                warn!(%id, attempt, %reason, "Lost a concurrent update, retrying");
            }
            Err(e) => return Err(e),
        }
    }
}

//=========================================================================================
// Accounts
//=========================================================================================

fn normalize_account(mut account: NewAccount) -> PortResult<NewAccount> {
    account.email = account.email.trim().to_lowercase();
    account.display_name = account.display_name.trim().to_string();
    let valid_email = account
        .email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !valid_email {
        return Err(PortError::Validation(format!(
            "'{}' is not a valid e-mail address",
            account.email
        )));
    }
    if account.display_name.is_empty() {
        return Err(PortError::Validation("Display name is required".to_string()));
    }
    Ok(account)
}

/// Inserts an empty mini-project record for a student who has none. An
/// existing record is left untouched.
pub async fn ensure_student_record(
    mini_projects: &dyn MiniProjectRepository,
    user: &User,
    now: DateTime<Utc>,
) -> PortResult<()> {
    if user.role != Role::Student {
        return Ok(());
    }
    match mini_projects
        .insert_mini_project(&MiniProjectRecord::new(user.id, now))
        .await
    {
        Ok(()) => {
            debug!(user_id = %user.id, "Inserted mini-project record");
            Ok(())
        }
        Err(PortError::Conflict(_)) => Ok(()),
        Err(e) => Err(e),
    }
}

/// Creates a user and, for students, their empty mini-project record.
/// A failed record insert leaves the user in place; the record is filled
/// in on the next sign-in.
pub async fn provision_account(
    users: &dyn UserRepository,
    mini_projects: &dyn MiniProjectRepository,
    account: NewAccount,
    now: DateTime<Utc>,
) -> PortResult<User> {
    let account = normalize_account(account)?;
    let user = users.create_user(account).await?;
    ensure_student_record(mini_projects, &user, now).await?;

    info!(user_id = %user.id, role = user.role.as_str(), "Provisioned account");
    Ok(user)
}

/// Signs in through the external identity provider. The first time an
/// e-mail is seen a student account is provisioned. Returns the user and
/// whether it was just created.
pub async fn sign_in_with_identity(
    users: &dyn UserRepository,
    mini_projects: &dyn MiniProjectRepository,
    identity: &dyn IdentityProvider,
    code: &str,
    state: &str,
    now: DateTime<Utc>,
) -> PortResult<(User, bool)> {
    let profile = identity.exchange_code(code, state).await?;

    if let Some(user) = users.find_user_by_email(&profile.email).await? {
        debug!(user_id = %user.id, "Identity matched an existing user");
        ensure_student_record(mini_projects, &user, now).await?;
        return Ok((user, false));
    }

    let account = NewAccount {
        display_name: if profile.display_name.trim().is_empty() {
            profile.email.clone()
        } else {
            profile.display_name
        },
        email: profile.email,
        role: Role::Student,
        provider: AuthProvider::Google,
        provider_id: Some(profile.provider_id),
        password_hash: None,
    };
    let user = provision_account(users, mini_projects, account, now).await?;
    Ok((user, true))
}

//=========================================================================================
// Classrooms
//=========================================================================================

/// Creates a classroom with a random join code.
pub async fn create_classroom(
    classrooms: &dyn ClassroomRepository,
    teacher_id: Uuid,
    name: &str,
    description: String,
    now: DateTime<Utc>,
) -> PortResult<Classroom> {
    create_classroom_with(classrooms, teacher_id, name, description, now, || {
        generate_code(&mut rand::thread_rng())
    })
    .await
}

/// Same as [`create_classroom`] with an explicit code source. A code the
/// store rejects as taken is replaced and the insert retried.
pub async fn create_classroom_with<G>(
    classrooms: &dyn ClassroomRepository,
    teacher_id: Uuid,
    name: &str,
    description: String,
    now: DateTime<Utc>,
    mut next_code: G,
) -> PortResult<Classroom>
where
    G: FnMut() -> String + Send,
{
    let mut classroom = Classroom::new(teacher_id, name, description, next_code(), now)?;
    for attempt in 1..=MAX_CODE_ATTEMPTS {
        match classrooms.insert_classroom(&classroom).await {
            Ok(()) => {
                info!(classroom_id = %classroom.id, code = %classroom.code, "Created classroom");
                return Ok(classroom);
            }
            Err(PortError::Conflict(reason)) if attempt < MAX_CODE_ATTEMPTS => {
                debug!(attempt, %reason, "Classroom code taken, generating another");
                classroom.code = next_code();
            }
            Err(e) => return Err(e),
        }
    }
    Err(PortError::Conflict(
        "Could not find an unused classroom code".to_string(),
    ))
}

/// Enrolls a student using a join code.
pub async fn join_classroom(
    classrooms: &dyn ClassroomRepository,
    student_id: Uuid,
    code: &str,
    now: DateTime<Utc>,
) -> PortResult<Classroom> {
    let code = normalize_code(code);
    let classroom = classrooms
        .find_by_code(&code)
        .await?
        .ok_or_else(|| PortError::NotFound(format!("No classroom with code {}", code)))?;

    let (classroom, added) = update_versioned(classrooms, classroom.id, |c: &mut Classroom| {
        Ok(c.add_student(student_id, now))
    })
    .await?;
    if added {
        info!(classroom_id = %classroom.id, %student_id, "Student joined classroom");
    }
    Ok(classroom)
}

//=========================================================================================
// Mini-Projects
//=========================================================================================

/// Settings for one weekly generation run.
#[derive(Debug, Clone, Copy)]
pub struct GenerationSettings {
    pub per_language: usize,
    pub retention_weeks: usize,
}

/// Generates this ISO week's recommendations for `user` and files them.
///
/// The LLM is called outside the revision-checked update, so a lost race
/// only repeats the cheap bookkeeping.
pub async fn generate_weekly_projects(
    mini_projects: &dyn MiniProjectRepository,
    generator: &dyn ProjectGenerationService,
    user: &User,
    settings: GenerationSettings,
    now: DateTime<Utc>,
) -> PortResult<WeekEntry> {
    let record = mini_projects.load(user.id).await?;
    if !record.generation_enabled {
        return Err(PortError::Conflict(
            "Project generation is disabled for this user".to_string(),
        ));
    }

    let mut avoid_titles: Vec<String> = record.known_titles().into_iter().collect();
    avoid_titles.extend(
        record
            .legacy_recommendations
            .iter()
            .map(|p| normalize_title(&p.title)),
    );
    avoid_titles.sort();

    let (experience, interests) = match &user.survey {
        Some(survey) => (survey.experience, survey.interests.clone()),
        None => (ExperienceLevel::Beginner, Vec::new()),
    };

    let mut generated = Vec::new();
    for language in Language::ALL {
        let request = ProjectGenerationRequest {
            language,
            count: settings.per_language,
            experience,
            interests: interests.clone(),
            avoid_titles: avoid_titles.clone(),
        };
        let mut batch = generator.generate_projects(&request).await?;
        batch.retain(|p| p.language == language);
        generated.extend(batch);
    }

    let week_number = week::week_number_for(now);
    let (start, end) = week::week_bounds(now);
    let (_, entry) = update_versioned(mini_projects, user.id, |r: &mut MiniProjectRecord| {
        r.migrate_legacy();
        r.roll_week(now);
        let fresh = r.dedupe_recommendations(generated.clone());
        let target =
            r.add_weekly_generated_projects(fresh, Some(week_number), Some(start), Some(end), now);
        let evicted = r.apply_retention(settings.retention_weeks);
        if evicted > 0 {
            debug!(evicted, "Evicted old project weeks");
        }
        r.week(target)
            .cloned()
            .ok_or_else(|| PortError::Unexpected(format!("Week {} missing after insert", target)))
    })
    .await?;

    info!(
        user_id = %user.id,
        week_number,
        java = entry.java_projects.len(),
        python = entry.python_projects.len(),
        "Generated weekly projects"
    );
    Ok(entry)
}

/// Submits a task, asks the reviewer for feedback, and completes it with the
/// returned score. If the reviewer fails the task stays submitted.
pub async fn review_task_submission(
    mini_projects: &dyn MiniProjectRepository,
    reviewer: &dyn CodeFeedbackService,
    user_id: Uuid,
    title: &str,
    code: String,
    now: DateTime<Utc>,
) -> PortResult<CompletedTask> {
    let (_, (task, recommendation)) =
        update_versioned(mini_projects, user_id, |r: &mut MiniProjectRecord| {
            let recommendation = r
                .weekly_project_history
                .iter()
                .rev()
                .flat_map(|w| w.java_projects.iter().chain(w.python_projects.iter()))
                .find(|p| normalize_title(&p.title) == normalize_title(title))
                .map(|p| (p.language, p.requirements.clone()));
            let task = r.submit_task(title, code.clone(), now)?.clone();
            Ok((task, recommendation))
        })
        .await?;

    let request = CodeReviewRequest {
        title: task.title.clone(),
        language: recommendation.as_ref().map(|(language, _)| *language),
        requirements: recommendation.map(|(_, requirements)| requirements),
        code: task.code.clone(),
    };
    let feedback = reviewer.review_code(&request).await?;

    let (_, completed) = update_versioned(mini_projects, user_id, |r: &mut MiniProjectRecord| {
        r.complete_task(&task.title, feedback.score, feedback.feedback.clone(), now)
            .map(Clone::clone)
    })
    .await?;

    info!(%user_id, title = %completed.title, score = feedback.score, "Reviewed mini-project task");
    Ok(completed)
}

//=========================================================================================
// Best-effort External Calls
//=========================================================================================

/// Deletes files from the host, logging and collecting failures instead of
/// raising them.
pub async fn discard_files(storage: &dyn FileStorage, files: &[StoredFile]) -> Vec<String> {
    let mut errors = Vec::new();
    for file in files {
        if let Err(e) = storage.delete(&file.public_id, file.resource_type).await {
            warn!(public_id = %file.public_id, error = %e, "Failed to delete stored file");
            errors.push(format!("{}: {}", file.public_id, e));
        }
    }
    errors
}

/// Sends a notification, logging failures instead of raising them.
pub async fn send_best_effort(mailer: &dyn MailService, mail: OutgoingMail) -> bool {
    let to = mail.to.clone();
    match mailer.send(mail).await {
        Ok(()) => true,
        Err(e) => {
            warn!(%to, error = %e, "Failed to send notification e-mail");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AuthorizationRedirect, IdentityProfile, SkillsSurvey, UserCredentials};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// A single-document store whose first `races` saves lose to a
    /// concurrent writer.
    struct FlakyStore {
        doc: Mutex<(i64, Vec<u32>)>,
        races: Mutex<usize>,
    }

    #[async_trait]
    impl VersionedStore<(i64, Vec<u32>)> for FlakyStore {
        async fn load(&self, _id: Uuid) -> PortResult<(i64, Vec<u32>)> {
            Ok(self.doc.lock().unwrap().clone())
        }

        async fn store(&self, document: &(i64, Vec<u32>)) -> PortResult<(i64, Vec<u32>)> {
            let mut races = self.races.lock().unwrap();
            let mut doc = self.doc.lock().unwrap();
            if *races > 0 {
                *races -= 1;
                doc.0 += 1;
                doc.1.push(99);
            }
            if doc.0 != document.0 {
                return Err(PortError::StaleRevision("revision moved".into()));
            }
            *doc = (document.0 + 1, document.1.clone());
            Ok(doc.clone())
        }
    }

    fn flaky(races: usize) -> FlakyStore {
        FlakyStore {
            doc: Mutex::new((0, Vec::new())),
            races: Mutex::new(races),
        }
    }

    #[tokio::test]
    async fn update_retries_after_losing_a_race() {
        let store = flaky(1);
        let (saved, ()) = update_versioned(&store, Uuid::nil(), |d: &mut (i64, Vec<u32>)| {
            d.1.push(1);
            Ok(())
        })
        .await
        .unwrap();

        // The concurrent writer's change survives and ours lands on top.
        assert_eq!(saved.1, vec![99, 1]);
        assert_eq!(saved.0, 2);
    }

    #[tokio::test]
    async fn update_gives_up_after_max_attempts() {
        let store = flaky(MAX_SAVE_ATTEMPTS);
        let err = update_versioned(&store, Uuid::nil(), |d: &mut (i64, Vec<u32>)| {
            d.1.push(1);
            Ok(())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, PortError::StaleRevision(_)));
    }

    #[tokio::test]
    async fn mutate_errors_skip_the_save() {
        let store = flaky(0);
        let err = update_versioned(&store, Uuid::nil(), |_: &mut (i64, Vec<u32>)| {
            Err::<(), _>(PortError::Conflict("nope".into()))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, PortError::Conflict(_)));
        assert_eq!(store.doc.lock().unwrap().0, 0);
    }

    #[test]
    fn account_emails_are_normalized_and_checked() {
        let account = NewAccount {
            email: "  Ada@Example.COM ".into(),
            display_name: " Ada ".into(),
            role: Role::Student,
            provider: AuthProvider::Password,
            provider_id: None,
            password_hash: None,
        };
        let normalized = normalize_account(account.clone()).unwrap();
        assert_eq!(normalized.email, "ada@example.com");
        assert_eq!(normalized.display_name, "Ada");

        let bad = NewAccount {
            email: "not-an-email".into(),
            ..account
        };
        assert!(matches!(normalize_account(bad), Err(PortError::Validation(_))));
    }

    //=====================================================================================
    // Classroom codes
    //=====================================================================================

    /// Rejects every code in `taken` as already in use.
    struct CodeStore {
        taken: Vec<String>,
        inserted: Mutex<Vec<String>>,
    }

    impl CodeStore {
        fn with_taken(taken: &[&str]) -> Self {
            Self {
                taken: taken.iter().map(|c| c.to_string()).collect(),
                inserted: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl VersionedStore<Classroom> for CodeStore {
        async fn load(&self, _id: Uuid) -> PortResult<Classroom> {
            Err(PortError::NotFound("classroom".into()))
        }

        async fn store(&self, document: &Classroom) -> PortResult<Classroom> {
            Ok(document.clone())
        }
    }

    #[async_trait]
    impl ClassroomRepository for CodeStore {
        async fn insert_classroom(&self, classroom: &Classroom) -> PortResult<()> {
            self.inserted.lock().unwrap().push(classroom.code.clone());
            if self.taken.contains(&classroom.code) {
                return Err(PortError::Conflict("code taken".into()));
            }
            Ok(())
        }

        async fn find_by_code(&self, _code: &str) -> PortResult<Option<Classroom>> {
            Ok(None)
        }

        async fn list_by_teacher(&self, _teacher_id: Uuid) -> PortResult<Vec<Classroom>> {
            Ok(Vec::new())
        }

        async fn list_for_student(&self, _student_id: Uuid) -> PortResult<Vec<Classroom>> {
            Ok(Vec::new())
        }
    }

    fn codes(list: &[&str]) -> impl FnMut() -> String + Send {
        let mut codes: Vec<String> = list.iter().rev().map(|c| c.to_string()).collect();
        move || codes.pop().unwrap_or_else(|| "ZZZZZZZZ".to_string())
    }

    #[tokio::test]
    async fn taken_codes_are_replaced_until_one_is_free() {
        let store = CodeStore::with_taken(&["AAAAAAAA", "BBBBBBBB"]);
        let classroom = create_classroom_with(
            &store,
            Uuid::new_v4(),
            "Intro to Java",
            String::new(),
            Utc::now(),
            codes(&["AAAAAAAA", "BBBBBBBB", "CCCCCCCC"]),
        )
        .await
        .unwrap();

        assert_eq!(classroom.code, "CCCCCCCC");
        assert_eq!(
            *store.inserted.lock().unwrap(),
            vec!["AAAAAAAA", "BBBBBBBB", "CCCCCCCC"]
        );
    }

    #[tokio::test]
    async fn code_search_gives_up_after_max_attempts() {
        let taken = ["AAAAAAAA", "BBBBBBBB", "CCCCCCCC", "DDDDDDDD", "EEEEEEEE"];
        let store = CodeStore::with_taken(&taken);
        let err = create_classroom_with(
            &store,
            Uuid::new_v4(),
            "Intro to Java",
            String::new(),
            Utc::now(),
            codes(&taken),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, PortError::Conflict(_)));
        assert_eq!(store.inserted.lock().unwrap().len(), MAX_CODE_ATTEMPTS);
    }

    //=====================================================================================
    // Account provisioning
    //=====================================================================================

    /// Users and mini-project records in memory. The first `failures` record
    /// inserts fail as if the connection dropped.
    #[derive(Default)]
    struct AccountStore {
        users: Mutex<Vec<User>>,
        records: Mutex<Vec<MiniProjectRecord>>,
        failures: Mutex<usize>,
    }

    #[async_trait]
    impl UserRepository for AccountStore {
        async fn create_user(&self, account: NewAccount) -> PortResult<User> {
            let mut users = self.users.lock().unwrap();
            if users.iter().any(|u| u.email == account.email) {
                return Err(PortError::Conflict("email taken".into()));
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
            users.push(user.clone());
            Ok(user)
        }

        async fn get_user(&self, user_id: Uuid) -> PortResult<User> {
            self.users
                .lock()
                .unwrap()
                .iter()
                .find(|u| u.id == user_id)
                .cloned()
                .ok_or_else(|| PortError::NotFound("user".into()))
        }

        async fn find_user_by_email(&self, email: &str) -> PortResult<Option<User>> {
            Ok(self.users.lock().unwrap().iter().find(|u| u.email == email).cloned())
        }

        async fn get_credentials(&self, _email: &str) -> PortResult<UserCredentials> {
            Err(PortError::NotFound("credentials".into()))
        }

        async fn save_survey(
            &self,
            _user_id: Uuid,
            _survey: &SkillsSurvey,
        ) -> PortResult<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl VersionedStore<MiniProjectRecord> for AccountStore {
        async fn load(&self, id: Uuid) -> PortResult<MiniProjectRecord> {
            self.records
                .lock()
                .unwrap()
                .iter()
                .find(|r| r.user_id == id)
                .cloned()
                .ok_or_else(|| PortError::NotFound("record".into()))
        }

        async fn store(&self, document: &MiniProjectRecord) -> PortResult<MiniProjectRecord> {
            Ok(document.clone())
        }
    }

    #[async_trait]
    impl MiniProjectRepository for AccountStore {
        async fn insert_mini_project(&self, record: &MiniProjectRecord) -> PortResult<()> {
            let mut failures = self.failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(PortError::Unexpected("connection reset".into()));
            }
            let mut records = self.records.lock().unwrap();
            if records.iter().any(|r| r.user_id == record.user_id) {
                return Err(PortError::Conflict("record exists".into()));
            }
            records.push(record.clone());
            Ok(())
        }
    }

    struct GoogleSays(IdentityProfile);

    #[async_trait]
    impl IdentityProvider for GoogleSays {
        fn begin_sign_in(&self) -> PortResult<AuthorizationRedirect> {
            Ok(AuthorizationRedirect {
                url: "https://accounts.example/consent".into(),
                state: "s1".into(),
            })
        }

        async fn exchange_code(&self, _code: &str, state: &str) -> PortResult<IdentityProfile> {
            if state != "s1" {
                return Err(PortError::Unauthorized);
            }
            Ok(self.0.clone())
        }
    }

    fn google_student(email: &str) -> NewAccount {
        NewAccount {
            email: email.into(),
            display_name: "Grace".into(),
            role: Role::Student,
            provider: AuthProvider::Google,
            provider_id: Some("g-1".into()),
            password_hash: None,
        }
    }

    #[tokio::test]
    async fn students_get_a_record_with_their_account() {
        let store = AccountStore::default();
        let account = google_student("grace@example.com");
        let user = provision_account(&store, &store, account, Utc::now())
            .await
            .unwrap();
        assert_eq!(store.load(user.id).await.unwrap().user_id, user.id);
    }

    #[tokio::test]
    async fn a_lost_record_is_restored_on_the_next_sign_in() {
        let store = AccountStore {
            failures: Mutex::new(1),
            ..Default::default()
        };
        let account = google_student("grace@example.com");
        let err = provision_account(&store, &store, account, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::Unexpected(_)));
        let user = store
            .find_user_by_email("grace@example.com")
            .await
            .unwrap()
            .unwrap();
        assert!(store.load(user.id).await.is_err());

        let identity = GoogleSays(IdentityProfile {
            email: "grace@example.com".into(),
            display_name: "Grace".into(),
            provider_id: "g-1".into(),
        });
        let (signed_in, created) =
            sign_in_with_identity(&store, &store, &identity, "code", "s1", Utc::now())
                .await
                .unwrap();
        assert!(!created);
        assert_eq!(signed_in.id, user.id);
        assert_eq!(store.load(user.id).await.unwrap().user_id, user.id);

        // A second sign-in finds the record and leaves it alone.
        ensure_student_record(&store, &signed_in, Utc::now()).await.unwrap();
        assert_eq!(store.records.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn sign_in_rejects_an_unknown_state() {
        let store = AccountStore::default();
        let identity = GoogleSays(IdentityProfile {
            email: "grace@example.com".into(),
            display_name: "Grace".into(),
            provider_id: "g-1".into(),
        });
        let err = sign_in_with_identity(&store, &store, &identity, "code", "forged", Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::Unauthorized));
        assert!(store.users.lock().unwrap().is_empty());
    }
}

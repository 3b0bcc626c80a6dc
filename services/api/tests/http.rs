//! End-to-end tests of the router over the in-memory store, with fake
//! LLM, file host, mailer and identity provider.

use api_lib::adapters::MemoryStore;
use api_lib::config::{Config, LlmConfig, StoreKind};
use api_lib::web::{router, state::AppState};
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use chrono::Utc;
use classroom_core::domain::{
    AuthorizationRedirect, CodeFeedback, CodeReviewRequest, FileUpload, IdentityProfile, OutgoingMail,
    ProjectGenerationRequest, ProjectRecommendation, ResourceType, StoredFile,
};
use classroom_core::ports::{
    CodeFeedbackService, FileStorage, IdentityProvider, MailService, PortError, PortResult,
    ProjectGenerationService,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;
use uuid::Uuid;

//=========================================================================================
// Fakes
//=========================================================================================

struct FakeGenerator;

#[async_trait]
impl ProjectGenerationService for FakeGenerator {
    async fn generate_projects(
        &self,
        request: &ProjectGenerationRequest,
    ) -> PortResult<Vec<ProjectRecommendation>> {
        let now = Utc::now();
        Ok((1..=request.count)
            .map(|n| ProjectRecommendation {
                title: format!("{} project {}", request.language, n),
                description: "Build something small".to_string(),
                language: request.language,
                requirements: "It runs".to_string(),
                sample_output: "ok".to_string(),
                rubric: "Works: 100".to_string(),
                is_ai_generated: true,
                generated_at: now,
                week_number: None,
                created_at: now,
            })
            .collect())
    }
}

#[async_trait]
impl CodeFeedbackService for FakeGenerator {
    async fn review_code(&self, request: &CodeReviewRequest) -> PortResult<CodeFeedback> {
        Ok(CodeFeedback {
            score: 85,
            feedback: format!("Solid work on {}", request.title),
        })
    }
}

#[derive(Default)]
struct FakeStorage {
    uploaded: Mutex<Vec<String>>,
    deleted: Mutex<Vec<String>>,
}

#[async_trait]
impl FileStorage for FakeStorage {
    async fn upload(&self, file: FileUpload) -> PortResult<StoredFile> {
        self.uploaded.lock().unwrap().push(file.file_name.clone());
        Ok(StoredFile {
            public_id: format!("test/{}", file.file_name),
            url: format!("https://files.example/{}", file.file_name),
            resource_type: ResourceType::from_mime(&file.content_type),
            file_name: file.file_name,
            content_type: file.content_type,
            bytes: file.data.len() as u64,
        })
    }

    async fn delete(&self, public_id: &str, _resource_type: ResourceType) -> PortResult<()> {
        self.deleted.lock().unwrap().push(public_id.to_string());
        Ok(())
    }
}

#[derive(Default)]
struct FakeMailer {
    sent: Mutex<Vec<OutgoingMail>>,
}

#[async_trait]
impl MailService for FakeMailer {
    async fn send(&self, mail: OutgoingMail) -> PortResult<()> {
        self.sent.lock().unwrap().push(mail);
        Ok(())
    }
}

struct FakeIdentity;

#[async_trait]
impl IdentityProvider for FakeIdentity {
    fn begin_sign_in(&self) -> PortResult<AuthorizationRedirect> {
        Ok(AuthorizationRedirect {
            url: "https://accounts.example/consent?state=abc".to_string(),
            state: "abc".to_string(),
        })
    }

    async fn exchange_code(&self, code: &str, state: &str) -> PortResult<IdentityProfile> {
        if code != "good-code" || state != "abc" {
            return Err(PortError::Unauthorized);
        }
        Ok(IdentityProfile {
            email: "grace@example.com".to_string(),
            display_name: "Grace".to_string(),
            provider_id: "google-123".to_string(),
        })
    }
}

//=========================================================================================
// Harness
//=========================================================================================

struct TestApp {
    router: Router,
    storage: Arc<FakeStorage>,
    mailer: Arc<FakeMailer>,
}

fn test_config() -> Config {
    Config {
        bind_address: ([127, 0, 0, 1], 0).into(),
        store: StoreKind::Memory,
        database_url: None,
        log_level: tracing::Level::INFO,
        cors_origin: "http://localhost:5173".to_string(),
        max_upload_bytes: 1024 * 1024,
        retention_weeks: 26,
        projects_per_language: 2,
        llm: LlmConfig {
            use_remote: false,
            local_url: "http://localhost:11434/v1".to_string(),
            remote_url: None,
            model: "codellama".to_string(),
            api_key: None,
        },
        cloudinary: None,
        gmail: None,
        google: None,
    }
}

fn app() -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let storage = Arc::new(FakeStorage::default());
    let mailer = Arc::new(FakeMailer::default());
    let llm = Arc::new(FakeGenerator);
    let state = Arc::new(AppState {
        users: store.clone(),
        mini_projects: store.clone(),
        classrooms: store.clone(),
        activities: store.clone(),
        assignments: store,
        storage: storage.clone(),
        mailer: mailer.clone(),
        identity: Arc::new(FakeIdentity),
        generator: llm.clone(),
        reviewer: llm,
        config: Arc::new(test_config()),
    });
    TestApp {
        router: router(state),
        storage,
        mailer,
    }
}

impl TestApp {
    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    async fn call(
        &self,
        method: &str,
        uri: &str,
        user: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header("x-user-id", user);
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }

    async fn multipart(&self, uri: &str, user: &str, body: String) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("x-user-id", user)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap();
        self.send(request).await
    }

    /// Signs up and returns the new user's id.
    async fn signup(&self, email: &str, role: &str) -> String {
        let (status, body) = self
            .call(
                "POST",
                "/auth/signup",
                None,
                Some(json!({
                    "email": email,
                    "password": "correct horse",
                    "display_name": email.split('@').next().unwrap(),
                    "role": role,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body["id"].as_str().unwrap().to_string()
    }

    /// A teacher, an enrolled student and their classroom.
    async fn classroom(&self) -> (String, String, String) {
        let teacher = self.signup("turing@example.com", "teacher").await;
        let student = self.signup("ada@example.com", "student").await;
        let (status, classroom) = self
            .call(
                "POST",
                "/classrooms",
                Some(&teacher),
                Some(json!({ "name": "Intro to Programming" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let code = classroom["code"].as_str().unwrap().to_lowercase();
        let (status, _) = self
            .call("POST", "/classrooms/join", Some(&student), Some(json!({ "code": code })))
            .await;
        assert_eq!(status, StatusCode::OK);
        let id = classroom["id"].as_str().unwrap().to_string();
        (teacher, student, id)
    }
}

const BOUNDARY: &str = "X-TEST-BOUNDARY";

fn form(fields: &[(&str, &str)], files: &[(&str, &str, &str)]) -> String {
    let mut body = String::new();
    for (name, value) in fields {
        body.push_str(&format!(
            "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
            BOUNDARY, name, value
        ));
    }
    for (file_name, content_type, data) in files {
        body.push_str(&format!(
            "--{}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n{}\r\n",
            BOUNDARY, file_name, content_type, data
        ));
    }
    body.push_str(&format!("--{}--\r\n", BOUNDARY));
    body
}

//=========================================================================================
// Accounts
//=========================================================================================

#[tokio::test]
async fn health_is_public() {
    let app = app();
    let (status, body) = app.call("GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn signup_then_login() {
    let app = app();
    let id = app.signup("Ada@Example.com", "student").await;
    assert_eq!(app.mailer.sent.lock().unwrap()[0].to, "ada@example.com");

    let (status, _) = app
        .call(
            "POST",
            "/auth/signup",
            None,
            Some(json!({"email": "ada@example.com", "password": "another one", "display_name": "Ada"})),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, user) = app
        .call(
            "POST",
            "/auth/login",
            None,
            Some(json!({"email": "ada@example.com", "password": "correct horse"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(user["id"], id.as_str());
    assert_eq!(user["role"], "student");

    let (status, _) = app
        .call(
            "POST",
            "/auth/login",
            None,
            Some(json!({"email": "ada@example.com", "password": "wrong horse"})),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn signup_rejects_admins_and_short_passwords() {
    let app = app();
    let (status, _) = app
        .call(
            "POST",
            "/auth/signup",
            None,
            Some(json!({"email": "root@example.com", "password": "long enough", "display_name": "Root", "role": "admin"})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .call(
            "POST",
            "/auth/signup",
            None,
            Some(json!({"email": "bob@example.com", "password": "short", "display_name": "Bob"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn google_sign_in_creates_the_account_once() {
    let app = app();
    let (status, body) = app.call("GET", "/auth/google/url", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "abc");
    assert!(body["url"].as_str().unwrap().ends_with("state=abc"));

    let callback = json!({"code": "good-code", "state": body["state"]});
    let (status, first) = app
        .call("POST", "/auth/google/callback", None, Some(callback.clone()))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["created"], true);
    assert_eq!(first["user"]["provider"], "google");

    let (_, second) = app.call("POST", "/auth/google/callback", None, Some(callback)).await;
    assert_eq!(second["created"], false);
    assert_eq!(second["user"]["id"], first["user"]["id"]);

    let (status, _) = app
        .call("POST", "/auth/google/callback", None, Some(json!({"code": "forged", "state": "abc"})))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .call(
            "POST",
            "/auth/google/callback",
            None,
            Some(json!({"code": "good-code", "state": "other"})),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn protected_routes_need_a_known_user() {
    let app = app();
    let (status, _) = app.call("GET", "/classrooms", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let stranger = Uuid::new_v4().to_string();
    let (status, _) = app.call("GET", "/classrooms", Some(&stranger), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.call("GET", "/classrooms", Some("not-a-uuid"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn survey_is_saved_and_read_back() {
    let app = app();
    let ada = app.signup("ada@example.com", "student").await;

    let (status, _) = app.call("GET", "/users/me/survey", Some(&ada), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .call(
            "PUT",
            "/users/me/survey",
            Some(&ada),
            Some(json!({"languages": ["rust"], "experience": "beginner", "weekly_hours": 4})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, survey) = app
        .call(
            "PUT",
            "/users/me/survey",
            Some(&ada),
            Some(json!({
                "languages": ["Python", "python", "java"],
                "experience": "intermediate",
                "interests": [" games "],
                "weekly_hours": 4,
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(survey["languages"], json!(["python", "java"]));
    assert_eq!(survey["interests"], json!(["games"]));

    let (status, stored) = app.call("GET", "/users/me/survey", Some(&ada), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stored["experience"], "intermediate");
}

//=========================================================================================
// Mini-Projects
//=========================================================================================

#[tokio::test]
async fn weekly_generation_lifecycle() {
    let app = app();
    let ada = app.signup("ada@example.com", "student").await;

    let (status, _) = app.call("POST", "/mini-projects/me/generate", Some(&ada), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, record) = app
        .call("POST", "/mini-projects/me/generation/enable", Some(&ada), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["generation_enabled"], true);

    let (status, week) = app.call("POST", "/mini-projects/me/generate", Some(&ada), None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(week["java_projects"].as_array().unwrap().len(), 2);
    assert_eq!(week["python_projects"].as_array().unwrap().len(), 2);
    let week_number = week["week_number"].as_u64().unwrap();

    let (_, all) = app.call("GET", "/mini-projects/me/current", Some(&ada), None).await;
    assert_eq!(all.as_array().unwrap().len(), 4);

    let (status, _) = app
        .call("GET", "/mini-projects/me/current?language=cobol", Some(&ada), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .call("DELETE", "/mini-projects/me/current/JAVA", Some(&ada), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, java) = app
        .call("GET", "/mini-projects/me/current?language=java", Some(&ada), None)
        .await;
    assert!(java.as_array().unwrap().is_empty());

    let (_, python) = app
        .call(
            "GET",
            &format!("/mini-projects/me/weeks/{}?language=python", week_number),
            Some(&ada),
            None,
        )
        .await;
    assert_eq!(python.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn tasks_are_saved_then_reviewed() {
    let app = app();
    let ada = app.signup("ada@example.com", "student").await;
    let task = json!({"title": "python project 1", "code": "print('hi')"});

    let (status, saved) = app
        .call("PUT", "/mini-projects/me/tasks/progress", Some(&ada), Some(task.clone()))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(saved["status"], "paused");

    let (status, done) = app
        .call("POST", "/mini-projects/me/tasks/submit", Some(&ada), Some(task.clone()))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(done["status"], "completed");
    assert_eq!(done["score"], 85);

    let (status, _) = app
        .call("POST", "/mini-projects/me/tasks/submit", Some(&ada), Some(task))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

//=========================================================================================
// Classrooms and Class Work
//=========================================================================================

#[tokio::test]
async fn classroom_membership() {
    let app = app();
    let (teacher, student, classroom_id) = app.classroom().await;

    let (status, _) = app
        .call("POST", "/classrooms", Some(&student), Some(json!({"name": "Mine"})))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, listed) = app.call("GET", "/classrooms", Some(&student), None).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let (_, classroom) = app
        .call("GET", &format!("/classrooms/{}", classroom_id), Some(&teacher), None)
        .await;
    let code = classroom["code"].as_str().unwrap().to_string();
    let (status, again) = app
        .call("POST", "/classrooms/join", Some(&student), Some(json!({"code": code})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["students"].as_array().unwrap().len(), 1);

    let (status, _) = app
        .call("POST", "/classrooms/join", Some(&student), Some(json!({"code": "NOPE00"})))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let outsider = app.signup("eve@example.com", "student").await;
    let (status, _) = app
        .call("GET", &format!("/classrooms/{}", classroom_id), Some(&outsider), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .call(
            "DELETE",
            &format!("/classrooms/{}/students/{}", classroom_id, student),
            Some(&student),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, listed) = app.call("GET", "/classrooms", Some(&student), None).await;
    assert!(listed.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn activity_submission_and_grading() {
    let app = app();
    let (teacher, student, classroom_id) = app.classroom().await;

    let (status, activity) = app
        .call(
            "POST",
            &format!("/classrooms/{}/activities", classroom_id),
            Some(&teacher),
            Some(json!({"title": "FizzBuzz", "kind": "coding", "max_score": 10})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let activity_id = activity["id"].as_str().unwrap().to_string();

    let (_, seen) = app
        .call("GET", &format!("/classrooms/{}/activities", classroom_id), Some(&student), None)
        .await;
    assert!(seen.as_array().unwrap().is_empty());

    let submit = format!("/activities/{}/submissions", activity_id);
    let answer = json!({"content": "for i in range(100): ..."});
    let (status, _) = app.call("POST", &submit, Some(&student), Some(answer.clone())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .call("POST", &format!("/activities/{}/publish", activity_id), Some(&teacher), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let grade = format!("/activities/{}/submissions/{}/grade", activity_id, student);
    let (status, _) = app
        .call("POST", &grade, Some(&teacher), Some(json!({"score": 8})))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, submission) = app.call("POST", &submit, Some(&student), Some(answer.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(submission["status"], "submitted");
    let (status, _) = app.call("POST", &submit, Some(&student), Some(answer)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .call("POST", &grade, Some(&teacher), Some(json!({"score": 11})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = app
        .call("POST", &grade, Some(&student), Some(json!({"score": 10})))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, graded) = app
        .call("POST", &grade, Some(&teacher), Some(json!({"score": 8, "feedback": "Nice"})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(graded["score"], 8);
    assert_eq!(graded["status"], "graded");
    assert!(app
        .mailer
        .sent
        .lock()
        .unwrap()
        .iter()
        .any(|m| m.to == "ada@example.com" && m.subject.contains("FizzBuzz")));

    let (status, _) = app
        .call("DELETE", &format!("/activities/{}/submissions/me", activity_id), Some(&student), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn assignments_with_attachments() {
    let app = app();
    let (teacher, student, classroom_id) = app.classroom().await;

    let (status, assignment) = app
        .multipart(
            &format!("/classrooms/{}/assignments", classroom_id),
            &teacher,
            form(
                &[("title", "Essay"), ("max_score", "20"), ("allow_late_submission", "true")],
                &[("brief.pdf", "application/pdf", "%PDF-1.4")],
            ),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", assignment);
    assert_eq!(assignment["attachments"][0]["resource_type"], "raw");
    let assignment_id = assignment["id"].as_str().unwrap().to_string();

    let (status, _) = app
        .call("GET", &format!("/assignments/{}", assignment_id), Some(&student), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    app.call("POST", &format!("/assignments/{}/publish", assignment_id), Some(&teacher), None)
        .await;

    let (status, submission) = app
        .multipart(
            &format!("/assignments/{}/submissions", assignment_id),
            &student,
            form(&[("content", "See attached")], &[("essay.txt", "text/plain", "Once upon a time")]),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", submission);
    assert_eq!(submission["attachments"][0]["file_name"], "essay.txt");

    let (status, _) = app
        .call("DELETE", &format!("/assignments/{}", assignment_id), Some(&student), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, deleted) = app
        .call("DELETE", &format!("/assignments/{}", assignment_id), Some(&teacher), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(deleted["cleanup_errors"].as_array().unwrap().is_empty());
    let removed = app.storage.deleted.lock().unwrap().clone();
    assert_eq!(removed, vec!["test/brief.pdf", "test/essay.txt"]);

    let (_, listed) = app
        .call("GET", &format!("/classrooms/{}/assignments", classroom_id), Some(&teacher), None)
        .await;
    assert!(listed.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn rejected_hand_ins_upload_nothing() {
    let app = app();
    let (teacher, student, classroom_id) = app.classroom().await;
    let outsider = app.signup("hopper@example.com", "student").await;

    let (_, assignment) = app
        .multipart(
            &format!("/classrooms/{}/assignments", classroom_id),
            &teacher,
            form(&[("title", "Essay"), ("max_score", "20")], &[]),
        )
        .await;
    let submissions = format!("/assignments/{}/submissions", assignment["id"].as_str().unwrap());
    let answer = || form(&[], &[("essay.txt", "text/plain", "Once upon a time")]);

    let (status, _) = app.multipart(&submissions, &student, answer()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let publish = submissions.replace("/submissions", "/publish");
    app.call("POST", &publish, Some(&teacher), None).await;

    let (status, _) = app.multipart(&submissions, &outsider, answer()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(app.storage.uploaded.lock().unwrap().is_empty());

    let (status, _) = app.multipart(&submissions, &student, answer()).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = app.multipart(&submissions, &student, answer()).await;
    assert_eq!(status, StatusCode::CONFLICT);

    assert_eq!(*app.storage.uploaded.lock().unwrap(), vec!["essay.txt"]);
    assert!(app.storage.deleted.lock().unwrap().is_empty());
}

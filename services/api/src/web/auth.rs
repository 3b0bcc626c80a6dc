//! services/api/src/web/auth.rs
//!
//! Account endpoints: password signup and login, and Google sign-in.
//! Issuing session tokens is left to the gateway in front of the service;
//! these handlers only establish who the user is.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use classroom_core::domain::{AuthProvider, NewAccount, OutgoingMail, Role, User};
use classroom_core::ports::PortError;
use classroom_core::workflow::{
    ensure_student_record, provision_account, send_best_effort, sign_in_with_identity,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use utoipa::ToSchema;

use crate::error::{ApiError, ApiResult};
use crate::web::state::AppState;

pub const MIN_PASSWORD_LEN: usize = 8;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub display_name: String,
    /// Defaults to `student`. Admin accounts cannot be self-registered.
    pub role: Option<Role>,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize, ToSchema)]
pub struct GoogleUrlResponse {
    pub url: String,
    pub state: String,
}

#[derive(Deserialize, ToSchema)]
pub struct GoogleCallbackRequest {
    pub code: String,
    /// The `state` returned by `/auth/google/url`.
    pub state: String,
}

#[derive(Serialize, ToSchema)]
pub struct GoogleSignInResponse {
    pub user: User,
    pub created: bool,
}

fn welcome_mail(user: &User) -> OutgoingMail {
    OutgoingMail {
        to: user.email.clone(),
        subject: "Welcome to the classroom".to_string(),
        body: format!(
            "Hi {},\n\nYour {} account is ready.",
            user.display_name,
            user.role.as_str()
        ),
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /auth/signup - Create a new user account
#[utoipa::path(
    post,
    path = "/auth/signup",
    tag = "auth",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "User created successfully", body = User),
        (status = 400, description = "Invalid request"),
        (status = 409, description = "E-mail already registered")
    )
)]
pub async fn signup_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignupRequest>,
) -> ApiResult<impl IntoResponse> {
    let role = req.role.unwrap_or(Role::Student);
    if role == Role::Admin {
        return Err(PortError::Forbidden("Admin accounts cannot sign up".to_string()).into());
    }
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(PortError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        ))
        .into());
    }

    // 1. Hash the password
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| {
            error!("Failed to hash password: {:?}", e);
            ApiError::Internal("Failed to hash password".to_string())
        })?
        .to_string();

    // 2. Create the user (and their mini-project record)
    let account = NewAccount {
        email: req.email,
        display_name: req.display_name,
        role,
        provider: AuthProvider::Password,
        provider_id: None,
        password_hash: Some(password_hash),
    };
    let user = provision_account(
        state.users.as_ref(),
        state.mini_projects.as_ref(),
        account,
        Utc::now(),
    )
    .await?;

    // 3. Say hello
    send_best_effort(state.mailer.as_ref(), welcome_mail(&user)).await;

    Ok((StatusCode::CREATED, Json(user)))
}

/// POST /auth/login - Check a password and return the profile
#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = User),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<User>> {
    // 1. Get credentials by email; unknown e-mails look like bad passwords
    let creds = state
        .users
        .get_credentials(&req.email)
        .await
        .map_err(|e| match e {
            PortError::NotFound(_) => PortError::Unauthorized,
            other => other,
        })?;
    let stored_hash = creds.password_hash.ok_or(PortError::Unauthorized)?;

    // 2. Verify password
    let parsed_hash = PasswordHash::new(&stored_hash).map_err(|e| {
        error!("Failed to parse password hash: {:?}", e);
        ApiError::Internal("Authentication error".to_string())
    })?;
    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| PortError::Unauthorized)?;

    let user = state.users.get_user(creds.user_id).await?;
    ensure_student_record(state.mini_projects.as_ref(), &user, Utc::now()).await?;
    info!(user_id = %user.id, "User logged in");
    Ok(Json(user))
}

/// GET /auth/google/url - Where to send the browser for Google consent
#[utoipa::path(
    get,
    path = "/auth/google/url",
    tag = "auth",
    responses(
        (status = 200, description = "Consent URL", body = GoogleUrlResponse),
        (status = 502, description = "Google sign-in is not configured")
    )
)]
pub async fn google_url_handler(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<GoogleUrlResponse>> {
    let redirect = state.identity.begin_sign_in()?;
    Ok(Json(GoogleUrlResponse {
        url: redirect.url,
        state: redirect.state,
    }))
}

/// POST /auth/google/callback - Exchange a Google authorization code
#[utoipa::path(
    post,
    path = "/auth/google/callback",
    tag = "auth",
    request_body = GoogleCallbackRequest,
    responses(
        (status = 200, description = "Signed in", body = GoogleSignInResponse),
        (status = 401, description = "Unknown sign-in state, or Google did not vouch for the e-mail"),
        (status = 502, description = "Google could not be reached")
    )
)]
pub async fn google_callback_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GoogleCallbackRequest>,
) -> ApiResult<Json<GoogleSignInResponse>> {
    let (user, created) = sign_in_with_identity(
        state.users.as_ref(),
        state.mini_projects.as_ref(),
        state.identity.as_ref(),
        req.code.trim(),
        req.state.trim(),
        Utc::now(),
    )
    .await?;

    if created {
        send_best_effort(state.mailer.as_ref(), welcome_mail(&user)).await;
    }
    Ok(Json(GoogleSignInResponse { user, created }))
}

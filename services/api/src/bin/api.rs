//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{
        CloudinaryAdapter, DbAdapter, DisabledIdentity, DisabledStorage, GmailAdapter,
        discover_google, GoogleIdentityAdapter, MemoryStore, NoopMailer, OllamaAdapter,
    },
    config::{Config, StoreKind},
    error::ApiError,
    web::{router, state::AppState},
};
use classroom_core::ports::{
    ActivityRepository, AssignmentRepository, ClassroomRepository, FileStorage, IdentityProvider,
    MailService, MiniProjectRepository, UserRepository,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// The repository handles, all served by one backing store.
struct Repositories {
    users: Arc<dyn UserRepository>,
    mini_projects: Arc<dyn MiniProjectRepository>,
    classrooms: Arc<dyn ClassroomRepository>,
    activities: Arc<dyn ActivityRepository>,
    assignments: Arc<dyn AssignmentRepository>,
}

fn repositories<S>(store: Arc<S>) -> Repositories
where
    S: UserRepository
        + MiniProjectRepository
        + ClassroomRepository
        + ActivityRepository
        + AssignmentRepository
        + 'static,
{
    Repositories {
        users: store.clone(),
        mini_projects: store.clone(),
        classrooms: store.clone(),
        activities: store.clone(),
        assignments: store,
    }
}

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Open the Store & Run Migrations ---
    let repos = match config.store {
        StoreKind::Postgres => {
            let database_url = config
                .database_url
                .as_deref()
                .ok_or_else(|| ApiError::Internal("DATABASE_URL is required".to_string()))?;
            info!("Connecting to database...");
            let db_pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(database_url)
                .await?;
            let db_adapter = Arc::new(DbAdapter::new(db_pool));
            info!("Running database migrations...");
            db_adapter.run_migrations().await?;
            info!("Database migrations complete.");
            repositories(db_adapter)
        }
        StoreKind::Memory => {
            warn!("Using the in-memory store; nothing survives a restart.");
            repositories(Arc::new(MemoryStore::new()))
        }
    };

    // --- 3. Initialize Service Adapters ---
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .map_err(|e| ApiError::Internal(format!("Failed to build HTTP client: {}", e)))?;

    let llm = Arc::new(OllamaAdapter::new(&config.llm)?);
    info!(endpoint = config.llm.endpoint(), model = %config.llm.model, "LLM adapter ready");

    let storage: Arc<dyn FileStorage> = match &config.cloudinary {
        Some(cloudinary) => Arc::new(CloudinaryAdapter::new(http.clone(), cloudinary.clone())),
        None => {
            warn!("Cloudinary is not configured; file uploads are disabled.");
            Arc::new(DisabledStorage)
        }
    };
    // Google's OpenID metadata backs both sign-in and the Gmail token refresh.
    let oauth_http = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(|e| ApiError::Internal(format!("Failed to build HTTP client: {}", e)))?;
    let google_metadata = if config.google.is_some() || config.gmail.is_some() {
        match discover_google(&oauth_http).await {
            Ok(metadata) => Some(metadata),
            Err(e) => {
                warn!(error = %e, "Google discovery failed; Google sign-in and Gmail are disabled.");
                None
            }
        }
    } else {
        None
    };

    let mailer: Arc<dyn MailService> = match (&config.gmail, &google_metadata) {
        (Some(gmail), Some(metadata)) => Arc::new(GmailAdapter::new(
            http.clone(),
            oauth_http.clone(),
            metadata.clone(),
            gmail.clone(),
        )),
        _ => {
            warn!("Gmail is not configured; notification emails are skipped.");
            Arc::new(NoopMailer)
        }
    };
    let identity: Arc<dyn IdentityProvider> = match (&config.google, google_metadata) {
        (Some(google), Some(metadata)) => Arc::new(GoogleIdentityAdapter::new(
            oauth_http.clone(),
            metadata,
            google,
        )?),
        _ => {
            warn!("Google OAuth is not configured; Google sign-in is disabled.");
            Arc::new(DisabledIdentity)
        }
    };

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        users: repos.users,
        mini_projects: repos.mini_projects,
        classrooms: repos.classrooms,
        activities: repos.activities,
        assignments: repos.assignments,
        storage,
        mailer,
        identity,
        generator: llm.clone(),
        reviewer: llm,
        config: config.clone(),
    });

    // --- 5. Create the Web Router ---
    let app = router(app_state);

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

//! services/api/src/adapters/identity.rs
//!
//! Google OpenID Connect implementation of the `IdentityProvider` port, plus
//! a disabled provider for deployments without Google credentials.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use classroom_core::domain::{AuthorizationRedirect, IdentityProfile};
use classroom_core::ports::{IdentityProvider, PortError, PortResult};
use openidconnect::core::{
    CoreAuthenticationFlow, CoreClient, CoreIdTokenClaims, CoreProviderMetadata,
};
use openidconnect::{
    AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointMaybeSet, EndpointNotSet,
    EndpointSet, IssuerUrl, Nonce, RedirectUrl, Scope, TokenResponse,
};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, warn};

use super::retry::{default_backoff, with_backoff, MaybeRetry};
use crate::config::GoogleOAuthConfig;

pub const GOOGLE_ISSUER: &str = "https://accounts.google.com";

/// How long a sign-in may take between redirect and callback.
const PENDING_TTL_MINUTES: i64 = 10;

pub type GoogleClient =
    CoreClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointMaybeSet, EndpointMaybeSet>;

/// Fetches Google's discovery document and signing keys. `http` must not
/// follow redirects.
pub async fn discover_google(http: &reqwest::Client) -> PortResult<CoreProviderMetadata> {
    let issuer = IssuerUrl::new(GOOGLE_ISSUER.to_string())
        .map_err(|e| PortError::Unexpected(e.to_string()))?;
    with_backoff(&default_backoff(), "google-discovery", move || {
        let issuer = issuer.clone();
        async move {
            CoreProviderMetadata::discover_async(issuer, http)
                .await
                .map_err(|e| {
                    MaybeRetry::MaybeRetry(PortError::ExternalService(format!(
                        "Google discovery failed: {}",
                        e
                    )))
                })
        }
    })
    .await
}

/// Builds a Google client for the given credentials.
pub fn google_client(
    metadata: CoreProviderMetadata,
    client_id: &str,
    client_secret: &str,
) -> GoogleClient {
    CoreClient::from_provider_metadata(
        metadata,
        ClientId::new(client_id.to_string()),
        Some(ClientSecret::new(client_secret.to_string())),
    )
}

struct PendingSignIn {
    nonce: Nonce,
    issued_at: DateTime<Utc>,
}

/// Maps verified ID-token claims to a profile. Unverified or missing
/// e-mail addresses are refused.
pub fn profile_from_claims(claims: &CoreIdTokenClaims) -> PortResult<IdentityProfile> {
    let email = match (claims.email(), claims.email_verified()) {
        (Some(email), Some(true)) => email.as_str().to_string(),
        _ => return Err(PortError::Unauthorized),
    };
    let display_name = claims
        .name()
        .and_then(|name| name.get(None))
        .map(|name| name.as_str().to_string())
        .unwrap_or_default();

    Ok(IdentityProfile {
        display_name,
        email,
        provider_id: claims.subject().as_str().to_string(),
    })
}

//=========================================================================================
// Google
//=========================================================================================

pub struct GoogleIdentityAdapter {
    http: reqwest::Client,
    client: GoogleClient,
    pending: Mutex<HashMap<String, PendingSignIn>>,
}

impl GoogleIdentityAdapter {
    pub fn new(
        http: reqwest::Client,
        metadata: CoreProviderMetadata,
        config: &GoogleOAuthConfig,
    ) -> PortResult<Self> {
        let redirect = RedirectUrl::new(config.redirect_uri.clone())
            .map_err(|e| PortError::Validation(format!("Invalid redirect URI: {}", e)))?;
        let client = google_client(metadata, &config.client_id, &config.client_secret)
            .set_redirect_uri(redirect);
        Ok(Self {
            http,
            client,
            pending: Mutex::new(HashMap::new()),
        })
    }

    fn pending(&self) -> PortResult<std::sync::MutexGuard<'_, HashMap<String, PendingSignIn>>> {
        self.pending
            .lock()
            .map_err(|_| PortError::Unexpected("Sign-in state lock poisoned".to_string()))
    }

    /// Removes and returns the nonce issued with `state`.
    fn take_nonce(&self, state: &str) -> PortResult<Nonce> {
        let entry = self.pending()?.remove(state).ok_or(PortError::Unauthorized)?;
        if Utc::now() - entry.issued_at > Duration::minutes(PENDING_TTL_MINUTES) {
            return Err(PortError::Unauthorized);
        }
        Ok(entry.nonce)
    }
}

#[async_trait]
impl IdentityProvider for GoogleIdentityAdapter {
    fn begin_sign_in(&self) -> PortResult<AuthorizationRedirect> {
        let (url, csrf, nonce) = self
            .client
            .authorize_url(
                CoreAuthenticationFlow::AuthorizationCode,
                CsrfToken::new_random,
                Nonce::new_random,
            )
            .add_scope(Scope::new("email".to_string()))
            .add_scope(Scope::new("profile".to_string()))
            .url();

        let now = Utc::now();
        let mut pending = self.pending()?;
        pending.retain(|_, entry| now - entry.issued_at <= Duration::minutes(PENDING_TTL_MINUTES));
        pending.insert(
            csrf.secret().clone(),
            PendingSignIn {
                nonce,
                issued_at: now,
            },
        );

        Ok(AuthorizationRedirect {
            url: url.to_string(),
            state: csrf.secret().clone(),
        })
    }

    async fn exchange_code(&self, code: &str, state: &str) -> PortResult<IdentityProfile> {
        let nonce = self.take_nonce(state)?;

        // Authorization codes are single-use, so the exchange is not retried.
        let token = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .map_err(|e| PortError::Unexpected(e.to_string()))?
            .request_async(&self.http)
            .await
            .map_err(|e| PortError::ExternalService(format!("Google token exchange failed: {}", e)))?;

        let id_token = token
            .id_token()
            .ok_or_else(|| PortError::ExternalService("Google returned no ID token".to_string()))?;
        let claims = id_token
            .claims(&self.client.id_token_verifier(), &nonce)
            .map_err(|e| {
                warn!(error = %e, "Rejected Google ID token");
                PortError::Unauthorized
            })?;

        let profile = profile_from_claims(claims)?;
        debug!(provider_id = %profile.provider_id, "Verified Google ID token");
        Ok(profile)
    }
}

//=========================================================================================
// Disabled
//=========================================================================================

/// Used when Google sign-in is not configured.
#[derive(Clone, Default)]
pub struct DisabledIdentity;

#[async_trait]
impl IdentityProvider for DisabledIdentity {
    fn begin_sign_in(&self) -> PortResult<AuthorizationRedirect> {
        Err(PortError::ExternalService(
            "Google sign-in is not configured".to_string(),
        ))
    }

    async fn exchange_code(&self, _code: &str, _state: &str) -> PortResult<IdentityProfile> {
        Err(PortError::ExternalService(
            "Google sign-in is not configured".to_string(),
        ))
    }
}

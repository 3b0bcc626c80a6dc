//! services/api/src/adapters/mail.rs
//!
//! `MailService` adapters: Gmail's send API authorised with an OAuth2
//! refresh token exchanged at Google's token endpoint, and a no-op mailer
//! for deployments without Gmail.

use async_trait::async_trait;
use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE},
    Engine as _,
};
use chrono::{DateTime, Duration, Utc};
use classroom_core::domain::OutgoingMail;
use classroom_core::ports::{MailService, PortError, PortResult};
use openidconnect::core::CoreProviderMetadata;
use openidconnect::{OAuth2TokenResponse, RefreshToken, RequestTokenError};
use retry_policies::policies::ExponentialBackoff;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::identity::{google_client, GoogleClient};
use super::retry::{default_backoff, send_with_retry, with_backoff, MaybeRetry};
use crate::config::GmailConfig;

/// Used when Google omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;
const SEND_URL: &str = "https://gmail.googleapis.com/gmail/v1/users/me/messages/send";

/// Drops line breaks so a value cannot start a header of its own.
fn header_value(value: &str) -> String {
    value.chars().filter(|c| !matches!(c, '\r' | '\n')).collect()
}

/// Non-ASCII subjects are sent as an RFC 2047 encoded word.
fn encode_subject(subject: &str) -> String {
    let subject = header_value(subject);
    if subject.is_ascii() {
        subject
    } else {
        format!("=?UTF-8?B?{}?=", STANDARD.encode(subject))
    }
}

/// Renders a plain-text RFC 822 message.
pub fn render_message(from: &str, mail: &OutgoingMail) -> String {
    format!(
        "From: {}\r\nTo: {}\r\nSubject: {}\r\nMIME-Version: 1.0\r\nContent-Type: text/plain; charset=\"UTF-8\"\r\n\r\n{}",
        header_value(from),
        header_value(&mail.to),
        encode_subject(&mail.subject),
        mail.body
    )
}

struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

//=========================================================================================
// Gmail
//=========================================================================================

pub struct GmailAdapter {
    http: reqwest::Client,
    oauth_http: reqwest::Client,
    client: GoogleClient,
    config: GmailConfig,
    backoff: ExponentialBackoff,
    token: Mutex<Option<CachedToken>>,
}

impl GmailAdapter {
    /// `oauth_http` is used for token refreshes and must not follow redirects.
    pub fn new(
        http: reqwest::Client,
        oauth_http: reqwest::Client,
        metadata: CoreProviderMetadata,
        config: GmailConfig,
    ) -> Self {
        Self {
            http,
            oauth_http,
            client: google_client(metadata, &config.client_id, &config.client_secret),
            config,
            backoff: default_backoff(),
            token: Mutex::new(None),
        }
    }

    /// Returns a cached access token, refreshing it a minute before expiry.
    async fn access_token(&self) -> PortResult<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Utc::now() + Duration::seconds(60) {
                return Ok(token.value.clone());
            }
        }

        let refresh_token = &RefreshToken::new(self.config.refresh_token.clone());
        let response = with_backoff(&self.backoff, "gmail-oauth", move || async move {
            let request = self
                .client
                .exchange_refresh_token(refresh_token)
                .map_err(|e| MaybeRetry::NoRetry(PortError::Unexpected(e.to_string())))?;
            request.request_async(&self.oauth_http).await.map_err(|e| {
                let retry = matches!(e, RequestTokenError::Request(_));
                let err = PortError::ExternalService(format!("Gmail token refresh failed: {}", e));
                if retry {
                    MaybeRetry::MaybeRetry(err)
                } else {
                    MaybeRetry::NoRetry(err)
                }
            })
        })
        .await?;

        let expires_in = response
            .expires_in()
            .and_then(|d| Duration::from_std(d).ok())
            .unwrap_or_else(|| Duration::seconds(DEFAULT_TOKEN_LIFETIME_SECS));
        let value = response.access_token().secret().clone();
        debug!(expires_in = expires_in.num_seconds(), "Refreshed Gmail access token");
        *cached = Some(CachedToken {
            value: value.clone(),
            expires_at: Utc::now() + expires_in,
        });
        Ok(value)
    }
}

#[async_trait]
impl MailService for GmailAdapter {
    async fn send(&self, mail: OutgoingMail) -> PortResult<()> {
        let token = self.access_token().await?;
        let raw = URL_SAFE.encode(render_message(&self.config.sender, &mail));
        let payload = json!({ "raw": raw });

        send_with_retry(&self.backoff, "gmail", || {
            self.http.post(SEND_URL).bearer_auth(&token).json(&payload)
        })
        .await?;

        info!(to = %mail.to, subject = %mail.subject, "Sent e-mail");
        Ok(())
    }
}

//=========================================================================================
// No-op Mailer
//=========================================================================================

/// Logs and drops every message.
#[derive(Clone, Default)]
pub struct NoopMailer;

#[async_trait]
impl MailService for NoopMailer {
    async fn send(&self, mail: OutgoingMail) -> PortResult<()> {
        debug!(to = %mail.to, subject = %mail.subject, "Mail disabled, dropping message");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_has_headers_then_body() {
        let mail = OutgoingMail {
            to: "ada@example.com".into(),
            subject: "Graded".into(),
            body: "You scored 9/10".into(),
        };
        let raw = render_message("class@example.com", &mail);
        assert!(raw.starts_with("From: class@example.com\r\nTo: ada@example.com\r\n"));
        assert!(raw.contains("Subject: Graded\r\n"));
        assert!(raw.ends_with("\r\n\r\nYou scored 9/10"));

        let encoded = URL_SAFE.encode(&raw);
        assert!(!encoded.contains('+') && !encoded.contains('/'));
    }

    #[test]
    fn line_breaks_in_a_subject_cannot_add_headers() {
        let mail = OutgoingMail {
            to: "ada@example.com".into(),
            subject: "Graded: Loops\r\nBcc: everyone@example.com".into(),
            body: "You scored 9/10".into(),
        };
        let raw = render_message("class@example.com", &mail);
        let headers = raw.split("\r\n\r\n").next().unwrap();
        assert_eq!(headers.lines().count(), 5);
        assert!(headers.contains("Subject: Graded: LoopsBcc: everyone@example.com\r\n"));
        assert!(!headers.lines().any(|line| line.starts_with("Bcc:")));
    }

    #[test]
    fn non_ascii_subjects_are_encoded() {
        let mail = OutgoingMail {
            to: "ada@example.com".into(),
            subject: "Calificación: Bucles".into(),
            body: "9/10".into(),
        };
        let raw = render_message("class@example.com", &mail);
        let expected = format!("=?UTF-8?B?{}?=", STANDARD.encode("Calificación: Bucles"));
        assert!(raw.contains(&format!("Subject: {}\r\n", expected)));
        assert!(raw.is_ascii());
    }
}

//! HTTP implementation of the Nebula backend traits for a Supabase-style
//! service: PostgREST tables under `/rest/v1`, object storage under
//! `/storage/v1` and password auth under `/auth/v1`.

mod auth;
mod rest;
mod storage;

use nebula_core::{AuthSession, BackendConfig, CoreError};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, RequestBuilder};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

pub use rest::{filter_params, parse_content_range, select_params};
pub use storage::object_url;

const LOG_TARGET: &str = "nebula::backend";

/// Default timeout for HTTP requests (10 seconds)
const DEFAULT_TIMEOUT_SECS: u64 = 10;
const CONNECT_TIMEOUT_SECS: u64 = 5;
/// Default number of retry attempts
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Client for one backend project.
///
/// Requests are authorized with the signed-in user's access token when a
/// session exists, otherwise with the anonymous key.
pub struct SupabaseClient {
    client: ClientWithMiddleware,
    base_url: String,
    anon_key: String,
    session: RwLock<Option<AuthSession>>,
}

impl SupabaseClient {
    /// Create a client with a 10-second timeout and 3 retries.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: &BackendConfig) -> Result<Self, CoreError> {
        let base_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .user_agent(concat!("Nebula/", env!("CARGO_PKG_VERSION")))
            .build()?;

        // Wrap with retry middleware (exponential backoff)
        let retry_policy =
            ExponentialBackoff::builder().build_with_max_retries(DEFAULT_MAX_RETRIES);
        let client = ClientBuilder::new(base_client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            anon_key: config.anon_key.clone(),
            session: RwLock::new(None),
        })
    }

    /// Reuse a session saved by a previous run
    pub async fn restore_session(&self, session: AuthSession) {
        debug!(target: LOG_TARGET, "Restoring session for {}", session.user.id);
        *self.session.write().await = Some(session);
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn bearer(&self) -> String {
        let token = self
            .session
            .read()
            .await
            .as_ref()
            .map_or_else(|| self.anon_key.clone(), |s| s.access_token.clone());
        format!("Bearer {token}")
    }

    /// Attach the project key and the caller's authorization
    async fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.anon_key)
            .header(reqwest::header::AUTHORIZATION, self.bearer().await)
    }
}

/// Turn a non-2xx response into [`CoreError::Backend`] carrying the service's message
async fn ensure_success(
    operation: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, CoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let reason = error_message(&body).unwrap_or_else(|| status.to_string());
    Err(CoreError::backend(operation, reason))
}

/// Pull a human-readable message out of an error body.
///
/// The REST, storage and auth services each use their own field name.
#[must_use]
pub fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    ["error_description", "msg", "message", "error"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: &str) -> BackendConfig {
        BackendConfig {
            url: url.to_string(),
            anon_key: "anon".to_string(),
        }
    }

    #[test]
    fn test_error_message_field_priority() {
        assert_eq!(
            error_message(r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#),
            Some("Invalid login credentials".to_string())
        );
        assert_eq!(
            error_message(r#"{"msg":"User already registered","code":422}"#),
            Some("User already registered".to_string())
        );
        assert_eq!(
            error_message(r#"{"message":"duplicate key value"}"#),
            Some("duplicate key value".to_string())
        );
        assert_eq!(error_message("<html>bad gateway</html>"), None);
        assert_eq!(error_message(r#"{"code":500}"#), None);
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let client = SupabaseClient::new(&config("https://demo.supabase.co/")).unwrap();
        assert_eq!(
            client.endpoint("/rest/v1/songs"),
            "https://demo.supabase.co/rest/v1/songs"
        );
    }

    #[tokio::test]
    async fn test_bearer_prefers_session_token() {
        let client = SupabaseClient::new(&config("https://demo.supabase.co")).unwrap();
        assert_eq!(client.bearer().await, "Bearer anon");

        client
            .restore_session(AuthSession {
                access_token: "user-token".into(),
                refresh_token: None,
                expires_at: None,
                user: nebula_core::AuthUser {
                    id: "u1".into(),
                    email: None,
                },
            })
            .await;
        assert_eq!(client.bearer().await, "Bearer user-token");
    }
}

use crate::{ensure_success, SupabaseClient, LOG_TARGET};
use async_trait::async_trait;
use nebula_core::{AuthService, AuthSession, CoreError};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

#[derive(Serialize)]
struct PasswordCredentials<'a> {
    email: &'a str,
    password: &'a str,
}

/// Sign-up answers with a full session when confirmation is off, or with
/// the bare user object when the address still has to be confirmed.
fn session_from_signup(body: Value) -> Result<Option<AuthSession>, CoreError> {
    if body.get("access_token").is_some() {
        Ok(Some(serde_json::from_value(body)?))
    } else {
        Ok(None)
    }
}

#[async_trait]
impl AuthService for SupabaseClient {
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, CoreError> {
        let url = self.endpoint("/auth/v1/token?grant_type=password");
        let request = self
            .client
            .post(&url)
            .header("apikey", &self.anon_key)
            .json(&PasswordCredentials { email, password });

        let response = ensure_success("sign_in", request.send().await?).await?;
        let session: AuthSession = response.json().await?;

        info!(target: LOG_TARGET, "Auth session issued for {}", session.user.id);
        *self.session.write().await = Some(session.clone());
        Ok(session)
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Option<AuthSession>, CoreError> {
        let url = self.endpoint("/auth/v1/signup");
        let request = self
            .client
            .post(&url)
            .header("apikey", &self.anon_key)
            .json(&PasswordCredentials { email, password });

        let response = ensure_success("sign_up", request.send().await?).await?;
        let session = session_from_signup(response.json().await?)?;

        if let Some(session) = &session {
            *self.session.write().await = Some(session.clone());
        } else {
            info!(target: LOG_TARGET, "Sign-up pending email confirmation");
        }
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), CoreError> {
        if self.session.read().await.is_none() {
            return Ok(());
        }

        let url = self.endpoint("/auth/v1/logout");
        let result = match self.authorize(self.client.post(&url)).await.send().await {
            Ok(response) => ensure_success("sign_out", response).await.map(|_| ()),
            Err(e) => Err(e.into()),
        };

        // The local session is dropped even if the server call failed
        *self.session.write().await = None;
        if let Err(e) = &result {
            warn!(target: LOG_TARGET, "Server-side sign-out failed: {}", e);
        }
        result
    }

    async fn current_session(&self) -> Option<AuthSession> {
        self.session.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_signup_with_session() {
        let body = json!({
            "access_token": "t",
            "token_type": "bearer",
            "expires_in": 3600,
            "expires_at": 1_700_000_000,
            "refresh_token": "r",
            "user": { "id": "u1", "email": "ada@example.com", "role": "authenticated" }
        });
        let session = session_from_signup(body).unwrap().unwrap();
        assert_eq!(session.user.id, "u1");
        assert_eq!(session.expires_at, Some(1_700_000_000));
    }

    #[test]
    fn test_signup_pending_confirmation() {
        let body = json!({ "id": "u1", "email": "ada@example.com", "confirmation_sent_at": "2024-01-01T00:00:00Z" });
        assert!(session_from_signup(body).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sign_out_without_session_is_local() {
        let client = SupabaseClient::new(&nebula_core::BackendConfig {
            url: "http://127.0.0.1:9".into(),
            anon_key: "anon".into(),
        })
        .unwrap();
        assert!(client.sign_out().await.is_ok());
        assert!(client.current_session().await.is_none());
    }
}

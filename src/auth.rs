use crate::config::AdminCredentials;
use crate::errors::AuthError;
use crate::models::{Credentials, User};
use crate::remote::{failure_message, provider_message, RemoteClient};
use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

const MIN_PASSWORD_LEN: usize = 6;

/// External identity provider. Every successful sign-in is treated as an
/// admin session; there is no finer-grained authorization.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Returns the new user when the provider hands one back immediately.
    async fn sign_up(&self, email: &str, password: &str) -> Result<Option<User>, AuthError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<User, AuthError>;

    async fn sign_out(&self) -> Result<(), AuthError>;

    async fn current_session(&self) -> Result<Option<User>, AuthError>;
}

/// Trimmed email and password, or `InvalidInput` when either is unusable.
pub fn validate_credentials(credentials: &Credentials) -> Result<(String, String), AuthError> {
    let email = credentials.email.trim();
    let password = credentials.password.trim();
    if email.is_empty() || password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::InvalidInput);
    }
    Ok((email.to_string(), password.to_string()))
}

/// Auth endpoints of the hosted service. The session lives on the shared
/// client and, when a session file is configured, survives restarts.
pub struct RemoteIdentity {
    client: Arc<RemoteClient>,
}

impl RemoteIdentity {
    pub fn new(client: Arc<RemoteClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl IdentityProvider for RemoteIdentity {
    async fn sign_up(&self, email: &str, password: &str) -> Result<Option<User>, AuthError> {
        let response = self
            .client
            .anon_request(Method::POST, "/auth/v1/signup")
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(|err| AuthError::Transport(err.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| AuthError::Transport(err.to_string()))?;
        if !status.is_success() {
            return Err(AuthError::Rejected(provider_message(&body)));
        }

        // With email confirmation on, the body is the bare user; otherwise it
        // is a session wrapping one.
        let value: serde_json::Value = serde_json::from_str(&body).unwrap_or_default();
        let user = value
            .get("user")
            .cloned()
            .or_else(|| value.get("id").map(|_| value.clone()))
            .and_then(|user| serde_json::from_value::<User>(user).ok());
        Ok(user)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let user = self
            .client
            .grant_token("password", json!({ "email": email, "password": password }))
            .await?;
        debug!(user = %user.id, "signed in");
        Ok(user)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        if self.client.access_token().is_none() {
            self.client.set_session(None).await;
            return Ok(());
        }
        let result = self
            .client
            .request(Method::POST, "/auth/v1/logout")
            .send()
            .await;
        self.client.set_session(None).await;

        let response = result.map_err(|err| AuthError::Transport(err.to_string()))?;
        if !response.status().is_success() {
            return Err(AuthError::Rejected(failure_message(response).await));
        }
        Ok(())
    }

    async fn current_session(&self) -> Result<Option<User>, AuthError> {
        if !self.client.restore_persisted_session().await {
            return Ok(None);
        }
        let response = self
            .client
            .send_authorized(|| self.client.request(Method::GET, "/auth/v1/user"))
            .await
            .map_err(|err| AuthError::Transport(err.to_string()))?;
        match response.status() {
            status if status.is_success() => {
                let user = response
                    .json()
                    .await
                    .map_err(|err| AuthError::Transport(err.to_string()))?;
                Ok(Some(user))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                warn!("stored session is no longer valid");
                self.client.set_session(None).await;
                Ok(None)
            }
            _ => Err(AuthError::Rejected(failure_message(response).await)),
        }
    }
}

/// Identity for local-only mode. With admin credentials configured it checks
/// them; without, the single local user is always signed in.
pub struct LocalIdentity {
    admin: Option<AdminCredentials>,
}

impl LocalIdentity {
    pub fn new(admin: Option<AdminCredentials>) -> Self {
        Self { admin }
    }

    fn local_user(email: Option<String>) -> User {
        User {
            id: "local".to_string(),
            email,
        }
    }
}

#[async_trait]
impl IdentityProvider for LocalIdentity {
    async fn sign_up(&self, _email: &str, _password: &str) -> Result<Option<User>, AuthError> {
        Err(AuthError::Unavailable)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<User, AuthError> {
        match &self.admin {
            Some(admin) if admin.email == email && admin.password == password => {
                Ok(Self::local_user(Some(admin.email.clone())))
            }
            Some(_) => Err(AuthError::Rejected("Invalid login credentials".into())),
            None => Ok(Self::local_user(Some(email.to_string()))),
        }
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        Ok(())
    }

    async fn current_session(&self) -> Result<Option<User>, AuthError> {
        Ok(match self.admin {
            Some(_) => None,
            None => Some(Self::local_user(None)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::tests::{client_for, client_with_session_file};
    use crate::remote::StoredSession;
    use axum::{
        extract::Query,
        http::{HeaderMap, StatusCode},
        routing::{get, post},
        Json, Router,
    };
    use serde_json::Value;
    use std::collections::HashMap;

    fn creds(email: &str, password: &str) -> Credentials {
        Credentials {
            email: email.into(),
            password: password.into(),
        }
    }

    #[test]
    fn credentials_need_email_and_six_char_password() {
        assert_eq!(
            validate_credentials(&creds("", "secret1")),
            Err(AuthError::InvalidInput)
        );
        assert_eq!(
            validate_credentials(&creds("a@b.c", "12345")),
            Err(AuthError::InvalidInput)
        );
        assert_eq!(
            validate_credentials(&creds(" a@b.c ", " 123456 ")),
            Ok(("a@b.c".into(), "123456".into()))
        );
    }

    #[tokio::test]
    async fn local_identity_checks_configured_admin() {
        let identity = LocalIdentity::new(Some(AdminCredentials {
            email: "admin@example.com".into(),
            password: "hunter22".into(),
        }));
        assert_eq!(identity.current_session().await, Ok(None));
        assert!(matches!(
            identity.sign_in("admin@example.com", "wrong!!").await,
            Err(AuthError::Rejected(_))
        ));
        let user = identity.sign_in("admin@example.com", "hunter22").await.unwrap();
        assert_eq!(user.email.as_deref(), Some("admin@example.com"));
        assert_eq!(
            identity.sign_up("x@y.z", "123456").await,
            Err(AuthError::Unavailable)
        );
    }

    #[tokio::test]
    async fn local_identity_without_admin_is_always_signed_in() {
        let identity = LocalIdentity::new(None);
        let user = identity.current_session().await.unwrap().unwrap();
        assert_eq!(user.id, "local");
    }

    async fn token(
        Query(params): Query<HashMap<String, String>>,
        Json(body): Json<Value>,
    ) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
        if params.get("grant_type").map(String::as_str) == Some("password")
            && body["password"] == "correct-horse"
        {
            return Ok(Json(serde_json::json!({
                "access_token": "user-token",
                "user": { "id": "u-1", "email": body["email"].clone() }
            })));
        }
        Err((
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "Invalid login credentials"
            })),
        ))
    }

    async fn user(headers: HeaderMap) -> Result<Json<Value>, StatusCode> {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if auth == "Bearer user-token" {
            Ok(Json(serde_json::json!({ "id": "u-1", "email": "me@example.com" })))
        } else {
            Err(StatusCode::UNAUTHORIZED)
        }
    }

    async fn spawn_auth() -> String {
        let app = Router::new()
            .route("/auth/v1/token", post(token))
            .route("/auth/v1/user", get(user))
            .route("/auth/v1/logout", post(|| async { StatusCode::NO_CONTENT }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn remote_sign_in_stores_token_and_restores_session() {
        let url = spawn_auth().await;
        let client = client_for(&url);
        let identity = RemoteIdentity::new(Arc::clone(&client));

        assert_eq!(identity.current_session().await, Ok(None));

        let err = identity.sign_in("me@example.com", "wrong-pass").await;
        assert_eq!(
            err,
            Err(AuthError::Rejected("Invalid login credentials".into()))
        );
        assert_eq!(client.access_token(), None);

        let user = identity
            .sign_in("me@example.com", "correct-horse")
            .await
            .unwrap();
        assert_eq!(user.id, "u-1");
        assert_eq!(client.access_token().as_deref(), Some("user-token"));
        assert_eq!(
            identity.current_session().await.unwrap().map(|u| u.id),
            Some("u-1".to_string())
        );

        identity.sign_out().await.unwrap();
        assert_eq!(client.access_token(), None);
        assert_eq!(identity.current_session().await, Ok(None));
    }

    #[tokio::test]
    async fn signed_in_session_is_restored_after_restart() {
        let url = spawn_auth().await;
        let path = crate::storage::tests::unique_data_path("auth_session");
        let first = RemoteIdentity::new(client_with_session_file(&url, &path));
        first.sign_in("me@example.com", "correct-horse").await.unwrap();
        assert!(path.exists());

        let restarted = RemoteIdentity::new(client_with_session_file(&url, &path));
        assert_eq!(
            restarted.current_session().await.unwrap().map(|u| u.id),
            Some("u-1".to_string())
        );

        restarted.sign_out().await.unwrap();
        assert!(!path.exists());
        let after_logout = RemoteIdentity::new(client_with_session_file(&url, &path));
        assert_eq!(after_logout.current_session().await, Ok(None));
    }

    #[tokio::test]
    async fn revoked_persisted_session_is_discarded() {
        let url = spawn_auth().await;
        let path = crate::storage::tests::unique_data_path("revoked_session");
        let seeded = client_with_session_file(&url, &path);
        seeded
            .set_session(Some(StoredSession {
                access_token: "revoked-token".into(),
                refresh_token: None,
                expires_at: None,
            }))
            .await;

        let client = client_with_session_file(&url, &path);
        let identity = RemoteIdentity::new(Arc::clone(&client));
        assert_eq!(identity.current_session().await, Ok(None));
        assert_eq!(client.session(), None);
        assert!(!path.exists());
    }
}

use crate::config::RemoteConfig;
use crate::errors::{AuthError, BackendError, StoreError};
use crate::models::{NewTransaction, Transaction, TransactionId, TransactionPatch, User};
use crate::storage::{sort_ascending, TransactionStore};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{header::HeaderValue, Method, RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{
    io::ErrorKind,
    path::PathBuf,
    sync::{Arc, RwLock},
    time::Duration,
};
use tokio::fs;
use tracing::{debug, info, warn};

pub const TABLE: &str = "transactions";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
/// Tokens this close to expiry are refreshed before use.
const REFRESH_MARGIN_SECS: i64 = 60;

/// Tokens of a signed-in user, as written to the session file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSession {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Unix seconds.
    #[serde(default)]
    pub expires_at: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    user: User,
}

/// Connection to the hosted service. Shared by the table store, the identity
/// provider and the realtime channel so they all see the same session.
pub struct RemoteClient {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    realtime_url: String,
    session: RwLock<Option<StoredSession>>,
    session_file: Option<PathBuf>,
}

fn realtime_endpoint(base: &Url, anon_key: &str) -> Result<String, BackendError> {
    let mut url = base.clone();
    let scheme = if base.scheme() == "https" { "wss" } else { "ws" };
    url.set_scheme(scheme)
        .map_err(|_| BackendError::InitFailure(format!("cannot derive websocket url from '{base}'")))?;
    let path = format!("{}/realtime/v1/websocket", base.path().trim_end_matches('/'));
    url.set_path(&path);
    url.query_pairs_mut()
        .clear()
        .append_pair("apikey", anon_key)
        .append_pair("vsn", "1.0.0");
    Ok(url.to_string())
}

impl RemoteClient {
    pub fn new(config: &RemoteConfig) -> Result<Self, BackendError> {
        let parsed = Url::parse(&config.url)
            .map_err(|err| BackendError::InitFailure(format!("invalid url '{}': {err}", config.url)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(BackendError::InitFailure(format!(
                "unsupported url scheme '{}'",
                parsed.scheme()
            )));
        }
        HeaderValue::from_str(&config.anon_key)
            .map_err(|_| BackendError::InitFailure("access key is not a valid header value".into()))?;

        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| BackendError::InitFailure(err.to_string()))?;

        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            anon_key: config.anon_key.clone(),
            realtime_url: realtime_endpoint(&parsed, &config.anon_key)?,
            session: RwLock::new(None),
            session_file: None,
        })
    }

    /// Keeps the session in `path` so a restarted process can pick it up.
    pub fn with_session_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.session_file = Some(path.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> Option<StoredSession> {
        match self.session.read() {
            Ok(session) => session.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn access_token(&self) -> Option<String> {
        self.session().map(|session| session.access_token)
    }

    fn replace_session(&self, session: Option<StoredSession>) {
        match self.session.write() {
            Ok(mut slot) => *slot = session,
            Err(poisoned) => *poisoned.into_inner() = session,
        }
    }

    /// Installs (or clears) the session and mirrors it to the session file.
    /// File errors are logged; the in-memory session is still replaced.
    pub async fn set_session(&self, session: Option<StoredSession>) {
        self.replace_session(session.clone());
        let Some(path) = &self.session_file else {
            return;
        };
        let result = match &session {
            Some(session) => match serde_json::to_vec_pretty(session) {
                Ok(bytes) => fs::write(path, bytes).await,
                Err(err) => Err(std::io::Error::other(err)),
            },
            None => match fs::remove_file(path).await {
                Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
                other => other,
            },
        };
        if let Err(err) = result {
            warn!(path = %path.display(), "failed to persist session: {err}");
        }
    }

    /// Loads the session left by an earlier run when none is held yet.
    /// Returns whether a session is available afterwards.
    pub async fn restore_persisted_session(&self) -> bool {
        if self.session().is_some() {
            return true;
        }
        let Some(path) = &self.session_file else {
            return false;
        };
        let bytes = match fs::read(path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return false,
            Err(err) => {
                warn!(path = %path.display(), "failed to read session file: {err}");
                return false;
            }
        };
        match serde_json::from_slice::<StoredSession>(&bytes) {
            Ok(session) => {
                debug!(path = %path.display(), "loaded persisted session");
                self.replace_session(Some(session));
                true
            }
            Err(err) => {
                warn!(path = %path.display(), "ignoring malformed session file: {err}");
                false
            }
        }
    }

    /// Signed-in users act with their own token; everyone else uses the
    /// public key.
    fn bearer(&self) -> String {
        self.access_token().unwrap_or_else(|| self.anon_key.clone())
    }

    fn request_with(&self, method: Method, path: &str, bearer: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer)
    }

    pub(crate) fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.request_with(method, path, &self.bearer())
    }

    /// Request signed with the public key only, for endpoints that must not
    /// see a possibly stale user token.
    pub(crate) fn anon_request(&self, method: Method, path: &str) -> RequestBuilder {
        self.request_with(method, path, &self.anon_key)
    }

    /// Runs a token grant and installs the resulting session.
    pub(crate) async fn grant_token(
        &self,
        grant_type: &str,
        body: serde_json::Value,
    ) -> Result<User, AuthError> {
        let response = self
            .anon_request(Method::POST, "/auth/v1/token")
            .query(&[("grant_type", grant_type)])
            .json(&body)
            .send()
            .await
            .map_err(|err| AuthError::Transport(err.to_string()))?;
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Rejected(provider_message(&body)));
        }
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|err| AuthError::Transport(err.to_string()))?;
        let session = StoredSession {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at: token
                .expires_in
                .map(|secs| Utc::now().timestamp() + secs),
        };
        self.set_session(Some(session)).await;
        Ok(token.user)
    }

    fn refresh_token(&self) -> Option<String> {
        self.session().and_then(|session| session.refresh_token)
    }

    fn expires_soon(&self) -> bool {
        self.session()
            .and_then(|session| session.expires_at)
            .is_some_and(|at| at - Utc::now().timestamp() <= REFRESH_MARGIN_SECS)
    }

    /// Trades the refresh token for a fresh session. Any failure drops the
    /// session, so later requests fall back to the public key.
    pub async fn refresh_session(&self) -> Result<(), AuthError> {
        let Some(refresh_token) = self.refresh_token() else {
            self.set_session(None).await;
            return Err(AuthError::Rejected("no refresh token".into()));
        };
        match self
            .grant_token("refresh_token", json!({ "refresh_token": refresh_token }))
            .await
        {
            Ok(user) => {
                info!(user = %user.id, "session refreshed");
                Ok(())
            }
            Err(err) => {
                warn!("session refresh failed: {err}");
                self.set_session(None).await;
                Err(err)
            }
        }
    }

    /// Sends a request signed with the current session. A token about to
    /// expire is refreshed first; a 401 triggers one refresh and a resend.
    pub(crate) async fn send_authorized<F>(&self, build: F) -> reqwest::Result<Response>
    where
        F: Fn() -> RequestBuilder + Send + Sync,
    {
        if self.refresh_token().is_some() && self.expires_soon() {
            self.refresh_session().await.ok();
        }
        let response = build().send().await?;
        if response.status() != StatusCode::UNAUTHORIZED || self.refresh_token().is_none() {
            return Ok(response);
        }
        if self.refresh_session().await.is_err() {
            return Ok(response);
        }
        build().send().await
    }

    /// Websocket endpoint of the realtime service.
    pub fn realtime_url(&self) -> String {
        self.realtime_url.clone()
    }
}

/// Picks the human readable part out of an error body from the REST or auth
/// API, falling back to the raw text.
pub fn provider_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["error_description", "msg", "message", "error"] {
            if let Some(text) = value.get(key).and_then(|v| v.as_str()) {
                if !text.is_empty() {
                    return text.to_string();
                }
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "request failed".to_string()
    } else {
        trimmed.to_string()
    }
}

pub(crate) async fn failure_message(response: Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    format!("{status}: {}", provider_message(&body))
}

/// Maps a non-success REST response. 401 survives only when a refresh did not
/// help, so it is reported as an expired session.
async fn rejection(response: Response, otherwise: fn(String) -> StoreError) -> StoreError {
    if response.status() == StatusCode::UNAUTHORIZED {
        StoreError::Unauthorized(failure_message(response).await)
    } else {
        otherwise(failure_message(response).await)
    }
}

/// Rows of the hosted `transactions` table.
pub struct RemoteStore {
    client: Arc<RemoteClient>,
}

impl RemoteStore {
    pub fn new(client: Arc<RemoteClient>) -> Self {
        Self { client }
    }

    fn table_path() -> String {
        format!("/rest/v1/{TABLE}")
    }

    pub async fn fetch_all(&self) -> Result<Vec<Transaction>, StoreError> {
        let path = Self::table_path();
        let response = self
            .client
            .send_authorized(|| {
                self.client
                    .request(Method::GET, &path)
                    .query(&[("select", "*"), ("order", "tanggal.asc")])
            })
            .await
            .map_err(|err| StoreError::Query(err.to_string()))?;
        if !response.status().is_success() {
            return Err(rejection(response, StoreError::Query).await);
        }
        let mut rows: Vec<Transaction> = response
            .json()
            .await
            .map_err(|err| StoreError::Query(err.to_string()))?;
        sort_ascending(&mut rows);
        debug!(count = rows.len(), "fetched remote transactions");
        Ok(rows)
    }

    async fn write_rows<F>(&self, build: F) -> Result<Vec<Transaction>, StoreError>
    where
        F: Fn() -> RequestBuilder + Send + Sync,
    {
        let response = self
            .client
            .send_authorized(|| build().header("Prefer", "return=representation"))
            .await
            .map_err(|err| StoreError::Write(err.to_string()))?;
        if !response.status().is_success() {
            return Err(rejection(response, StoreError::Write).await);
        }
        response
            .json()
            .await
            .map_err(|err| StoreError::Write(err.to_string()))
    }

    fn by_id(&self, method: Method, id: &TransactionId) -> RequestBuilder {
        self.client
            .request(method, &Self::table_path())
            .query(&[("id", format!("eq.{id}"))])
    }
}

#[async_trait]
impl TransactionStore for RemoteStore {
    async fn load_all(&self) -> Result<Vec<Transaction>, StoreError> {
        self.fetch_all().await
    }

    async fn insert(&self, record: NewTransaction) -> Result<Transaction, StoreError> {
        let path = Self::table_path();
        let rows = [record];
        self.write_rows(|| self.client.request(Method::POST, &path).json(&rows))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Write("insert returned no rows".into()))
    }

    async fn update(
        &self,
        id: &TransactionId,
        patch: TransactionPatch,
    ) -> Result<Transaction, StoreError> {
        self.write_rows(|| self.by_id(Method::PATCH, id).json(&patch))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    async fn delete(&self, id: &TransactionId) -> Result<(), StoreError> {
        let response = self
            .client
            .send_authorized(|| self.by_id(Method::DELETE, id))
            .await
            .map_err(|err| StoreError::Write(err.to_string()))?;
        if !response.status().is_success() {
            return Err(rejection(response, StoreError::Write).await);
        }
        Ok(())
    }
}

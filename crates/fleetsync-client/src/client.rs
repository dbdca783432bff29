//! Record store HTTP client (session gateway)

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use reqwest::header::COOKIE;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::config::{Credentials, StoreConfig};
use crate::encoding::TextEncoding;
use crate::error::{Result, StoreError};
use crate::protocol::{
    self, service, SaveRequest, ServiceRequest, ServiceResponse, SERVICE_PATH, SESSION_COOKIE,
};
use crate::rows::QueryResult;
use crate::session::SessionState;

/// Default request timeout
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Default connection timeout
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest response excerpt quoted in error messages
const ERROR_EXCERPT_LEN: usize = 200;

/// Record store client
///
/// Clones share one session: a token obtained by any clone is used by all,
/// and at most one login is in flight at a time.
#[derive(Debug, Clone)]
pub struct StoreClient {
    client: Client,
    endpoint: Url,
    credentials: Credentials,
    encoding: TextEncoding,
    session: Arc<SessionState>,
}

impl StoreClient {
    /// Create a new store client
    ///
    /// # Arguments
    /// * `base_url` - Base URL of the store application (e.g., "http://erp.local:8180/mge")
    /// * `credentials` - Login used whenever a session is needed
    pub fn new(base_url: &str, credentials: Credentials) -> Result<Self> {
        Self::with_options(
            base_url,
            credentials,
            TextEncoding::default(),
            DEFAULT_TIMEOUT,
            DEFAULT_CONNECT_TIMEOUT,
        )
    }

    /// Create a client from a [`StoreConfig`]
    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        Self::with_options(
            &config.base_url,
            config.credentials.clone(),
            config.encoding,
            config.request_timeout(),
            config.connect_timeout(),
        )
    }

    /// Create a new store client with custom configuration
    pub fn with_options(
        base_url: &str,
        credentials: Credentials,
        encoding: TextEncoding,
        timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .build()?;

        let endpoint = Url::parse(&format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            SERVICE_PATH
        ))?;

        Ok(Self {
            client,
            endpoint,
            credentials,
            encoding,
            session: Arc::new(SessionState::default()),
        })
    }

    /// Get the service endpoint URL
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Whether a session token is currently held
    pub fn is_authenticated(&self) -> bool {
        self.session.token().is_some()
    }

    // =========================================================================
    // Session
    // =========================================================================

    /// Exchange the credentials for a session token.
    ///
    /// If a login is already in flight, waits for that attempt instead of
    /// starting another; its outcome (token or error) is shared by every
    /// waiter. A failed login clears any stale token.
    #[instrument(skip(self))]
    pub async fn authenticate(&self) -> Result<()> {
        let login = self.session.join_or_start(|| {
            let this = self.clone();
            async move { this.login().await }.boxed()
        });

        let outcome = login.clone().await;
        self.session.finish(&login);
        outcome.map(|_| ())
    }

    /// Log out and drop the local token. The token is dropped even if the
    /// store call fails.
    #[instrument(skip(self))]
    pub async fn logout(&self) -> Result<()> {
        let Some(token) = self.session.token() else {
            return Ok(());
        };
        self.session.invalidate(&token);

        let outcome = self
            .send(service::LOGOUT, &Value::Null, Some(&token))
            .await
            .and_then(|response| response.into_result(service::LOGOUT));
        match outcome {
            Ok(_) | Err(StoreError::SessionExpired(_)) => {
                info!("Logged out of record store");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// The login itself. Runs inside the shared future, so it is the only
    /// place the token is written.
    async fn login(&self) -> Result<String> {
        info!(user = %self.credentials.username, "Authenticating with record store");
        let body = protocol::login_body(&self.credentials.username, &self.credentials.password);

        let outcome = match self.send(service::LOGIN, &body, None).await {
            Ok(response) => match response.into_result(service::LOGIN) {
                Ok(body) => protocol::session_token(&body).ok_or_else(|| {
                    StoreError::Authentication("login response carried no session token".into())
                }),
                Err(StoreError::RemoteService { message, .. })
                | Err(StoreError::SessionExpired(message)) => {
                    Err(StoreError::Authentication(message))
                }
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };

        match outcome {
            Ok(token) => {
                self.session.store(token.clone());
                info!("Record store session established");
                Ok(token)
            }
            Err(e) => {
                self.session.clear();
                warn!(error = %e, "Record store login failed");
                Err(e)
            }
        }
    }

    /// Current token, logging in first if there is none
    async fn ensure_session(&self) -> Result<String> {
        if let Some(token) = self.session.token() {
            return Ok(token);
        }
        self.authenticate().await?;
        self.session
            .token()
            .ok_or_else(|| StoreError::Authentication("no session token after login".into()))
    }

    /// Replace an expired token. If another caller already renewed it,
    /// the fresh token is reused without a second login.
    async fn renew_session(&self, stale: &str) -> Result<String> {
        self.session.invalidate(stale);
        self.ensure_session().await
    }

    // =========================================================================
    // Requests
    // =========================================================================

    /// Call a store service under a valid session and return its body.
    ///
    /// An expired session is renewed once and the call repeated once; a
    /// second expiry is returned as [`StoreError::SessionExpired`].
    #[instrument(skip(self, payload))]
    pub async fn request(&self, service: &str, payload: &Value) -> Result<Value> {
        let token = self.ensure_session().await?;

        match self.call(service, payload, &token).await {
            Err(StoreError::SessionExpired(message)) => {
                warn!(service, %message, "Record store session expired, re-authenticating");
                let token = self.renew_session(&token).await?;
                self.call(service, payload, &token).await
            }
            outcome => outcome,
        }
    }

    /// Run a read query and decode its positional rows
    #[instrument(skip(self))]
    pub async fn query(&self, sql: &str) -> Result<QueryResult> {
        debug!("Executing store query");
        let body = self
            .request(service::EXECUTE_QUERY, &serde_json::json!({ "sql": sql }))
            .await?;
        QueryResult::from_body(body)
    }

    /// Bulk insert rows into a dataset entity
    #[instrument(skip(self, request), fields(entity = %request.entity_name, rows = request.records.len()))]
    pub async fn save(&self, request: &SaveRequest) -> Result<Value> {
        let payload = serde_json::to_value(request)?;
        self.request(service::SAVE, &payload).await
    }

    async fn call(&self, service: &str, payload: &Value, token: &str) -> Result<Value> {
        self.send(service, payload, Some(token))
            .await?
            .into_result(service)
    }

    /// One HTTP round trip: post the envelope, decode, parse
    async fn send(
        &self,
        service: &str,
        payload: &Value,
        token: Option<&str>,
    ) -> Result<ServiceResponse> {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("serviceName", service)
            .append_pair("outputType", "json");

        let envelope = ServiceRequest {
            service_name: service,
            request_body: payload,
        };
        let mut request = self.client.post(url).json(&envelope);
        if let Some(token) = token {
            request = request.header(COOKIE, format!("{}={}", SESSION_COOKIE, token));
        }

        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(StoreError::SessionExpired(format!("HTTP {}", status)));
        }

        // Deployments mislabel the charset; the configured encoding wins
        let bytes = response.bytes().await?;

        if !status.is_success() {
            let text = self.encoding.decode(&bytes).unwrap_or_default();
            return Err(StoreError::remote(
                service,
                format!("HTTP {}: {}", status, excerpt(&text)),
            ));
        }

        let text = self.encoding.decode(&bytes)?;
        serde_json::from_str(&text).map_err(|e| {
            StoreError::Decode(format!(
                "malformed {} response: {} ({})",
                service,
                e,
                excerpt(&text)
            ))
        })
    }
}

fn excerpt(text: &str) -> &str {
    match text.char_indices().nth(ERROR_EXCERPT_LEN) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

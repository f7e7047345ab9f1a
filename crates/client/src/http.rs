//! Authenticated HTTP client
//!
//! Every call carries `Authorization: Bearer <access token>` when the session
//! has one. A 401 on any call other than the refresh call itself triggers one
//! refresh exchange and one reissue of that call; the retry flag lives on the
//! call, so concurrent calls never share it. Concurrent 401s are not
//! coalesced: each call runs its own exchange.

use std::sync::Arc;

use loners_protocol::{ErrorBody, RefreshRequest, RefreshResponse};
use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::session::{LogoutReason, SessionStore};

pub const REFRESH_PATH: &str = "/auth/refresh";

/// A call against the API, rebuildable for the retry
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, ApiError> {
        self.body = Some(serde_json::to_value(body).map_err(ApiError::Encode)?);
        Ok(self)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn is_refresh(&self) -> bool {
        self.path.starts_with(REFRESH_PATH)
    }
}

/// Cheap to clone; all clones share one session and connection pool
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<Inner>,
}

struct Inner {
    http: reqwest::Client,
    base_url: String,
    session: Arc<SessionStore>,
}

impl ApiClient {
    pub fn new(config: &ClientConfig, session: Arc<SessionStore>) -> Result<Self, ApiError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self::with_http(builder.build()?, &config.api_url, session))
    }

    pub fn with_http(
        http: reqwest::Client,
        base_url: &str,
        session: Arc<SessionStore>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                http,
                base_url: base_url.trim_end_matches('/').to_string(),
                session,
            }),
        }
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.inner.session
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    /// Run `request` and decode a JSON response body
    pub async fn send<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiError> {
        let response = self.send_with_refresh(&request).await?;
        let response = check_status(request.path(), response).await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|source| ApiError::Decode {
            path: request.path().to_string(),
            source,
        })
    }

    /// Run `request`, ignoring any response body
    pub async fn send_empty(&self, request: ApiRequest) -> Result<(), ApiError> {
        let response = self.send_with_refresh(&request).await?;
        check_status(request.path(), response).await?;
        Ok(())
    }

    async fn send_with_refresh(&self, request: &ApiRequest) -> Result<Response, ApiError> {
        let session = self.inner.session.current();
        let mut token = session.access_token.clone();
        let mut retried = false;

        loop {
            let response = self.execute(request, token.as_deref()).await?;
            if response.status() != StatusCode::UNAUTHORIZED || retried || request.is_refresh() {
                return Ok(response);
            }
            let Some(refresh_token) = self.inner.session.current().refresh_token.clone() else {
                return Ok(response);
            };
            retried = true;

            debug!(
                component = "api",
                event = "api.refresh.started",
                path = %request.path(),
            );
            match self.exchange_refresh(&refresh_token).await {
                Ok(new_token) => {
                    match self
                        .inner
                        .session
                        .refresh_access(&refresh_token, new_token.clone())
                    {
                        Ok(true) => {}
                        Ok(false) => debug!(
                            component = "api",
                            event = "api.refresh.session_replaced",
                            "Session changed during refresh; retrying this call only"
                        ),
                        Err(err) => warn!(
                            component = "api",
                            event = "api.refresh.persist_failed",
                            error = %err,
                            "Refreshed token could not be persisted"
                        ),
                    }
                    token = Some(new_token);
                }
                Err(err) => {
                    warn!(
                        component = "api",
                        event = "api.refresh.failed",
                        path = %request.path(),
                        error = %err,
                        "Refresh exchange failed, clearing session"
                    );
                    if let Err(storage_err) = self.inner.session.logout(LogoutReason::RefreshFailed)
                    {
                        warn!(
                            component = "api",
                            event = "api.logout.persist_failed",
                            error = %storage_err,
                        );
                    }
                    return Err(err);
                }
            }
        }
    }

    /// Exchange the refresh token for a new access token; sent without bearer
    async fn exchange_refresh(&self, refresh_token: &str) -> Result<String, ApiError> {
        let request = ApiRequest::post(REFRESH_PATH).json(&RefreshRequest {
            refresh_token: refresh_token.to_string(),
        })?;
        let response = self.execute(&request, None).await?;
        let response = check_status(REFRESH_PATH, response).await?;
        let bytes = response.bytes().await?;
        let body: RefreshResponse =
            serde_json::from_slice(&bytes).map_err(|source| ApiError::Decode {
                path: REFRESH_PATH.to_string(),
                source,
            })?;
        info!(
            component = "api",
            event = "api.refresh.succeeded",
        );
        Ok(body.token)
    }

    async fn execute(
        &self,
        request: &ApiRequest,
        token: Option<&str>,
    ) -> Result<Response, ApiError> {
        let url = format!("{}{}", self.inner.base_url, request.path);
        let mut builder = self.inner.http.request(request.method.clone(), &url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|err| {
            warn!(
                component = "api",
                event = "api.request.transport_failed",
                method = %request.method,
                path = %request.path,
                error = %err,
            );
            ApiError::Transport(err)
        })?;
        debug!(
            component = "api",
            event = "api.request.completed",
            method = %request.method,
            path = %request.path,
            status = response.status().as_u16(),
            authenticated = token.is_some(),
        );
        Ok(response)
    }
}

async fn check_status(path: &str, response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .ok()
        .and_then(ErrorBody::into_message);
    Err(ApiError::Status {
        status,
        path: path.to_string(),
        message,
    })
}

/// Percent-encode one path segment
pub(crate) fn segment(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

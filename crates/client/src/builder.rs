//! Builder pattern for constructing an [`OpenLiveClient`].

use std::sync::Arc;
use std::time::Duration;

use ol_domain::config::{
    Config, Credentials, DEFAULT_API_BASE_URL, DEFAULT_HEARTBEAT_INTERVAL_SECS, DEFAULT_WS_URL,
};
use ol_domain::{Error, Result};

use crate::connection::Connection;
use crate::control::ControlPlaneClient;
use crate::dispatcher::EventDispatcher;
use crate::session::OpenLiveClient;
use crate::signer::RequestSigner;

/// Fluent builder for [`OpenLiveClient`].
///
/// # Example
///
/// ```rust,no_run
/// # use ol_client::{OpenLiveClientBuilder, Credentials};
/// let client = OpenLiveClientBuilder::new()
///     .credentials(Credentials::new("CODE", 1650000000000, "key-id", "key-secret"))
///     .heartbeat_interval(std::time::Duration::from_secs(19))
///     .build()
///     .unwrap();
/// ```
pub struct OpenLiveClientBuilder {
    credentials: Option<Credentials>,
    api_base_url: String,
    ws_url: String,
    heartbeat_interval: Duration,
    http: Option<reqwest::Client>,
}

impl OpenLiveClientBuilder {
    pub fn new() -> Self {
        Self {
            credentials: None,
            api_base_url: DEFAULT_API_BASE_URL.into(),
            ws_url: DEFAULT_WS_URL.into(),
            heartbeat_interval: Duration::from_secs(DEFAULT_HEARTBEAT_INTERVAL_SECS),
            http: None,
        }
    }

    /// Seed credentials and endpoints from a loaded [`Config`].
    pub fn from_config(config: &Config) -> Self {
        Self::new()
            .credentials(config.credentials.clone())
            .api_base_url(config.endpoints.api_base_url.clone())
            .ws_url(config.endpoints.ws_url.clone())
            .heartbeat_interval(Duration::from_secs(config.endpoints.heartbeat_interval_secs))
    }

    // ── Required ─────────────────────────────────────────────────────

    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    // ── Endpoints ────────────────────────────────────────────────────

    /// Override the control-plane base URL (default `https://live-open.biliapi.com`).
    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    /// Override the data-plane WebSocket URL.
    pub fn ws_url(mut self, url: impl Into<String>) -> Self {
        self.ws_url = url.into();
        self
    }

    // ── Behavior ─────────────────────────────────────────────────────

    /// Override the interval of both heartbeats (default 19s).
    pub fn heartbeat_interval(mut self, d: Duration) -> Self {
        self.heartbeat_interval = d;
        self
    }

    /// Use a preconfigured HTTP client (proxy, custom TLS roots, ...).
    pub fn http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    /// Build the [`OpenLiveClient`].
    pub fn build(self) -> Result<OpenLiveClient> {
        let credentials = self
            .credentials
            .ok_or_else(|| Error::Config("credentials are required".into()))?;
        if credentials.access_key_id.is_empty() || credentials.access_key_secret.is_empty() {
            return Err(Error::Config("accessKeyId and accessKeySecret are required".into()));
        }
        if !credentials.access_key_id.is_ascii() {
            return Err(Error::Encoding(
                "accessKeyId contains non-ASCII characters".into(),
            ));
        }
        if self.api_base_url.is_empty() {
            return Err(Error::Config("api_base_url is required".into()));
        }
        if self.ws_url.is_empty() {
            return Err(Error::Config("ws_url is required".into()));
        }

        let signer = RequestSigner::new(
            credentials.access_key_id.clone(),
            credentials.access_key_secret.clone(),
        );
        let control = match self.http {
            Some(http) => ControlPlaneClient::with_http(http, &self.api_base_url, signer),
            None => ControlPlaneClient::new(&self.api_base_url, signer)?,
        };
        let dispatcher = Arc::new(EventDispatcher::new());
        let connection =
            Connection::new(self.ws_url, self.heartbeat_interval, dispatcher.clone())?;

        Ok(OpenLiveClient::from_parts(
            credentials,
            control,
            connection,
            dispatcher,
            self.heartbeat_interval,
        ))
    }
}

impl Default for OpenLiveClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

//! Control-plane HTTP client: start, heartbeat and end a broadcast session.
//!
//! `ControlPlaneClient` wraps a `reqwest::Client` and signs every request
//! with [`RequestSigner`]. There is no retry: a failed call is returned to
//! the caller, who decides whether the session survives it.

use std::time::Instant;

use ol_domain::trace::TraceEvent;
use ol_domain::{Error, Result};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::Serialize;

use crate::signer::RequestSigner;
use crate::types::response_code;

pub const START_PATH: &str = "/v2/app/start";
pub const HEARTBEAT_PATH: &str = "/v2/app/heartbeat";
pub const END_PATH: &str = "/v2/app/end";

#[derive(Serialize)]
struct StartRequest<'a> {
    code: &'a str,
    app_id: i64,
}

#[derive(Serialize)]
struct HeartbeatRequest<'a> {
    game_id: &'a str,
}

#[derive(Serialize)]
struct EndRequest<'a> {
    app_id: i64,
    game_id: &'a str,
}

/// Signed client for the `/v2/app/*` endpoints.
///
/// Cheap to clone; the underlying `reqwest::Client` keeps a connection pool.
#[derive(Debug, Clone)]
pub struct ControlPlaneClient {
    http: Client,
    base_url: String,
    signer: RequestSigner,
}

impl ControlPlaneClient {
    pub fn new(base_url: &str, signer: RequestSigner) -> Result<Self> {
        let http = Client::builder()
            .build()
            .map_err(|e| Error::Network(e.to_string()))?;
        Ok(Self::with_http(http, base_url, signer))
    }

    pub fn with_http(http: Client, base_url: &str, signer: RequestSigner) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
            signer,
        }
    }

    /// Build the full URL for a path like `/v2/app/start`.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// POST `json_body` to `url` with the signature headers and return the
    /// parsed response body verbatim.
    ///
    /// Transport failures and non-JSON bodies are [`Error::Network`].
    pub async fn sign_and_send(&self, url: &str, json_body: &str) -> Result<serde_json::Value> {
        let signed = self.signer.sign(json_body)?;

        let mut rb = self
            .http
            .post(url)
            .header(AUTHORIZATION, signed.authorization.as_str())
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json");
        for (name, value) in signed.pairs() {
            rb = rb.header(name, value);
        }

        let start = Instant::now();
        let resp = rb
            .body(json_body.to_owned())
            .send()
            .await
            .map_err(|e| Error::Network(format!("POST {url}: {e}")))?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| Error::Network(format!("reading {url}: {e}")))?;
        let duration_ms = start.elapsed().as_millis() as u64;

        let value: serde_json::Value = serde_json::from_str(&text).map_err(|e| {
            Error::Network(format!("{url} returned {status} with unparseable body: {e}"))
        })?;

        TraceEvent::ControlPlaneCall {
            endpoint: url.to_owned(),
            code: response_code(&value),
            duration_ms,
        }
        .emit();

        Ok(value)
    }

    async fn post<T: Serialize>(&self, path: &str, body: &T) -> Result<serde_json::Value> {
        let json = serde_json::to_string(body)?;
        self.sign_and_send(&self.url(path), &json).await
    }

    /// `POST /v2/app/start`.
    pub async fn start_app(&self, code: &str, app_id: i64) -> Result<serde_json::Value> {
        self.post(START_PATH, &StartRequest { code, app_id }).await
    }

    /// `POST /v2/app/heartbeat`.
    pub async fn heartbeat(&self, game_id: &str) -> Result<serde_json::Value> {
        self.post(HEARTBEAT_PATH, &HeartbeatRequest { game_id }).await
    }

    /// `POST /v2/app/end`.
    pub async fn end_app(&self, app_id: i64, game_id: &str) -> Result<serde_json::Value> {
        self.post(END_PATH, &EndRequest { app_id, game_id }).await
    }
}

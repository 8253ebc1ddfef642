//! `ol-client` — client for the live-streaming "open broadcast" service.
//!
//! A session is started over a signed HTTP control-plane, then real-time
//! events arrive over a binary-framed WebSocket. Both channels are kept
//! alive with periodic heartbeats.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ OpenLiveClient (session controller)                          │
//! │   ├─ ControlPlaneClient ── RequestSigner    (HTTP, signed)   │
//! │   │     start / heartbeat / end                              │
//! │   └─ Connection (WebSocket)                                  │
//! │         ├─ receive loop ── ol_protocol::decode               │
//! │         │                    └─ EventDispatcher ─► handlers  │
//! │         └─ heartbeat loop                                    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Session flow (hard-coded by the client)
//!
//! 1. `POST /v2/app/start` with `{code, app_id}` → `game_id` + `auth_body`
//! 2. Connect WS, send one `Auth` packet carrying `auth_body`
//! 3. Spawn the receive loop and the socket heartbeat loop
//! 4. Spawn the session heartbeat loop (`POST /v2/app/heartbeat`)
//! 5. On stop or any failure: cancel the shared token, close the socket,
//!    `POST /v2/app/end`
//!
//! # Example
//!
//! ```rust,no_run
//! # use ol_client::{OpenLiveClient, Credentials};
//! # async fn demo() -> Result<(), ol_client::Error> {
//! let client = OpenLiveClient::builder()
//!     .credentials(Credentials::new("CODE", 1650000000000, "key-id", "key-secret"))
//!     .build()?;
//!
//! client.events().on_commands(["LIVE_OPEN_PLATFORM_DM"], |ev| {
//!     println!("{}: {}", ev.cmd, ev.json["data"]);
//! });
//!
//! client.start().await?;
//! client.wait_until_stopped().await;
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod connection;
pub mod control;
pub mod dispatcher;
pub mod session;
pub mod signer;
pub mod types;

// ── Re-exports for ergonomic imports ─────────────────────────────────

pub use builder::OpenLiveClientBuilder;
pub use connection::Connection;
pub use control::ControlPlaneClient;
pub use dispatcher::{EventDispatcher, MessageEvent, ALL, OTHERS};
pub use session::OpenLiveClient;
pub use signer::{RequestSigner, SignedHeaders};
pub use types::{ConnectionState, Session, StartOutcome};

pub use ol_domain::config::Credentials;
pub use ol_domain::{Error, ProtocolError, Result};
pub use ol_protocol::{ClientOperation, Operation, ServerOperation};

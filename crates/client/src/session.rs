//! Session controller — owns one broadcast session end to end.
//!
//! `start()` opens the server-side session, hands its `auth_body` to the
//! [`Connection`], and spawns the session heartbeat loop. That loop is the
//! single owner of session teardown: whatever stops the session (a
//! `stop()` call, a socket failure, a rejected heartbeat), the loop is the
//! one that calls `/v2/app/end`.

use std::sync::Arc;
use std::time::Duration;

use ol_domain::config::Credentials;
use ol_domain::trace::TraceEvent;
use ol_domain::{Error, Result};
use parking_lot::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::connection::Connection;
use crate::control::ControlPlaneClient;
use crate::dispatcher::EventDispatcher;
use crate::types::{response_code, ConnectionState, Session, StartOutcome};

/// Client for one streamer's broadcast session. Cheap to clone.
#[derive(Clone)]
pub struct OpenLiveClient {
    inner: Arc<ClientInner>,
}

pub(crate) struct ClientInner {
    pub(crate) credentials: Credentials,
    pub(crate) control: ControlPlaneClient,
    pub(crate) connection: Connection,
    pub(crate) dispatcher: Arc<EventDispatcher>,
    pub(crate) heartbeat_interval: Duration,
    slot: Mutex<SessionSlot>,
}

#[derive(Default)]
struct SessionSlot {
    phase: Phase,
    generation: u64,
}

#[derive(Default)]
enum Phase {
    #[default]
    Idle,
    /// Holds the tokens the attempt will run under, so `stop()` can abort
    /// it and `wait_until_stopped()` can block on it.
    Starting {
        cancel: CancellationToken,
        finished: CancellationToken,
    },
    Running(ActiveSession),
}

#[derive(Clone)]
struct ActiveSession {
    session: Session,
    cancel: CancellationToken,
    /// Socket attempt owned by this session.
    socket_generation: u64,
    /// Fires once the heartbeat loop has finished teardown.
    finished: CancellationToken,
}

impl std::fmt::Debug for OpenLiveClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenLiveClient")
            .field("credentials", &self.inner.credentials)
            .field("session", &self.session())
            .field("connection", &self.inner.connection)
            .finish()
    }
}

impl OpenLiveClient {
    /// Start a new builder.
    pub fn builder() -> crate::builder::OpenLiveClientBuilder {
        crate::builder::OpenLiveClientBuilder::new()
    }

    pub(crate) fn from_parts(
        credentials: Credentials,
        control: ControlPlaneClient,
        connection: Connection,
        dispatcher: Arc<EventDispatcher>,
        heartbeat_interval: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                credentials,
                control,
                connection,
                dispatcher,
                heartbeat_interval,
                slot: Mutex::new(SessionSlot::default()),
            }),
        }
    }

    /// Subscribe here before (or after) calling [`start`](Self::start).
    pub fn events(&self) -> &EventDispatcher {
        &self.inner.dispatcher
    }

    /// The active session, if one is running.
    pub fn session(&self) -> Option<Session> {
        match &self.inner.slot.lock().phase {
            Phase::Running(active) => Some(active.session.clone()),
            _ => None,
        }
    }

    pub fn is_running(&self) -> bool {
        match &self.inner.slot.lock().phase {
            Phase::Idle => false,
            Phase::Starting { cancel, .. } => !cancel.is_cancelled(),
            Phase::Running(active) => !active.cancel.is_cancelled(),
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.connection.state()
    }

    /// Start the session: control-plane start, socket auth, heartbeats.
    ///
    /// Either everything is running when this returns `Ok(Started)`, or
    /// nothing is. Calling it again while a session is live returns
    /// `Ok(AlreadyRunning)`.
    pub async fn start(&self) -> Result<StartOutcome> {
        let (generation, cancel, finished) = {
            let mut slot = self.inner.slot.lock();
            match &slot.phase {
                Phase::Starting { cancel, .. } if !cancel.is_cancelled() => {
                    return Ok(StartOutcome::AlreadyRunning)
                }
                Phase::Running(a) if !a.cancel.is_cancelled() => {
                    return Ok(StartOutcome::AlreadyRunning)
                }
                _ => {}
            }
            let cancel = CancellationToken::new();
            let finished = CancellationToken::new();
            slot.generation += 1;
            slot.phase = Phase::Starting {
                cancel: cancel.clone(),
                finished: finished.clone(),
            };
            (slot.generation, cancel, finished)
        };

        match self
            .start_session(generation, cancel.clone(), finished.clone())
            .await
        {
            Ok(()) => Ok(StartOutcome::Started),
            Err(e) => {
                tracing::warn!(error = %e, "session start failed");
                cancel.cancel();
                {
                    let mut slot = self.inner.slot.lock();
                    if slot.generation == generation {
                        slot.phase = Phase::Idle;
                    }
                }
                finished.cancel();
                Err(e)
            }
        }
    }

    /// Everything after the slot is claimed. On error, whatever this
    /// attempt opened (socket, server-side session) is already closed.
    async fn start_session(
        &self,
        generation: u64,
        cancel: CancellationToken,
        finished: CancellationToken,
    ) -> Result<()> {
        let inner = &self.inner;
        let creds = &inner.credentials;

        let resp = inner.control.start_app(&creds.code, creds.app_id).await?;
        let session = Session::from_start_response(&resp)?;
        tracing::info!(game_id = %session.game_id, "control-plane session opened");

        let socket = inner
            .connection
            .start_attempt(&session.auth_body, cancel.clone())
            .await;
        let socket = match socket {
            Ok(Some(socket_generation)) if !cancel.is_cancelled() => Ok(socket_generation),
            Ok(Some(socket_generation)) => {
                inner.connection.stop_attempt(socket_generation);
                Err(Error::Other("session stopped during start".into()))
            }
            Ok(None) => Err(Error::Other(
                "socket is already owned by another session".into(),
            )),
            Err(e) => Err(e),
        };
        let socket_generation = match socket {
            Ok(g) => g,
            Err(e) => {
                // The server-side session exists; close it before reporting.
                end_session(inner, &session.game_id).await;
                return Err(e);
            }
        };

        let installed = {
            let mut slot = inner.slot.lock();
            let current = slot.generation == generation;
            if current {
                slot.phase = Phase::Running(ActiveSession {
                    session: session.clone(),
                    cancel: cancel.clone(),
                    socket_generation,
                    finished: finished.clone(),
                });
            }
            current
        };
        if !installed {
            inner.connection.stop_attempt(socket_generation);
            end_session(inner, &session.game_id).await;
            return Err(Error::Other("superseded by a newer start".into()));
        }

        TraceEvent::SessionStarted {
            game_id: session.game_id.clone(),
        }
        .emit();

        tokio::spawn(session_heartbeat_loop(
            inner.clone(),
            ActiveSession {
                session,
                cancel,
                socket_generation,
                finished,
            },
            generation,
        ));
        Ok(())
    }

    /// Tear down the socket and signal every loop to stop.
    ///
    /// Does not call `/v2/app/end` itself; the session heartbeat loop does
    /// that once it observes the cancellation. Idempotent.
    pub fn stop(&self) {
        let socket_generation = {
            let slot = self.inner.slot.lock();
            match &slot.phase {
                Phase::Idle => None,
                Phase::Starting { cancel, .. } => {
                    cancel.cancel();
                    None
                }
                Phase::Running(active) => {
                    active.cancel.cancel();
                    Some(active.socket_generation)
                }
            }
        };
        if let Some(g) = socket_generation {
            self.inner.connection.stop_attempt(g);
        }
    }

    /// Wait until the current attempt has been fully torn down, including
    /// the control-plane end call. Blocks across a `start()` in progress;
    /// returns immediately when idle.
    pub async fn wait_until_stopped(&self) {
        let finished = match &self.inner.slot.lock().phase {
            Phase::Idle => None,
            Phase::Starting { finished, .. } => Some(finished.clone()),
            Phase::Running(active) => Some(active.finished.clone()),
        };
        if let Some(finished) = finished {
            finished.cancelled().await;
        }
    }
}

/// Keep the server-side session alive; on cancellation or any failure,
/// tear down this session's socket and end the session.
///
/// Only ever touches its own socket attempt, so a late-running loop cannot
/// disturb a session started after it.
async fn session_heartbeat_loop(inner: Arc<ClientInner>, active: ActiveSession, generation: u64) {
    let ActiveSession {
        session,
        cancel,
        socket_generation,
        finished,
    } = active;
    let game_id = session.game_id.as_str();
    let mut ticker = tokio::time::interval(inner.heartbeat_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let failure = loop {
        tokio::select! {
            _ = cancel.cancelled() => break None,
            _ = ticker.tick() => {}
        }
        let result = tokio::select! {
            _ = cancel.cancelled() => break None,
            r = inner.control.heartbeat(game_id) => r,
        };
        match result {
            Ok(resp) if response_code(&resp) == Some(0) => {
                tracing::debug!(game_id = %game_id, "session heartbeat ok");
            }
            Ok(resp) => break Some(format!("heartbeat rejected: {resp}")),
            Err(e) => break Some(format!("heartbeat failed: {e}")),
        }
    };

    let reason = match failure {
        Some(reason) => {
            tracing::warn!(game_id = %game_id, reason = %reason, "session heartbeat loop failed");
            end_session(&inner, game_id).await;
            cancel.cancel();
            inner.connection.stop_attempt(socket_generation);
            reason
        }
        None => {
            tracing::info!(game_id = %game_id, "session stopped");
            inner.connection.stop_attempt(socket_generation);
            end_session(&inner, game_id).await;
            "stopped".to_owned()
        }
    };

    TraceEvent::SessionEnded {
        game_id: game_id.to_owned(),
        reason,
    }
    .emit();

    {
        let mut slot = inner.slot.lock();
        if slot.generation == generation {
            slot.phase = Phase::Idle;
        }
    }
    finished.cancel();
}

/// Best-effort `/v2/app/end`; failures are logged, never raised.
async fn end_session(inner: &ClientInner, game_id: &str) {
    match inner.control.end_app(inner.credentials.app_id, game_id).await {
        Ok(resp) if response_code(&resp) == Some(0) => {
            tracing::info!(game_id = %game_id, "control-plane session ended");
        }
        Ok(resp) => {
            tracing::warn!(game_id = %game_id, response = %resp, "session end rejected");
        }
        Err(e) => {
            tracing::warn!(game_id = %game_id, error = %e, "session end failed");
        }
    }
}

//! Session data and lifecycle states.

use std::fmt;

use ol_domain::{Error, Result};

/// Server-assigned context for one broadcast run.
///
/// `game_id` is never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub game_id: String,
    /// Opaque credential handed to the socket in the `Auth` packet.
    pub auth_body: String,
}

impl Session {
    /// Extract the session from a `/v2/app/start` response.
    ///
    /// A non-zero `code` or a missing field is an authentication failure
    /// carrying the raw response.
    pub fn from_start_response(resp: &serde_json::Value) -> Result<Self> {
        let code = response_code(resp);
        if code != Some(0) {
            return Err(Error::Authentication {
                message: match code {
                    Some(c) => format!("session start rejected with code {c}"),
                    None => "session start response has no code".into(),
                },
                response: resp.clone(),
            });
        }

        let field = |pointer: &str| {
            resp.pointer(pointer)
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
        };

        let game_id = field("/data/game_info/game_id").ok_or_else(|| Error::Authentication {
            message: "session start response has no game_id".into(),
            response: resp.clone(),
        })?;
        let auth_body =
            field("/data/websocket_info/auth_body").ok_or_else(|| Error::Authentication {
                message: "session start response has no auth_body".into(),
                response: resp.clone(),
            })?;

        Ok(Self { game_id, auth_body })
    }
}

/// Business-level `code` of a control-plane response.
pub fn response_code(resp: &serde_json::Value) -> Option<i64> {
    resp.get("code").and_then(|c| c.as_i64())
}

/// Successful result of a `start()` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    /// A previous start is still live; nothing was done.
    AlreadyRunning,
}

impl StartOutcome {
    pub fn message(self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::AlreadyRunning => "already running",
        }
    }
}

impl fmt::Display for StartOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Lifecycle of the WebSocket connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Authenticating,
    Open,
    Closing,
    /// Torn down by a loop failure or a server close. Restartable.
    Closed,
}

impl ConnectionState {
    /// Whether a new `start` may proceed from this state.
    pub fn can_start(self) -> bool {
        matches!(self, Self::Idle | Self::Closed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Authenticating => "authenticating",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn start_response(code: i64) -> serde_json::Value {
        json!({
            "code": code,
            "message": "0",
            "data": {
                "game_info": { "game_id": "g1" },
                "websocket_info": { "auth_body": "abc", "wss_link": [] }
            }
        })
    }

    #[test]
    fn session_from_successful_start() {
        let s = Session::from_start_response(&start_response(0)).unwrap();
        assert_eq!(s.game_id, "g1");
        assert_eq!(s.auth_body, "abc");
    }

    #[test]
    fn non_zero_code_is_authentication_failure() {
        let err = Session::from_start_response(&start_response(7002)).unwrap_err();
        match err {
            Error::Authentication { message, response } => {
                assert!(message.contains("7002"));
                assert_eq!(response["code"], 7002);
            }
            other => panic!("expected Authentication, got {other:?}"),
        }
    }

    #[test]
    fn empty_game_id_is_rejected() {
        let mut resp = start_response(0);
        resp["data"]["game_info"]["game_id"] = json!("");
        assert!(matches!(
            Session::from_start_response(&resp),
            Err(Error::Authentication { .. })
        ));
    }

    #[test]
    fn missing_code_is_rejected() {
        let resp = json!({ "data": {} });
        assert!(Session::from_start_response(&resp).is_err());
    }

    #[test]
    fn only_idle_and_closed_can_start() {
        assert!(ConnectionState::Idle.can_start());
        assert!(ConnectionState::Closed.can_start());
        assert!(!ConnectionState::Connecting.can_start());
        assert!(!ConnectionState::Authenticating.can_start());
        assert!(!ConnectionState::Open.can_start());
        assert!(!ConnectionState::Closing.can_start());
    }

    #[test]
    fn outcome_messages() {
        assert_eq!(StartOutcome::Started.to_string(), "started");
        assert_eq!(StartOutcome::AlreadyRunning.to_string(), "already running");
    }
}

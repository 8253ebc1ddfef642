use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Vendor endpoints
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub const DEFAULT_API_BASE_URL: &str = "https://live-open.biliapi.com";
pub const DEFAULT_WS_URL: &str = "wss://broadcastlv.chat.bilibili.com:443/sub";
pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 19;

/// Where the control-plane and data-plane live, and how often both are
/// kept alive.
///
/// Only tests and staging setups should need to override these.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EndpointsConfig {
    /// Control-plane base URL (`/v2/app/*` is appended).
    #[serde(default = "d_api_base_url")]
    pub api_base_url: String,

    /// Data-plane WebSocket URL.
    #[serde(default = "d_ws_url")]
    pub ws_url: String,

    /// Interval for both the socket heartbeat and the session heartbeat.
    #[serde(default = "d_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            api_base_url: d_api_base_url(),
            ws_url: d_ws_url(),
            heartbeat_interval_secs: d_heartbeat_interval_secs(),
        }
    }
}

fn d_api_base_url() -> String {
    DEFAULT_API_BASE_URL.into()
}

fn d_ws_url() -> String {
    DEFAULT_WS_URL.into()
}

fn d_heartbeat_interval_secs() -> u64 {
    DEFAULT_HEARTBEAT_INTERVAL_SECS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_empty_uses_defaults() {
        let cfg: EndpointsConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, EndpointsConfig::default());
        assert_eq!(cfg.heartbeat_interval_secs, 19);
    }

    #[test]
    fn partial_override_keeps_other_defaults() {
        let cfg: EndpointsConfig =
            serde_json::from_str(r#"{"ws_url": "ws://127.0.0.1:9000/sub"}"#).unwrap();
        assert_eq!(cfg.ws_url, "ws://127.0.0.1:9000/sub");
        assert_eq!(cfg.api_base_url, DEFAULT_API_BASE_URL);
    }
}

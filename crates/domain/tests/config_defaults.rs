use ol_domain::config::{Config, DEFAULT_API_BASE_URL, DEFAULT_WS_URL};

#[test]
fn default_endpoints_are_the_vendor_ones() {
    let config = Config::default();
    assert_eq!(config.endpoints.api_base_url, "https://live-open.biliapi.com");
    assert_eq!(
        config.endpoints.ws_url,
        "wss://broadcastlv.chat.bilibili.com:443/sub"
    );
    assert_eq!(config.endpoints.heartbeat_interval_secs, 19);
}

#[test]
fn flat_credential_document_parses() {
    let json = r#"{
        "code": "ABCDEF",
        "app_id": 1650000000000,
        "accessKeyId": "id-1",
        "accessKeySecret": "secret-1"
    }"#;
    let config: Config = serde_json::from_str(json).unwrap();
    assert_eq!(config.credentials.code, "ABCDEF");
    assert_eq!(config.credentials.app_id, 1650000000000);
    assert_eq!(config.credentials.access_key_id, "id-1");
    assert_eq!(config.credentials.access_key_secret, "secret-1");
    assert_eq!(config.endpoints.api_base_url, DEFAULT_API_BASE_URL);
    assert_eq!(config.endpoints.ws_url, DEFAULT_WS_URL);
}

#[test]
fn endpoints_override_parses() {
    let json = r#"{
        "code": "c",
        "app_id": 1,
        "accessKeyId": "i",
        "accessKeySecret": "s",
        "endpoints": { "api_base_url": "http://127.0.0.1:8080", "heartbeat_interval_secs": 5 }
    }"#;
    let config: Config = serde_json::from_str(json).unwrap();
    assert_eq!(config.endpoints.api_base_url, "http://127.0.0.1:8080");
    assert_eq!(config.endpoints.heartbeat_interval_secs, 5);
    assert_eq!(config.endpoints.ws_url, DEFAULT_WS_URL);
}

#[test]
fn template_uses_file_key_names() {
    let value = serde_json::to_value(Config::template()).unwrap();
    for key in ["code", "app_id", "accessKeyId", "accessKeySecret"] {
        assert!(value.get(key).is_some(), "template missing {key}");
    }
    assert_eq!(value["app_id"], 0);
}

#[test]
fn template_round_trips_through_a_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, serde_json::to_string_pretty(&Config::template()).unwrap()).unwrap();

    let raw = std::fs::read_to_string(&path).unwrap();
    let parsed: Config = serde_json::from_str(&raw).unwrap();
    assert_eq!(parsed, Config::template());
}

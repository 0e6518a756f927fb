//! Tests for config functionality.

use crate::config::{Config, ReleasePolicy};
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_default_config() {
    let config = Config::default();

    assert_eq!(config.cluster_name, "default");
    assert_eq!(config.service_name, "lock");
    assert!(config.node_name.is_none());
    assert_eq!(config.method_call_timeout_ms, 60_000);
    assert_eq!(config.retry_backoff_min_ms, 10);
    assert_eq!(config.retry_backoff_max_ms, 500);
    assert_eq!(config.grant_expiry_slack_ms, 1_000);
    assert_eq!(config.release_policy, ReleasePolicy::Release);
    assert!(config.evict_idle_locks);
    assert!(config.event_log.is_none());
    assert!(config.validate().is_ok());
}

#[test]
fn test_parse_minimal_yaml() {
    let config = Config::from_yaml("{}").unwrap();

    assert_eq!(config.cluster_name, "default");
    assert_eq!(config.service_name, "lock");
}

#[test]
fn test_parse_partial_yaml() {
    let yaml = r#"
cluster_name: web
release_policy: retain
"#;
    let config = Config::from_yaml(yaml).unwrap();

    assert_eq!(config.cluster_name, "web");
    assert_eq!(config.release_policy, ReleasePolicy::Retain);

    // Unspecified values should use defaults
    assert_eq!(config.service_name, "lock");
    assert_eq!(config.method_call_timeout_ms, 60_000);
}

#[test]
fn test_parse_full_yaml() {
    let yaml = r#"
cluster_name: ejb
service_name: sfsb-lock
node_name: node-7
method_call_timeout_ms: 5000
retry_backoff_min_ms: 5
retry_backoff_max_ms: 80
grant_expiry_slack_ms: 250
release_policy: release
evict_idle_locks: false
event_log: /var/log/clusterlock/events.ndjson
"#;
    let config = Config::from_yaml(yaml).unwrap();

    assert_eq!(config.cluster_name, "ejb");
    assert_eq!(config.service_name, "sfsb-lock");
    assert_eq!(config.node_name.as_deref(), Some("node-7"));
    assert_eq!(config.method_call_timeout_ms, 5000);
    assert_eq!(config.retry_backoff_min_ms, 5);
    assert_eq!(config.retry_backoff_max_ms, 80);
    assert_eq!(config.grant_expiry_slack_ms, 250);
    assert_eq!(config.release_policy, ReleasePolicy::Release);
    assert!(!config.evict_idle_locks);
    assert!(
        config
            .event_log
            .as_ref()
            .unwrap()
            .ends_with("events.ndjson")
    );
}

#[test]
fn test_unknown_fields_ignored() {
    let yaml = r#"
cluster_name: web
future_setting: 42
"#;
    let config = Config::from_yaml(yaml).unwrap();
    assert_eq!(config.cluster_name, "web");
}

#[test]
fn test_validation_rejects_empty_cluster_name() {
    let result = Config::from_yaml("cluster_name: ''");
    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("cluster_name"));
}

#[test]
fn test_validation_rejects_blank_node_name() {
    let result = Config::from_yaml("node_name: '  '");
    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("node_name"));
}

#[test]
fn test_validation_rejects_zero_call_timeout() {
    let result = Config::from_yaml("method_call_timeout_ms: 0");
    assert!(result.is_err());
    assert!(
        result
            .unwrap_err()
            .to_string()
            .contains("method_call_timeout_ms")
    );
}

#[test]
fn test_validation_rejects_inverted_backoff() {
    let yaml = r#"
retry_backoff_min_ms: 100
retry_backoff_max_ms: 50
"#;
    let result = Config::from_yaml(yaml);
    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("retry_backoff_max_ms"));
}

#[test]
fn test_invalid_release_policy_fails() {
    let result = Config::from_yaml("release_policy: sometimes");
    assert!(result.is_err());
}

#[test]
fn test_release_policy_from_str() {
    assert_eq!(ReleasePolicy::from_str("release"), Some(ReleasePolicy::Release));
    assert_eq!(ReleasePolicy::from_str("retain"), Some(ReleasePolicy::Retain));
    assert_eq!(ReleasePolicy::from_str("keep"), None);
}

#[test]
fn test_yaml_roundtrip_preserves_values() {
    let config = Config {
        cluster_name: "web".to_string(),
        node_name: Some("node-2".to_string()),
        release_policy: ReleasePolicy::Retain,
        ..Config::default()
    };

    let yaml = config.to_yaml().unwrap();
    let parsed = Config::from_yaml(&yaml).unwrap();

    assert_eq!(parsed.cluster_name, "web");
    assert_eq!(parsed.node_name.as_deref(), Some("node-2"));
    assert_eq!(parsed.release_policy, ReleasePolicy::Retain);
}

#[test]
fn test_load_from_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("clusterlock.yaml");
    std::fs::write(&path, "cluster_name: from-file\n").unwrap();

    let config = Config::load(&path).unwrap();
    assert_eq!(config.cluster_name, "from-file");
}

#[test]
fn test_load_missing_file_fails() {
    let temp_dir = TempDir::new().unwrap();
    let result = Config::load(temp_dir.path().join("missing.yaml"));
    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("failed to read config file"));
}

#[test]
fn test_service_key() {
    let config = Config {
        cluster_name: "web".to_string(),
        ..Config::default()
    };
    assert_eq!(config.service().to_string(), "web/lock");
}

#[test]
fn test_retry_backoff_grows_and_caps() {
    let config = Config {
        retry_backoff_min_ms: 10,
        retry_backoff_max_ms: 100,
        ..Config::default()
    };

    assert_eq!(config.retry_backoff(0, 0), Duration::from_millis(10));
    assert_eq!(config.retry_backoff(1, 0), Duration::from_millis(20));
    assert_eq!(config.retry_backoff(3, 0), Duration::from_millis(80));
    assert_eq!(config.retry_backoff(10, 0), Duration::from_millis(100));
    assert_eq!(config.retry_backoff(40, 0), Duration::from_millis(100));

    // Junior members wait longer than senior ones for the same attempt.
    assert!(config.retry_backoff(0, 2) > config.retry_backoff(0, 0));
}

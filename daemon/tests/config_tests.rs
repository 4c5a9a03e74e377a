use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;
use vigilante_daemon::config::Config;

#[test]
fn test_default_config() {
    let config = Config::default();
    assert_eq!(config.general.log_level, "info");
    assert_eq!(config.storage.max_connections, 8);
    assert_eq!(config.query.timeout_seconds, 30);
    assert_eq!(config.query.default_top_k, 10);
    assert!(config.server.socket_path.is_none());
}

#[test]
fn test_load_from_toml() {
    let toml_content = r#"
[general]
log_level = "debug"

[storage]
data_dir = "/var/lib/vigilante/tenants"
max_connections = 2

[query]
timeout_seconds = 5
default_top_k = 0

[server]
socket_path = "/tmp/vigilante-test.sock"
"#;
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(toml_content.as_bytes()).unwrap();
    let config = Config::load(file.path()).unwrap();
    assert_eq!(config.general.log_level, "debug");
    assert_eq!(config.storage.data_dir, PathBuf::from("/var/lib/vigilante/tenants"));
    assert_eq!(config.storage.max_connections, 2);
    assert_eq!(config.query.default_top_k, 0);
    assert_eq!(config.query_timeout().as_secs(), 5);
    assert_eq!(config.server.socket_path, Some(PathBuf::from("/tmp/vigilante-test.sock")));
}

#[test]
fn test_server_section_is_optional() {
    let toml_content = r#"
[general]
log_level = "warn"

[storage]
data_dir = "tenants"
max_connections = 4

[query]
timeout_seconds = 10
default_top_k = 3
"#;
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(toml_content.as_bytes()).unwrap();
    let config = Config::load(file.path()).unwrap();
    assert!(config.server.socket_path.is_none());
    assert_eq!(config.query.default_top_k, 3);
}

#[test]
fn test_load_rejects_malformed_file() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(b"[storage\nmax_connections = ").unwrap();
    assert!(Config::load(file.path()).is_err());
}

#[test]
fn test_save_config() {
    let mut config = Config::default();
    config.query.default_top_k = 25;
    let file = NamedTempFile::new().unwrap();
    config.save(file.path()).unwrap();
    let loaded = Config::load(file.path()).unwrap();
    assert_eq!(loaded.query.default_top_k, 25);
    assert_eq!(loaded.storage.data_dir, config.storage.data_dir);
}

#[test]
fn test_zero_timeout_is_clamped() {
    let mut config = Config::default();
    config.query.timeout_seconds = 0;
    assert_eq!(config.query_timeout().as_secs(), 1);
}

use hl_domain::config::{Config, ConfigSeverity, LinkMethod, ProtocolBackend};

#[test]
fn default_host_is_localhost() {
    let config = Config::default();
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.server.port, 3000);
}

#[test]
fn default_storage_layout() {
    let config = Config::default();
    assert_eq!(config.storage.data_dir, std::path::PathBuf::from("data"));
    assert_eq!(
        config.storage.users_dir(),
        std::path::PathBuf::from("data").join("users")
    );
    assert_eq!(config.auth.users_file, std::path::PathBuf::from("data/auth.json"));
}

#[test]
fn full_file_parses() {
    let toml_str = r#"
[server]
host = "0.0.0.0"
port = 8099
name = "Support line"

[storage]
data_dir = "/var/lib/hookline"

[sessions]
default_method = "pairing_code"
command_timeout_secs = 5

[webhooks]
timeout_secs = 3
signing_secret_env = "MY_SECRET"

[protocol]
backend = "loopback"
auto_pair_after_secs = 2
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.server.port, 8099);
    assert_eq!(config.server.name, "Support line");
    assert_eq!(config.sessions.default_method, LinkMethod::PairingCode);
    assert_eq!(config.sessions.command_timeout_secs, 5);
    assert_eq!(config.webhooks.timeout_secs, 3);
    assert_eq!(config.webhooks.signing_secret_env, "MY_SECRET");
    assert_eq!(config.protocol.backend, ProtocolBackend::Loopback);
    assert_eq!(config.protocol.auto_pair_after_secs, Some(2));
}

#[test]
fn default_config_has_only_warnings() {
    let issues = Config::default().validate();
    assert!(issues.iter().all(|i| i.severity == ConfigSeverity::Warning));
    assert!(issues.iter().any(|i| i.field == "protocol.backend"));
}

#[test]
fn zero_port_and_timeouts_are_errors() {
    let mut config = Config::default();
    config.server.port = 0;
    config.sessions.command_timeout_secs = 0;
    config.webhooks.timeout_secs = 0;
    let fields: Vec<String> = config
        .validate()
        .into_iter()
        .filter(|i| i.severity == ConfigSeverity::Error)
        .map(|i| i.field)
        .collect();
    assert!(fields.contains(&"server.port".to_string()));
    assert!(fields.contains(&"sessions.command_timeout_secs".to_string()));
    assert!(fields.contains(&"webhooks.timeout_secs".to_string()));
}

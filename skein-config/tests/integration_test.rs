//! Integration tests for skein-config

use skein_config::*;
use std::io::Write;
use std::time::Duration;
use temp_env::with_vars;

#[test]
fn test_default_config_validation() {
    let config = SkeinConfig::default();
    assert!(config.validate_all().is_ok());
    assert_eq!(config.socket.address(), "127.0.0.1:20000");
}

#[test]
fn test_config_loader_from_env() {
    let vars = vec![
        ("SKEIN_MAILBOX_CAPACITY", Some("64")),
        ("SKEIN_POOL_WORKERS", Some("8")),
        ("SKEIN_PORT", Some("21000")),
        ("SKEIN_AUTHKEY", Some("s3cret")),
        ("SKEIN_RECONNECT_DELAY_MS", Some("250")),
        ("SKEIN_LOG_LEVEL", Some("debug")),
        ("SKEIN_LOG_FORMAT", Some("json")),
    ];

    with_vars(vars, || {
        let config = ConfigLoader::new().from_env().unwrap();

        assert_eq!(config.runtime.mailbox_capacity, 64);
        assert_eq!(config.runtime.pool_workers, 8);
        assert_eq!(config.socket.port, 21000);
        assert_eq!(config.socket.authkey, "s3cret");
        assert_eq!(config.socket.reconnect_delay, Duration::from_millis(250));
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.logging.format, LogFormat::Json);
    });
}

#[test]
fn test_invalid_env_values() {
    with_vars(vec![("SKEIN_PORT", Some("not-a-port"))], || {
        let err = ConfigLoader::new().from_env().unwrap_err();
        assert!(matches!(err, ConfigError::EnvError(_)));
        assert!(err.to_string().contains("SKEIN_PORT"));
    });

    with_vars(vec![("SKEIN_LOG_LEVEL", Some("chatty"))], || {
        assert!(matches!(
            ConfigLoader::new().from_env(),
            Err(ConfigError::EnvError(_))
        ));
    });

    // Parses fine but fails validation
    with_vars(vec![("SKEIN_POOL_WORKERS", Some("0"))], || {
        assert!(matches!(
            ConfigLoader::new().from_env(),
            Err(ConfigError::DomainError { .. })
        ));
    });
}

#[test]
fn test_custom_prefix() {
    with_vars(vec![("ECHO_PORT", Some("30001"))], || {
        let config = ConfigLoader::with_prefix("ECHO").from_env().unwrap();
        assert_eq!(config.socket.port, 30001);
    });
}

#[test]
fn test_file_with_env_override() {
    let yaml = r#"
runtime:
  pool_workers: 2

socket:
  bind_address: "0.0.0.0"
  port: 20500
  authkey: "from-file"
  reconnect_delay: 2s

logging:
  level: warn
  format: compact
"#;

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();

    with_vars(vec![("SKEIN_AUTHKEY", Some("from-env"))], || {
        let config = ConfigLoader::new().from_file(file.path()).unwrap();

        assert_eq!(config.runtime.pool_workers, 2);
        assert_eq!(config.runtime.mailbox_capacity, 256);
        assert_eq!(config.socket.bind_address, "0.0.0.0");
        assert_eq!(config.socket.port, 20500);
        assert_eq!(config.socket.authkey, "from-env");
        assert_eq!(config.socket.reconnect_delay, Duration::from_secs(2));
        assert_eq!(config.logging.level, LogLevel::Warn);
        assert_eq!(config.logging.format, LogFormat::Compact);
    });
}

#[test]
fn test_load_fallback_chain() {
    let unset: Vec<(&str, Option<&str>)> = [
        "SKEIN_MAILBOX_CAPACITY",
        "SKEIN_POOL_WORKERS",
        "SKEIN_BIND_ADDRESS",
        "SKEIN_PORT",
        "SKEIN_AUTHKEY",
        "SKEIN_RECONNECT_DELAY_MS",
        "SKEIN_LOG_LEVEL",
        "SKEIN_LOG_FORMAT",
    ]
    .into_iter()
    .map(|name| (name, None))
    .collect();

    with_vars(unset, || {
        let loader = ConfigLoader::new();
        let config = loader.load(None::<&str>).unwrap();
        assert_eq!(config, SkeinConfig::default());

        let missing = loader.load(Some("/definitely/not/here.yaml"));
        assert!(matches!(missing, Err(ConfigError::FileReadError(_))));
    });
}

#[test]
fn test_malformed_yaml() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"socket: [this is not a map").unwrap();

    let result = ConfigLoader::new().from_file(file.path());
    assert!(matches!(result, Err(ConfigError::ParseError(_))));
}

#[test]
fn test_yaml_config_serialization() {
    let yaml = SkeinConfig::generate_sample();
    let parsed: SkeinConfig = serde_yaml::from_str(&yaml).unwrap();
    assert!(parsed.validate_all().is_ok());
}

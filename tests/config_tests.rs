// tests/config_tests.rs

use farmguard_gateway::config::{load_config, AppConfig, ConfigValidator, ServiceKeys};
use farmguard_gateway::AppError;
use serial_test::serial;
use std::env;
use std::io::Write;
use tempfile::NamedTempFile;

const ENV_VARS: &[&str] = &[
    "WEATHER_API_KEY",
    "WEATHER_API_KEYS",
    "WEATHERAPI_KEY",
    "OPENAI_API_KEY",
    "COHERE_API_KEY",
    "NEXT_PUBLIC_WEATHER_API_KEY",
    "NEXT_PUBLIC_WEATHER_API_KEYS",
    "NEXT_PUBLIC_WEATHERAPI_KEY",
    "NEXT_PUBLIC_OPENAI_API_KEY",
    "NEXT_PUBLIC_COHERE_API_KEY",
    "FARMGUARD_HOST",
    "FARMGUARD_PORT",
    "FARMGUARD_ADMIN_TOKEN",
];

fn clear_env() {
    for name in ENV_VARS {
        env::remove_var(name);
    }
}

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

const SAMPLE: &str = r#"
server:
  port: 9001
  admin_token: "file-token"
key_policy:
  failure_threshold: 4
resilience:
  request_timeout_secs: 5
services:
  - name: weather
    primary: "owm-file-primary-key"
    alternatives: ["owm-file-backup-key"]
    probe:
      url: "https://api.openweathermap.org/data/2.5/weather?q=London"
      query_param: appid
  - name: market
"#;

#[test]
#[serial]
fn loads_yaml_file_with_defaults() {
    clear_env();
    let file = write_config(SAMPLE);

    let config = load_config(file.path()).unwrap();
    assert_eq!(config.server.port, 9001);
    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.server.admin_token.as_deref(), Some("file-token"));
    assert_eq!(config.key_policy.failure_threshold, 4);
    assert_eq!(config.key_policy.blacklist_duration_secs, 3600);
    assert_eq!(config.resilience.request_timeout_secs, 5);
    assert_eq!(config.resilience.cache_ttl_secs, 300);
    assert_eq!(config.resilience.circuit_breaker.failure_threshold, 5);

    let weather = config.service("weather").unwrap();
    assert_eq!(
        weather.all_keys(),
        vec!["owm-file-primary-key", "owm-file-backup-key"]
    );
    assert_eq!(
        weather.probe.as_ref().unwrap().query_param.as_deref(),
        Some("appid")
    );
    assert!(config.service("market").unwrap().all_keys().is_empty());
}

#[test]
#[serial]
fn missing_file_uses_defaults_and_environment() {
    clear_env();
    env::set_var("WEATHER_API_KEY", "env-weather-primary");
    env::set_var("WEATHER_API_KEYS", "env-alt-1, env-alt-2,");
    env::set_var("NEXT_PUBLIC_OPENAI_API_KEY", "sk-env-openai");
    env::set_var("FARMGUARD_PORT", "7070");

    let config = load_config(std::path::Path::new("/nonexistent/farmguard.yaml")).unwrap();
    clear_env();

    assert_eq!(config.server.port, 7070);
    assert_eq!(
        config.service("weather").unwrap().all_keys(),
        vec!["env-weather-primary", "env-alt-1", "env-alt-2"]
    );
    assert_eq!(
        config.service("ai").unwrap().primary.as_deref(),
        Some("sk-env-openai")
    );
}

#[test]
#[serial]
fn environment_credentials_merge_into_file_service() {
    clear_env();
    env::set_var("WEATHER_API_KEY", "env-weather-primary");
    env::set_var("WEATHERAPI_KEY", "weatherapi-com-key");
    env::set_var("FARMGUARD_ADMIN_TOKEN", "env-token");
    let file = write_config(SAMPLE);

    let config = load_config(file.path()).unwrap();
    clear_env();

    let weather = config.service("weather").unwrap();
    assert_eq!(weather.primary.as_deref(), Some("env-weather-primary"));
    assert_eq!(
        weather.alternatives,
        vec!["owm-file-primary-key", "owm-file-backup-key", "weatherapi-com-key"]
    );
    assert_eq!(config.server.admin_token.as_deref(), Some("env-token"));
}

#[test]
#[serial]
fn malformed_yaml_is_a_parse_error() {
    clear_env();
    let file = write_config("services:\n  - name: [weather\n");

    let err = load_config(file.path()).unwrap_err();
    assert!(matches!(err, AppError::ConfigParse { .. }));
}

#[test]
#[serial]
fn invalid_probe_url_fails_validation() {
    clear_env();
    let file = write_config(
        r#"
services:
  - name: weather
    primary: "k"
    probe:
      url: "not a url"
"#,
    );

    let err = load_config(file.path()).unwrap_err();
    assert!(matches!(err, AppError::ConfigValidation { .. }));
}

#[test]
fn duplicate_service_names_are_rejected() {
    let config = AppConfig {
        services: vec![ServiceKeys::new("weather"), ServiceKeys::new("weather")],
        ..AppConfig::default()
    };
    assert!(ConfigValidator::validate(&config).is_err());
}

#[test]
fn zero_thresholds_are_rejected() {
    let mut config = AppConfig::default();
    config.key_policy.failure_threshold = 0;
    assert!(ConfigValidator::validate(&config).is_err());

    let mut config = AppConfig::default();
    config.resilience.request_timeout_secs = 0;
    assert!(ConfigValidator::validate(&config).is_err());

    let mut config = AppConfig::default();
    config.server.port = 0;
    assert!(ConfigValidator::validate(&config).is_err());
}

use std::time::Duration;

use runbox::{Config, ConfigError};

use super::FIXTURES_PATH;

#[test]
fn test_load_toml_config() {
    let path = format!("{FIXTURES_PATH}/configs/valid.toml");
    let config = Config::from_file(&path).expect("Failed to load config");

    assert_eq!(config.max_output, 4096);
    assert_eq!(config.pool.size, 1);
    assert_eq!(config.languages.len(), 1);

    let profile = config.profile_for("python").unwrap();
    assert_eq!(config.effective_time_limit(profile, None), Duration::from_secs(2));
}

#[test]
fn test_load_json_config() {
    let path = format!("{FIXTURES_PATH}/configs/valid.json");
    let config = Config::from_file(&path).expect("Failed to load config");

    assert_eq!(
        config.docker_host.as_deref(),
        Some("unix:///var/run/docker.sock")
    );
    let profile = config.profile_for("cpp").unwrap();
    assert!(profile.is_compiled());
    assert_eq!(profile.default_memory_limit(), 256 * 1024 * 1024);
}

#[test]
fn test_load_invalid_source_file() {
    let path = format!("{FIXTURES_PATH}/configs/invalid_source_file.toml");
    assert!(Config::from_file(&path).is_err());
}

#[test]
fn test_load_invalid_empty_image() {
    let path = format!("{FIXTURES_PATH}/configs/invalid_empty_image.toml");
    assert!(matches!(
        Config::from_file(&path),
        Err(ConfigError::Invalid(_))
    ));
}

#[test]
fn test_invalid_file_falls_back_to_defaults() {
    let path = format!("{FIXTURES_PATH}/configs/invalid_empty_image.toml");
    let config = Config::load_or_default(Some(path.as_ref()));

    assert!(config.profile_for("java").is_ok());
    assert_eq!(config.languages.len(), Config::default().languages.len());
}

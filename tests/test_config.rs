use std::io::Write;
use typthon_objc::{Bridge, BridgeConfig, ExceptionPolicy};

#[test]
fn test_config_file_drives_the_bridge() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
        [dispatch]
        signature_cache_capacity = 64

        [exceptions]
        policy = "raise"

        [logging]
        level = "trace"
        json = true
        "#
    )
    .unwrap();

    let config = BridgeConfig::from_file(file.path()).unwrap();
    assert_eq!(config.dispatch.signature_cache_capacity, 64);
    assert_eq!(config.exceptions.policy, ExceptionPolicy::Raise);
    assert!(config.log_config().json_format);

    let bridge = Bridge::simulated(config.clone()).unwrap();
    assert_eq!(bridge.config(), &config);
}

#[test]
fn test_missing_config_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = BridgeConfig::from_file(&dir.path().join("absent.toml")).unwrap_err();
    assert!(err.to_string().contains("absent.toml"));
}

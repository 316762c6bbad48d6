use serial_test::serial;
use temp_env::with_vars;

use super::*;

#[test]
fn default_config_should_initialize_with_hardcoded_values() {
    let config = WatcherConfig::default();

    assert_eq!(config.poll.interval_ms, 5_000);
    assert!(config.poll.periodic);
}

#[test]
#[serial]
fn new_should_merge_environment_overrides() {
    with_vars(
        vec![
            ("WATCHER__POLL__INTERVAL_MS", Some("250")),
            ("WATCHER__POLL__PERIODIC", Some("false")),
        ],
        || {
            let config = WatcherConfig::new().unwrap();

            assert_eq!(config.poll.interval_ms, 250);
            assert!(!config.poll.periodic);
        },
    );
}

#[test]
#[serial]
fn new_without_overrides_should_keep_defaults() {
    let empty_vars: Vec<(&str, Option<&str>)> = vec![];
    with_vars(empty_vars, || {
        let config = WatcherConfig::new().unwrap().validate().unwrap();

        assert_eq!(config.poll.interval_ms, 5_000);
        assert!(config.poll.periodic);
    });
}

#[test]
fn validate_should_reject_zero_poll_interval() {
    let config = WatcherConfig {
        poll: PollConfig {
            interval_ms: 0,
            periodic: true,
        },
    };

    assert!(config.validate().is_err());
}

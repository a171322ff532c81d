use std::path::PathBuf;

use lmq::config::{load_config, ConfigError};
use lmq::Config;

#[test]
fn load_config_matches_toml() {
    let cfg: Config = load_config("lmq.toml").expect("failed to load config");

    assert!(!cfg.server.debug);
    assert_eq!(cfg.server.bind_addresses, vec!["127.0.0.1:8080".to_string()]);
    assert_eq!(cfg.server.whitelist().unwrap().len(), 2);
    assert_eq!(cfg.queues.init_size, 1000);
    assert_eq!(cfg.queues.max_size, None);
    assert_eq!(cfg.recovery.dir, PathBuf::from("./recovery"));
    assert_eq!(cfg.recovery.file_size, 10_000);
    assert_eq!(cfg.recovery.channel_capacity, 1000);
    assert_eq!(cfg.recovery.fsync_every_n, Some(1000));
    assert!(cfg.recovery.blocking_rejournal);
    assert_eq!(cfg.payload.file_base_path, PathBuf::from("./files"));
    assert!(cfg.payload.mysql_url.is_none());
}

#[test]
fn missing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_config(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io(_)));
}

#[test]
fn invalid_values_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.toml");

    std::fs::write(&path, "[recovery]\nfile_size = 0\n").unwrap();
    assert!(matches!(load_config(&path), Err(ConfigError::Invalid(_))));

    std::fs::write(&path, "[server]\nbind_addresses = []\n").unwrap();
    assert!(matches!(load_config(&path), Err(ConfigError::Invalid(_))));

    std::fs::write(&path, "[queues]\ninit_size = \"big\"\n").unwrap();
    assert!(matches!(load_config(&path), Err(ConfigError::Toml(_))));
}

/*!
 * Store Configuration Tests
 *
 * Environment-driven configuration; serialized because it mutates process env
 */

use dir_store::store::config::{ENV_READ_KEEP_ALIVE, ENV_ROOT, ENV_WRITER_POLICY};
use dir_store::{InlineContext, KeyedStore, StoreConfig, StoreError, WriterPolicy};
use pretty_assertions::assert_eq;
use serial_test::serial;
use std::path::PathBuf;
use std::time::Duration;

fn clear_env() {
    for var in [ENV_ROOT, ENV_WRITER_POLICY, ENV_READ_KEEP_ALIVE] {
        std::env::remove_var(var);
    }
}

#[test]
#[serial]
fn test_from_env_defaults() {
    clear_env();
    let config = StoreConfig::from_env().unwrap();

    assert_eq!(config.root, std::env::temp_dir().join("dir-store"));
    assert_eq!(config.writer_policy, WriterPolicy::Strict);
    assert_eq!(config.read_keep_alive, Duration::from_secs(60));
}

#[test]
#[serial]
fn test_from_env_overrides() {
    clear_env();
    std::env::set_var(ENV_ROOT, "/srv/prefs");
    std::env::set_var(ENV_WRITER_POLICY, "Permissive");
    std::env::set_var(ENV_READ_KEEP_ALIVE, "5");

    let config = StoreConfig::from_env().unwrap();
    clear_env();

    assert_eq!(config.root, PathBuf::from("/srv/prefs"));
    assert_eq!(config.writer_policy, WriterPolicy::Permissive);
    assert_eq!(config.read_keep_alive, Duration::from_secs(5));
}

#[test]
#[serial]
fn test_from_env_rejects_bad_values() {
    clear_env();
    std::env::set_var(ENV_WRITER_POLICY, "sometimes");
    assert!(matches!(StoreConfig::from_env(), Err(StoreError::Config(_))));

    clear_env();
    std::env::set_var(ENV_READ_KEEP_ALIVE, "soon");
    assert!(matches!(StoreConfig::from_env(), Err(StoreError::Config(_))));

    clear_env();
    std::env::set_var(ENV_READ_KEEP_ALIVE, "0");
    assert!(matches!(StoreConfig::from_env(), Err(StoreError::Config(_))));
    clear_env();
}

#[test]
#[serial]
fn test_store_from_env_root() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("from-env");
    clear_env();
    std::env::set_var(ENV_ROOT, &root);

    let store = KeyedStore::new(StoreConfig::from_env().unwrap(), InlineContext).unwrap();
    clear_env();

    assert_eq!(store.root(), root.as_path());
    assert!(root.is_dir());
}

#[test]
fn test_config_serde_round_trip() {
    let config = StoreConfig::builder("/data/ds")
        .writer_policy(WriterPolicy::Permissive)
        .thread_name_prefix("prefs")
        .build()
        .unwrap();

    let json = serde_json::to_string(&config).unwrap();
    assert!(json.contains("\"permissive\""));
    let back: StoreConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(back, config);
}

#[test]
fn test_invalid_config_refused_by_store() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = StoreConfig::new(dir.path());
    config.thread_name_prefix = String::new();

    assert!(matches!(
        KeyedStore::new(config, InlineContext),
        Err(StoreError::Config(_))
    ));
}

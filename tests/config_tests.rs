//! Configuration defaults, builder validation, and file loading.

use eventharvest::config::HarvestConfig;
use eventharvest::sources::SourceKind;
use std::time::Duration;

#[test]
fn defaults_match_a_polite_production_run() {
    let config = HarvestConfig::default();

    assert_eq!(config.workers(), 5);
    assert_eq!(config.max_attempts(), 3);
    assert_eq!(config.base_backoff(), Duration::from_secs(3));
    assert_eq!(config.max_backoff(), Duration::from_secs(60));
    assert_eq!(config.cache_ttl(SourceKind::Website), Duration::from_secs(24 * 3600));
    assert_eq!(config.fetch_delay_range().0, Duration::from_secs(3));
    assert_eq!(config.fetch_delay_range().1, Duration::from_secs(10));
    assert!((config.similarity_threshold() - 0.85).abs() < f64::EPSILON);
    assert!((config.min_success_fraction() - 0.5).abs() < f64::EPSILON);
    assert!(config.headless());
    assert!(config.health_check_enabled());
    assert!(!config.bypass_cache());
    assert!(!config.dry_run());
}

#[test]
fn session_pool_follows_worker_count_by_default() {
    let config = HarvestConfig::builder()
        .workers(8)
        .build()
        .expect("valid config");
    assert_eq!(config.max_sessions(), 8);

    let pinned = HarvestConfig::builder()
        .workers(8)
        .max_sessions(2)
        .build()
        .expect("valid config");
    assert_eq!(pinned.max_sessions(), 2);
}

#[test]
fn social_ttl_overrides_per_kind() {
    let config = HarvestConfig::builder()
        .cache_ttl_hours(24)
        .social_cache_ttl_hours(6)
        .build()
        .expect("valid config");

    assert_eq!(config.cache_ttl(SourceKind::Website), Duration::from_secs(24 * 3600));
    assert_eq!(config.cache_ttl(SourceKind::SocialPage), Duration::from_secs(6 * 3600));
}

#[test]
fn builder_rejects_invalid_settings() {
    assert!(HarvestConfig::builder().workers(0).build().is_err());
    assert!(HarvestConfig::builder().max_attempts(0).build().is_err());
    assert!(HarvestConfig::builder().fetch_delay_secs(10, 3).build().is_err());
    assert!(
        HarvestConfig::builder()
            .similarity_threshold(1.5)
            .build()
            .is_err()
    );
    assert!(
        HarvestConfig::builder()
            .min_success_fraction(-0.1)
            .build()
            .is_err()
    );
}

#[test]
fn config_loads_from_json_file_with_partial_fields() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("config.json");
    std::fs::write(
        &path,
        r#"{
            "workers": 3,
            "cache_ttl_hours": 12,
            "social_email": "scraper@example.com",
            "social_password": "hunter2"
        }"#,
    )
    .expect("write config");

    let config = HarvestConfig::from_file(&path).expect("loads");
    assert_eq!(config.workers(), 3);
    assert_eq!(config.cache_ttl(SourceKind::Website), Duration::from_secs(12 * 3600));
    // Unset fields fall back to defaults
    assert_eq!(config.max_attempts(), 3);

    // Credentials load but never render in Debug output
    assert_eq!(
        config.social_email().map(|c| c.expose()),
        Some("scraper@example.com")
    );
    let rendered = format!("{config:?}");
    assert!(!rendered.contains("hunter2"));
}

#[test]
fn invalid_file_settings_are_rejected_on_load() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{"workers": 0}"#).expect("write config");
    assert!(HarvestConfig::from_file(&path).is_err());
}

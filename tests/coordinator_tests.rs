//! End-to-end coordinator runs: source list loading, cross-source
//! merging, deterministic ordering, backup snapshots, and run status.

use std::io::Read;
use std::path::Path;

use eventharvest::config::HarvestConfig;
use eventharvest::coordinator::{RunCoordinator, RunStatus};
use eventharvest::events::Event;

fn jsonld_page(title: &str, date: &str, venue: &str) -> String {
    format!(
        r#"<html><head><script type="application/ld+json">
        {{
            "@type": "Event",
            "name": "{title}",
            "startDate": "{date}",
            "location": {{"@type": "Place", "name": "{venue}"}}
        }}
        </script></head><body></body></html>"#
    )
}

fn write_sources(path: &Path, entries: &[(&str, String, bool)]) {
    let sources: Vec<serde_json::Value> = entries
        .iter()
        .map(|(id, url, active)| {
            serde_json::json!({
                "id": id,
                "name": id.to_uppercase(),
                "url": url,
                "kind": "website",
                "method": "lightweight",
                "active": active,
            })
        })
        .collect();
    std::fs::write(path, serde_json::to_string_pretty(&sources).expect("serializes"))
        .expect("writes sources");
}

fn test_config(root: &Path, sources: &Path) -> HarvestConfig {
    HarvestConfig::builder()
        .cache_dir(root.join("cache"))
        .cookie_dir(root.join("cookies"))
        .backup_dir(root.join("backups"))
        .sources_file(sources)
        .workers(3)
        .fetch_delay_secs(0, 0)
        .base_backoff_ms(10)
        .max_backoff_ms(50)
        .jitter_ms(5)
        .build()
        .expect("valid config")
}

#[tokio::test]
async fn near_duplicates_across_sources_merge_with_lineage() {
    let mut server = mockito::Server::new_async().await;
    let dir = tempfile::tempdir().expect("tempdir");

    server.mock("HEAD", "/a").with_status(200).create_async().await;
    server
        .mock("GET", "/a")
        .with_status(200)
        .with_body(jsonld_page("Jazz Night", "2024-07-15T21:00:00", "Heraklion"))
        .create_async()
        .await;

    server.mock("HEAD", "/b").with_status(200).create_async().await;
    server
        .mock("GET", "/b")
        .with_status(200)
        .with_body(jsonld_page("Jazz Night!!", "2024-07-15T20:00:00", "Iraklio"))
        .create_async()
        .await;

    let sources_path = dir.path().join("sources.json");
    write_sources(
        &sources_path,
        &[
            ("a", format!("{}/a", server.url()), true),
            ("b", format!("{}/b", server.url()), true),
        ],
    );

    let coordinator = RunCoordinator::new(test_config(dir.path(), &sources_path))
        .expect("coordinator assembles");
    let (events, summary) = coordinator.run(None).await.expect("run completes");

    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.events_raw, 2);
    assert_eq!(summary.events_final, 1, "near-duplicates fold into one event");
    assert_eq!(summary.status, RunStatus::Success);

    let merged = &events[0];
    let mut source_ids: Vec<_> = merged.sources.iter().map(|s| s.source_id.as_str()).collect();
    source_ids.sort_unstable();
    assert_eq!(source_ids, vec!["a", "b"], "both sources in the lineage");
    assert_eq!(merged.merged_from.len(), 1);
}

#[tokio::test]
async fn backup_snapshot_contains_the_final_event_collection() {
    let mut server = mockito::Server::new_async().await;
    let dir = tempfile::tempdir().expect("tempdir");

    server.mock("HEAD", "/a").with_status(200).create_async().await;
    server
        .mock("GET", "/a")
        .with_status(200)
        .with_body(jsonld_page("Harbour Market", "2024-07-19T09:00:00", "Heraklion"))
        .create_async()
        .await;

    let sources_path = dir.path().join("sources.json");
    write_sources(&sources_path, &[("a", format!("{}/a", server.url()), true)]);

    let coordinator = RunCoordinator::new(test_config(dir.path(), &sources_path))
        .expect("coordinator assembles");
    let (events, summary) = coordinator.run(None).await.expect("run completes");

    let backup = summary.backup_path.expect("backup written");
    assert!(backup.exists());

    let file = std::fs::File::open(&backup).expect("open backup");
    let mut decoder = flate2::read::GzDecoder::new(file);
    let mut json = String::new();
    decoder.read_to_string(&mut json).expect("decompress");
    let restored: Vec<Event> = serde_json::from_str(&json).expect("parse");
    assert_eq!(restored, events);
}

#[tokio::test]
async fn inactive_sources_and_subsets_are_excluded_before_dispatch() {
    let mut server = mockito::Server::new_async().await;
    let dir = tempfile::tempdir().expect("tempdir");

    server.mock("HEAD", "/a").with_status(200).create_async().await;
    server
        .mock("GET", "/a")
        .with_status(200)
        .with_body(jsonld_page("Jazz Night", "2024-07-15T21:00:00", "Heraklion"))
        .create_async()
        .await;

    // Neither the inactive source nor the out-of-subset source may be
    // touched at all
    let untouched = server
        .mock("GET", "/x")
        .with_status(200)
        .expect(0)
        .create_async()
        .await;

    let sources_path = dir.path().join("sources.json");
    write_sources(
        &sources_path,
        &[
            ("a", format!("{}/a", server.url()), true),
            ("inactive", format!("{}/x", server.url()), false),
            ("outside", format!("{}/x", server.url()), true),
        ],
    );

    let coordinator = RunCoordinator::new(test_config(dir.path(), &sources_path))
        .expect("coordinator assembles");
    let subset = vec!["a".to_string()];
    let (_events, summary) = coordinator.run(Some(&subset)).await.expect("run completes");

    assert_eq!(summary.sources_total, 1);
    assert_eq!(summary.succeeded, 1);
    untouched.assert_async().await;
}

#[tokio::test]
async fn run_is_degraded_below_the_minimum_success_fraction() {
    let mut server = mockito::Server::new_async().await;
    let dir = tempfile::tempdir().expect("tempdir");

    server.mock("HEAD", "/a").with_status(200).create_async().await;
    server
        .mock("GET", "/a")
        .with_status(200)
        .with_body(jsonld_page("Jazz Night", "2024-07-15T21:00:00", "Heraklion"))
        .create_async()
        .await;

    for path in ["/b", "/c", "/d"] {
        server.mock("HEAD", path).with_status(200).create_async().await;
        server.mock("GET", path).with_status(404).create_async().await;
    }

    let sources_path = dir.path().join("sources.json");
    write_sources(
        &sources_path,
        &[
            ("a", format!("{}/a", server.url()), true),
            ("b", format!("{}/b", server.url()), true),
            ("c", format!("{}/c", server.url()), true),
            ("d", format!("{}/d", server.url()), true),
        ],
    );

    let coordinator = RunCoordinator::new(test_config(dir.path(), &sources_path))
        .expect("coordinator assembles");
    let (_events, summary) = coordinator.run(None).await.expect("run completes without abort");

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 3);
    assert_eq!(summary.status, RunStatus::Degraded, "1/4 is below the 0.5 floor");
}

#[tokio::test]
async fn final_events_are_ordered_by_start_time_not_completion() {
    let mut server = mockito::Server::new_async().await;
    let dir = tempfile::tempdir().expect("tempdir");

    // The later-starting event is served by the faster source
    server.mock("HEAD", "/late").with_status(200).create_async().await;
    server
        .mock("GET", "/late")
        .with_status(200)
        .with_body(jsonld_page("Zeta Late Show", "2024-09-20T22:00:00", "Chania"))
        .create_async()
        .await;

    server.mock("HEAD", "/early").with_status(200).create_async().await;
    server
        .mock("GET", "/early")
        .with_status(200)
        .with_body(jsonld_page("Alpha Morning Fair", "2024-07-02T08:00:00", "Rethymno"))
        .create_async()
        .await;

    let sources_path = dir.path().join("sources.json");
    write_sources(
        &sources_path,
        &[
            ("late", format!("{}/late", server.url()), true),
            ("early", format!("{}/early", server.url()), true),
        ],
    );

    let coordinator = RunCoordinator::new(test_config(dir.path(), &sources_path))
        .expect("coordinator assembles");
    let (events, _summary) = coordinator.run(None).await.expect("run completes");

    let titles: Vec<_> = events.iter().map(|e| e.title.as_str()).collect();
    assert_eq!(titles, vec!["Alpha Morning Fair", "Zeta Late Show"]);
}

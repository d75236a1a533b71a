#![cfg(unix)]

use axum::body::Body;
use axum::http::{Request, StatusCode};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

use logctl::aggregator::{create_router, AppState, Discovery};
use logctl::control::{platform_transport, serve_log_channel, ControlClient};
use logctl::stats::StatsCollector;
use logctl::{EngineSettings, LogEngine};

fn aggregator_state(base_dir: &Path, own_dir: &Path) -> AppState {
    let settings = EngineSettings {
        log_dir: own_dir.to_path_buf(),
        ..EngineSettings::default()
    };
    AppState::new(
        Discovery::new(base_dir),
        ControlClient::new(platform_transport(), Duration::from_secs(2)),
        LogEngine::new("Aggregator", settings).unwrap(),
        Arc::new(StatsCollector::new("Aggregator").unwrap()),
    )
    .unwrap()
}

#[tokio::test]
async fn test_rotate_fan_out_reports_dead_endpoint() {
    let base = TempDir::new().unwrap();
    let own = TempDir::new().unwrap();

    // Module "a" is live and writes to {base}/a.log
    let engine = LogEngine::new(
        "a",
        EngineSettings {
            log_dir: base.path().to_path_buf(),
            ..EngineSettings::default()
        },
    )
    .unwrap();
    let log_path = engine.open_module_file().unwrap();
    engine.error("", "", "before rotation").await;
    let _channel = serve_log_channel(
        &engine,
        base.path(),
        platform_transport(),
        Duration::from_secs(1),
    )
    .await
    .unwrap();

    // Module "b" left a marker behind but is not running
    std::fs::write(base.path().join("log_b.sock"), b"").unwrap();

    let app = create_router(aggregator_state(base.path(), own.path()), None);
    let response = app
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/logger/all")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"Cmd":"Rotate"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();

    let a_marker = base.path().join("log_a.sock");
    let b_marker = base.path().join("log_b.sock");
    assert!(text.contains(&format!("{} OK\n", a_marker.display())));
    let b_line = text
        .lines()
        .find(|line| line.starts_with(&b_marker.display().to_string()))
        .expect("missing line for b");
    assert!(b_line.contains("dial"));
    assert!(text.ends_with("Failures 1"));

    // a's previous content lives on under the rotated name
    let rotated: Vec<_> = std::fs::read_dir(base.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with("a.log."))
        .collect();
    assert_eq!(rotated.len(), 1);
    let rotated_contents = std::fs::read_to_string(base.path().join(&rotated[0])).unwrap();
    assert!(rotated_contents.contains("before rotation"));
    assert_eq!(std::fs::read_to_string(&log_path).unwrap(), "");
}

#[tokio::test]
async fn test_level_fan_out_all_ok() {
    let base = TempDir::new().unwrap();
    let own = TempDir::new().unwrap();

    let mut channels = Vec::new();
    let mut engines = Vec::new();
    for module in ["one", "two"] {
        let engine = LogEngine::new(
            module,
            EngineSettings {
                log_dir: base.path().to_path_buf(),
                ..EngineSettings::default()
            },
        )
        .unwrap();
        channels.push(
            serve_log_channel(
                &engine,
                base.path(),
                platform_transport(),
                Duration::from_secs(1),
            )
            .await
            .unwrap(),
        );
        engines.push(engine);
    }

    let app = create_router(aggregator_state(base.path(), own.path()), None);
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/logger/all")
                .body(Body::from(r#"{"Cmd":"Level","Message":"debug"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert!(String::from_utf8(body.to_vec()).unwrap().ends_with("All OK"));
    for engine in &engines {
        assert_eq!(engine.level(), logctl::Severity::Debug);
    }
}

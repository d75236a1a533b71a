#![cfg(unix)]

use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

use logctl::control::{platform_transport, serve_log_channel, ControlChannel, ControlClient};
use logctl::{EngineSettings, LogEngine, Severity};

fn engine_in(dir: &Path) -> LogEngine {
    let settings = EngineSettings {
        log_dir: dir.to_path_buf(),
        ..EngineSettings::default()
    };
    LogEngine::new("svc", settings).unwrap()
}

async fn channel_for(engine: &LogEngine, dir: &Path) -> ControlChannel {
    serve_log_channel(engine, dir, platform_transport(), Duration::from_secs(1))
        .await
        .unwrap()
}

fn client() -> ControlClient {
    ControlClient::new(platform_transport(), Duration::from_secs(2))
}

#[tokio::test]
async fn test_level_command_enables_debug_output() {
    let dir = TempDir::new().unwrap();
    let engine = engine_in(dir.path());
    let log_path = engine.open_module_file().unwrap();

    engine.debug("", "", "before level change").await;

    let channel = channel_for(&engine, dir.path()).await;
    assert_eq!(channel.marker(), dir.path().join("log_svc.sock"));

    let reply = client().send(channel.marker(), "level:Debug").await.unwrap();
    assert_eq!(reply, "OK");
    assert_eq!(engine.level(), Severity::Debug);

    engine.debug("", "", "after level change").await;

    let contents = std::fs::read_to_string(&log_path).unwrap();
    assert!(!contents.contains("before level change"));
    assert!(contents.contains("[DEBUG] Default None after level change"));

    channel.shutdown().await;
}

#[tokio::test]
async fn test_filelog_streams_the_active_file() {
    let dir = TempDir::new().unwrap();
    let engine = engine_in(dir.path());
    engine.open_module_file().unwrap();
    engine.error("", "", "first line").await;
    engine.error("", "", "second line").await;

    let channel = channel_for(&engine, dir.path()).await;
    let reply = client().send(channel.marker(), "filelog:").await.unwrap();

    assert!(reply.contains("first line"));
    assert!(reply.contains("second line"));
    assert!(!reply.starts_with("OK"));
}

#[tokio::test]
async fn test_trace_commands_route_messages() {
    let dir = TempDir::new().unwrap();
    let engine = engine_in(dir.path());
    let log_path = engine.open_module_file().unwrap();
    let channel = channel_for(&engine, dir.path()).await;
    let client = client();

    assert_eq!(client.send(channel.marker(), "trace:").await.unwrap(), "OK");
    engine.error("req-1", "", "traced").await;

    assert_eq!(client.send(channel.marker(), "traceoff:").await.unwrap(), "OK");
    engine.error("req-1", "", "untraced").await;

    let trace = std::fs::read_to_string(dir.path().join("trace_req-1.log")).unwrap();
    let main = std::fs::read_to_string(&log_path).unwrap();
    assert!(trace.contains("traced"));
    assert!(!trace.contains("untraced"));
    assert!(main.contains("untraced"));
}

#[tokio::test]
async fn test_errors_are_returned_as_text() {
    let dir = TempDir::new().unwrap();
    let engine = engine_in(dir.path());
    let channel = channel_for(&engine, dir.path()).await;
    let client = client();

    assert_eq!(
        client.send(channel.marker(), "explode:now").await.unwrap(),
        "ERR unknown command: explode"
    );

    let reply = client.send(channel.marker(), "rotate:").await.unwrap();
    assert!(reply.starts_with("ERR "));
    assert!(reply.contains("No log file is active"));

    let reply = client
        .send(channel.marker(), "setpath:/definitely/not/here")
        .await
        .unwrap();
    assert!(reply.starts_with("ERR "));

    let reply = client.send(channel.marker(), "level:loud").await.unwrap();
    assert!(reply.starts_with("ERR invalid argument for level"));
}

#[tokio::test]
async fn test_setpath_moves_the_module_file() {
    let dir = TempDir::new().unwrap();
    let target = TempDir::new().unwrap();
    let engine = engine_in(dir.path());
    engine.open_module_file().unwrap();
    let channel = channel_for(&engine, dir.path()).await;

    let request = format!("setpath:{}", target.path().display());
    assert_eq!(client().send(channel.marker(), &request).await.unwrap(), "OK");

    engine.warn("", "", "in new directory").await;
    let contents = std::fs::read_to_string(target.path().join("svc.log")).unwrap();
    assert!(contents.contains("in new directory"));
}

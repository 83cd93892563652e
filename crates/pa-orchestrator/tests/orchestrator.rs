//! Query, stop and connection behaviour of the session orchestrator

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;

use common::{eventually, Behavior, Harness, Step};
use pa_core::traits::ResponseEvent;
use pa_core::ConfigError;
use pa_orchestrator::discovery::DEFAULT_DESCRIPTION;
use pa_orchestrator::{OrchestratorEvent, SessionOrchestrator, SessionStatus, STOPPING_MESSAGE};

fn record(orchestrator: &SessionOrchestrator) -> Arc<Mutex<Vec<OrchestratorEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    orchestrator.subscribe(move |event| sink.lock().push(event.clone()));
    events
}

fn status_changes(events: &[OrchestratorEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            OrchestratorEvent::StatusChanged(text) => Some(text.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_initialize_discovers_servers() {
    let harness = Harness::new();
    let events = record(&harness.orchestrator);

    assert!(harness.orchestrator.initialize().await);
    assert!(harness.orchestrator.is_ready());
    assert!(harness.orchestrator.has_session());
    assert!(!harness.orchestrator.is_connected());
    assert_eq!(harness.orchestrator.status(), SessionStatus::Disconnected);

    let servers = harness.orchestrator.available_servers();
    let names: Vec<&str> = servers.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["Lights", "Weather"]);
    assert_eq!(servers[0].description, "Controls the lights");
    assert_eq!(servers[1].description, DEFAULT_DESCRIPTION);

    let events = events.lock();
    assert!(events.contains(&OrchestratorEvent::ServersChanged));
    assert!(events.contains(&OrchestratorEvent::ReadyChanged(true)));
}

#[tokio::test]
async fn test_initialize_without_session() {
    let harness = Harness::new();
    harness.control.fail_create.store(true, Ordering::SeqCst);

    assert!(!harness.orchestrator.initialize().await);
    assert!(harness.orchestrator.is_ready());
    assert!(!harness.orchestrator.has_session());
    assert!(harness.orchestrator.status().is_error());
    assert!(harness
        .last_line()
        .starts_with("Error: Session unavailable:"));
}

#[tokio::test]
async fn test_connect_reports_server() {
    let harness = Harness::new();
    harness.orchestrator.initialize().await;
    let events = record(&harness.orchestrator);

    assert!(harness.orchestrator.connect(&harness.server("Lights")).await);
    assert!(harness.orchestrator.is_connected());
    assert_eq!(harness.orchestrator.server_name().as_deref(), Some("Lights"));
    assert_eq!(harness.orchestrator.status_text(), "Connected to Lights");
    assert_eq!(
        harness.lines(),
        vec!["System: Connecting to Lights...", "System: Connected to Lights"]
    );

    let events = events.lock();
    assert_eq!(
        status_changes(&events),
        vec!["Connecting to Lights...", "Connected to Lights"]
    );
    assert!(events.contains(&OrchestratorEvent::ConnectedChanged(true)));
}

#[tokio::test]
async fn test_connect_prefers_reported_server_name() {
    let harness = Harness::new();
    *harness.control.server_name.lock() = Some("Living Room".to_string());
    harness.orchestrator.initialize().await;

    assert!(harness.orchestrator.connect(&harness.server("Lights")).await);
    assert_eq!(harness.orchestrator.status_text(), "Connected to Living Room");
}

#[tokio::test]
async fn test_connect_failure() {
    let harness = Harness::new();
    harness.orchestrator.initialize().await;
    *harness.control.connect.lock() = Behavior::Fail("refused".to_string());

    assert!(!harness.orchestrator.connect(&harness.server("Lights")).await);
    assert!(!harness.orchestrator.is_connected());
    assert_eq!(
        harness.last_line(),
        "Error: Connection failed: Connection lost: refused"
    );
    assert!(harness.orchestrator.status().is_error());
}

#[tokio::test]
async fn test_connect_to_missing_server_file() {
    let harness = Harness::new();
    harness.orchestrator.initialize().await;
    let mut ghost = harness.server("Weather");
    ghost.path = harness.dir.path().join("servers").join("ghost_server.py");

    assert!(!harness.orchestrator.connect(&ghost).await);
    assert_eq!(harness.control.connect_calls.load(Ordering::SeqCst), 0);
    assert!(harness.last_line().starts_with("Error: Connection failed:"));
}

#[tokio::test]
async fn test_streaming_query_accumulates_chunks() {
    let harness = Harness::connected().await;
    let events = record(&harness.orchestrator);

    let orchestrator = harness.orchestrator.clone();
    let query = tokio::spawn(async move { orchestrator.submit_query("turn on").await });

    harness.control.query_started.notified().await;
    harness.control.chunk("Turn");
    harness.control.chunk(" on");
    harness.control.chunk(" done");
    harness.control.complete("");
    query.await.unwrap();

    assert_eq!(harness.last_line(), "Assistant: Turn on done");
    assert_eq!(
        &harness.lines()[2..],
        &["You: turn on", "Assistant: Turn on done"]
    );
    assert_eq!(harness.orchestrator.status(), SessionStatus::Idle);

    let events = events.lock();
    assert_eq!(
        status_changes(&events),
        vec!["Processing query...", "Streaming response...", "Ready"]
    );
    assert_eq!(events.last(), Some(&OrchestratorEvent::ResponseFinished));
}

#[tokio::test]
async fn test_query_is_trimmed() {
    let harness = Harness::connected().await;

    let orchestrator = harness.orchestrator.clone();
    let query = tokio::spawn(async move { orchestrator.submit_query("  turn on \n").await });
    harness.control.query_started.notified().await;
    harness.control.complete("Done");
    query.await.unwrap();

    assert!(harness.lines().contains(&"You: turn on".to_string()));
    assert_eq!(harness.last_line(), "Assistant: Done");
}

#[tokio::test]
async fn test_blank_queries_are_ignored() {
    let harness = Harness::connected().await;
    let before = harness.lines();
    let status = harness.orchestrator.status();
    let events = record(&harness.orchestrator);

    harness.orchestrator.submit_query("").await;
    harness.orchestrator.submit_query("   \t").await;

    assert_eq!(harness.lines(), before);
    assert_eq!(harness.orchestrator.status(), status);
    assert!(events.lock().is_empty());
}

#[tokio::test]
async fn test_query_without_connection() {
    let harness = Harness::new();
    harness.orchestrator.initialize().await;

    harness.orchestrator.submit_query("turn on").await;

    assert_eq!(harness.lines(), vec!["Error: Not connected to a server"]);
    assert_eq!(
        harness.orchestrator.status_text(),
        "Error: Not connected to a server"
    );
}

#[tokio::test]
async fn test_non_streaming_query() {
    let harness = Harness::new();
    harness.control.streaming.store(false, Ordering::SeqCst);
    harness.orchestrator.initialize().await;
    harness.orchestrator.connect(&harness.server("Weather")).await;

    let orchestrator = harness.orchestrator.clone();
    let query = tokio::spawn(async move { orchestrator.submit_query("forecast?").await });
    harness.control.query_started.notified().await;
    harness.control.chunk("ignored");
    harness.control.complete("It is sunny");
    query.await.unwrap();

    assert_eq!(
        &harness.lines()[2..],
        &["You: forecast?", "Assistant: It is sunny"]
    );
    assert_eq!(harness.orchestrator.status(), SessionStatus::Idle);
}

#[tokio::test]
async fn test_complete_text_fills_untouched_placeholder() {
    let harness = Harness::connected().await;

    let orchestrator = harness.orchestrator.clone();
    let query = tokio::spawn(async move { orchestrator.submit_query("status").await });
    harness.control.query_started.notified().await;
    harness.control.complete("All lights off");
    query.await.unwrap();

    assert_eq!(harness.last_line(), "Assistant: All lights off");
}

#[tokio::test]
async fn test_failed_query_drops_empty_placeholder() {
    let harness = Harness::connected().await;

    let orchestrator = harness.orchestrator.clone();
    let query = tokio::spawn(async move { orchestrator.submit_query("turn on").await });
    harness.control.query_started.notified().await;
    harness
        .control
        .step(Step::Fail("model offline".to_string()));
    query.await.unwrap();

    let lines = harness.lines();
    assert!(!lines.iter().any(|line| line.starts_with("Assistant:")));
    assert_eq!(
        harness.last_line(),
        "Error: Error processing query: Server error: model offline"
    );
    assert!(harness.orchestrator.status().is_error());
}

#[tokio::test]
async fn test_stop_immediately_after_submission() {
    let harness = Harness::connected().await;

    let orchestrator = harness.orchestrator.clone();
    let query = tokio::spawn(async move { orchestrator.submit_query("turn on").await });
    harness.control.query_started.notified().await;

    let stop = harness.orchestrator.stop_response();
    let frozen = harness.lines();
    assert_eq!(frozen.last().map(String::as_str), Some("System: Stopping response..."));
    assert!(!frozen.iter().any(|line| line.starts_with("Assistant:")));
    assert_eq!(harness.orchestrator.status(), SessionStatus::Idle);

    harness.control.chunk("Turn");
    harness.control.chunk(" on");
    harness.control.complete("Turn on");
    query.await.unwrap();
    stop.await.unwrap();
    harness
        .control
        .deliver_late(ResponseEvent::Chunk(" late".to_string()));

    let mut expected = frozen;
    expected.push("System: Response stopped".to_string());
    assert_eq!(harness.lines(), expected);
    assert_eq!(harness.orchestrator.status(), SessionStatus::Idle);
    assert_eq!(harness.control.stop_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_stop_silences_every_query_in_flight() {
    let harness = Harness::connected().await;

    let orchestrator = harness.orchestrator.clone();
    let first = tokio::spawn(async move { orchestrator.submit_query("turn on").await });
    harness.control.query_started.notified().await;
    harness.control.chunk("A");
    eventually(|| harness.last_line() == "Assistant: A").await;

    let orchestrator = harness.orchestrator.clone();
    let second = tokio::spawn(async move { orchestrator.submit_query("second").await });
    eventually(|| harness.control.queries_seen() == 2).await;

    harness.orchestrator.stop_response().await.unwrap();
    let frozen = harness.lines();
    assert!(frozen.contains(&"Assistant: A".to_string()));
    assert!(frozen.contains(&"You: second".to_string()));
    assert_eq!(frozen.last().map(String::as_str), Some("System: Response stopped"));

    harness
        .control
        .deliver_to(0, ResponseEvent::Chunk("LEAK".to_string()));
    harness
        .control
        .deliver_to(1, ResponseEvent::Chunk("LEAK".to_string()));
    assert_eq!(harness.lines(), frozen);

    // Let both session calls return
    harness.control.complete("done");
    first.await.unwrap();
    harness.control.complete("done");
    second.await.unwrap();

    assert_eq!(harness.lines(), frozen);
    assert_eq!(harness.orchestrator.status(), SessionStatus::Idle);
}

#[tokio::test]
async fn test_stop_mid_stream_freezes_log() {
    let harness = Harness::connected().await;

    let orchestrator = harness.orchestrator.clone();
    let query = tokio::spawn(async move { orchestrator.submit_query("turn on").await });
    harness.control.query_started.notified().await;
    harness.control.chunk("Turn");
    eventually(|| harness.last_line() == "Assistant: Turn").await;

    let stop = harness.orchestrator.stop_response();
    let frozen = harness.lines();
    assert_eq!(
        &frozen[frozen.len() - 2..],
        &["Assistant: Turn", STOPPING_MESSAGE_LINE]
    );

    harness.control.chunk(" on");
    harness.control.chunk(" done");
    harness.control.complete("");
    query.await.unwrap();
    stop.await.unwrap();

    let lines = harness.lines();
    assert_eq!(&lines[..frozen.len()], frozen.as_slice());
    assert_eq!(lines[frozen.len()..], ["System: Response stopped"]);
}

const STOPPING_MESSAGE_LINE: &str = "System: Stopping response...";

#[test]
fn test_stopping_message_text() {
    assert_eq!(format!("System: {}", STOPPING_MESSAGE), STOPPING_MESSAGE_LINE);
}

#[tokio::test]
async fn test_next_query_after_stop_streams_again() {
    let harness = Harness::connected().await;

    let orchestrator = harness.orchestrator.clone();
    let first = tokio::spawn(async move { orchestrator.submit_query("first").await });
    harness.control.query_started.notified().await;
    harness.orchestrator.stop_response().await.unwrap();
    harness.control.complete("");
    first.await.unwrap();

    let orchestrator = harness.orchestrator.clone();
    let second = tokio::spawn(async move { orchestrator.submit_query("second").await });
    harness.control.query_started.notified().await;
    harness.control.chunk("Hello");
    harness.control.complete("");
    second.await.unwrap();

    assert_eq!(harness.last_line(), "Assistant: Hello");
    assert_eq!(harness.orchestrator.status(), SessionStatus::Idle);
}

#[tokio::test]
async fn test_clear_conversation() {
    let harness = Harness::connected().await;
    let events = record(&harness.orchestrator);

    harness.orchestrator.clear_conversation();

    assert!(harness.orchestrator.conversation().is_empty());
    assert!(harness.orchestrator.is_connected());
    assert_eq!(*events.lock(), vec![OrchestratorEvent::ConversationChanged]);
}

#[tokio::test]
async fn test_unknown_config_key_is_rejected_and_not_persisted() {
    let harness = Harness::new();

    let err = harness
        .orchestrator
        .set_config_value("display", "colour", toml::Value::String("red".into()))
        .unwrap_err();
    assert!(matches!(err, ConfigError::UnknownKey { .. }));

    harness
        .orchestrator
        .set_config_value("display", "dark_mode", toml::Value::Boolean(true))
        .unwrap();
    harness.orchestrator.save_config().unwrap();

    let saved = std::fs::read_to_string(harness.config_path()).unwrap();
    assert!(!saved.contains("colour"));
    assert!(saved.contains("dark_mode = true"));
    assert_eq!(
        harness.orchestrator.config_value("display", "dark_mode"),
        Some(toml::Value::Boolean(true))
    );
    assert_eq!(harness.orchestrator.config_path(), harness.config_path());
}

#[tokio::test]
async fn test_config_write_does_not_touch_running_session() {
    let harness = Harness::connected().await;

    harness
        .orchestrator
        .set_config_value("llm", "streaming", toml::Value::Boolean(false))
        .unwrap();

    assert!(harness.orchestrator.config().llm.streaming);
    assert_eq!(harness.control.created.load(Ordering::SeqCst), 1);
    assert!(harness.orchestrator.is_connected());
}

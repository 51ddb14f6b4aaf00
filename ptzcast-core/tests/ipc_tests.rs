//! Integration tests for the IPC protocol and the daemon socket

mod mocks;

use mocks::{FakeCamera, RecordingArbiter, ScriptSpawner};
use ptzcast_core::config::{ConfigFile, Encoder, Protocol, StreamConfigPatch};
use ptzcast_core::controls::UNITS_PER_DEGREE;
use ptzcast_core::error::PtzError;
use ptzcast_core::ipc::{DaemonEvent, IpcClient, IpcMessage, IpcResponse, IpcServer};
use ptzcast_core::{ControlResult, Daemon, StreamEvent};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_message_ping_serialization() {
    let bytes = IpcMessage::Ping.to_bytes();
    assert_eq!(bytes.last(), Some(&b'\n'));
    let parsed = IpcMessage::from_bytes(&bytes[..bytes.len() - 1]).expect("Should parse");
    assert_eq!(parsed, IpcMessage::Ping);
}

#[test]
fn test_message_set_control_wire_format() {
    let msg = IpcMessage::SetControl {
        control: "brightness".into(),
        value: 70,
    };
    let json = String::from_utf8(msg.to_bytes()).unwrap();
    assert_eq!(
        json.trim(),
        r#"{"type":"SetControl","control":"brightness","value":70}"#
    );
}

#[test]
fn test_message_start_stream_with_patch() {
    let parsed = IpcMessage::from_bytes(
        br#"{"type":"StartStream","config":{"protocol":"rtmp","bitrate":2500000}}"#,
    )
    .unwrap();
    match parsed {
        IpcMessage::StartStream { config } => {
            assert_eq!(config.protocol, Some(Protocol::Rtmp));
            assert_eq!(config.bitrate, Some(2_500_000));
        }
        other => panic!("Expected StartStream, got {:?}", other),
    }
}

#[test]
fn test_response_error_serialization() {
    let resp = IpcResponse::error("Stream already running");
    let bytes = resp.to_bytes();
    let parsed = IpcResponse::from_bytes(&bytes[..bytes.len() - 1]).expect("Should parse");
    match parsed {
        IpcResponse::Error { message } => assert_eq!(message, "Stream already running"),
        _ => panic!("Expected Error response"),
    }
}

#[test]
fn test_response_control_serialization() {
    let resp = IpcResponse::Control(ControlResult {
        control: "zoom_absolute".into(),
        success: true,
        value: Some(4),
        error: None,
        message: None,
    });
    let json = String::from_utf8(resp.to_bytes()).unwrap();
    assert!(json.contains(r#""type":"Control""#));
    assert!(!json.contains("error"));

    let parsed = IpcResponse::from_bytes(json.trim().as_bytes()).unwrap();
    assert_eq!(parsed, resp);
}

#[test]
fn test_response_event_serialization() {
    let resp = IpcResponse::Event {
        event: DaemonEvent::Stream(StreamEvent::Started { pid: 4242 }),
    };
    let json = String::from_utf8(resp.to_bytes()).unwrap();
    assert_eq!(
        json.trim(),
        r#"{"type":"Event","event":{"stream":{"event":"started","pid":4242}}}"#
    );
}

#[test]
fn test_invalid_message_deserialization() {
    assert!(IpcMessage::from_bytes(b"not valid json").is_err());
    assert!(IpcMessage::from_bytes(br#"{"type":"Launch"}"#).is_err());
}

struct TestDaemon {
    dir: TempDir,
    socket: PathBuf,
    camera: Arc<FakeCamera>,
    spawner: Arc<ScriptSpawner>,
}

impl TestDaemon {
    async fn start() -> Self {
        let dir = TempDir::new().unwrap();
        let socket = dir.path().join("ptzcast.sock");
        let camera = FakeCamera::new();
        let spawner = ScriptSpawner::long_running();

        let mut config = ConfigFile::default();
        config.state.dir = dir.path().join("state");
        config.stream.startup_probe_ms = 200;

        let daemon = Daemon::with_parts(
            config,
            camera.clone(),
            RecordingArbiter::new(),
            spawner.clone(),
        );
        let mut server = IpcServer::with_path(daemon.services().clone(), &socket);
        server.start().await.unwrap();
        let supervisor = daemon.services().supervisor.clone();
        tokio::spawn(async move {
            while server.accept_one().await.unwrap() {}
            supervisor.shutdown().await;
        });

        Self {
            dir,
            socket,
            camera,
            spawner,
        }
    }

    async fn client(&self) -> IpcClient {
        IpcClient::connect_to(&self.socket, Duration::from_secs(2))
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn test_connect_without_daemon() {
    let dir = TempDir::new().unwrap();
    let err = IpcClient::connect_to(&dir.path().join("none.sock"), Duration::from_millis(100))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, PtzError::Ipc(_)));
}

#[tokio::test]
async fn test_ping_and_controls_over_socket() {
    let daemon = TestDaemon::start().await;
    let mut client = daemon.client().await;

    assert!(client.ping().await.unwrap());

    let result = client.set_control("brightness", 70).await.unwrap();
    assert!(result.success);
    assert_eq!(daemon.camera.value("brightness"), Some(70));

    let config = client.camera_config().await.unwrap();
    assert_eq!(config["brightness"], 70);
    assert!(daemon.dir.path().join("state").join("camera-config.json").exists());

    let result = client.get_control("brightness").await.unwrap();
    assert_eq!(result.value, Some(70));

    let result = client.set_control("brightness", 500).await.unwrap();
    assert!(!result.success);
    assert!(result.error.unwrap().contains("out of range"));

    let result = client.pan(10.0).await.unwrap();
    assert!(result.success);
    assert_eq!(daemon.camera.value("pan_absolute"), Some(10 * UNITS_PER_DEGREE));
}

#[tokio::test]
async fn test_stream_lifecycle_over_socket() {
    let daemon = TestDaemon::start().await;
    let mut client = daemon.client().await;

    let err = client
        .start_stream(StreamConfigPatch::default())
        .await
        .unwrap_err();
    assert!(matches!(err, PtzError::Remote(ref m) if m.contains("No destination")));

    let status = client
        .start_stream(StreamConfigPatch {
            protocol: Some(Protocol::Rtmp),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(status.is_streaming);
    assert_eq!(daemon.spawner.spawn_count(), 1);

    let err = client
        .start_stream(StreamConfigPatch::default())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Stream already running");

    client.stop_stream().await.unwrap();

    let mut waited = 0;
    while client.status().await.unwrap().pid.is_some() {
        assert!(waited < 50, "stream did not stop");
        tokio::time::sleep(Duration::from_millis(100)).await;
        waited += 1;
    }
    assert!(!client.status().await.unwrap().config.auto_start);
}

#[tokio::test]
async fn test_subscribers_receive_events() {
    let daemon = TestDaemon::start().await;
    let mut events = daemon.client().await.subscribe().await.unwrap();
    let mut client = daemon.client().await;

    client.zoom(3).await.unwrap();
    let event = tokio::time::timeout(Duration::from_secs(5), events.next_event())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    match event {
        DaemonEvent::Control(result) => {
            assert_eq!(result.control, "zoom_absolute");
            assert_eq!(result.value, Some(3));
        }
        other => panic!("Expected control event, got {:?}", other),
    }

    client.shutdown().await.unwrap();
    let end = tokio::time::timeout(Duration::from_secs(5), events.next_event())
        .await
        .unwrap()
        .unwrap();
    assert!(end.is_none());
}

#[tokio::test]
async fn test_detect_encoder_over_socket() {
    let daemon = TestDaemon::start().await;
    let mut client = daemon.client().await;

    let probe = client.detect_encoder().await.unwrap();
    assert!(probe.success);
    assert_eq!(probe.encoder, Some(Encoder::Nvv4l2h264enc));
    assert!(daemon.camera.calls().contains(&vec!["nvv4l2h264enc".to_string()]));
}

#[tokio::test]
async fn test_daemon_answers_while_camera_settles() {
    let dir = TempDir::new().unwrap();
    let socket = dir.path().join("ptzcast.sock");
    let camera = FakeCamera::new();

    let mut config = ConfigFile::default();
    config.state.dir = dir.path().join("state");
    config.preview.port = None;

    let daemon = Daemon::with_parts(
        config,
        camera.clone(),
        RecordingArbiter::new(),
        ScriptSpawner::long_running(),
    )
    .with_socket(&socket);
    let run = tokio::spawn(daemon.run());

    for _ in 0..100 {
        if socket.exists() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let mut client = IpcClient::connect_to(&socket, Duration::from_secs(2))
        .await
        .unwrap();
    assert!(client.ping().await.unwrap());
    // Activation is still waiting for the device, so nothing was restored yet
    assert!(camera.set_names().is_empty());

    client.shutdown().await.unwrap();
    tokio::time::timeout(Duration::from_secs(10), run)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(!socket.exists());
}

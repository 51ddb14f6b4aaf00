//! Integration tests for resource eviction

mod mocks;

use mocks::{CannedRunner, RecordingSignaller, StaticStrategy};
use ptzcast_core::config::ReaperSettings;
use ptzcast_core::exec::CommandOutput;
use ptzcast_core::reaper::{ProcessReaper, ResourceArbiter, ResourceId};
use std::path::PathBuf;
use std::time::Duration;

fn device() -> ResourceId {
    ResourceId::Device(PathBuf::from("/dev/video0"))
}

#[tokio::test]
async fn test_first_successful_strategy_wins() {
    let signaller = RecordingSignaller::new();
    let reaper = ProcessReaper::new(signaller.clone(), Duration::ZERO)
        .with_strategy(StaticStrategy::fails("broken"))
        .with_strategy(StaticStrategy::finds("empty", vec![]))
        .with_strategy(StaticStrategy::finds("second", vec![300, 100, 300]))
        .with_strategy(StaticStrategy::finds("never", vec![999]));

    let report = reaper.free(&device()).await;
    assert_eq!(report.strategy, Some("second"));
    assert_eq!(report.discovered, vec![100, 300]);
    assert_eq!(*signaller.terminated.lock(), vec![100, 300]);
    assert!(signaller.killed.lock().is_empty());
}

#[tokio::test]
async fn test_stubborn_holder_is_killed_after_grace() {
    let signaller = RecordingSignaller::new();
    signaller.ignore_term(42);
    let reaper = ProcessReaper::new(signaller.clone(), Duration::from_millis(20))
        .with_strategy(StaticStrategy::finds("fixed", vec![41, 42]));

    let report = reaper.free(&ResourceId::Port(8081)).await;
    assert_eq!(report.terminated, vec![41, 42]);
    assert_eq!(report.forced, vec![42]);
    assert_eq!(*signaller.killed.lock(), vec![42]);
}

#[tokio::test]
async fn test_own_pid_is_never_signalled() {
    let own = std::process::id();
    let signaller = RecordingSignaller::new();
    let reaper = ProcessReaper::new(signaller.clone(), Duration::ZERO)
        .with_strategy(StaticStrategy::finds("self", vec![own]))
        .with_strategy(StaticStrategy::finds("other", vec![7]));

    let report = reaper.free(&device()).await;
    assert_eq!(report.strategy, Some("other"));
    assert!(!signaller.terminated.lock().contains(&own));
}

#[tokio::test]
async fn test_nothing_found_is_not_an_error() {
    let signaller = RecordingSignaller::new();
    let strategy = StaticStrategy::fails("missing");
    let reaper = ProcessReaper::new(signaller.clone(), Duration::ZERO).with_strategy(strategy);

    let report = reaper.free(&device()).await;
    assert_eq!(report.strategy, None);
    assert!(report.discovered.is_empty());
    assert!(signaller.terminated.lock().is_empty());
}

#[tokio::test]
async fn test_system_chain_falls_through_to_process_scan() {
    let runner = CannedRunner::new();
    // fuser finds nothing and exits 1
    runner.respond(
        "fuser",
        CommandOutput {
            code: Some(1),
            ..Default::default()
        },
    );
    runner.respond(
        "ps",
        CommandOutput::ok("  77 ffmpeg -f v4l2 -i /dev/video0 -listen 1 http://0.0.0.0:8081\n"),
    );

    let settings = ReaperSettings {
        grace_ms: 0,
        consumers: vec!["ffmpeg".to_string()],
    };
    let signaller = RecordingSignaller::new();
    let reaper = ProcessReaper::system(runner.clone(), &settings).with_signaller(signaller.clone());
    assert_eq!(
        reaper.strategy_names(),
        vec!["fuser", "process-scan", "socket-list"]
    );

    let report = reaper.free(&device()).await;
    assert_eq!(report.strategy, Some("process-scan"));
    assert_eq!(report.discovered, vec![77]);
    assert_eq!(*signaller.terminated.lock(), vec![77]);

    let calls = runner.calls();
    assert_eq!(calls[0], ("fuser".to_string(), vec!["/dev/video0".to_string()]));
    assert_eq!(calls[1].0, "ps");
}

#[tokio::test]
async fn test_port_discovery_uses_tcp_namespace() {
    let runner = CannedRunner::new();
    runner.respond("fuser", CommandOutput::ok(""));
    runner.respond("ps", CommandOutput::ok(""));
    runner.respond(
        "ss",
        CommandOutput::ok("LISTEN 0 5 0.0.0.0:8081 0.0.0.0:* users:((\"ffmpeg\",pid=31337,fd=3))\n"),
    );
    let settings = ReaperSettings {
        grace_ms: 0,
        consumers: vec![],
    };
    let reaper = ProcessReaper::system(runner.clone(), &settings)
        .with_signaller(RecordingSignaller::new());

    let report = reaper.free(&ResourceId::Port(8081)).await;
    assert_eq!(report.strategy, Some("socket-list"));
    assert_eq!(report.discovered, vec![31337]);
    assert_eq!(
        runner.calls()[0].1,
        vec!["-n".to_string(), "tcp".to_string(), "8081".to_string()]
    );
}

#[tokio::test]
async fn test_free_camera_leaves_unrelated_consumers_alone() {
    let runner = CannedRunner::new();
    runner.respond(
        "fuser",
        CommandOutput {
            code: Some(1),
            ..Default::default()
        },
    );
    runner.respond(
        "ps",
        CommandOutput::ok(
            "  303 /usr/bin/ffmpeg -i input.mp4 out.mkv\n  304 ffmpeg -f v4l2 -i /dev/video2 x.mkv\n",
        ),
    );
    runner.respond("ss", CommandOutput::ok(""));

    let settings = ReaperSettings {
        grace_ms: 0,
        consumers: vec!["ffmpeg".to_string()],
    };
    let signaller = RecordingSignaller::new();
    let reaper = ProcessReaper::system(runner.clone(), &settings).with_signaller(signaller.clone());

    let report = reaper.free(&device()).await;
    assert!(report.discovered.is_empty());
    assert!(signaller.terminated.lock().is_empty());
    assert!(signaller.killed.lock().is_empty());
}

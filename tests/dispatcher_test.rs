//! End-to-end tool calls through the dispatcher against fake media tools.

#![cfg(unix)]

mod common;

use std::fs;
use std::time::Duration;

use assert_matches::assert_matches;
use serde_json::json;
use serial_test::serial;
use tokio_util::sync::CancellationToken;
use vr_core::{Error, ProgressSender};

use common::*;

#[tokio::test]
#[serial]
async fn import_then_trim_runs_stream_copy() {
    let harness = TestHarness::new(RECORD_ARGS);
    let input = harness.add_input("clip.mp4");
    let dispatcher = harness.dispatcher();
    let cancel = CancellationToken::new();

    let reply = dispatcher
        .dispatch(
            &request("import", json!({"path": "input/clip.mp4"})),
            &ProgressSender::noop(),
            &cancel,
        )
        .await
        .unwrap();
    assert_eq!(reply.joined_text(), "Successfully imported video: clip.mp4");

    let (progress, mut rx) = progress_channel();
    let reply = dispatcher
        .dispatch(
            &request(
                "trim",
                json!({"timestamp_start": "00:00:01", "timestamp_end": "00:00:05"}),
            ),
            &progress,
            &cancel,
        )
        .await
        .unwrap();

    let args = harness.recorded_args().expect("ffmpeg was not run");
    let canonical_input = fs::canonicalize(&input).unwrap();
    assert_eq!(args.len(), 9, "unexpected argv: {args:?}");
    assert_eq!(args[0], "-i");
    assert_eq!(args[1], canonical_input.to_string_lossy());
    assert_eq!(&args[2..8], ["-ss", "00:00:01", "-to", "00:00:05", "-c", "copy"]);

    let output = std::path::Path::new(&args[8]);
    assert_eq!(output.parent().unwrap(), harness.output_dir());
    let name = output.file_name().unwrap().to_string_lossy();
    assert!(name.starts_with("trim_") && name.ends_with(".mp4"), "{name}");
    assert!(output.exists());

    assert!(reply.joined_text().starts_with("Success: trimmed clip written to"));
    assert!(reply.joined_text().contains(&*name));

    let events = drain(&mut rx);
    let last = events.last().unwrap();
    assert_eq!(last.percent, 100);
    assert!(!last.error);
}

#[tokio::test]
#[serial]
async fn trim_before_import_never_spawns() {
    let harness = TestHarness::new(RECORD_ARGS);
    let dispatcher = harness.dispatcher();

    let result = dispatcher
        .dispatch(
            &request(
                "trim",
                json!({"timestamp_start": "00:00:01", "timestamp_end": "00:00:05"}),
            ),
            &ProgressSender::noop(),
            &CancellationToken::new(),
        )
        .await;

    assert_matches!(result, Err(Error::InvalidInput(msg)) if msg == "No video imported");
    assert!(harness.recorded_args().is_none());
}

#[tokio::test]
#[serial]
async fn bad_trim_arguments_are_rejected_before_spawning() {
    let harness = TestHarness::new(RECORD_ARGS);
    harness.add_input("clip.mp4");
    let dispatcher = harness.dispatcher();
    let cancel = CancellationToken::new();
    let noop = ProgressSender::noop();

    dispatcher
        .dispatch(&request("import", json!({"path": "input/clip.mp4"})), &noop, &cancel)
        .await
        .unwrap();

    for args in [
        json!({"timestamp_start": "00:00:01"}),
        json!({"timestamp_start": "1:2:3", "timestamp_end": "00:00:05"}),
        json!({"timestamp_start": "00:00:05", "timestamp_end": "00:00:01"}),
        json!({"timestamp_start": "00:00:05", "timestamp_end": "00:00:05"}),
        json!({"timestamp_start": 1, "timestamp_end": "00:00:05"}),
    ] {
        let result = dispatcher.dispatch(&request("trim", args.clone()), &noop, &cancel).await;
        assert_matches!(result, Err(Error::InvalidInput(_)), "accepted {args}");
    }
    assert!(harness.recorded_args().is_none());
}

#[tokio::test]
#[serial]
async fn import_rejections() {
    let harness = TestHarness::new(RECORD_ARGS);
    let dispatcher = harness.dispatcher();
    let cancel = CancellationToken::new();
    let noop = ProgressSender::noop();

    fs::write(harness.output_dir().join("elsewhere.mp4"), b"x").unwrap();
    harness.add_input("notes.txt");

    let outside = dispatcher
        .dispatch(&request("import", json!({"path": "output/elsewhere.mp4"})), &noop, &cancel)
        .await;
    assert_matches!(outside, Err(Error::Security(_)));

    let traversal = dispatcher
        .dispatch(
            &request("import", json!({"path": "input/../output/elsewhere.mp4"})),
            &noop,
            &cancel,
        )
        .await;
    assert_matches!(traversal, Err(Error::Security(_)));

    let missing = dispatcher
        .dispatch(&request("import", json!({"path": "input/missing.mp4"})), &noop, &cancel)
        .await;
    assert_matches!(missing, Err(Error::InvalidInput(_)));

    let wrong_type = dispatcher
        .dispatch(&request("import", json!({"path": "input/notes.txt"})), &noop, &cancel)
        .await;
    assert_matches!(wrong_type, Err(Error::InvalidInput(_)));

    let no_path = dispatcher.dispatch(&request("import", json!({})), &noop, &cancel).await;
    assert_matches!(no_path, Err(Error::InvalidInput(msg)) if msg.contains("path"));

    assert!(dispatcher.session().snapshot().await.is_none());
}

#[tokio::test]
#[serial]
async fn export_sanitizes_traversal_in_file_name() {
    let harness = TestHarness::new(RECORD_ARGS);
    harness.add_input("clip.mp4");
    let dispatcher = harness.dispatcher();
    let cancel = CancellationToken::new();
    let noop = ProgressSender::noop();

    dispatcher
        .dispatch(&request("import", json!({"path": "input/clip.mp4"})), &noop, &cancel)
        .await
        .unwrap();

    let reply = dispatcher
        .dispatch(
            &request("export", json!({"file_name": "../../etc/passwd.mp4"})),
            &noop,
            &cancel,
        )
        .await
        .unwrap();

    let expected = harness.output_dir().join("passwd.mp4");
    let args = harness.recorded_args().unwrap();
    assert_eq!(args.last().unwrap(), &expected.to_string_lossy());
    assert!(expected.exists());
    assert!(reply.joined_text().contains("passwd.mp4"));
}

#[tokio::test]
#[serial]
async fn export_without_extension_forces_source_muxer() {
    let harness = TestHarness::new(RECORD_ARGS);
    harness.add_input("clip.mkv");
    let dispatcher = harness.dispatcher();
    let cancel = CancellationToken::new();
    let noop = ProgressSender::noop();

    dispatcher
        .dispatch(&request("import", json!({"path": "input/clip.mkv"})), &noop, &cancel)
        .await
        .unwrap();
    dispatcher
        .dispatch(&request("export", json!({"file_name": "final"})), &noop, &cancel)
        .await
        .unwrap();

    let args = harness.recorded_args().unwrap();
    let n = args.len();
    assert_eq!(&args[n - 3..n - 1], ["-f", "matroska"]);
}

#[tokio::test]
#[serial]
async fn export_path_must_stay_in_output_dir() {
    let harness = TestHarness::new(RECORD_ARGS);
    harness.add_input("clip.mp4");
    fs::create_dir(harness.output_dir().join("finals")).unwrap();
    let dispatcher = harness.dispatcher();
    let cancel = CancellationToken::new();
    let noop = ProgressSender::noop();

    dispatcher
        .dispatch(&request("import", json!({"path": "input/clip.mp4"})), &noop, &cancel)
        .await
        .unwrap();

    let escaped = dispatcher
        .dispatch(
            &request("export", json!({"file_name": "out.mp4", "path": "../input"})),
            &noop,
            &cancel,
        )
        .await;
    assert_matches!(escaped, Err(Error::Security(_)));
    assert!(harness.recorded_args().is_none());

    dispatcher
        .dispatch(
            &request("export", json!({"file_name": "out.mp4", "path": "finals"})),
            &noop,
            &cancel,
        )
        .await
        .unwrap();
    assert!(harness.output_dir().join("finals/out.mp4").exists());
}

#[tokio::test]
#[serial]
async fn failing_tool_reports_diagnostics() {
    let harness = TestHarness::new(FAIL_WITH_DIAGNOSTICS);
    harness.add_input("clip.mp4");
    let dispatcher = harness.dispatcher();
    let cancel = CancellationToken::new();

    dispatcher
        .dispatch(
            &request("import", json!({"path": "input/clip.mp4"})),
            &ProgressSender::noop(),
            &cancel,
        )
        .await
        .unwrap();

    let (progress, mut rx) = progress_channel();
    let result = dispatcher
        .dispatch(&request("export", json!({"file_name": "out.mp4"})), &progress, &cancel)
        .await;

    assert_matches!(
        result,
        Err(Error::Process { ref diagnostics, .. }) if diagnostics.contains("Invalid data found")
    );

    let events = drain(&mut rx);
    let last = events.last().unwrap();
    assert!(last.error);
    assert!(last.message.contains("Invalid data found"));
    assert!(events.windows(2).all(|w| w[0].percent <= w[1].percent));
}

#[tokio::test]
#[serial]
async fn progress_is_reported_while_running() {
    let harness = TestHarness::new(EMIT_PROGRESS);
    harness.add_input("clip.mp4");
    let dispatcher = harness.dispatcher();
    let cancel = CancellationToken::new();

    dispatcher
        .dispatch(
            &request("import", json!({"path": "input/clip.mp4"})),
            &ProgressSender::noop(),
            &cancel,
        )
        .await
        .unwrap();

    let (progress, mut rx) = progress_channel();
    let reply = dispatcher
        .dispatch(&request("preview", json!({})), &progress, &cancel)
        .await
        .unwrap();
    assert_eq!(reply.joined_text(), "Preview finished");

    let percents: Vec<u8> = drain(&mut rx).iter().map(|e| e.percent).collect();
    assert_eq!(percents, vec![1, 2, 3, 100]);
}

#[tokio::test]
#[serial]
async fn cancellation_kills_running_tool() {
    let harness = TestHarness::new(HANG_RECORDING_PID);
    harness.add_input("clip.mp4");
    let dispatcher = std::sync::Arc::new(harness.dispatcher());
    let noop = ProgressSender::noop();

    dispatcher
        .dispatch(
            &request("import", json!({"path": "input/clip.mp4"})),
            &noop,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    let task = {
        let dispatcher = dispatcher.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            dispatcher
                .dispatch(
                    &request("export", json!({"file_name": "out.mp4"})),
                    &ProgressSender::noop(),
                    &cancel,
                )
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(200)).await;
    cancel.cancel();

    let result = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("cancelled run did not finish")
        .unwrap();
    assert_matches!(result, Err(Error::Cancelled(_)));

    let pid = harness.recorded_pid().expect("tool never started");
    assert!(!process_alive(pid), "tool process {pid} survived cancellation");

    // The session lock was released.
    let reply = dispatcher
        .dispatch(
            &request("import", json!({"path": "input/clip.mp4"})),
            &noop,
            &CancellationToken::new(),
        )
        .await;
    assert!(reply.is_ok());
}

#[tokio::test]
#[serial]
async fn timeout_kills_running_tool() {
    let harness = TestHarness::with_timeout(HANG_RECORDING_PID, Duration::from_secs(1));
    harness.add_input("clip.mp4");
    let dispatcher = harness.dispatcher();
    let cancel = CancellationToken::new();
    let noop = ProgressSender::noop();

    dispatcher
        .dispatch(&request("import", json!({"path": "input/clip.mp4"})), &noop, &cancel)
        .await
        .unwrap();

    let result = tokio::time::timeout(
        Duration::from_secs(10),
        dispatcher.dispatch(&request("preview", json!({})), &noop, &cancel),
    )
    .await
    .expect("timed out run did not finish");
    assert_matches!(result, Err(Error::Timeout { .. }));

    let pid = harness.recorded_pid().expect("tool never started");
    assert!(!process_alive(pid), "tool process {pid} survived the timeout");
}

#[tokio::test]
async fn export_before_import_reports_missing_video_before_checking_path() {
    let harness = TestHarness::new(RECORD_ARGS);
    let result = harness
        .dispatcher()
        .dispatch(
            &request("export", json!({"file_name": "out.mp4", "path": "../input"})),
            &ProgressSender::noop(),
            &CancellationToken::new(),
        )
        .await;
    assert_matches!(result, Err(Error::InvalidInput(msg)) if msg.contains("No video imported"));
    assert!(harness.recorded_args().is_none());
}

#[tokio::test]
async fn unknown_tool_is_invalid_input() {
    let harness = TestHarness::new(RECORD_ARGS);
    let result = harness
        .dispatcher()
        .dispatch(
            &request("speed", json!({"factor": 2})),
            &ProgressSender::noop(),
            &CancellationToken::new(),
        )
        .await;
    assert_matches!(result, Err(Error::InvalidInput(msg)) if msg.contains("speed"));
}

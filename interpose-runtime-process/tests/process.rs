//! Subprocess runtime tests. Modules are small `/bin/sh` scripts.

#![cfg(unix)]

use interpose_runtime_process::{ProcessRuntime, WasiRuntime};
use interpose_types::{CallContext, Completion, ModuleRuntime, ResourceLimits, RuntimeError};
use std::os::unix::fs::PermissionsExt;
use std::time::{Duration, Instant};

fn sh(script: &str) -> ProcessRuntime {
    ProcessRuntime::new("/bin/sh").arg("-c").arg(script)
}

fn ctx() -> CallContext {
    CallContext::new(ResourceLimits::default())
}

#[tokio::test]
async fn stdin_reaches_the_module_and_stdout_comes_back() {
    let rt = sh("cat");
    let out = rt.call(br#"{"payload":1}"#.to_vec(), &ctx()).await.unwrap();
    assert_eq!(out.completion, Completion::Success);
    assert_eq!(out.stdout, br#"{"payload":1}"#);
}

#[tokio::test]
async fn empty_output_is_success() {
    let out = sh("cat >/dev/null").call(b"{}".to_vec(), &ctx()).await.unwrap();
    assert_eq!(out.completion, Completion::Success);
    assert!(out.stdout.is_empty());
}

#[tokio::test]
async fn module_that_ignores_stdin_still_completes() {
    let input = vec![b'x'; 1 << 20];
    let out = sh("printf ok").call(input, &ctx()).await.unwrap();
    assert_eq!(out.stdout, b"ok");
}

#[tokio::test]
async fn nonzero_exit_is_abnormal_with_stderr() {
    let out = sh("echo 'bad input' >&2; printf '{\"payload\":1}'; exit 3")
        .call(b"{}".to_vec(), &ctx())
        .await
        .unwrap();
    assert_eq!(
        out.completion,
        Completion::Abnormal {
            diagnostic: "bad input".into()
        }
    );
    assert_eq!(out.stdout, br#"{"payload":1}"#);
}

#[tokio::test]
async fn nonzero_exit_without_stderr_reports_status() {
    let out = sh("exit 7").call(Vec::new(), &ctx()).await.unwrap();
    match out.completion {
        Completion::Abnormal { diagnostic } => assert!(diagnostic.contains('7'), "{diagnostic}"),
        Completion::Success => panic!("expected abnormal"),
    }
}

#[tokio::test]
async fn environment_is_cleared_except_configured_vars() {
    let rt = sh("printf '%s|%s' \"$HOME\" \"$MODULE_MODE\"").env("MODULE_MODE", "strict");
    let out = rt.call(Vec::new(), &ctx()).await.unwrap();
    assert_eq!(out.stdout, b"|strict");
}

#[tokio::test]
async fn output_over_cap_is_rejected_promptly() {
    let rt = sh("while :; do printf 'xxxxxxxxxxxxxxxx'; done");
    let ctx = CallContext::new(ResourceLimits::default().with_max_output_bytes(1024));
    let started = Instant::now();
    let err = rt.call(Vec::new(), &ctx).await.unwrap_err();
    assert!(matches!(err, RuntimeError::OutputTooLarge { limit: 1024 }));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn cancel_kills_a_hung_module() {
    let rt = sh("sleep 30");
    let ctx = ctx();
    let cancel = ctx.cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });
    let started = Instant::now();
    let err = rt.call(Vec::new(), &ctx).await.unwrap_err();
    assert!(matches!(err, RuntimeError::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn missing_program_is_spawn_error() {
    let rt = ProcessRuntime::new("/nonexistent/interpose-module");
    let err = rt.call(Vec::new(), &ctx()).await.unwrap_err();
    assert!(matches!(err, RuntimeError::Spawn(_)));
}

#[tokio::test]
async fn script_file_module_runs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("upper.sh");
    std::fs::write(
        &path,
        "#!/bin/sh\nread -r _line\nprintf '{\"payload\":\"seen\",\"headers\":{\"X-Seen\":\"1\"}}'\n",
    )
    .unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();

    let rt = ProcessRuntime::new(&path).working_dir(dir.path());
    let out = rt.call(b"{\"payload\":0}\n".to_vec(), &ctx()).await.unwrap();
    let doc: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(doc["payload"], "seen");
    assert_eq!(doc["headers"]["X-Seen"], "1");
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn memory_cap_is_applied_to_the_child() {
    let rt = sh("ulimit -v");
    let limits = ResourceLimits::default().with_memory_bytes(512 * 1024 * 1024);
    let out = rt.call(Vec::new(), &CallContext::new(limits)).await.unwrap();
    assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "524288");
}

#[tokio::test]
async fn wasi_runtime_surfaces_missing_engine_as_spawn_error() {
    let rt = WasiRuntime::with_engine("audit.wasm", "/nonexistent/engine", ["run"]);
    let err = rt.call(Vec::new(), &ctx()).await.unwrap_err();
    assert!(matches!(err, RuntimeError::Spawn(_)));
}

#[tokio::test]
async fn wasi_runtime_passes_module_path_to_engine() {
    // Stand in for the engine with a shell that prints its arguments.
    let rt = WasiRuntime::with_engine("mod.wasm", "/bin/sh", ["-c", "printf '%s' \"$0\""]);
    let out = rt.call(Vec::new(), &ctx()).await.unwrap();
    assert_eq!(out.stdout, b"mod.wasm");
}

// --- Leftover descendants ---

/// A script that forks a writer of `marker`, one second later, into the background.
fn forks_background_writer(marker: &std::path::Path, then: &str) -> ProcessRuntime {
    sh(&format!(
        "(sleep 1; echo alive > '{}') >/dev/null 2>&1 </dev/null & {then}",
        marker.display()
    ))
}

#[tokio::test]
async fn background_children_die_when_module_exits() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("marker");

    let out = forks_background_writer(&marker, "exit 0")
        .call(Vec::new(), &ctx())
        .await
        .unwrap();
    assert_eq!(out.completion, Completion::Success);

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(!marker.exists(), "background work outlived the call");
}

#[tokio::test]
async fn background_children_die_after_abnormal_exit() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("marker");

    let out = forks_background_writer(&marker, "exit 4")
        .call(Vec::new(), &ctx())
        .await
        .unwrap();
    assert!(matches!(out.completion, Completion::Abnormal { .. }));

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(!marker.exists(), "background work outlived the call");
}

#[tokio::test]
async fn dropping_the_call_kills_the_whole_group() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("marker");
    let rt = forks_background_writer(&marker, "sleep 30");

    let ctx = ctx();
    let dropped = tokio::time::timeout(Duration::from_millis(200), rt.call(Vec::new(), &ctx)).await;
    assert!(dropped.is_err());

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(!marker.exists(), "background work outlived the dropped call");
}

#[tokio::test]
async fn unbounded_output_cap_reads_the_full_response() {
    let ctx = CallContext::new(ResourceLimits::default().with_max_output_bytes(usize::MAX));
    let out = sh(r#"printf '{"payload":1}'"#).call(Vec::new(), &ctx).await.unwrap();
    assert_eq!(out.completion, Completion::Success);
    assert_eq!(out.stdout, br#"{"payload":1}"#);
}

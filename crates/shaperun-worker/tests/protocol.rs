//! The worker binary spoken to directly over its pipes.

use std::ffi::OsStr;
use std::fs;
use std::process::Stdio;

use shaperun_protocol::{
    sidecar_path, LineChannel, PathPairRequest, StructuredRequest, EXIT, READY,
};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

const WORKER: &str = env!("CARGO_BIN_EXE_shaperun-worker");

async fn spawn(mode: &str) -> (Child, LineChannel<ChildStdout, ChildStdin>) {
    let mut child = Command::new(WORKER)
        .arg(mode)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .unwrap();
    let stdout = child.stdout.take().unwrap();
    let stdin = child.stdin.take().unwrap();
    let mut channel = LineChannel::new(stdout, stdin);
    assert_eq!(channel.recv_line().await.unwrap(), READY);
    (child, channel)
}

#[tokio::test]
async fn test_structured_session() {
    let dir = tempfile::tempdir().unwrap();
    let code = dir.path().join("t1_code.txt");
    let args = dir.path().join("t1_args.json");
    let output = dir.path().join("t1.brep");
    fs::write(&code, "result = box(h, 1, 1)\nmaterial = 'pine'").unwrap();
    fs::write(&args, r#"{"h": 3}"#).unwrap();

    let (mut child, mut channel) = spawn("serve").await;

    let request = StructuredRequest::new(&code, &args, &output).encode().unwrap();
    channel.send_line(&request).await.unwrap();
    assert_eq!(channel.recv_line().await.unwrap(), "OK|PINE");
    assert!(fs::metadata(&output).unwrap().len() > 0);

    fs::write(&code, "x = 1").unwrap();
    channel.send_line(&request).await.unwrap();
    assert_eq!(channel.recv_line().await.unwrap(), "ERR");
    assert!(!output.exists());
    let detail = fs::read_to_string(sidecar_path(&output)).unwrap();
    assert!(detail.contains("'result'"), "{}", detail);

    // Malformed lines get a response too.
    channel.send_line("not json").await.unwrap();
    assert_eq!(channel.recv_line().await.unwrap(), "ERR");

    channel.send_line(EXIT).await.unwrap();
    assert!(child.wait().await.unwrap().success());
}

#[tokio::test]
async fn test_path_pair_session() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("scriptA.txt");
    let output = dir.path().join("out1.brep");
    fs::write(&script, "show_object(box(100, 100, 100))\nmaterial = 'steel'\n").unwrap();

    let (mut child, mut channel) = spawn("paths").await;

    let request = PathPairRequest::new(&script, &output).encode().unwrap();
    channel.send_line(&request).await.unwrap();
    assert_eq!(channel.recv_line().await.unwrap(), "SUCCESS|STEEL");

    let missing = dir.path().join("missing.txt");
    let request = PathPairRequest::new(&missing, &output).encode().unwrap();
    channel.send_line(&request).await.unwrap();
    assert_eq!(
        channel.recv_line().await.unwrap(),
        format!("ERROR: Script file not found: {}", missing.display())
    );

    channel.send_line("no separator here").await.unwrap();
    assert!(channel
        .recv_line()
        .await
        .unwrap()
        .starts_with("ERROR: Invalid request format"));

    channel.send_line(EXIT).await.unwrap();
    assert!(child.wait().await.unwrap().success());
}

#[tokio::test]
async fn test_closed_stdin_ends_worker() {
    let (mut child, channel) = spawn("serve").await;
    drop(channel);
    assert!(child.wait().await.unwrap().success());
}

#[tokio::test]
async fn test_cold_run_exit_codes() {
    let dir = tempfile::tempdir().unwrap();
    let code = dir.path().join("code.txt");
    let args = dir.path().join("args.json");
    let output = dir.path().join("out.brep");
    fs::write(&code, "result = sphere(r)").unwrap();
    fs::write(&args, r#"{"r": 2.5}"#).unwrap();

    let run = |output: &std::path::Path| {
        std::process::Command::new(WORKER)
            .args([OsStr::new("run"), code.as_os_str(), args.as_os_str(), output.as_os_str()])
            .stderr(Stdio::null())
            .output()
            .unwrap()
    };

    let ok = run(&output);
    assert!(ok.status.success());
    assert_eq!(String::from_utf8_lossy(&ok.stdout).trim(), "SUCCESS");
    assert!(output.exists());

    fs::write(&args, r#"{"r": "wide"}"#).unwrap();
    let failed = run(&output);
    assert_eq!(failed.status.code(), Some(1));
    assert!(!output.exists());
    assert!(sidecar_path(&output).exists());
}

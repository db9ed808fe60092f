#![cfg(all(unix, feature = "cli"))]

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use conbridge::transport::ClientStream;
use conbridge::EndpointConfig;

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/cbcli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn bin() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_conbridge"));
    cmd.env_remove("CONBRIDGE_ENDPOINT")
        .env_remove("CONBRIDGE_DIR")
        .arg("--log-level")
        .arg("error");
    cmd
}

fn spawn_serve(dir: &Path, count: u64) -> Child {
    bin()
        .arg("--format")
        .arg("json")
        .arg("serve")
        .arg("--dir")
        .arg(dir)
        .arg("--name")
        .arg("console")
        .arg("--count")
        .arg(count.to_string())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("serve should start")
}

fn wait_for_endpoint(dir: &Path, timeout: Duration) {
    let config = EndpointConfig::named("console").with_dir(dir);
    let start = Instant::now();
    loop {
        if ClientStream::connect(&config).is_ok() {
            return;
        }
        if start.elapsed() >= timeout {
            panic!("endpoint did not come up");
        }
        thread::sleep(Duration::from_millis(25));
    }
}

fn wait_for_exit(child: &mut Child, timeout: Duration) -> std::process::ExitStatus {
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait().expect("child status should be readable") {
            return status;
        }
        if start.elapsed() >= timeout {
            let _ = child.kill();
            panic!("serve did not exit");
        }
        thread::sleep(Duration::from_millis(25));
    }
}

fn child_stdout(child: &mut Child) -> String {
    let mut out = String::new();
    if let Some(stdout) = child.stdout.as_mut() {
        let _ = stdout.read_to_string(&mut out);
    }
    out
}

fn send(dir: &Path, words: &[&str]) -> std::process::Output {
    bin()
        .arg("--format")
        .arg("json")
        .arg("send")
        .arg("--dir")
        .arg(dir)
        .arg("--name")
        .arg("console")
        .args(words)
        .output()
        .expect("send should run")
}

#[test]
fn send_reaches_serve_and_is_executed() {
    let dir = unique_temp_dir("send");
    let mut child = spawn_serve(&dir, 1);
    wait_for_endpoint(&dir, Duration::from_secs(3));

    let output = send(&dir, &["changelevel", "gm_construct"]);
    assert!(output.status.success(), "send failed: {output:?}");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"kind\":\"sent\""));
    assert!(stdout.contains("\"command\":\"changelevel gm_construct\""));

    let status = wait_for_exit(&mut child, Duration::from_secs(5));
    assert!(status.success());
    let served = child_stdout(&mut child);
    assert!(served.contains("\"kind\":\"executed\""));
    assert!(served.contains("\"command\":\"changelevel gm_construct\""));
    assert!(!dir.join("console").exists());
    assert!(!dir.join("console_in").exists());

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn tail_prints_records_published_by_serve() {
    let dir = unique_temp_dir("tail");
    let mut child = spawn_serve(&dir, 1);
    wait_for_endpoint(&dir, Duration::from_secs(3));
    thread::sleep(Duration::from_millis(200));

    child
        .stdin
        .as_mut()
        .expect("stdin should be piped")
        .write_all(b"hello from stdin\n")
        .expect("stdin write should succeed");

    let output = bin()
        .arg("--format")
        .arg("json")
        .arg("tail")
        .arg("--dir")
        .arg(&dir)
        .arg("--name")
        .arg("console")
        .arg("--count")
        .arg("1")
        .output()
        .expect("tail should run");
    assert!(output.status.success(), "tail failed: {output:?}");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"kind\":\"log\""));
    assert!(stdout.contains("\"channel_name\":\"Console\""));
    assert!(stdout.contains("\"message\":\"hello from stdin\\n\""));

    let output = send(&dir, &["quit"]);
    assert!(output.status.success());
    assert!(wait_for_exit(&mut child, Duration::from_secs(5)).success());

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn send_without_host_is_transport_error() {
    let dir = unique_temp_dir("nohost");
    let output = send(&dir, &["status"]);

    assert_eq!(output.status.code(), Some(3));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("connect failed"));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn serve_refuses_to_replace_regular_file() {
    let dir = unique_temp_dir("occupied");
    std::fs::write(dir.join("console"), b"not a fifo").expect("file should be written");

    let output = bin()
        .arg("serve")
        .arg("--dir")
        .arg(&dir)
        .arg("--name")
        .arg("console")
        .stdin(Stdio::null())
        .output()
        .expect("serve should run");

    assert_eq!(output.status.code(), Some(3));
    assert!(String::from_utf8_lossy(&output.stderr).contains("not a fifo"));
    assert!(dir.join("console").is_file());

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn version_prints_name() {
    let output = bin().arg("version").output().expect("version should run");
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).starts_with("conbridge "));
}

//! `zli shell` against a fake connection bridge

use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::path::PathBuf;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Bridge that answers the first line with `script`, then records what it receives
fn fake_bridge(script: Vec<&'static str>) -> (String, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap().to_string();

    let handle = thread::spawn(move || {
        let (socket, _) = listener.accept().unwrap();
        socket
            .set_read_timeout(Some(Duration::from_secs(10)))
            .unwrap();
        let mut reader = BufReader::new(socket.try_clone().unwrap());
        let mut writer = socket;

        let mut received = Vec::new();
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        received.push(line.trim().to_string());

        for frame in script {
            writer.write_all(frame.as_bytes()).unwrap();
            writer.write_all(b"\n").unwrap();
        }

        loop {
            line.clear();
            match reader.read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => received.push(line.trim().to_string()),
            }
        }
        received
    });

    (address, handle)
}

fn shell(address: &str, connection_id: &str) -> (TempDir, Command) {
    let dir = TempDir::new().unwrap();
    let path: PathBuf = dir.path().join("config.toml");
    std::fs::write(
        &path,
        format!("[session]\nbridge_address = \"{}\"\n", address),
    )
    .unwrap();

    let mut cmd = Command::cargo_bin("zli").unwrap();
    cmd.env_remove("ZLI_CONFIG")
        .env_remove("RUST_LOG")
        .arg("--config")
        .arg(&path)
        .args(["shell", connection_id])
        .timeout(Duration::from_secs(20));
    (dir, cmd)
}

#[test]
fn test_output_then_unattached_exits_zero() {
    let (address, bridge) = fake_bridge(vec![
        r#"{"type":"event","event":"Start"}"#,
        r#"{"type":"output","data":"aGVsbG8gZnJvbSByZW1vdGUNCg=="}"#,
        r#"{"type":"event","event":"Unattached"}"#,
    ]);
    let (_dir, mut cmd) = shell(&address, "conn-42");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("hello from remote"))
        .stderr(predicate::str::contains("Another client has attached"));

    let received = bridge.join().unwrap();
    assert_eq!(received[0], r#"{"type":"open","connectionId":"conn-42"}"#);
}

#[test]
fn test_target_disconnect_exits_one() {
    let (address, bridge) = fake_bridge(vec![
        r#"{"type":"event","event":"Start"}"#,
        r#"{"type":"event","event":"Disconnect"}"#,
    ]);
    let (_dir, mut cmd) = shell(&address, "conn-43");

    cmd.assert()
        .code(1)
        .stderr(predicate::str::contains("Target Disconnected."));
    bridge.join().unwrap();
}

#[test]
fn test_unreachable_bridge_exits_one() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap().to_string();
    drop(listener);

    let (_dir, mut cmd) = shell(&address, "conn-44");
    cmd.assert()
        .code(1)
        .stderr(predicate::str::contains("Failed to open connection conn-44"));
}

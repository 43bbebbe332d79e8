//! End-to-end smoke test: spawn the built `af-daemon` binary against a
//! scratch bind address and confirm the ingress HTTP surface answers.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::process::{Child, Command};
use std::time::{Duration, Instant};

struct DaemonProcess(Child);

impl Drop for DaemonProcess {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

fn spawn_daemon(bind_address: &str) -> DaemonProcess {
    let bin = assert_cmd::cargo::cargo_bin("af-daemon");
    let child = Command::new(bin)
        .env("AF_BIND_ADDRESS", bind_address)
        .env("RUST_LOG", "error")
        .spawn()
        .expect("failed to spawn af-daemon");
    DaemonProcess(child)
}

fn wait_for_port(address: &str, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if TcpStream::connect(address).is_ok() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    false
}

fn http_get(address: &str, path: &str) -> String {
    let mut stream = TcpStream::connect(address).expect("connect");
    let request = format!("GET {path} HTTP/1.1\r\nHost: {address}\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).expect("write request");
    let mut response = String::new();
    stream.read_to_string(&mut response).expect("read response");
    response
}

#[test]
#[serial_test::serial]
fn health_endpoint_reports_ok() {
    let address = "127.0.0.1:18099";
    let _daemon = spawn_daemon(address);
    assert!(wait_for_port(address, Duration::from_secs(5)), "daemon never bound {address}");

    let response = http_get(address, "/health");
    assert!(response.starts_with("HTTP/1.1 200"), "unexpected status line: {response}");
    assert!(response.contains("\"status\":\"ok\""), "unexpected body: {response}");
}

#[test]
#[serial_test::serial]
fn job_lifecycle_via_http_reaches_queued_state() {
    let address = "127.0.0.1:18100";
    let _daemon = spawn_daemon(address);
    assert!(wait_for_port(address, Duration::from_secs(5)), "daemon never bound {address}");

    let mut stream = TcpStream::connect(address).expect("connect");
    let body = serde_json::json!({
        "name": "smoke job",
        "applicationPath": "calc",
        "steps": [
            {"order": 0, "type": "click", "target": "5"},
            {"order": 1, "type": "validate", "target": "5"}
        ]
    })
    .to_string();
    let request = format!(
        "POST /jobs HTTP/1.1\r\nHost: {address}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    stream.write_all(request.as_bytes()).expect("write request");
    let mut response = String::new();
    stream.read_to_string(&mut response).expect("read response");
    assert!(response.starts_with("HTTP/1.1 201"), "unexpected status line: {response}");
    assert!(response.contains("jobId"), "unexpected body: {response}");
}

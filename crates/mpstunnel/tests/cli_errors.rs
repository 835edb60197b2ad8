#![cfg(all(unix, feature = "cli"))]

use std::net::TcpListener;
use std::process::{Command, Output};

fn mpstunnel(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_mpstunnel"))
        .args(["--log-level", "off"])
        .args(args)
        .output()
        .expect("command should run")
}

fn closed_port() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind should succeed");
    let addr = listener.local_addr().expect("local addr").to_string();
    drop(listener);
    addr
}

#[test]
fn invalid_eid_is_usage_error() {
    let output = mpstunnel(&["link", "127.0.0.1:1", "--eid", "not-an-eid"]);
    assert_eq!(output.status.code(), Some(64));
    assert!(String::from_utf8_lossy(&output.stderr).contains("--eid"));
}

#[test]
fn refused_master_is_transport_error() {
    let addr = closed_port();
    let output = mpstunnel(&["send", &addr, "--data", "REV", "--cr"]);
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn empty_payload_is_rejected() {
    let output = mpstunnel(&["send", "127.0.0.1:1"]);
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn version_prints_package_version() {
    let output = mpstunnel(&["version"]);
    assert!(output.status.success());
    let text = String::from_utf8_lossy(&output.stdout);
    assert!(text.starts_with("mpstunnel "));
    assert!(text.contains(env!("CARGO_PKG_VERSION")));
}

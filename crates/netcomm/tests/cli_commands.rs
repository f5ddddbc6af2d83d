#![cfg(feature = "cli")]

use std::io::Read;
use std::net::{TcpListener, UdpSocket};
use std::process::{Child, Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use netcomm_frame::{EncodedMessage, TypedValue};
use netcomm_socket::connect;
use netcomm_transport::SocketAddress;

const EXIT_TIMEOUT: Duration = Duration::from_secs(10);

fn netcomm() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_netcomm"));
    cmd.args(["--log-level", "warn"]);
    cmd
}

fn free_tcp_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .expect("bind should succeed")
        .local_addr()
        .expect("local addr")
        .port()
}

fn free_udp_port() -> u16 {
    UdpSocket::bind("127.0.0.1:0")
        .expect("bind should succeed")
        .local_addr()
        .expect("local addr")
        .port()
}

/// Wait for `child` to exit, killing it after `timeout`.
fn wait_with_timeout(mut child: Child, timeout: Duration) -> Output {
    let start = Instant::now();
    loop {
        match child.try_wait().expect("try_wait should succeed") {
            Some(_) => break,
            None if start.elapsed() >= timeout => {
                let _ = child.kill();
                break;
            }
            None => thread::sleep(Duration::from_millis(25)),
        }
    }
    let status = child.wait().expect("wait should succeed");
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    if let Some(mut out) = child.stdout.take() {
        out.read_to_end(&mut stdout).expect("stdout should be readable");
    }
    if let Some(mut err) = child.stderr.take() {
        err.read_to_end(&mut stderr).expect("stderr should be readable");
    }
    Output {
        status,
        stdout,
        stderr,
    }
}

#[test]
fn version_prints_name() {
    let output = netcomm().arg("version").output().expect("run netcomm");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("netcomm "), "{stdout}");
}

#[test]
fn out_of_range_command_is_data_invalid() {
    let port = free_tcp_port();
    let output = netcomm()
        .args(["send", &format!("127.0.0.1:{port}"), "--command", "300"])
        .output()
        .expect("run netcomm");
    assert_eq!(output.status.code(), Some(60));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("CommandValueOverflow"), "{stderr}");
}

#[test]
fn json_null_argument_is_data_invalid() {
    let port = free_tcp_port();
    let output = netcomm()
        .args([
            "send",
            &format!("127.0.0.1:{port}"),
            "--json-args",
            "[1, null]",
        ])
        .output()
        .expect("run netcomm");
    assert_eq!(output.status.code(), Some(60));
}

#[test]
fn refused_connection_is_transport_error() {
    let port = free_tcp_port();
    let output = netcomm()
        .args(["send", &format!("127.0.0.1:{port}"), "--arg", "int:1"])
        .output()
        .expect("run netcomm");
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn udp_sends_to_itself() {
    let port = free_udp_port();
    let address = format!("127.0.0.1:{port}");
    let child = netcomm()
        .args([
            "--format",
            "json",
            "udp",
            &address,
            "--to",
            &address,
            "--count",
            "1",
            "--arg",
            "str:ping",
        ])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn netcomm");

    let output = wait_with_timeout(child, EXIT_TIMEOUT);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"protocol\":\"UDP\""), "{stdout}");
    assert!(stdout.contains("\"value\":\"ping\""), "{stdout}");
}

#[test]
fn listen_prints_received_frame() {
    let port = free_tcp_port();
    let address = SocketAddress::new("127.0.0.1", port);
    let child = netcomm()
        .args([
            "--format",
            "json",
            "listen",
            &address.to_string(),
            "--count",
            "1",
        ])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn netcomm");

    let start = Instant::now();
    let client = loop {
        match connect(&address) {
            Ok(client) => break client,
            Err(err) => {
                assert!(start.elapsed() < EXIT_TIMEOUT, "connect timeout: {err}");
                thread::sleep(Duration::from_millis(25));
            }
        }
    };
    let message = EncodedMessage::build(
        0x88,
        &[TypedValue::Integer(-256), TypedValue::from("Hello")],
    );
    client.send(&message).expect("send should succeed");

    let output = wait_with_timeout(child, EXIT_TIMEOUT);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"command\":136"), "{stdout}");
    assert!(stdout.contains("\"result\":\"completed\""), "{stdout}");
    assert!(stdout.contains("\"value\":-256"), "{stdout}");
}

#[test]
fn send_wait_times_out_without_reply() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind should succeed");
    let port = listener.local_addr().expect("local addr").port();
    let holder = thread::spawn(move || {
        let (stream, _) = listener.accept().expect("accept should succeed");
        thread::sleep(Duration::from_secs(2));
        drop(stream);
    });

    let output = netcomm()
        .args([
            "send",
            &format!("127.0.0.1:{port}"),
            "--arg",
            "bool:true",
            "--wait",
            "--wait-timeout",
            "300ms",
        ])
        .output()
        .expect("run netcomm");
    assert_eq!(output.status.code(), Some(124));
    holder.join().expect("holder thread");
}

#[test]
fn demo_exchanges_udp_and_tcp_frames() {
    let child = netcomm()
        .args([
            "--format",
            "json",
            "demo",
            "--address",
            "127.0.0.1:0",
            "--interval",
            "1s",
            "--duration",
            "2s",
        ])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn netcomm");

    let output = wait_with_timeout(child, EXIT_TIMEOUT);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"protocol\":\"UDP\""), "{stdout}");
    assert!(stdout.contains("\"protocol\":\"TCP\""), "{stdout}");
    assert!(stdout.contains("\"value\":\"Hello\""), "{stdout}");
}

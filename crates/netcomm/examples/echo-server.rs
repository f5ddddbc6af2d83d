//! TCP server that sends every completed frame back to its sender.
//!
//! Run with `cargo run --example echo-server`, then point
//! `netcomm send 127.0.0.1:10010 --wait` at it.

use std::thread;
use std::time::Duration;

use netcomm::frame::EncodedMessage;
use netcomm::socket::Listener;
use netcomm::transport::SocketAddress;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let address: SocketAddress = "127.0.0.1:10010".parse()?;
    let listener = Listener::bind(&address)?;
    println!("echo server listening on {}", listener.local_address());

    listener.on_accept(|socket| {
        let installed = socket.on_received(|socket, event| {
            if !event.is_completed() {
                println!("{}: {}", socket.protocol(), event.result());
                return;
            }
            let reply = EncodedMessage::build(event.command(), event.args());
            if let Err(err) = socket.send(&reply) {
                eprintln!("echo failed: {err}");
            }
        });
        if let Err(err) = installed {
            eprintln!("receive setup failed: {err}");
        }
    })?;

    while listener.is_running() {
        thread::sleep(Duration::from_millis(500));
    }
    Ok(())
}

use std::sync::atomic::Ordering;
use std::sync::mpsc;
use std::time::Instant;

use netcomm_frame::{EncodedMessage, TypedValue};
use netcomm_socket::{
    bind_datagram_with_config, connect_with_config, Listener, DEFAULT_POLL_INTERVAL,
};
use tracing::{info, warn};

use crate::cmd::{forward_events, install_ctrlc_handler, parse_duration, DemoArgs};
use crate::exit::{build_error, socket_error, CliResult, SUCCESS};
use crate::output::{print_event, OutputFormat};

/// Command 0x88 with one argument of every kind.
pub fn demo_message() -> EncodedMessage {
    EncodedMessage::build(
        0x88,
        &[
            TypedValue::Integer(-256),
            TypedValue::Boolean(true),
            TypedValue::from("Hello"),
            TypedValue::Float(-1.1),
            TypedValue::from(vec![0x41, 0x42, 0x43]),
        ],
    )
}

/// A UDP socket that sends to itself, a TCP server on the same address, and
/// a TCP client sending to that server while the connection is up.
pub fn run(args: DemoArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.socket.to_config()?;
    let interval = parse_duration(&args.interval)?;
    let deadline = match args.duration.as_deref() {
        Some(duration) => Some(Instant::now() + parse_duration(duration)?),
        None => None,
    };
    let message = demo_message();
    if !message.is_successful() {
        return Err(build_error(message.build_result()));
    }

    let running = install_ctrlc_handler()?;
    let (tx, rx) = mpsc::channel();

    let udp = bind_datagram_with_config(&args.address, config.clone())
        .map_err(|err| socket_error("udp bind failed", err))?;
    info!(address = %udp.local_address(), "udp socket started");
    forward_events(&udp, tx.clone(), false)?;

    let listener = Listener::bind(&args.address)
        .map_err(|err| socket_error("tcp bind failed", err))?
        .with_socket_config(config.clone());
    info!(address = %listener.local_address(), "tcp server started");
    let accept_tx = tx.clone();
    listener
        .on_accept(move |socket| {
            info!(remote = ?socket.remote_address(), "tcp client accepted");
            if let Err(err) = forward_events(&socket, accept_tx.clone(), false) {
                warn!(error = %err, "dropping connection");
                let _ = socket.close();
            }
        })
        .map_err(|err| socket_error("accept setup failed", err))?;

    let client = connect_with_config(listener.local_address(), config)
        .map_err(|err| socket_error("tcp connect failed", err))?;
    info!(local = %client.local_address(), "tcp client started");
    forward_events(&client, tx, false)?;

    let mut next_tick = Instant::now();
    while running.load(Ordering::SeqCst) && deadline.map_or(true, |d| Instant::now() < d) {
        let now = Instant::now();
        if now >= next_tick {
            udp.send_to(&message, udp.local_address())
                .map_err(|err| socket_error("udp send failed", err))?;
            if client.is_connected() {
                if let Err(err) = client.send(&message) {
                    warn!(error = %err, "tcp client send failed");
                }
            }
            next_tick = now + interval;
        }

        let mut wait = DEFAULT_POLL_INTERVAL.min(next_tick.saturating_duration_since(Instant::now()));
        if let Some(deadline) = deadline {
            wait = wait.min(deadline.saturating_duration_since(Instant::now()));
        }
        if let Ok(record) = rx.recv_timeout(wait) {
            print_event(&record, format);
        }
    }

    let _ = client.close();
    let _ = udp.close();
    listener.close();
    Ok(SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_message_builds() {
        let message = demo_message();
        assert!(message.is_successful());
        assert_eq!(message.command(), 0x88);
        // 23 text bytes plus seven bytes of markers, length and checksum
        assert_eq!(message.len(), 23 + 7);
    }
}

use std::sync::atomic::Ordering;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Instant;

use netcomm_socket::{bind_datagram_with_config, DEFAULT_POLL_INTERVAL};
use tracing::info;

use crate::cmd::{forward_events, install_ctrlc_handler, parse_duration, UdpArgs};
use crate::exit::{socket_error, CliResult, SUCCESS};
use crate::output::{print_event, OutputFormat};

pub fn run(args: UdpArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.socket.to_config()?;
    let interval = parse_duration(&args.interval)?;
    let outgoing = match &args.to {
        Some(destination) => Some((destination, args.message.build()?)),
        None => None,
    };

    let socket = bind_datagram_with_config(&args.bind, config)
        .map_err(|err| socket_error("bind failed", err))?;
    info!(address = %socket.local_address(), "udp socket started");

    let running = install_ctrlc_handler()?;
    let (tx, rx) = mpsc::channel();
    forward_events(&socket, tx, false)?;

    let mut printed = 0usize;
    let mut next_send = Instant::now();
    while running.load(Ordering::SeqCst) {
        let mut wait = DEFAULT_POLL_INTERVAL;
        if let Some((destination, message)) = &outgoing {
            let now = Instant::now();
            if now >= next_send {
                socket
                    .send_to(message, destination)
                    .map_err(|err| socket_error("send failed", err))?;
                next_send = now + interval;
            }
            wait = wait.min(next_send.saturating_duration_since(Instant::now()));
        }

        let record = match rx.recv_timeout(wait) {
            Ok(record) => record,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        print_event(&record, format);
        if record.event.is_completed() {
            printed = printed.saturating_add(1);
            if args.count.is_some_and(|count| printed >= count) {
                break;
            }
        }
    }

    let _ = socket.close();
    Ok(SUCCESS)
}

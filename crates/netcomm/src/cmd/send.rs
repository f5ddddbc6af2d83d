use std::sync::atomic::Ordering;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use netcomm_frame::EncodedMessage;
use netcomm_socket::{connect_with_config, ReceiveResult, Socket};
use tracing::{debug, info};

use crate::cmd::{forward_events, install_ctrlc_handler, parse_duration, SendArgs};
use crate::exit::{socket_error, CliError, CliResult, DATA_INVALID, FAILURE, SUCCESS, TIMEOUT};
use crate::output::{print_event, EventRecord, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let message = args.message.build()?;
    let repeat = args.repeat.as_deref().map(parse_duration).transpose()?;
    let wait_timeout = parse_duration(&args.wait_timeout)?;
    let config = args.socket.to_config()?;

    let socket = connect_with_config(&args.address, config)
        .map_err(|err| socket_error("connect failed", err))?;
    info!(
        local = %socket.local_address(),
        remote = %args.address,
        "tcp client started"
    );

    let (tx, rx) = mpsc::channel();
    forward_events(&socket, tx, false)?;
    socket
        .send(&message)
        .map_err(|err| socket_error("send failed", err))?;
    debug!(
        command = message.command(),
        args = message.args().len(),
        bytes = message.len(),
        "frame sent"
    );

    let result = match repeat {
        Some(interval) => repeat_while_connected(&socket, &message, interval, &rx, format),
        None if args.wait => wait_for_reply(&rx, wait_timeout, format),
        None => Ok(SUCCESS),
    };

    let _ = socket.close();
    result
}

/// Re-send every `interval` until the peer goes away or Ctrl-C.
fn repeat_while_connected(
    socket: &Socket,
    message: &EncodedMessage,
    interval: Duration,
    rx: &Receiver<EventRecord>,
    format: OutputFormat,
) -> CliResult<i32> {
    let running = install_ctrlc_handler()?;
    loop {
        let next = Instant::now() + interval;
        while let Some(remaining) = next.checked_duration_since(Instant::now()) {
            match rx.recv_timeout(remaining) {
                Ok(record) => print_event(&record, format),
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => {
                    thread::sleep(remaining);
                    break;
                }
            }
        }

        if !running.load(Ordering::SeqCst) {
            return Ok(SUCCESS);
        }
        if !socket.is_connected() {
            info!("connection closed, no more sends");
            return Ok(SUCCESS);
        }
        socket
            .send(message)
            .map_err(|err| socket_error("send failed", err))?;
    }
}

fn wait_for_reply(
    rx: &Receiver<EventRecord>,
    timeout: Duration,
    format: OutputFormat,
) -> CliResult<i32> {
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let record = match rx.recv_timeout(remaining) {
            Ok(record) => record,
            Err(_) => {
                return Err(CliError::new(
                    TIMEOUT,
                    format!("no reply within {timeout:?}"),
                ))
            }
        };

        print_event(&record, format);
        match record.event.result() {
            ReceiveResult::Completed => return Ok(SUCCESS),
            ReceiveResult::Interrupted => continue,
            ReceiveResult::ParsingError => {
                return Err(CliError::new(DATA_INVALID, "reply could not be parsed"))
            }
            ReceiveResult::Closed => {
                return Err(CliError::new(
                    FAILURE,
                    "connection closed before a reply arrived",
                ))
            }
        }
    }
}

use std::sync::atomic::Ordering;
use std::sync::mpsc::{self, RecvTimeoutError};

use netcomm_socket::{Listener, DEFAULT_POLL_INTERVAL};
use tracing::{info, warn};

use crate::cmd::{forward_events, install_ctrlc_handler, ListenArgs};
use crate::exit::{socket_error, CliResult, SUCCESS};
use crate::output::{print_event, OutputFormat};

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.socket.to_config()?;
    let listener = Listener::bind(&args.address)
        .map_err(|err| socket_error("bind failed", err))?
        .with_socket_config(config);
    info!(address = %listener.local_address(), "tcp server started");

    let running = install_ctrlc_handler()?;
    let (tx, rx) = mpsc::channel();
    let echo = args.echo;
    listener
        .on_accept(move |socket| {
            info!(remote = ?socket.remote_address(), "tcp client accepted");
            if let Err(err) = forward_events(&socket, tx.clone(), echo) {
                warn!(error = %err, "dropping connection");
                let _ = socket.close();
            }
        })
        .map_err(|err| socket_error("accept setup failed", err))?;

    let mut printed = 0usize;
    while running.load(Ordering::SeqCst) {
        let record = match rx.recv_timeout(DEFAULT_POLL_INTERVAL) {
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

    listener.close();
    Ok(SUCCESS)
}

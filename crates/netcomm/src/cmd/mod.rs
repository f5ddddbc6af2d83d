use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Subcommand};
use netcomm_frame::{EncodedMessage, FrameConfig, FrameError, TypedValue};
use netcomm_socket::{Protocol, ReceiveResult, ReceivedEvent, Socket, SocketConfig};
use netcomm_transport::SocketAddress;
use tracing::warn;

use crate::exit::{build_error, frame_error, socket_error, CliError, CliResult, INTERNAL, USAGE};
use crate::output::{EventRecord, OutputFormat};

pub mod demo;
pub mod listen;
pub mod send;
pub mod udp;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Accept TCP connections and print received frames.
    Listen(ListenArgs),
    /// Connect over TCP and send a frame.
    Send(SendArgs),
    /// Bind a UDP socket, optionally send periodically, and print received frames.
    Udp(UdpArgs),
    /// Run a UDP socket, a TCP server and a TCP client against each other.
    Demo(DemoArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Listen(args) => listen::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Udp(args) => udp::run(args, format),
        Command::Demo(args) => demo::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

pub const DEFAULT_ADDRESS: &str = "127.0.0.1:10010";

/// Socket tuning shared by every networking subcommand.
#[derive(Args, Debug, Clone)]
pub struct SocketOptions {
    /// Report a frame as interrupted after this long without completing (e.g. 15s, 500ms).
    #[arg(long, env = "NETCOMM_STALL_TIMEOUT", default_value = "15s")]
    pub stall_timeout: String,
    /// Bytes requested per socket read.
    #[arg(long, env = "NETCOMM_CHUNK_SIZE", default_value_t = netcomm_socket::DEFAULT_READ_CHUNK_SIZE)]
    pub chunk_size: usize,
    /// Largest frame text length accepted from peers.
    #[arg(long, env = "NETCOMM_MAX_TEXT_LEN")]
    pub max_text_len: Option<usize>,
    /// Write timeout for sends (e.g. 5s). Default: none.
    #[arg(long, env = "NETCOMM_WRITE_TIMEOUT")]
    pub write_timeout: Option<String>,
}

impl SocketOptions {
    pub fn to_config(&self) -> CliResult<SocketConfig> {
        let mut frame = FrameConfig::default();
        if let Some(max) = self.max_text_len {
            frame.max_text_len = max;
        }
        frame.write_timeout = self.write_timeout.as_deref().map(parse_duration).transpose()?;

        Ok(SocketConfig::default()
            .with_stall_timeout(parse_duration(&self.stall_timeout)?)
            .with_read_chunk_size(self.chunk_size)
            .with_frame_config(frame))
    }
}

/// Command and arguments of an outgoing frame.
#[derive(Args, Debug, Clone)]
pub struct MessageArgs {
    /// Command value (decimal or 0x-prefixed hex, 0..=255).
    #[arg(long, short = 'c', default_value = "0x88", value_parser = parse_command, allow_negative_numbers = true)]
    pub command: i64,
    /// Typed argument as kind:value (int, float, bool, str, bytes). Repeatable.
    #[arg(long = "arg", value_name = "KIND:VALUE", conflicts_with = "json_args")]
    pub args: Vec<String>,
    /// Arguments as a JSON array, e.g. '[-256, true, "Hello", -1.1]'.
    #[arg(long, value_name = "JSON")]
    pub json_args: Option<String>,
}

impl MessageArgs {
    pub fn build(&self) -> CliResult<EncodedMessage> {
        let values = match &self.json_args {
            Some(json) => match json_values(json)? {
                Ok(values) => values,
                Err(failed) => return Err(build_error(failed.build_result())),
            },
            None => self
                .args
                .iter()
                .map(|literal| literal.parse::<TypedValue>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|err| frame_error("invalid --arg", err))?,
        };

        let message = EncodedMessage::build_raw(self.command, &values);
        if !message.is_successful() {
            return Err(build_error(message.build_result()));
        }
        Ok(message)
    }
}

/// Convert a JSON array into typed values.
///
/// The outer `Err` is a usage problem; the inner one is a message that
/// cannot be built because an element has no wire encoding.
fn json_values(json: &str) -> CliResult<Result<Vec<TypedValue>, EncodedMessage>> {
    let parsed: serde_json::Value = serde_json::from_str(json)
        .map_err(|err| CliError::new(USAGE, format!("--json-args is not valid JSON: {err}")))?;
    let serde_json::Value::Array(items) = parsed else {
        return Err(CliError::new(USAGE, "--json-args must be a JSON array"));
    };

    let mut values = Vec::with_capacity(items.len());
    for item in items {
        match json_value(item) {
            Ok(value) => values.push(value),
            Err(err) => return Ok(Err(EncodedMessage::from_error(&err))),
        }
    }
    Ok(Ok(values))
}

fn json_value(item: serde_json::Value) -> Result<TypedValue, FrameError> {
    match item {
        serde_json::Value::Bool(b) => Ok(TypedValue::Boolean(b)),
        serde_json::Value::String(s) => Ok(TypedValue::Text(s)),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Ok(TypedValue::Integer(i)),
            None => n
                .as_f64()
                .map(TypedValue::Float)
                .ok_or_else(|| FrameError::DataTypeNotImplemented(format!("number {n}"))),
        },
        serde_json::Value::Null => Err(FrameError::DataTypeNotImplemented("null".into())),
        serde_json::Value::Array(_) => Err(FrameError::DataTypeNotImplemented("array".into())),
        serde_json::Value::Object(_) => Err(FrameError::DataTypeNotImplemented("object".into())),
    }
}

fn parse_command(input: &str) -> Result<i64, String> {
    let input = input.trim();
    let parsed = match input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
    {
        Some(hex) => i64::from_str_radix(hex, 16),
        None => input.parse(),
    };
    parsed.map_err(|_| format!("invalid command value: {input}"))
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

/// Install a receive handler that forwards every event to `tx`.
///
/// With `echo`, completed frames are also sent back to where they came from.
/// Sockets that hit a parsing error are closed from the handler, since their
/// stream cannot be resynchronized.
pub fn forward_events(socket: &Socket, tx: Sender<EventRecord>, echo: bool) -> CliResult<()> {
    socket
        .on_received(move |socket, event| {
            if echo && event.is_completed() {
                echo_back(socket, &event);
            }
            let failed = event.result() == ReceiveResult::ParsingError;
            let _ = tx.send(EventRecord {
                protocol: socket.protocol(),
                local: socket.local_address().clone(),
                event,
            });
            if failed {
                let _ = socket.close();
            }
        })
        .map_err(|err| socket_error("receive setup failed", err))
}

fn echo_back(socket: &Socket, event: &ReceivedEvent) {
    let reply = EncodedMessage::build(event.command(), event.args());
    let sent = match (socket.protocol(), event.remote()) {
        (Protocol::Udp, Some(remote)) => socket.send_to(&reply, remote),
        _ => socket.send(&reply),
    };
    if let Err(err) = sent {
        warn!(error = %err, "echo failed");
    }
}

/// Flag cleared by Ctrl-C.
pub fn install_ctrlc_handler() -> CliResult<Arc<AtomicBool>> {
    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    ctrlc::set_handler(move || {
        flag.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))?;
    Ok(running)
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Address to listen on.
    #[arg(default_value = DEFAULT_ADDRESS)]
    pub address: SocketAddress,
    /// Exit after receiving N frames.
    #[arg(long)]
    pub count: Option<usize>,
    /// Send every received frame back to its sender.
    #[arg(long)]
    pub echo: bool,
    #[command(flatten)]
    pub socket: SocketOptions,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Address to connect to.
    pub address: SocketAddress,
    #[command(flatten)]
    pub message: MessageArgs,
    /// Re-send at this interval while the connection stays up (e.g. 5s).
    #[arg(long, value_name = "INTERVAL")]
    pub repeat: Option<String>,
    /// Wait for one frame in reply and print it.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait for the reply when --wait is set (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
    #[command(flatten)]
    pub socket: SocketOptions,
}

#[derive(Args, Debug)]
pub struct UdpArgs {
    /// Address to bind.
    #[arg(default_value = DEFAULT_ADDRESS)]
    pub bind: SocketAddress,
    /// Send the message to this address every --interval.
    #[arg(long, value_name = "ADDRESS")]
    pub to: Option<SocketAddress>,
    /// Send interval when --to is set (e.g. 5s).
    #[arg(long, default_value = "5s")]
    pub interval: String,
    /// Exit after receiving N frames.
    #[arg(long)]
    pub count: Option<usize>,
    #[command(flatten)]
    pub message: MessageArgs,
    #[command(flatten)]
    pub socket: SocketOptions,
}

#[derive(Args, Debug)]
pub struct DemoArgs {
    /// Address shared by the UDP socket and the TCP server.
    #[arg(long, default_value = DEFAULT_ADDRESS)]
    pub address: SocketAddress,
    /// Send interval for the UDP socket and the TCP client (e.g. 5s).
    #[arg(long, default_value = "5s")]
    pub interval: String,
    /// Stop after this long (e.g. 30s). Default: run until Ctrl-C.
    #[arg(long)]
    pub duration: Option<String>,
    #[command(flatten)]
    pub socket: SocketOptions,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

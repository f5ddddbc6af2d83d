use std::io::IsTerminal;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use netcomm_frame::TypedValue;
use netcomm_socket::{Protocol, ReceivedEvent};
use netcomm_transport::SocketAddress;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

/// A received event together with the socket it arrived on.
#[derive(Debug, Clone)]
pub struct EventRecord {
    pub protocol: Protocol,
    pub local: SocketAddress,
    pub event: ReceivedEvent,
}

#[derive(Serialize)]
struct EventOutput<'a> {
    protocol: &'a str,
    local: String,
    remote: Option<String>,
    result: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    command: Option<u8>,
    args: Vec<ArgOutput>,
    timestamp: String,
}

#[derive(Serialize)]
struct ArgOutput {
    kind: &'static str,
    value: serde_json::Value,
}

pub fn print_event(record: &EventRecord, format: OutputFormat) {
    let event = &record.event;
    let remote = event
        .remote()
        .map(ToString::to_string)
        .unwrap_or_else(|| "-".to_string());

    match format {
        OutputFormat::Json => {
            let out = EventOutput {
                protocol: record.protocol.as_str(),
                local: record.local.to_string(),
                remote: event.remote().map(ToString::to_string),
                result: event.result().as_str(),
                command: event.is_completed().then(|| event.command()),
                args: event.args().iter().map(arg_output).collect(),
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["PROTOCOL", "REMOTE", "RESULT", "COMMAND", "ARGS"])
                .add_row(vec![
                    record.protocol.to_string(),
                    remote,
                    event.result().to_string(),
                    command_label(event),
                    pretty_args(event.args()),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            if event.is_completed() {
                println!(
                    "{} {} {} ({})",
                    record.protocol,
                    remote,
                    command_label(event),
                    pretty_args(event.args())
                );
            } else {
                println!("{} {} {}", record.protocol, remote, event.result());
            }
        }
    }
}

fn command_label(event: &ReceivedEvent) -> String {
    if event.is_completed() {
        format!("0x{:02X}", event.command())
    } else {
        "-".to_string()
    }
}

/// Arguments as `-256, true, Hello, -1.100000, [0x41,0x42,0x43]`.
pub fn pretty_args(args: &[TypedValue]) -> String {
    args.iter()
        .map(|arg| match arg {
            TypedValue::Bytes(_) => format!("[{arg}]"),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn arg_output(arg: &TypedValue) -> ArgOutput {
    let value = match arg {
        TypedValue::Integer(v) => serde_json::Value::from(*v),
        TypedValue::Float(v) => serde_json::Number::from_f64(*v)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        TypedValue::Boolean(v) => serde_json::Value::Bool(*v),
        TypedValue::Text(s) => serde_json::Value::String(s.clone()),
        TypedValue::Bytes(b) => {
            serde_json::Value::String(b.iter().map(|byte| format!("{byte:02x}")).collect())
        }
    };
    ArgOutput {
        kind: arg.kind().name(),
        value,
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pretty_args_match_demo_rendering() {
        let args = [
            TypedValue::Integer(-256),
            TypedValue::Boolean(true),
            TypedValue::from("Hello"),
            TypedValue::Float(f64::from(-1.1f32)),
            TypedValue::from(vec![0x41, 0x42, 0x43]),
        ];
        assert_eq!(
            pretty_args(&args),
            "-256, true, Hello, -1.100000, [0x41,0x42,0x43]"
        );
    }

    #[test]
    fn json_args_carry_kind_and_value() {
        let out = arg_output(&TypedValue::from(vec![0xAB, 0x01]));
        assert_eq!(out.kind, "bytes");
        assert_eq!(out.value, serde_json::json!("ab01"));

        let out = arg_output(&TypedValue::Float(f64::NAN));
        assert_eq!(out.value, serde_json::Value::Null);
    }
}

use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use rilbridge_call::{CallSnapshot, Event, Response, Status, Token};
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
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum HostOutput<'a> {
    Completion {
        token: Token,
        status: Status,
        response: &'a Response,
        timestamp: String,
    },
    Event {
        event: Event,
        timestamp: String,
    },
}

/// One message recovered from a capture.
#[derive(Serialize)]
pub struct DecodedOutput {
    pub offset: usize,
    pub opcode: u16,
    pub name: &'static str,
    pub size: usize,
    pub decoded: String,
}

pub fn print_completion(token: Token, status: Status, response: &Response, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&HostOutput::Completion {
            token,
            status,
            response,
            timestamp: now_unix_seconds(),
        }),
        OutputFormat::Table => match response {
            Response::Calls(calls) => {
                println!("{token} {}", status_name(status));
                println!("{}", calls_table(calls));
            }
            other => {
                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(vec!["TOKEN", "STATUS", "RESPONSE"])
                    .add_row(vec![
                        token.to_string(),
                        status_name(status).to_string(),
                        response_summary(other),
                    ]);
                println!("{table}");
            }
        },
        OutputFormat::Pretty => {
            println!(
                "token={token} status={} response={}",
                status_name(status),
                response_summary(response)
            );
        }
    }
}

pub fn print_event(event: Event, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&HostOutput::Event {
            event,
            timestamp: now_unix_seconds(),
        }),
        OutputFormat::Table | OutputFormat::Pretty => println!("event={}", event_name(event)),
    }
}

pub fn print_decoded(messages: &[DecodedOutput], dropped: &[String], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            for message in messages {
                print_json(message);
            }
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["OFFSET", "OPCODE", "NAME", "SIZE", "DECODED"]);
            for message in messages {
                table.add_row(vec![
                    message.offset.to_string(),
                    format!("{:#06x}", message.opcode),
                    message.name.to_string(),
                    message.size.to_string(),
                    message.decoded.clone(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for message in messages {
                println!(
                    "offset={} opcode={:#06x} ({}) size={} {}",
                    message.offset, message.opcode, message.name, message.size, message.decoded
                );
            }
        }
    }
    for reason in dropped {
        eprintln!("dropped: {reason}");
    }
}

fn calls_table(calls: &[CallSnapshot]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["INDEX", "CALL ID", "STATE", "DIR", "NUMBER", "TOA"]);
    for call in calls {
        table.add_row(vec![
            call.index.to_string(),
            call.call_id.to_string(),
            call.state.to_string(),
            if call.mobile_terminated { "MT" } else { "MO" }.to_string(),
            call.number.clone(),
            call.toa.to_string(),
        ]);
    }
    table
}

fn response_summary(response: &Response) -> String {
    match response {
        Response::None => "-".to_string(),
        Response::FailCause(cause) => format!("fail_cause={cause}"),
        Response::Calls(calls) => {
            let entries: Vec<String> = calls
                .iter()
                .map(|c| format!("{}:{}:{}:{}", c.index, c.call_id, c.state, c.number))
                .collect();
            format!("calls=[{}]", entries.join(", "))
        }
    }
}

fn status_name(status: Status) -> &'static str {
    match status {
        Status::Success => "success",
        Status::GenericFailure => "generic_failure",
    }
}

fn event_name(event: Event) -> &'static str {
    match event {
        Event::CallRing => "call_ring",
        Event::CallStateChanged => "call_state_changed",
    }
}

fn print_json<T: Serialize>(value: &T) {
    let line = serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string());
    let mut out = std::io::stdout().lock();
    let _ = writeln!(out, "{line}");
    let _ = out.flush();
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

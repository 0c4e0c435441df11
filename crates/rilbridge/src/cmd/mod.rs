use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use rilbridge_call::MAX_CALLS;
use rilbridge_frame::{DEFAULT_MAX_MESSAGE, MAX_SINGLE_FRAME_DATA};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod decode;
pub mod run;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Bridge stdin requests to a baseband and print completions and events.
    Run(RunArgs),
    /// Decode a captured baseband byte stream.
    Decode(DecodeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Run(args) => run::run(args, format),
        Command::Decode(args) => decode::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Modem tty device, or a Unix socket path with --socket.
    #[arg(env = "RILBRIDGE_DEVICE")]
    pub device: PathBuf,
    /// Connect to DEVICE as a Unix socket instead of opening a tty.
    #[arg(long)]
    pub socket: bool,
    /// Number of call slots.
    #[arg(long, env = "RILBRIDGE_MAX_CALLS", default_value_t = MAX_CALLS)]
    pub max_calls: usize,
    /// Pause between stopping and restarting a DTMF tone (e.g. 300us, 1ms).
    #[arg(long, env = "RILBRIDGE_DTMF_SETTLE", default_value = "300us")]
    pub dtmf_settle: String,
    /// Pause before resuming a held call after hanging up (e.g. 300ms).
    #[arg(long, env = "RILBRIDGE_RESUME_SETTLE", default_value = "300ms")]
    pub resume_settle: String,
    /// Pause before answering a waiting call after holding (e.g. 500ms).
    #[arg(long, env = "RILBRIDGE_HOLD_SETTLE", default_value = "500ms")]
    pub hold_settle: String,
    /// Largest data chunk per frame before a message is fragmented.
    #[arg(long, env = "RILBRIDGE_FRAGMENT_SIZE", default_value_t = MAX_SINGLE_FRAME_DATA)]
    pub fragment_size: usize,
    /// Largest reassembled message accepted from the baseband.
    #[arg(long, env = "RILBRIDGE_MAX_MESSAGE", default_value_t = DEFAULT_MAX_MESSAGE)]
    pub max_message: usize,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Capture file holding raw link bytes.
    pub file: PathBuf,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `300us`, `150ms`, `2s` or a bare number of milliseconds. Zero is allowed.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("us") {
        (num, "us")
    } else if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "ms")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    match unit {
        "us" => Ok(Duration::from_micros(value)),
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        _ => Err(CliError::new(
            USAGE,
            format!("unsupported duration unit: {unit}"),
        )),
    }
}

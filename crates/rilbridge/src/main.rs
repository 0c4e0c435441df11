mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "rilbridge", version, about = "Baseband telephony bridge")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", env = "RILBRIDGE_FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(
        long,
        value_name = "FORMAT",
        env = "RILBRIDGE_LOG_FORMAT",
        default_value = "text",
        global = true
    )]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(
        long,
        value_name = "LEVEL",
        env = "RILBRIDGE_LOG_LEVEL",
        default_value = "info",
        global = true
    )]
    log_level: LogLevel,

    /// Log level for frame and transport detail (defaults to --log-level).
    #[arg(
        long,
        value_name = "LEVEL",
        env = "RILBRIDGE_WIRE_LOG_LEVEL",
        global = true
    )]
    wire_log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level, cli.wire_log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_subcommand_with_tuning() {
        let cli = Cli::try_parse_from([
            "rilbridge",
            "run",
            "/dev/ttyS1",
            "--max-calls",
            "2",
            "--hold-settle",
            "0ms",
        ])
        .expect("run args should parse");

        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.max_calls, 2);
        assert_eq!(args.hold_settle, "0ms");
        assert_eq!(args.resume_settle, "300ms");
        assert!(!args.socket);
    }

    #[test]
    fn parses_decode_with_global_format() {
        let cli = Cli::try_parse_from(["rilbridge", "decode", "capture.bin", "--format", "json"])
            .expect("decode args should parse");
        assert!(matches!(cli.command, Command::Decode(_)));
        assert!(matches!(cli.format, Some(OutputFormat::Json)));
        assert!(cli.wire_log_level.is_none());
    }

    #[test]
    fn parses_wire_log_level() {
        let cli = Cli::try_parse_from(["rilbridge", "--wire-log-level", "trace", "version"])
            .expect("wire level should parse");
        assert!(matches!(cli.wire_log_level, Some(LogLevel::Trace)));
    }

    #[test]
    fn rejects_unknown_log_level() {
        let err = Cli::try_parse_from(["rilbridge", "--log-level", "loud", "version"])
            .expect_err("bad level should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidValue);
    }
}

use std::io::BufRead;
use std::os::unix::net::UnixStream;
use std::sync::Arc;
use std::thread;

use rilbridge_call::{BridgeConfig, Dispatcher, Event, Host, Link, Request, Response, Status, Token};
use rilbridge_frame::{FrameConfig, MAX_FRAME_PAYLOAD};
use rilbridge_transport::{open_raw_tty, ModemStream};
use tracing::{info, warn};

use crate::cmd::{parse_duration, RunArgs};
use crate::exit::{
    call_error, io_error, transport_error, CliError, CliResult, INTERNAL, INTERRUPTED, USAGE,
};
use crate::output::{print_completion, print_event, OutputFormat};

/// Host that prints every completion and event to stdout.
struct StdoutHost {
    format: OutputFormat,
}

impl Host for StdoutHost {
    fn complete(&self, token: Token, status: Status, response: Response) {
        print_completion(token, status, &response, self.format);
    }

    fn emit_unsolicited(&self, event: Event) {
        print_event(event, self.format);
    }
}

pub fn run(args: RunArgs, format: OutputFormat) -> CliResult<i32> {
    let config = bridge_config(&args)?;
    let stream = open_stream(&args)?;
    let writer = stream
        .try_clone()
        .map_err(|err| transport_error("failed to split modem stream", err))?;

    let host: Arc<dyn Host> = Arc::new(StdoutHost { format });
    let frame_config = config.frame.clone();
    let link = Link::new(writer, host, config);
    install_ctrlc_handler(link.clone())?;

    let requests = link.clone();
    thread::Builder::new()
        .name("stdin".into())
        .spawn(move || read_requests(std::io::stdin().lock(), &requests))
        .map_err(|err| io_error("failed to start request reader", err))?;

    info!(
        device = %args.device.display(),
        transport = stream.transport_name(),
        "bridge running"
    );
    let mut dispatcher = Dispatcher::with_config(stream, link.clone(), frame_config);
    let Err(err) = dispatcher.run();
    link.shutdown();
    Err(call_error("baseband link failed", err))
}

fn bridge_config(args: &RunArgs) -> CliResult<BridgeConfig> {
    if args.max_calls == 0 {
        return Err(CliError::new(USAGE, "--max-calls must be at least 1"));
    }
    if args.fragment_size == 0 || args.fragment_size > MAX_FRAME_PAYLOAD {
        return Err(CliError::new(
            USAGE,
            format!("--fragment-size must be 1..={MAX_FRAME_PAYLOAD}"),
        ));
    }
    Ok(BridgeConfig {
        max_calls: args.max_calls,
        dtmf_settle: parse_duration(&args.dtmf_settle)?,
        resume_settle: parse_duration(&args.resume_settle)?,
        hold_settle: parse_duration(&args.hold_settle)?,
        frame: FrameConfig {
            fragment_size: args.fragment_size,
            max_message_size: args.max_message,
            ..FrameConfig::default()
        },
    })
}

fn open_stream(args: &RunArgs) -> CliResult<ModemStream> {
    if args.socket {
        let stream = UnixStream::connect(&args.device).map_err(|err| {
            io_error(&format!("failed to connect {}", args.device.display()), err)
        })?;
        return Ok(ModemStream::from_unix(stream));
    }
    open_raw_tty(&args.device).map_err(|err| transport_error("failed to open modem", err))
}

/// Feed request lines to the link until stdin closes or the link fails.
fn read_requests<R: BufRead>(input: R, link: &Link<ModemStream>) {
    let mut next_token = 1u64;
    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                warn!(error = %err, "stdin read failed");
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let request = match parse_request(line) {
            Ok(request) => request,
            Err(message) => {
                eprintln!("error: {message}");
                continue;
            }
        };

        let token = Token(next_token);
        next_token += 1;
        info!(%token, request = request.name(), "request");
        if let Err(err) = link.request(token, request) {
            warn!(error = %err, "link failed while issuing request");
            break;
        }
    }
    info!("request input closed");
}

/// Parse one request line.
pub fn parse_request(line: &str) -> Result<Request, String> {
    let mut words = line.split_whitespace();
    let verb = words.next().unwrap_or_default();
    let arg = words.next();
    if let Some(extra) = words.nth(usize::from(verb == "dial")) {
        return Err(format!("unexpected argument: {extra}"));
    }

    let request = match (verb, arg) {
        ("dial", Some(number)) => Request::Dial {
            number: number.to_string(),
            clir: parse_clir(line)?,
        },
        ("hangup", Some(index)) => Request::Hangup {
            index: index
                .parse()
                .map_err(|_| format!("invalid call index: {index}"))?,
        },
        ("answer", None) => Request::Answer,
        ("switch", None) => Request::SwitchWaitingOrHoldingAndActive,
        ("hangup-background", None) => Request::HangupWaitingOrBackground,
        ("hangup-foreground", None) => Request::HangupForegroundResumeBackground,
        ("calls", None) => Request::GetCurrentCalls,
        ("fail-cause", None) => Request::LastCallFailCause,
        ("dtmf", Some(tone)) => Request::Dtmf {
            tone: parse_tone(tone)?,
        },
        ("dtmf-start", Some(tone)) => Request::DtmfStart {
            tone: parse_tone(tone)?,
        },
        ("dtmf-stop", None) => Request::DtmfStop,
        ("dial" | "hangup" | "dtmf" | "dtmf-start", None) => {
            return Err(format!("{verb} needs an argument"))
        }
        (_, _) => return Err(format!("unrecognised request: {line}")),
    };
    Ok(request)
}

/// Optional third word of a dial line.
fn parse_clir(line: &str) -> Result<u32, String> {
    match line.split_whitespace().nth(2) {
        None => Ok(0),
        Some(value) => value
            .parse()
            .map_err(|_| format!("invalid CLIR mode: {value}")),
    }
}

fn parse_tone(value: &str) -> Result<u8, String> {
    match value.as_bytes() {
        [tone] => Ok(*tone),
        _ => Err(format!("DTMF tone must be a single character: {value}")),
    }
}

fn install_ctrlc_handler(link: Link<ModemStream>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        info!("interrupted; failing outstanding requests");
        link.shutdown();
        std::process::exit(INTERRUPTED);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_request_verb() {
        let cases = [
            ("dial 5551234", Request::Dial { number: "5551234".into(), clir: 0 }),
            ("dial +4412 1", Request::Dial { number: "+4412".into(), clir: 1 }),
            ("hangup 2", Request::Hangup { index: 2 }),
            ("answer", Request::Answer),
            ("switch", Request::SwitchWaitingOrHoldingAndActive),
            ("hangup-background", Request::HangupWaitingOrBackground),
            ("hangup-foreground", Request::HangupForegroundResumeBackground),
            ("calls", Request::GetCurrentCalls),
            ("fail-cause", Request::LastCallFailCause),
            ("dtmf #", Request::Dtmf { tone: b'#' }),
            ("dtmf-start 5", Request::DtmfStart { tone: b'5' }),
            ("dtmf-stop", Request::DtmfStop),
        ];
        for (line, expected) in cases {
            assert_eq!(parse_request(line).unwrap(), expected, "{line}");
        }
    }

    #[test]
    fn rejects_malformed_lines() {
        assert!(parse_request("dial").is_err());
        assert!(parse_request("hangup one").is_err());
        assert!(parse_request("answer now").is_err());
        assert!(parse_request("dial 1 2 3").is_err());
        assert!(parse_request("dtmf 12").is_err());
        assert!(parse_request("conference").is_err());
    }

    #[test]
    fn zero_fragment_size_is_usage_error() {
        let args = RunArgs {
            device: "/dev/null".into(),
            socket: false,
            max_calls: 4,
            dtmf_settle: "300us".into(),
            resume_settle: "300ms".into(),
            hold_settle: "500ms".into(),
            fragment_size: 0,
            max_message: 1024,
        };
        assert_eq!(bridge_config(&args).unwrap_err().code, USAGE);
    }
}

use std::fs;
use std::io::Cursor;

use rilbridge_call::protocol::{opcode_name, Command, Notification};
use rilbridge_frame::{FrameError, Message, MessageReader};

use crate::cmd::DecodeArgs;
use crate::exit::{frame_error, io_error, CliResult, SUCCESS};
use crate::output::{print_decoded, DecodedOutput, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let bytes = fs::read(&args.file)
        .map_err(|err| io_error(&format!("failed reading {}", args.file.display()), err))?;

    let (messages, dropped) = decode_stream(bytes)?;
    print_decoded(&messages, &dropped, format);
    Ok(SUCCESS)
}

/// Split a capture into messages. Malformed frames are reported, not fatal.
fn decode_stream(bytes: Vec<u8>) -> CliResult<(Vec<DecodedOutput>, Vec<String>)> {
    let mut reader = MessageReader::new(Cursor::new(bytes));
    let mut messages = Vec::new();
    let mut dropped = Vec::new();
    let mut start = 0usize;

    loop {
        let result = reader.receive_assembled();
        let position = reader.get_ref().position() as usize;
        match result {
            Ok(Some(message)) => {
                messages.push(describe(start, &message));
                start = position;
            }
            Ok(None) => {}
            Err(FrameError::ConnectionClosed) => break,
            Err(err) if err.is_recoverable() => {
                dropped.push(format!("offset {start}: {err}"));
                start = position;
            }
            Err(err) => return Err(frame_error("decode failed", err)),
        }
        if reader.is_idle() {
            start = position;
        }
    }

    Ok((messages, dropped))
}

fn describe(offset: usize, message: &Message) -> DecodedOutput {
    let decoded = match Notification::decode(message) {
        Ok(Some(notification)) => format!("{notification:?}"),
        Ok(None) => match Command::decode(message) {
            Ok(Some(command)) => format!("{command:?}"),
            Ok(None) => "unknown".to_string(),
            Err(err) => format!("malformed: {err}"),
        },
        Err(err) => format!("malformed: {err}"),
    };
    DecodedOutput {
        offset,
        opcode: message.command,
        name: opcode_name(message.command),
        size: message.data.len(),
        decoded,
    }
}

use std::fs::OpenOptions;
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::stream::ModemStream;

/// Open a modem tty device node in raw mode (blocking).
///
/// The node is opened read/write without becoming the controlling terminal,
/// then switched to raw mode with `cfmakeraw` so the byte stream passes
/// through the line discipline untouched.
pub fn open_raw_tty(path: impl AsRef<Path>) -> Result<ModemStream> {
    let path = path.as_ref();
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_NOCTTY)
        .open(path)
        .map_err(|e| TransportError::Open {
            path: path.to_path_buf(),
            source: e,
        })?;

    let fd = file.as_raw_fd();
    make_raw(fd).map_err(|e| TransportError::Termios {
        path: path.to_path_buf(),
        source: e,
    })?;

    info!(?path, fd, "opened modem tty");
    Ok(ModemStream::from_tty(file))
}

fn make_raw(fd: std::os::fd::RawFd) -> std::io::Result<()> {
    // SAFETY: `termios` is plain old data; an all-zero value is a valid
    // placeholder that tcgetattr overwrites before any field is read.
    let mut termios: libc::termios = unsafe { std::mem::zeroed() };

    // SAFETY: `fd` is an open descriptor owned by the caller and `termios` is a
    // valid writable pointer for the duration of the call.
    if unsafe { libc::tcgetattr(fd, &mut termios) } != 0 {
        return Err(std::io::Error::last_os_error());
    }

    // SAFETY: `termios` was initialized by tcgetattr above.
    unsafe { libc::cfmakeraw(&mut termios) };

    // SAFETY: same descriptor and a fully initialized termios value.
    if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &termios) } != 0 {
        return Err(std::io::Error::last_os_error());
    }

    debug!(fd, "tty switched to raw mode");
    Ok(())
}

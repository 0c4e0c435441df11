use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;

use crate::error::{Result, TransportError};

/// Blocks until a transport has bytes ready to read.
///
/// The receive dispatcher waits on this before every receive so the read
/// itself never parks while the dispatcher holds shared state.
pub trait WaitReadable {
    /// Wait without timeout until the next read will not block.
    fn wait_readable(&self) -> Result<()>;
}

/// A connected modem stream implementing Read + Write.
///
/// Wraps either a raw tty device node or one end of a Unix socket pair.
pub struct ModemStream {
    inner: ModemStreamInner,
}

enum ModemStreamInner {
    Tty(File),
    Unix(UnixStream),
}

impl Read for ModemStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            ModemStreamInner::Tty(file) => file.read(buf),
            ModemStreamInner::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for ModemStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            ModemStreamInner::Tty(file) => file.write(buf),
            ModemStreamInner::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            ModemStreamInner::Tty(file) => file.flush(),
            ModemStreamInner::Unix(stream) => stream.flush(),
        }
    }
}

impl ModemStream {
    /// Create a ModemStream from an already configured tty file.
    pub(crate) fn from_tty(file: File) -> Self {
        Self {
            inner: ModemStreamInner::Tty(file),
        }
    }

    /// Create a ModemStream from a Unix socket stream.
    pub fn from_unix(stream: UnixStream) -> Self {
        Self {
            inner: ModemStreamInner::Unix(stream),
        }
    }

    /// Create a connected pair of streams.
    ///
    /// One end plays the host side, the other a simulated baseband.
    pub fn pair() -> Result<(Self, Self)> {
        let (left, right) = UnixStream::pair()?;
        Ok((Self::from_unix(left), Self::from_unix(right)))
    }

    /// Try to clone this stream (creates a new file descriptor).
    ///
    /// Used to split one link into a reader half and a writer half.
    pub fn try_clone(&self) -> Result<Self> {
        match &self.inner {
            ModemStreamInner::Tty(file) => Ok(Self::from_tty(file.try_clone()?)),
            ModemStreamInner::Unix(stream) => Ok(Self::from_unix(stream.try_clone()?)),
        }
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match &self.inner {
            ModemStreamInner::Tty(_) => "tty",
            ModemStreamInner::Unix(_) => "unix-socket-pair",
        }
    }
}

impl AsRawFd for ModemStream {
    fn as_raw_fd(&self) -> RawFd {
        match &self.inner {
            ModemStreamInner::Tty(file) => file.as_raw_fd(),
            ModemStreamInner::Unix(stream) => stream.as_raw_fd(),
        }
    }
}

impl WaitReadable for ModemStream {
    fn wait_readable(&self) -> Result<()> {
        poll_readable(self.as_raw_fd())
    }
}

fn poll_readable(fd: RawFd) -> Result<()> {
    let mut pfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };

    loop {
        // SAFETY: `pfd` is a single valid, writable pollfd and the count passed is 1.
        // `fd` is owned by the ModemStream borrowed for the duration of this call.
        let rc = unsafe { libc::poll(&mut pfd, 1, -1) };
        if rc < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == ErrorKind::Interrupted {
                continue;
            }
            return Err(TransportError::Io(err));
        }

        if pfd.revents & libc::POLLIN != 0 {
            return Ok(());
        }
        if pfd.revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0 {
            return Err(TransportError::HungUp {
                revents: pfd.revents,
            });
        }
    }
}

impl std::fmt::Debug for ModemStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModemStream")
            .field("type", &self.transport_name())
            .field("fd", &self.as_raw_fd())
            .finish()
    }
}

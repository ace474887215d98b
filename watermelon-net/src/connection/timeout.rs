use std::{io, net::TcpStream, time::Duration};

/// A socket that supports arming a deadline on its next blocking read.
///
/// The [`Client::process`](https://docs.rs/rillwater) loop re-arms this on every call with the
/// remaining budget of the whole `process` invocation, not a fresh per-read timeout.
pub trait SetReadTimeout {
    /// Sets or clears the read timeout, same semantics as [`TcpStream::set_read_timeout`].
    ///
    /// # Errors
    ///
    /// Returns an error if the platform rejects the given duration.
    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()>;
}

impl SetReadTimeout for TcpStream {
    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        TcpStream::set_read_timeout(self, timeout)
    }
}

use std::{
    io::{self, IoSlice, Read, Write},
    time::Duration,
};

use bytes::{Buf, BufMut};
use rillwater_proto::{
    error::ServerError,
    proto::{error::DecoderError, ClientOp, ServerOp, StreamDecoder, StreamEncoder},
    Connect,
};

pub use self::timeout::SetReadTimeout;

mod timeout;

/// Largest chunk read from the socket per syscall.
const READ_CHUNK: usize = 64 * 1024;

/// Stop enqueuing further writes once the encoder backlog reaches this size.
const MAX_ENQUEUED_WRITES: usize = 8_290_304;

/// A blocking NATS Core connection over an arbitrary [`Read`] + [`Write`] socket.
#[derive(Debug)]
pub struct Connection<S> {
    socket: S,
    encoder: StreamEncoder,
    decoder: StreamDecoder,
    may_flush: bool,
}

impl<S> Connection<S>
where
    S: Read + Write + SetReadTimeout,
{
    #[must_use]
    pub fn new(socket: S) -> Self {
        Self {
            socket,
            encoder: StreamEncoder::new(),
            decoder: StreamDecoder::new(),
            may_flush: false,
        }
    }

    /// Reads the next [`ServerOp`], blocking for at most `timeout`.
    ///
    /// `timeout` is the remaining budget of the enclosing call, not a fresh
    /// per-read duration: callers re-arm it on every iteration with whatever
    /// time is left.
    ///
    /// # Errors
    ///
    /// Returns an error if the content cannot be decoded, if the deadline
    /// elapses, or if an I/O error occurs.
    pub fn read_next(&mut self, timeout: Option<Duration>) -> Result<ServerOp, ConnectionReadError> {
        loop {
            if let Some(op) = self
                .decoder
                .decode()
                .map_err(ConnectionReadError::Decoder)?
            {
                return Ok(op);
            }

            self.socket
                .set_read_timeout(timeout)
                .map_err(ConnectionReadError::Io)?;

            let mut chunk = [0; READ_CHUNK];
            match self.socket.read(&mut chunk) {
                Ok(0) => {
                    return Err(ConnectionReadError::Io(
                        io::ErrorKind::UnexpectedEof.into(),
                    ))
                }
                Ok(n) => {
                    self.decoder.read_buf().put_slice(&chunk[..n]);
                }
                Err(err)
                    if matches!(
                        err.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                    ) =>
                {
                    return Err(ConnectionReadError::TimedOut)
                }
                Err(err) => return Err(ConnectionReadError::Io(err)),
            }
        }
    }

    pub fn may_write(&self) -> bool {
        self.encoder.has_remaining()
    }

    pub fn should_flush(&self) -> bool {
        self.may_flush
    }

    pub fn may_enqueue_more_ops(&self) -> bool {
        self.encoder.remaining() < MAX_ENQUEUED_WRITES
    }

    pub fn enqueue_write_op(&mut self, item: &ClientOp) {
        self.encoder.enqueue_write_op(item);
    }

    /// Writes the next chunk of enqueued data to the socket.
    ///
    /// It returns the number of bytes that have been written.
    ///
    /// # Errors
    ///
    /// An I/O error is returned if it is not possible to write to the socket.
    pub fn write_next(&mut self) -> io::Result<usize> {
        if !self.encoder.has_remaining() {
            return Ok(0);
        }

        let mut bufs = [IoSlice::new(&[]); 64];
        let n = self.encoder.chunks_vectored(&mut bufs);
        debug_assert!(n > 0);

        let written = self.socket.write_vectored(&bufs[..n])?;
        self.encoder.advance(written);
        self.may_flush = true;
        Ok(written)
    }

    /// Convenience function for writing all enqueued messages and flushing.
    ///
    /// # Errors
    ///
    /// Returns an error if writing or flushing fails.
    pub fn write_and_flush(&mut self) -> io::Result<()> {
        while self.may_write() {
            self.write_next()?;
        }
        self.flush()
    }

    /// Flush any buffered writes to the connection.
    ///
    /// # Errors
    ///
    /// Returns an error if flushing fails.
    pub fn flush(&mut self) -> io::Result<()> {
        self.socket.flush()?;
        self.may_flush = false;
        Ok(())
    }

    /// Shutdown the connection.
    ///
    /// # Errors
    ///
    /// Returns an error if shutting down the connection fails.
    /// Implementations usually ignore this error.
    pub fn shutdown(&mut self) -> io::Result<()>
    where
        S: ShutdownSocket,
    {
        self.socket.shutdown_socket()
    }

    pub fn socket(&self) -> &S {
        &self.socket
    }

    pub fn socket_mut(&mut self) -> &mut S {
        &mut self.socket
    }

    pub fn replace_socket<F, S2>(self, replacer: F) -> Connection<S2>
    where
        F: FnOnce(S) -> S2,
    {
        Connection {
            socket: replacer(self.socket),
            encoder: self.encoder,
            decoder: self.decoder,
            may_flush: self.may_flush,
        }
    }

    pub fn into_inner(self) -> S {
        self.socket
    }
}

/// Sockets that can be cleanly shut down, e.g. [`TcpStream::shutdown`](std::net::TcpStream::shutdown).
pub trait ShutdownSocket {
    /// Shuts down the read and write halves of the socket.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform rejects the shutdown request.
    fn shutdown_socket(&self) -> io::Result<()>;
}

impl ShutdownSocket for std::net::TcpStream {
    fn shutdown_socket(&self) -> io::Result<()> {
        self.shutdown(std::net::Shutdown::Both)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectionReadError {
    #[error("decoder")]
    Decoder(#[source] DecoderError),
    #[error("io")]
    Io(#[source] io::Error),
    #[error("timed out")]
    TimedOut,
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("proto")]
    Proto(#[source] DecoderError),
    #[error("server")]
    ServerError(#[source] ServerError),
    #[error("io")]
    Io(#[source] io::Error),
    #[error("timed out")]
    TimedOut,
    #[error("unexpected ServerOp")]
    UnexpectedOp,
}

/// Send the `CONNECT` command to a pre-established connection `conn`, then
/// wait for the server's acknowledgement via the `PING`/`PONG` round-trip.
///
/// # Errors
///
/// Returns an error if connecting fails.
pub fn connect<S, F>(
    conn: &mut Connection<S>,
    connect: Connect,
    timeout: Option<Duration>,
    after_connect: F,
) -> Result<(), ConnectError>
where
    S: Read + Write + SetReadTimeout,
    F: FnOnce(&mut Connection<S>),
{
    conn.enqueue_write_op(&ClientOp::Connect {
        connect: Box::new(connect),
    });
    conn.write_and_flush().map_err(ConnectError::Io)?;

    after_connect(conn);
    conn.enqueue_write_op(&ClientOp::Ping);
    conn.write_and_flush().map_err(ConnectError::Io)?;

    loop {
        match conn.read_next(timeout) {
            Ok(ServerOp::Success) => {
                // Success. Repeat to receive the PONG
            }
            Ok(ServerOp::Pong) => {
                // Success. We've received the PONG,
                // possibly after having received OK.
                return Ok(());
            }
            Ok(ServerOp::Ping) => {
                // I guess this could somehow happen. Handle it and repeat
                conn.enqueue_write_op(&ClientOp::Pong);
            }
            Ok(ServerOp::Error { error }) => {
                tracing::warn!(%error, "server rejected CONNECT");
                return Err(ConnectError::ServerError(error));
            }
            Ok(ServerOp::Info { .. } | ServerOp::Message { .. }) => {
                return Err(ConnectError::UnexpectedOp);
            }
            Err(ConnectionReadError::Decoder(err)) => return Err(ConnectError::Proto(err)),
            Err(ConnectionReadError::Io(err)) => return Err(ConnectError::Io(err)),
            Err(ConnectionReadError::TimedOut) => return Err(ConnectError::TimedOut),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::{self, Read, Write},
        time::Duration,
    };

    use rillwater_proto::proto::ClientOp;

    use super::{Connection, SetReadTimeout};

    /// An in-memory loopback socket good enough to drive `Connection` in tests.
    struct Loopback {
        inbound: io::Cursor<Vec<u8>>,
        outbound: Vec<u8>,
    }

    impl Read for Loopback {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.inbound.read(buf)?;
            if n == 0 {
                Err(io::ErrorKind::WouldBlock.into())
            } else {
                Ok(n)
            }
        }
    }

    impl Write for Loopback {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.outbound.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SetReadTimeout for Loopback {
        fn set_read_timeout(&self, _timeout: Option<Duration>) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn ping_pong() {
        let socket = Loopback {
            inbound: io::Cursor::new(b"PONG\r\n".to_vec()),
            outbound: Vec::new(),
        };
        let mut client = Connection::new(socket);

        client.enqueue_write_op(&ClientOp::Ping);
        client.write_and_flush().unwrap();
        assert_eq!(client.socket().outbound, b"PING\r\n");

        let op = client.read_next(None).unwrap();
        assert!(matches!(op, rillwater_proto::proto::ServerOp::Pong));
    }
}

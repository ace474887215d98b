use std::{
    io::{self, Read, Write},
    sync::Arc,
    time::Duration,
};

use rustls::{pki_types::ServerName, ClientConfig, ClientConnection, StreamOwned};
use rillwater_net::{SetReadTimeout, ShutdownSocket};

#[derive(Debug)]
pub enum ConnectionSecurity<S> {
    Plain(S),
    Tls(Box<StreamOwned<ClientConnection, S>>),
}

impl<S> ConnectionSecurity<S>
where
    S: Read + Write,
{
    pub(crate) fn upgrade_tls(
        self,
        config: Arc<ClientConfig>,
        domain: ServerName<'static>,
    ) -> io::Result<Self> {
        let Self::Plain(mut sock) = self else {
            unreachable!("trying to upgrade to Tls a Tls connection")
        };

        let mut conn = ClientConnection::new(config, domain)
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
        conn.complete_io(&mut sock)?;

        Ok(Self::Tls(Box::new(StreamOwned::new(conn, sock))))
    }
}

impl<S> Read for ConnectionSecurity<S>
where
    S: Read + Write,
{
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Plain(conn) => conn.read(buf),
            Self::Tls(conn) => conn.read(buf),
        }
    }
}

impl<S> Write for ConnectionSecurity<S>
where
    S: Read + Write,
{
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Plain(conn) => conn.write(buf),
            Self::Tls(conn) => conn.write(buf),
        }
    }

    fn write_vectored(&mut self, bufs: &[io::IoSlice<'_>]) -> io::Result<usize> {
        match self {
            Self::Plain(conn) => conn.write_vectored(bufs),
            Self::Tls(conn) => conn.write_vectored(bufs),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Plain(conn) => conn.flush(),
            Self::Tls(conn) => conn.flush(),
        }
    }
}

impl<S> SetReadTimeout for ConnectionSecurity<S>
where
    S: SetReadTimeout,
{
    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        match self {
            Self::Plain(conn) => conn.set_read_timeout(timeout),
            Self::Tls(conn) => conn.sock.set_read_timeout(timeout),
        }
    }
}

impl<S> ShutdownSocket for ConnectionSecurity<S>
where
    S: ShutdownSocket,
{
    fn shutdown_socket(&self) -> io::Result<()> {
        match self {
            Self::Plain(conn) => conn.shutdown_socket(),
            Self::Tls(conn) => conn.sock.shutdown_socket(),
        }
    }
}

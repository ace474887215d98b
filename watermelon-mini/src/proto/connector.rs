use std::{io, net::TcpStream, sync::Arc, time::Duration};

use rillwater_net::{connect_tcp, error::ConnectionReadError, proto_connect, Connection};
use rillwater_proto::{
    proto::{error::DecoderError, ServerOp},
    Connect, Host, Protocol, ServerAddr, ServerInfo, Transport,
};
use rustls::{
    pki_types::{InvalidDnsNameError, ServerName},
    ClientConfig,
};

use crate::ConnectFlags;

use super::{
    authenticator::{AuthenticationError, AuthenticationMethod},
    connection::ConnectionSecurity,
};

#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("io error")]
    Io(#[source] io::Error),
    #[error("invalid DNS name")]
    InvalidDnsName(#[source] InvalidDnsNameError),
    #[error("unexpected ServerOp")]
    UnexpectedServerOp,
    #[error("websocket transport is not supported")]
    WebsocketUnsupported,
    #[error("decoder error")]
    Decoder(#[source] DecoderError),
    #[error("authentication error")]
    Authentication(#[source] AuthenticationError),
    #[error("timed out")]
    TimedOut,
    #[error("connect")]
    Connect(#[source] rillwater_net::error::ConnectError),
}

pub(crate) fn connect(
    tls_config: &Arc<ClientConfig>,
    addr: &ServerAddr,
    client_name: String,
    auth_method: Option<&AuthenticationMethod>,
    timeout: Option<Duration>,
    flags: ConnectFlags,
) -> Result<(Connection<ConnectionSecurity<TcpStream>>, Box<ServerInfo>), ConnectError> {
    if addr.transport() != Transport::TCP {
        return Err(ConnectError::WebsocketUnsupported);
    }

    tracing::debug!(%addr, "dialing");
    let sock = connect_tcp(addr).map_err(ConnectError::Io)?;
    sock.set_nodelay(true).map_err(ConnectError::Io)?;
    let mut secure = ConnectionSecurity::Plain(sock);

    if matches!(addr.protocol(), Protocol::TLS) {
        let domain = rustls_server_name_from_addr(addr).map_err(ConnectError::InvalidDnsName)?;
        secure = secure
            .upgrade_tls(Arc::clone(tls_config), domain.to_owned())
            .map_err(ConnectError::Io)?;
    }

    let mut conn = Connection::new(secure);
    let info = match conn.read_next(timeout) {
        Ok(ServerOp::Info { info }) => info,
        Ok(_) => return Err(ConnectError::UnexpectedServerOp),
        Err(ConnectionReadError::Io(err)) => return Err(ConnectError::Io(err)),
        Err(ConnectionReadError::Decoder(err)) => return Err(ConnectError::Decoder(err)),
        Err(ConnectionReadError::TimedOut) => return Err(ConnectError::TimedOut),
    };

    let mut conn = if matches!(
        (addr.protocol(), info.tls_required),
        (Protocol::PossiblyPlain, true)
    ) {
        let domain = rustls_server_name_from_addr(addr).map_err(ConnectError::InvalidDnsName)?;
        conn.replace_socket(|secure| {
            secure
                .upgrade_tls(Arc::clone(tls_config), domain.to_owned())
                .expect("re-dialing an already open socket for TLS cannot fail at the TCP layer")
        })
    } else {
        conn
    };

    let auth;
    let auth_method = if let Some(auth_method) = auth_method {
        Some(auth_method)
    } else if let Some(auth_method) = AuthenticationMethod::try_from_addr(addr) {
        auth = auth_method;
        Some(&auth)
    } else {
        None
    };

    let mut connect = Connect {
        verbose: flags.verbose,
        pedantic: flags.pedantic,
        require_tls: false,
        auth_token: None,
        username: None,
        password: None,
        client_name: Some(client_name),
        client_lang: "rust-rillwater",
        client_version: env!("CARGO_PKG_VERSION"),
        protocol: 1,
        echo: flags.echo,
        signature: None,
        jwt: None,
        supports_no_responders: true,
        supports_headers: true,
        nkey: None,
    };
    if let Some(auth_method) = auth_method {
        auth_method
            .prepare_for_auth(&info, &mut connect)
            .map_err(ConnectError::Authentication)?;
    }

    proto_connect(&mut conn, connect, timeout, |_conn| {})
        .map_err(ConnectError::Connect)?;

    tracing::debug!(%addr, server_id = %info.id, "handshake complete");
    Ok((conn, info))
}

fn rustls_server_name_from_addr(addr: &ServerAddr) -> Result<ServerName<'_>, InvalidDnsNameError> {
    match addr.host() {
        Host::Ip(addr) => Ok(ServerName::IpAddress((*addr).into())),
        Host::Dns(name) => <_ as AsRef<str>>::as_ref(name).try_into(),
    }
}

use std::{io, net::TcpStream};

use rillwater_proto::{Host, ServerAddr};

/// Connects to `addr` and returns a [`TcpStream`].
///
/// # Errors
///
/// It returns an error if it is not possible to connect to any of the
/// resolved addresses.
pub fn connect(addr: &ServerAddr) -> io::Result<TcpStream> {
    match addr.host() {
        Host::Ip(ip) => TcpStream::connect((*ip, addr.port())),
        Host::Dns(host) => {
            let host = <_ as AsRef<str>>::as_ref(host);
            TcpStream::connect((host, addr.port()))
        }
    }
}

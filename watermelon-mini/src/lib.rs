use std::{net::TcpStream, sync::Arc, time::Duration};

use rillwater_net::Connection;
use rillwater_proto::{ServerAddr, ServerInfo};
use rustls::{crypto::CryptoProvider, version::TLS13, ClientConfig};
use rustls_platform_verifier::Verifier;

pub use self::proto::{AuthenticationMethod, ConnectError, ConnectionSecurity};
use self::proto::connect;

mod proto;

#[derive(Debug, Clone, Default)]
#[non_exhaustive]
pub struct ConnectFlags {
    pub echo: bool,
    pub pedantic: bool,
    pub verbose: bool,
}

/// Connect to a given address with some reasonable presets.
///
/// The function is going to establish a TLS 1.3 connection, without the support of the client
/// authorization.
///
/// # Errors
///
/// This returns an error in case the connection fails.
#[expect(
    clippy::missing_panics_doc,
    reason = "the crypto_provider function always returns a provider that supports TLS 1.3"
)]
pub fn easy_connect(
    addr: &ServerAddr,
    auth: Option<&AuthenticationMethod>,
    timeout: Option<Duration>,
    flags: ConnectFlags,
) -> Result<(Connection<ConnectionSecurity<TcpStream>>, Box<ServerInfo>), ConnectError> {
    let provider = Arc::new(crypto_provider());
    let tls_config = Arc::new(
        ClientConfig::builder_with_provider(Arc::clone(&provider))
            .with_protocol_versions(&[&TLS13])
            .unwrap()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(Verifier::new().with_provider(provider)))
            .with_no_client_auth(),
    );

    connect(
        &tls_config,
        addr,
        "rillwater".to_owned(),
        auth,
        timeout,
        flags,
    )
}

fn crypto_provider() -> CryptoProvider {
    #[cfg(feature = "aws-lc-rs")]
    return rustls::crypto::aws_lc_rs::default_provider();
    #[cfg(all(not(feature = "aws-lc-rs"), feature = "ring"))]
    return rustls::crypto::ring::default_provider();
    #[cfg(not(any(feature = "aws-lc-rs", feature = "ring")))]
    compile_error!("Please enable the `aws-lc-rs` or the `ring` feature")
}

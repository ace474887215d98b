use std::time::Duration;

use rillwater_mini::{AuthenticationMethod, ConnectError};
use rillwater_proto::{ServerAddr, Subject};

#[cfg(feature = "from-env")]
use super::from_env::FromEnv;
use crate::core::Client;

/// A builder for [`Client`]
///
/// Obtained from [`Client::builder`].
#[derive(Debug)]
pub struct ClientBuilder {
    pub(crate) auth_method: Option<AuthenticationMethod>,
    pub(crate) flush_interval: Duration,
    pub(crate) inbox_prefix: Subject,
    pub(crate) echo: Echo,
    pub(crate) default_response_timeout: Duration,
    pub(crate) pedantic: bool,
    pub(crate) verbose: bool,
    pub(crate) delay: Option<Duration>,
    pub(crate) delay_mode: DelayMode,
    pub(crate) ping_interval: Duration,
    pub(crate) skip_invalid_messages: bool,
    pub(crate) tls_handshake_first: bool,
    pub(crate) tls_cert_file: Option<std::path::PathBuf>,
    pub(crate) tls_key_file: Option<std::path::PathBuf>,
    pub(crate) tls_ca_file: Option<std::path::PathBuf>,
}

/// Whether or not to allow messages published by this client to be echoed back to it's own subscriptions
#[derive(Debug, Copy, Clone, Default)]
pub enum Echo {
    /// Do not allow messages published by this client to be echoed back to it's own [`Subscription`]s
    ///
    /// [`Subscription`]: crate::core::Subscription
    #[default]
    Prevent,
    /// Allow messages published by this client to be echoed back to it's own [`Subscription`]s
    ///
    /// [`Subscription`]: crate::core::Subscription
    Allow,
}

/// How an initial reconnect [`ClientBuilder::delay`] is applied across successive attempts
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum DelayMode {
    /// Wait the same amount of time (`d₀`) before every reconnect attempt
    #[default]
    Constant,
    /// Wait `d₀ · (n + 1)` before the `n`th reconnect attempt
    Linear,
    /// Wait `d₀ · 10ⁿ` before the `n`th reconnect attempt
    Exponential,
}

impl DelayMode {
    /// The delay to apply before the `attempt`th reconnect attempt (0-indexed), given a
    /// base delay `d₀`
    pub(crate) fn delay_for(self, base: Duration, attempt: u32) -> Duration {
        match self {
            Self::Constant => base,
            Self::Linear => base.saturating_mul(attempt.saturating_add(1)),
            Self::Exponential => {
                let factor = 10u32.checked_pow(attempt).unwrap_or(u32::MAX);
                base.saturating_mul(factor)
            }
        }
    }
}

impl ClientBuilder {
    const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(2);

    pub(super) fn new() -> Self {
        Self {
            auth_method: None,
            flush_interval: Duration::ZERO,
            inbox_prefix: Subject::from_static("_INBOX"),
            echo: Echo::Prevent,
            default_response_timeout: Duration::from_secs(5),
            pedantic: false,
            verbose: true,
            delay: None,
            delay_mode: DelayMode::Constant,
            ping_interval: Self::DEFAULT_PING_INTERVAL,
            skip_invalid_messages: false,
            tls_handshake_first: false,
            tls_cert_file: None,
            tls_key_file: None,
            tls_ca_file: None,
        }
    }

    /// Construct [`ClientBuilder`] from environment variables
    ///
    /// Reads the following environment variables into [`ClientBuilder`]:
    ///
    /// Authentication:
    ///
    /// * `NATS_JWT` and `NATS_NKEY`: use nkey authentication
    /// * `NATS_CREDS_FILE`: read JWT and NKEY from the provided `.creds` file
    /// * `NATS_USERNAME` and `NATS_PASSWORD`: use username and password authentication
    ///
    /// Also reads `NATS_INBOX_PREFIX`. See [`ClientBuilder::server_addr_from_env`] for
    /// `NATS_HOST`/`NATS_PORT`, which this constructor doesn't consume.
    ///
    /// # Panics
    ///
    /// It panics if:
    ///
    /// - it is not possible to get the environment variables;
    /// - an error occurs when trying to read the credentials file;
    /// - the credentials file is invalid.
    #[cfg(feature = "from-env")]
    #[must_use]
    pub fn from_env() -> Self {
        use super::from_env;

        let env = envy::from_env::<FromEnv>().expect("FromEnv deserialization error");

        let mut this = Self::new();

        match env.auth {
            from_env::AuthenticationMethod::Creds { jwt, nkey } => {
                this = this.authentication_method(Some(AuthenticationMethod::Creds { jwt, nkey }));
            }
            from_env::AuthenticationMethod::CredsFile { creds_file } => {
                let contents = std::fs::read_to_string(creds_file).expect("read credentials file");
                let auth =
                    AuthenticationMethod::from_creds(&contents).expect("parse credentials file");
                this = this.authentication_method(Some(auth));
            }
            from_env::AuthenticationMethod::UserAndPassword { username, password } => {
                this = this.authentication_method(Some(AuthenticationMethod::UserAndPassword {
                    username,
                    password,
                }));
            }
            from_env::AuthenticationMethod::None => {
                this = this.authentication_method(None);
            }
        }

        if let Some(inbox_prefix) = env.inbox_prefix {
            this = this.inbox_prefix(inbox_prefix);
        }

        this
    }

    /// Construct a [`ServerAddr`] from the `NATS_HOST`/`NATS_PORT` environment variables
    ///
    /// Defaults to `localhost:4222` when either is unset. [`ClientBuilder::from_env`]
    /// doesn't produce an address itself, since [`ClientBuilder::connect`] takes one
    /// independently of the rest of the configuration.
    ///
    /// # Panics
    ///
    /// It panics if the environment variables can't be read or don't form a valid address.
    #[cfg(feature = "from-env")]
    #[must_use]
    pub fn server_addr_from_env() -> ServerAddr {
        let env = envy::from_env::<FromEnv>().expect("FromEnv deserialization error");
        let host = env.host.unwrap_or_else(|| "localhost".to_string());
        let port = env.port.unwrap_or(4222);
        format!("nats://{host}:{port}")
            .parse()
            .expect("NATS_HOST/NATS_PORT form a valid server address")
    }

    /// Define an authentication method
    #[must_use]
    pub fn authentication_method(mut self, auth_method: Option<AuthenticationMethod>) -> Self {
        self.auth_method = auth_method;
        self
    }

    /// Define a flush interval
    ///
    /// Setting a non-zero flush interval allows the client to generate
    /// larger TLS and TCP packets at the cost of increased latency. Using
    /// a value greater than a few seconds may break the client in
    /// unexpected ways.
    ///
    /// Setting this to [`Duration::ZERO`] causes the client to send messages
    /// as fast as the network will allow, trading off smaller packets for
    /// lower latency.
    ///
    /// Default: 0
    #[must_use]
    pub fn flush_interval(mut self, flush_interval: Duration) -> Self {
        self.flush_interval = flush_interval;
        self
    }

    /// Configure the inbox prefix to which replies from the NATS server will be received
    ///
    /// Default: `_INBOX`
    #[must_use]
    pub fn inbox_prefix(mut self, inbox_prefix: Subject) -> Self {
        self.inbox_prefix = inbox_prefix;
        self
    }

    /// Whether or not to allow messages published by this client to be echoed back to it's own [`Subscription`]s
    ///
    /// Setting this option to [`Echo::Allow`] will allow [`Subscription`]s created by
    /// this client to receive messages by itself published.
    ///
    /// Default: [`Echo::Prevent`].
    ///
    /// [`Subscription`]: crate::core::Subscription
    #[must_use]
    pub fn echo(mut self, echo: Echo) -> Self {
        self.echo = echo;
        self
    }

    /// The default timeout used by [`Client::request`]
    ///
    /// Default: 5 seconds.
    #[must_use]
    pub fn default_response_timeout(mut self, timeout: Duration) -> Self {
        self.default_response_timeout = timeout;
        self
    }

    /// Ask the server to validate subjects and queue names strictly
    ///
    /// Default: `false`.
    #[must_use]
    pub fn pedantic(mut self, pedantic: bool) -> Self {
        self.pedantic = pedantic;
        self
    }

    /// Ask the server to acknowledge every protocol message with `+OK`/`-ERR`
    ///
    /// This is required for subscribe-time permission errors to be observable; turning
    /// it off trades a small amount of traffic for silently dropped errors.
    ///
    /// Default: `true`.
    #[must_use]
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Wait this long before attempting to reconnect after losing the connection
    ///
    /// Default: no delay.
    #[must_use]
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// How [`ClientBuilder::delay`] grows across successive reconnect attempts
    ///
    /// Default: [`DelayMode::Constant`].
    #[must_use]
    pub fn delay_mode(mut self, delay_mode: DelayMode) -> Self {
        self.delay_mode = delay_mode;
        self
    }

    /// How often to send a keep-alive `PING` while idle
    ///
    /// Two consecutive unanswered `PING`s are treated as a dead connection.
    ///
    /// Default: 2 seconds.
    #[must_use]
    pub fn ping_interval(mut self, ping_interval: Duration) -> Self {
        self.ping_interval = ping_interval;
        self
    }

    /// Log and drop frames that fail to decode instead of treating them as fatal
    ///
    /// Default: `false`.
    #[must_use]
    pub fn skip_invalid_messages(mut self, skip_invalid_messages: bool) -> Self {
        self.skip_invalid_messages = skip_invalid_messages;
        self
    }

    /// Perform the TLS handshake before the server's `INFO` line instead of after it
    ///
    /// Default: `false`.
    #[must_use]
    pub fn tls_handshake_first(mut self, tls_handshake_first: bool) -> Self {
        self.tls_handshake_first = tls_handshake_first;
        self
    }

    /// Path to a client certificate used for mutual TLS
    #[must_use]
    pub fn tls_cert_file(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.tls_cert_file = Some(path.into());
        self
    }

    /// Path to the private key matching [`ClientBuilder::tls_cert_file`]
    #[must_use]
    pub fn tls_key_file(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.tls_key_file = Some(path.into());
        self
    }

    /// Path to a CA bundle used to verify the server's certificate
    #[must_use]
    pub fn tls_ca_file(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.tls_ca_file = Some(path.into());
        self
    }

    /// Creates a new [`Client`], connecting to the given address.
    ///
    /// Blocks for at most `timeout` (or indefinitely if `None`) while dialing and
    /// performing the handshake.
    ///
    /// # Errors
    ///
    /// It returns an error if the connection fails.
    pub fn connect(self, addr: &ServerAddr, timeout: Option<Duration>) -> Result<Client, ConnectError> {
        Client::connect(addr, self, timeout)
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::DelayMode;

    #[test]
    fn constant_never_grows() {
        let base = Duration::from_millis(50);
        for attempt in 0..5 {
            assert_eq!(base, DelayMode::Constant.delay_for(base, attempt));
        }
    }

    #[test]
    fn linear_grows_by_base_per_attempt() {
        let base = Duration::from_millis(10);
        assert_eq!(base, DelayMode::Linear.delay_for(base, 0));
        assert_eq!(base * 2, DelayMode::Linear.delay_for(base, 1));
        assert_eq!(base * 4, DelayMode::Linear.delay_for(base, 3));
    }

    #[test]
    fn exponential_grows_by_powers_of_ten() {
        let base = Duration::from_millis(1);
        assert_eq!(base, DelayMode::Exponential.delay_for(base, 0));
        assert_eq!(base * 10, DelayMode::Exponential.delay_for(base, 1));
        assert_eq!(base * 100, DelayMode::Exponential.delay_for(base, 2));
    }
}

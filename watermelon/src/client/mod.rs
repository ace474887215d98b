use std::{
    collections::{BTreeMap, VecDeque},
    net::TcpStream,
    num::NonZeroU64,
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, Instant},
};

use rillwater_mini::{easy_connect, ConnectError as MiniConnectError, ConnectFlags};
use rillwater_net::{error::ConnectionReadError, Connection};
use rillwater_proto::{
    error::ServerError,
    headers::{HeaderName, HeaderValue},
    proto::{error::DecoderError, ClientOp, ServerOp},
    MessageBase, QueueGroup, ServerAddr, ServerInfo, ServerMessage, Subject, SubscriptionId,
};

pub use rillwater_mini::AuthenticationMethod;

pub use self::builder::{ClientBuilder, DelayMode, Echo};
pub use self::commands::{
    ClientPublish, ClientRequest, Publish, PublishBuilder, Request, RequestBuilder, ResponseError,
    ResponseHandle,
};
pub use self::jetstream::{
    error::{JetstreamError, JetstreamError2, JetstreamErrorCode},
    AckPolicy, Compression, Consumer, ConsumerBatch, ConsumerBatchError, ConsumerConfig,
    ConsumerDurability, ConsumerLimits, ConsumerSpecificConfig, ConsumerStorage, ConsumerStream,
    ConsumerStreamError, Consumers, DeliverPolicy, DiscardPolicy, JetstreamClient, PubAck,
    ReplayPolicy, RetentionPolicy, Storage, Stream, StreamConfig, StreamPurgeRequest, StreamState,
    Streams,
};
pub use self::quick_info::QuickInfo;

use self::quick_info::RawQuickInfo;
use crate::multiplexed_subscription::MultiplexedSubscription;
use crate::subscription::Subscription;

mod builder;
mod commands;
#[cfg(feature = "from-env")]
mod from_env;
mod jetstream;
mod quick_info;
#[cfg(test)]
mod tests;

/// Every message not directed to a normal [`Subscription`] arrives here, keyed by the
/// unique reply subject minted for that particular request.
const MULTIPLEXED_SUBSCRIPTION_ID: SubscriptionId = SubscriptionId::MIN;

/// A connected NATS client
///
/// [`Client`] is cheap to clone: every clone shares the same underlying
/// connection, subscription table and write buffer. Only one thread should
/// call [`Client::process`] at a time; publishing, subscribing and requesting
/// may happen concurrently from any clone.
#[derive(Debug, Clone)]
pub struct Client(Arc<ClientInner>);

#[derive(Debug)]
struct ClientInner {
    quick_info: RawQuickInfo,
    state: Mutex<ClientState>,
}

#[derive(Debug)]
struct ClientState {
    conn: Connection<rillwater_mini::ConnectionSecurity<TcpStream>>,
    info: Box<ServerInfo>,
    inbox_prefix: Subject,
    multiplexed_subscription_prefix: Subject,
    next_subscription_id: u64,
    next_request_id: u64,
    default_response_timeout: Duration,
    subscriptions: BTreeMap<SubscriptionId, SubscriptionQueue>,
    multiplexed_subscriptions: BTreeMap<Subject, Option<ServerMessage>>,
    in_flight: VecDeque<InFlightCommand>,
    pending_pings: u8,
    ping_interval: Duration,
    next_ping_at: Instant,
    skip_invalid_messages: bool,
    delay: Option<Duration>,
    delay_mode: DelayMode,
    reconnect_attempts: u32,
    closed: bool,
}

#[derive(Debug)]
struct SubscriptionQueue {
    subject: Subject,
    queue_group: Option<QueueGroup>,
    messages: VecDeque<Result<ServerMessage, ServerError>>,
}

impl SubscriptionQueue {
    fn new(subject: Subject, queue_group: Option<QueueGroup>) -> Self {
        Self {
            subject,
            queue_group,
            messages: VecDeque::new(),
        }
    }
}

#[derive(Debug)]
enum InFlightCommand {
    Unimportant,
    Subscribe { id: SubscriptionId },
}

/// Error returned when an operation is attempted on a closed [`Client`]
#[derive(Debug, thiserror::Error)]
#[error("the client is closed")]
pub struct ClientClosedError;

/// Error returned by the non-blocking `try_*` family of methods
#[derive(Debug, thiserror::Error)]
pub enum TryCommandError {
    /// There isn't enough immediately available space in the internal write buffer
    #[error("the internal write buffer is full")]
    BufferFull,
    /// The client has been closed
    #[error("the client is closed")]
    Closed,
}

impl From<ClientClosedError> for TryCommandError {
    fn from(_: ClientClosedError) -> Self {
        Self::Closed
    }
}

/// The outcome of a single [`Client::process`] call
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// No new data was available within the given timeout
    Idle,
    /// At least one server operation was read and dispatched
    Progress,
}

/// Error returned by [`Client::process`]
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    /// An I/O error occurred on the underlying socket
    #[error("io")]
    Io(#[source] std::io::Error),
    /// The server sent malformed data
    #[error("decoder")]
    Decoder(#[source] DecoderError),
    /// Too many consecutive `PING`s went unanswered
    #[error("disconnected")]
    Disconnected,
    /// The client was already closed
    #[error("the client is closed")]
    Closed,
}

impl Client {
    /// Obtain a [`ClientBuilder`]
    #[must_use]
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Connect to `addr`, consuming the given `builder`
    ///
    /// This performs a blocking TCP (or TLS) dial, waits for the server's `INFO` line,
    /// authenticates if configured to, and sends `CONNECT`/`PING`, blocking until the
    /// server's `PONG` confirms the handshake completed.
    ///
    /// # Errors
    ///
    /// It returns an error if the underlying connection or the handshake fails.
    pub fn connect(
        addr: &ServerAddr,
        builder: ClientBuilder,
        timeout: Option<Duration>,
    ) -> Result<Self, MiniConnectError> {
        let flags = ConnectFlags {
            echo: matches!(builder.echo, Echo::Allow),
            pedantic: builder.pedantic,
            verbose: builder.verbose,
            ..ConnectFlags::default()
        };
        let (mut conn, info) = easy_connect(addr, builder.auth_method.as_ref(), timeout, flags)?;

        let multiplexed_subscription_prefix = Subject::from_dangerous_value(
            format!("{}.{}", builder.inbox_prefix, nuid::next()).into(),
        );
        let wildcard = Subject::from_dangerous_value(
            format!("{multiplexed_subscription_prefix}.*").into(),
        );
        conn.enqueue_write_op(&ClientOp::Subscribe {
            id: MULTIPLEXED_SUBSCRIPTION_ID,
            subject: wildcard,
            queue_group: None,
        });

        let mut in_flight = VecDeque::new();
        in_flight.push_back(InFlightCommand::Unimportant);

        let state = ClientState {
            conn,
            info,
            inbox_prefix: builder.inbox_prefix,
            multiplexed_subscription_prefix,
            next_subscription_id: u64::from(SubscriptionId::MIN) + 1,
            next_request_id: 1,
            default_response_timeout: builder.default_response_timeout,
            subscriptions: BTreeMap::new(),
            multiplexed_subscriptions: BTreeMap::new(),
            in_flight,
            pending_pings: 0,
            ping_interval: builder.ping_interval,
            next_ping_at: Instant::now() + builder.ping_interval,
            skip_invalid_messages: builder.skip_invalid_messages,
            delay: builder.delay,
            delay_mode: builder.delay_mode,
            reconnect_attempts: 0,
            closed: false,
        };

        let client = Self(Arc::new(ClientInner {
            quick_info: RawQuickInfo::new(),
            state: Mutex::new(state),
        }));
        client.0.quick_info.store_is_connected(true);
        tracing::debug!(%addr, "connected");

        Ok(client)
    }

    fn lock(&self) -> MutexGuard<'_, ClientState> {
        self.0
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Drive the connection for a single round: flush pending writes, send a
    /// keep-alive `PING` if the heartbeat interval elapsed, and read+dispatch
    /// at most one server operation.
    ///
    /// This must be called regularly by exactly one thread (usually the
    /// application's main loop) for the client to make any progress at all;
    /// publishing, subscribing and requesting merely enqueue work for the
    /// next call to `process`.
    ///
    /// # Errors
    ///
    /// It returns an error if the client is closed, if the connection was
    /// lost, or if a protocol violation was observed on the wire.
    pub fn process(&self, timeout: Option<Duration>) -> Result<ProcessOutcome, ProcessError> {
        let mut state = self.lock();

        if state.closed {
            return Err(ProcessError::Closed);
        }

        if Instant::now() >= state.next_ping_at {
            if state.pending_pings >= 2 {
                state.closed = true;
                drop(state);
                self.0.quick_info.store_is_connected(false);
                return Err(ProcessError::Disconnected);
            }

            state.conn.enqueue_write_op(&ClientOp::Ping);
            state.pending_pings += 1;
            state.next_ping_at = Instant::now() + state.ping_interval;
        }

        while state.conn.may_write() {
            if let Err(err) = state.conn.write_next() {
                state.closed = true;
                drop(state);
                self.0.quick_info.store_is_connected(false);
                return Err(ProcessError::Io(err));
            }
        }
        if state.conn.should_flush() {
            if let Err(err) = state.conn.flush() {
                state.closed = true;
                drop(state);
                self.0.quick_info.store_is_connected(false);
                return Err(ProcessError::Io(err));
            }
        }

        let op = match state.conn.read_next(timeout) {
            Ok(op) => op,
            Err(ConnectionReadError::TimedOut) => return Ok(ProcessOutcome::Idle),
            Err(ConnectionReadError::Decoder(err)) => {
                if state.skip_invalid_messages {
                    tracing::warn!(error = %err, "dropping malformed frame");
                    return Ok(ProcessOutcome::Idle);
                }
                state.closed = true;
                drop(state);
                self.0.quick_info.store_is_connected(false);
                tracing::error!(error = %err, "closing connection after malformed frame");
                return Err(ProcessError::Decoder(err));
            }
            Err(ConnectionReadError::Io(err)) => {
                state.closed = true;
                drop(state);
                self.0.quick_info.store_is_connected(false);
                return Err(ProcessError::Io(err));
            }
        };

        Self::dispatch(&mut state, op);
        Ok(ProcessOutcome::Progress)
    }

    fn dispatch(state: &mut ClientState, op: ServerOp) {
        match op {
            ServerOp::Info { info } => state.info = info,
            ServerOp::Ping => state.conn.enqueue_write_op(&ClientOp::Pong),
            ServerOp::Pong => state.pending_pings = 0,
            ServerOp::Success => {
                state.in_flight.pop_front();
            }
            ServerOp::Error { error } => {
                tracing::warn!(%error, "server reported a protocol error");
                if let Some(InFlightCommand::Subscribe { id }) = state.in_flight.pop_front() {
                    if let Some(queue) = state.subscriptions.get_mut(&id) {
                        queue.messages.push_back(Err(error));
                    }
                }
            }
            ServerOp::Message { mut message }
                if message.subscription_id == MULTIPLEXED_SUBSCRIPTION_ID =>
            {
                Self::synthesize_status_headers(&mut message);
                if let Some(slot) = state
                    .multiplexed_subscriptions
                    .get_mut(&message.base.subject)
                {
                    *slot = Some(message);
                }
            }
            ServerOp::Message { mut message } => {
                Self::synthesize_status_headers(&mut message);
                if let Some(queue) = state.subscriptions.get_mut(&message.subscription_id) {
                    queue.messages.push_back(Ok(message));
                }
            }
        }
    }

    /// Expose the decoder's typed `status_code` as ordinary `Status-Code`/`Status-Message`
    /// headers on the public [`ServerMessage`], as consumers never see the private status
    /// line otherwise.
    fn synthesize_status_headers(message: &mut ServerMessage) {
        if let Some(status_code) = message.status_code {
            message.base.headers.insert(
                HeaderName::STATUS_CODE,
                HeaderValue::from_dangerous_value(status_code.to_string().into()),
            );
            message.base.headers.insert(
                HeaderName::STATUS_MESSAGE,
                HeaderValue::from_dangerous_value(status_code.description().into()),
            );
        }
    }

    /// Re-establish the connection after [`Client::process`] returned an error
    ///
    /// Before any application write is admitted on the new connection, the multiplexed
    /// request subscription and every still-live [`Subscription`] are re-issued on the
    /// wire, so callers never need to re-subscribe by hand.
    ///
    /// If a [`ClientBuilder::delay`] was configured, this call blocks for the delay
    /// computed from [`ClientBuilder::delay_mode`] and the number of reconnect attempts
    /// made so far before dialing.
    ///
    /// # Errors
    ///
    /// It returns an error if the underlying connection or the handshake fails.
    pub fn reconnect(
        &self,
        addr: &ServerAddr,
        auth_method: Option<&AuthenticationMethod>,
        echo: Echo,
        timeout: Option<Duration>,
    ) -> Result<(), MiniConnectError> {
        let (base_delay, delay_mode, attempt) = {
            let state = self.lock();
            (state.delay, state.delay_mode, state.reconnect_attempts)
        };
        if let Some(base) = base_delay {
            let wait = delay_mode.delay_for(base, attempt);
            tracing::debug!(?wait, attempt, "waiting before reconnect attempt");
            std::thread::sleep(wait);
        }
        self.lock().reconnect_attempts = attempt.saturating_add(1);

        let flags = ConnectFlags {
            echo: matches!(echo, Echo::Allow),
            ..ConnectFlags::default()
        };
        let (mut conn, info) = easy_connect(addr, auth_method, timeout, flags)?;

        let mut state = self.lock();

        let wildcard = Subject::from_dangerous_value(
            format!("{}.*", state.multiplexed_subscription_prefix).into(),
        );
        conn.enqueue_write_op(&ClientOp::Subscribe {
            id: MULTIPLEXED_SUBSCRIPTION_ID,
            subject: wildcard,
            queue_group: None,
        });
        for (&id, queue) in &state.subscriptions {
            conn.enqueue_write_op(&ClientOp::Subscribe {
                id,
                subject: queue.subject.clone(),
                queue_group: queue.queue_group.clone(),
            });
        }

        state.conn = conn;
        state.info = info;
        state.in_flight.clear();
        state.in_flight.push_back(InFlightCommand::Unimportant);
        state.pending_pings = 0;
        state.next_ping_at = Instant::now() + state.ping_interval;
        state.reconnect_attempts = 0;
        state.closed = false;
        drop(state);

        self.0.quick_info.store_is_connected(true);
        tracing::info!(%addr, "reconnected");
        Ok(())
    }

    /// Close the client
    ///
    /// Any buffered write is flushed one last time before shutting down the socket.
    pub fn close(&self) {
        let mut state = self.lock();
        if state.closed {
            return;
        }
        let _ignored = state.conn.write_and_flush();
        state.closed = true;
        drop(state);
        self.0.quick_info.store_is_connected(false);
    }

    /// Returns the latest `INFO` line sent by the server
    #[must_use]
    pub fn server_info(&self) -> ServerInfo {
        (*self.lock().info).clone()
    }

    /// Returns a lock-free snapshot of the client's connection status
    #[must_use]
    pub fn quick_info(&self) -> QuickInfo {
        self.0.quick_info.get()
    }

    /// The default timeout used by [`Client::request`]
    #[must_use]
    pub fn default_response_timeout(&self) -> Duration {
        self.lock().default_response_timeout
    }

    /// Publish a message to `subject`
    pub fn publish(&self, subject: Subject) -> ClientPublish<'_> {
        ClientPublish::build(self, subject)
    }

    /// Publish a request to `subject`, awaiting for a response
    pub fn request(&self, subject: Subject) -> ClientRequest<'_> {
        ClientRequest::build(self, subject)
    }

    pub(crate) fn try_publish(&self, message: MessageBase) -> Result<(), TryCommandError> {
        let mut state = self.lock();
        if state.closed {
            return Err(TryCommandError::Closed);
        }
        if !state.conn.may_enqueue_more_ops() {
            return Err(TryCommandError::BufferFull);
        }
        state.conn.enqueue_write_op(&ClientOp::Publish { message });
        state.in_flight.push_back(InFlightCommand::Unimportant);
        Ok(())
    }

    pub(crate) fn publish_message(&self, message: MessageBase) -> Result<(), ClientClosedError> {
        let mut state = self.lock();
        if state.closed {
            return Err(ClientClosedError);
        }
        state.conn.enqueue_write_op(&ClientOp::Publish { message });
        state.in_flight.push_back(InFlightCommand::Unimportant);
        Ok(())
    }

    /// Subscribe to `subject`
    ///
    /// # Errors
    ///
    /// It returns an error if the client is closed.
    pub fn subscribe(
        &self,
        subject: Subject,
        queue_group: Option<QueueGroup>,
    ) -> Result<Subscription, ClientClosedError> {
        let mut state = self.lock();
        if state.closed {
            return Err(ClientClosedError);
        }
        let id = Self::next_subscription_id(&mut state);
        state.conn.enqueue_write_op(&ClientOp::Subscribe {
            id,
            subject: subject.clone(),
            queue_group: queue_group.clone(),
        });
        state.in_flight.push_back(InFlightCommand::Subscribe { id });
        state
            .subscriptions
            .insert(id, SubscriptionQueue::new(subject, queue_group));
        drop(state);

        Ok(Subscription::new(id, self.clone()))
    }

    /// Subscribe to `subject` if there's enough immediately available space in the
    /// internal write buffer
    ///
    /// # Errors
    ///
    /// It returns an error if the client's buffer is full or if the client is closed.
    pub fn try_subscribe(
        &self,
        subject: Subject,
        queue_group: Option<QueueGroup>,
    ) -> Result<Subscription, TryCommandError> {
        let mut state = self.lock();
        if state.closed {
            return Err(TryCommandError::Closed);
        }
        if !state.conn.may_enqueue_more_ops() {
            return Err(TryCommandError::BufferFull);
        }
        let id = Self::next_subscription_id(&mut state);
        state.conn.enqueue_write_op(&ClientOp::Subscribe {
            id,
            subject: subject.clone(),
            queue_group: queue_group.clone(),
        });
        state.in_flight.push_back(InFlightCommand::Subscribe { id });
        state
            .subscriptions
            .insert(id, SubscriptionQueue::new(subject, queue_group));
        drop(state);

        Ok(Subscription::new(id, self.clone()))
    }

    fn next_subscription_id(state: &mut ClientState) -> SubscriptionId {
        let id = state.next_subscription_id;
        state.next_subscription_id = id.checked_add(1).expect("SubscriptionId space exhausted");
        SubscriptionId::from(id)
    }

    pub(crate) fn try_recv_subscription(
        &self,
        id: SubscriptionId,
    ) -> Option<Result<ServerMessage, ServerError>> {
        self.lock()
            .subscriptions
            .get_mut(&id)
            .and_then(|queue| queue.messages.pop_front())
    }

    /// Unsubscribe from `id`, draining and returning any buffered but undelivered message
    pub(crate) fn unsubscribe_and_drain(
        &self,
        id: SubscriptionId,
        max_messages: Option<NonZeroU64>,
    ) -> Result<VecDeque<Result<ServerMessage, ServerError>>, ClientClosedError> {
        let mut state = self.lock();
        if state.closed {
            return Err(ClientClosedError);
        }
        state
            .conn
            .enqueue_write_op(&ClientOp::Unsubscribe { id, max_messages });
        state.in_flight.push_back(InFlightCommand::Unimportant);

        Ok(if max_messages.is_none() {
            state
                .subscriptions
                .remove(&id)
                .map(|queue| queue.messages)
                .unwrap_or_default()
        } else {
            VecDeque::new()
        })
    }

    pub(crate) fn lazy_unsubscribe(&self, id: SubscriptionId, max_messages: Option<NonZeroU64>) {
        if self.unsubscribe_and_drain(id, max_messages).is_err() {
            self.0.quick_info.store_is_failed_unsubscribe(true);
        }
    }

    pub(crate) fn try_multiplexed_request(
        &self,
        subject: Subject,
        headers: rillwater_proto::headers::HeaderMap,
        payload: bytes::Bytes,
    ) -> Result<MultiplexedSubscription, TryCommandError> {
        let mut state = self.lock();
        if state.closed {
            return Err(TryCommandError::Closed);
        }
        if !state.conn.may_enqueue_more_ops() {
            return Err(TryCommandError::BufferFull);
        }
        let reply_subject = Self::inbox_subject_locked(&mut state);
        state
            .multiplexed_subscriptions
            .insert(reply_subject.clone(), None);
        state.conn.enqueue_write_op(&ClientOp::Publish {
            message: MessageBase {
                subject,
                reply_subject: Some(reply_subject.clone()),
                headers,
                payload,
            },
        });
        state.in_flight.push_back(InFlightCommand::Unimportant);
        drop(state);

        Ok(MultiplexedSubscription::new(reply_subject, self.clone()))
    }

    pub(crate) fn multiplexed_request(
        &self,
        subject: Subject,
        headers: rillwater_proto::headers::HeaderMap,
        payload: bytes::Bytes,
    ) -> Result<MultiplexedSubscription, ClientClosedError> {
        let mut state = self.lock();
        if state.closed {
            return Err(ClientClosedError);
        }
        let reply_subject = Self::inbox_subject_locked(&mut state);
        state
            .multiplexed_subscriptions
            .insert(reply_subject.clone(), None);
        state.conn.enqueue_write_op(&ClientOp::Publish {
            message: MessageBase {
                subject,
                reply_subject: Some(reply_subject.clone()),
                headers,
                payload,
            },
        });
        state.in_flight.push_back(InFlightCommand::Unimportant);
        drop(state);

        Ok(MultiplexedSubscription::new(reply_subject, self.clone()))
    }

    pub(crate) fn try_recv_multiplexed(&self, reply_subject: &Subject) -> Option<ServerMessage> {
        let mut state = self.lock();
        let has_message = matches!(
            state.multiplexed_subscriptions.get(reply_subject),
            Some(Some(_))
        );
        if !has_message {
            return None;
        }
        state
            .multiplexed_subscriptions
            .remove(reply_subject)
            .flatten()
    }

    pub(crate) fn lazy_unsubscribe_multiplexed(&self, reply_subject: Subject) {
        self.lock().multiplexed_subscriptions.remove(&reply_subject);
    }

    /// Mint a fresh, process-unique inbox subject under this client's inbox prefix
    ///
    /// Useful when manually correlating a request/response pair with a dedicated
    /// [`Client::subscribe`] rather than relying on the built-in multiplexed
    /// request machinery, as Jetstream's pull consumers do.
    #[must_use]
    pub fn create_inbox_subject(&self) -> Subject {
        Self::inbox_subject_locked(&mut self.lock())
    }

    fn inbox_subject_locked(state: &mut ClientState) -> Subject {
        let id = state.next_request_id;
        state.next_request_id = state.next_request_id.wrapping_add(1);
        Subject::from_dangerous_value(format!("{}.{id}", state.inbox_prefix).into())
    }
}

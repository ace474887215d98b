use std::{fmt::Display, time::Duration};

use bytes::Bytes;
use resources::Response;
use rillwater_proto::StatusCode;
use rillwater_proto::{
    error::SubjectValidateError,
    headers::{HeaderMap, HeaderName},
    Subject,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

pub use self::commands::{
    ConsumerBatch, ConsumerBatchError, ConsumerStream, ConsumerStreamError, Consumers, Streams,
};
pub use self::resources::{
    AckPolicy, Compression, Consumer, ConsumerConfig, ConsumerDurability, ConsumerLimits,
    ConsumerSpecificConfig, ConsumerStorage, DeliverPolicy, DiscardPolicy, ReplayPolicy,
    RetentionPolicy, Storage, Stream, StreamConfig, StreamState,
};
use crate::core::Client;

use super::{ClientClosedError, ResponseError};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(2);
/// How long to block inside [`Client::process`] while polling for a Jetstream response.
const POLL_TIMEOUT: Duration = Duration::from_millis(50);

mod commands;
mod resources;

pub mod error {
    //! Jetstream specific errors

    pub use super::{JetstreamError, JetstreamError2, JetstreamErrorCode};
}

/// A NATS Jetstream client
///
/// `JetstreamClient` is a `Clone`able handle to a NATS [`Client`],
/// with Jetstream specific configurations.
#[derive(Debug, Clone)]
pub struct JetstreamClient {
    client: Client,
    prefix: Subject,
    request_timeout: Duration,
}

/// The acknowledgement returned by a Jetstream acked publish
#[derive(Debug, Deserialize)]
pub struct PubAck {
    /// The name of the stream that stored the message
    #[serde(rename = "stream")]
    pub stream_name: String,
    /// The sequence number assigned to the message
    pub seq: u64,
    /// Whether the stream recognised this message as a duplicate via `Nats-Msg-Id`
    #[serde(default)]
    pub duplicate: bool,
}

/// A request to purge messages from a stream
#[derive(Debug, Default, Serialize)]
pub struct StreamPurgeRequest {
    /// Only purge messages matching this subject filter
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    /// Only purge messages up to, but not including, this sequence number
    #[serde(rename = "seq", skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
    /// Keep this many of the newest matching messages instead of purging them
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct SuccessResponse {
    #[expect(dead_code, reason = "only the success/error discriminant is used")]
    success: bool,
}

/// A Jetstream API error
#[derive(Debug, Deserialize, thiserror::Error)]
#[error("jetstream error status={status}")]
pub struct JetstreamError {
    #[serde(rename = "code")]
    status: StatusCode,
    #[serde(rename = "err_code")]
    code: JetstreamErrorCode,
    description: String,
}

/// The type of error encountered while processing a Jetstream request
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JetstreamErrorCode(u16);

/// An error encountered while making a Jetstream request
#[derive(Debug, thiserror::Error)]
pub enum JetstreamError2 {
    #[error("invalid subject")]
    Subject(#[source] SubjectValidateError),
    #[error("client closed")]
    ClientClosed(#[source] ClientClosedError),
    #[error("client request failure")]
    ResponseError(#[source] ResponseError),
    #[error("JSON deserialization")]
    Json(#[source] serde_json::Error),
    #[error("bad response code")]
    Status(#[source] JetstreamError),
    #[error("unexpected status from a consumer batch: {0:?}")]
    UnexpectedMessage(rillwater_proto::ServerMessage),
}

impl JetstreamClient {
    /// Create a Jetstream client using the default configuration
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self::new_with_prefix(client, Subject::from_static("$JS.API"))
    }

    /// Create a Jetstream client using the provided `domain`
    ///
    /// # Errors
    ///
    /// It returns an error if the subject derived by the `domain` is not valid.
    pub fn new_with_domain(
        client: Client,
        domain: impl Display,
    ) -> Result<Self, SubjectValidateError> {
        let prefix = format!("$JS.{domain}.API").try_into()?;
        Ok(Self::new_with_prefix(client, prefix))
    }

    /// Create a Jetstream client using the provided API `prefix`
    #[must_use]
    pub fn new_with_prefix(client: Client, prefix: Subject) -> Self {
        Self {
            client,
            prefix,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// List streams present within this client's Jetstream context
    pub fn streams(&self) -> Streams {
        Streams::new(self.clone())
    }

    /// Obtain a stream present within this client's Jetstream context
    ///
    /// Blocks, driving [`Client::process`] internally, until a response arrives or the
    /// request timeout elapses.
    ///
    /// # Errors
    ///
    /// It returns an error if the given `name` produces an invalid subject or if an error occurs
    /// while creating the stream.
    pub fn stream(&self, name: impl Display) -> Result<Option<Stream>, JetstreamError2> {
        let subject = format!("{}.STREAM.INFO.{}", self.prefix, name)
            .try_into()
            .map_err(JetstreamError2::Subject)?;
        let resp = self.blocking_request(subject, Bytes::new())?;

        let json = serde_json::from_slice::<Response<Stream>>(&resp.base.payload)
            .map_err(JetstreamError2::Json)?;
        match json {
            Response::Response(stream) => Ok(Some(stream)),
            Response::Error { error } if error.code == JetstreamErrorCode::STREAM_NOT_FOUND => {
                Ok(None)
            }
            Response::Error { error } => Err(JetstreamError2::Status(error)),
        }
    }

    /// List consumers present within this client's Jetstream context
    pub fn consumers(&self, stream_name: impl Display) -> Consumers {
        Consumers::new(self.clone(), stream_name)
    }

    /// Obtain a consumer present within this client's Jetstream context
    ///
    /// # Errors
    ///
    /// It returns an error if the given `stream_name` and `consumer_name` produce an invalid
    /// subject or if an error occurs while creating the consumer.
    pub fn consumer(
        &self,
        stream_name: impl Display,
        consumer_name: impl Display,
    ) -> Result<Option<Consumer>, JetstreamError2> {
        let subject = format!(
            "{}.CONSUMER.INFO.{}.{}",
            self.prefix, stream_name, consumer_name
        )
        .try_into()
        .map_err(JetstreamError2::Subject)?;
        let resp = self.blocking_request(subject, Bytes::new())?;

        let json = serde_json::from_slice::<Response<Consumer>>(&resp.base.payload)
            .map_err(JetstreamError2::Json)?;
        match json {
            Response::Response(stream) => Ok(Some(stream)),
            Response::Error { error } if error.code == JetstreamErrorCode::CONSUMER_NOT_FOUND => {
                Ok(None)
            }
            Response::Error { error } => Err(JetstreamError2::Status(error)),
        }
    }

    /// Run a batch request over the provided `consumer`
    ///
    /// # Errors
    ///
    /// An error is returned if the subject is not valid or if the client has been closed.
    pub fn consumer_batch(
        &self,
        consumer: &Consumer,
        expires: Duration,
        max_msgs: usize,
    ) -> Result<ConsumerBatch, JetstreamError2> {
        ConsumerBatch::new(consumer, self.clone(), expires, max_msgs)
    }

    /// Run a stream request over the provided `consumer`
    pub fn consumer_stream(
        &self,
        consumer: Consumer,
        expires: Duration,
        max_msgs: usize,
    ) -> ConsumerStream {
        ConsumerStream::new(consumer, self.clone(), expires, max_msgs)
    }

    /// Create a stream with the given `config`
    ///
    /// # Errors
    ///
    /// It returns an error if `config.name` produces an invalid subject, if a stream by
    /// that name already exists with a different configuration, or if the request fails.
    pub fn create_stream(&self, config: &StreamConfig) -> Result<Stream, JetstreamError2> {
        let subject = format!("{}.STREAM.CREATE.{}", self.prefix, config.name)
            .try_into()
            .map_err(JetstreamError2::Subject)?;
        let payload = serde_json::to_vec(config).map_err(JetstreamError2::Json)?;
        let resp = self.blocking_request(subject, payload.into())?;

        match serde_json::from_slice::<Response<Stream>>(&resp.base.payload)
            .map_err(JetstreamError2::Json)?
        {
            Response::Response(stream) => {
                tracing::debug!(stream = %config.name, "created stream");
                Ok(stream)
            }
            Response::Error { error } => {
                tracing::warn!(stream = %config.name, %error, "failed to create stream");
                Err(JetstreamError2::Status(error))
            }
        }
    }

    /// Update an existing stream's configuration
    ///
    /// # Errors
    ///
    /// It returns an error if `config.name` produces an invalid subject, if the stream
    /// doesn't exist, or if the request fails.
    pub fn update_stream(&self, config: &StreamConfig) -> Result<Stream, JetstreamError2> {
        let subject = format!("{}.STREAM.UPDATE.{}", self.prefix, config.name)
            .try_into()
            .map_err(JetstreamError2::Subject)?;
        let payload = serde_json::to_vec(config).map_err(JetstreamError2::Json)?;
        let resp = self.blocking_request(subject, payload.into())?;

        match serde_json::from_slice::<Response<Stream>>(&resp.base.payload)
            .map_err(JetstreamError2::Json)?
        {
            Response::Response(stream) => Ok(stream),
            Response::Error { error } => Err(JetstreamError2::Status(error)),
        }
    }

    /// Delete the stream `name`
    ///
    /// # Errors
    ///
    /// It returns an error if `name` produces an invalid subject or if the request fails.
    pub fn delete_stream(&self, name: impl Display) -> Result<(), JetstreamError2> {
        let subject = format!("{}.STREAM.DELETE.{}", self.prefix, name)
            .try_into()
            .map_err(JetstreamError2::Subject)?;
        let resp = self.blocking_request(subject, Bytes::new())?;

        match serde_json::from_slice::<Response<SuccessResponse>>(&resp.base.payload)
            .map_err(JetstreamError2::Json)?
        {
            Response::Response(_) => {
                tracing::debug!(stream = %name.to_string(), "deleted stream");
                Ok(())
            }
            Response::Error { error } => {
                tracing::warn!(stream = %name.to_string(), %error, "failed to delete stream");
                Err(JetstreamError2::Status(error))
            }
        }
    }

    /// Purge messages from the stream `name`
    ///
    /// # Errors
    ///
    /// It returns an error if `name` produces an invalid subject or if the request fails.
    pub fn purge_stream(
        &self,
        name: impl Display,
        purge: &StreamPurgeRequest,
    ) -> Result<(), JetstreamError2> {
        let subject = format!("{}.STREAM.PURGE.{}", self.prefix, name)
            .try_into()
            .map_err(JetstreamError2::Subject)?;
        let payload = serde_json::to_vec(purge).map_err(JetstreamError2::Json)?;
        let resp = self.blocking_request(subject, payload.into())?;

        match serde_json::from_slice::<Response<SuccessResponse>>(&resp.base.payload)
            .map_err(JetstreamError2::Json)?
        {
            Response::Response(_) => Ok(()),
            Response::Error { error } => Err(JetstreamError2::Status(error)),
        }
    }

    /// Create a consumer on the stream `stream_name`
    ///
    /// Uses the durable-create endpoint when `config`'s durability is
    /// [`ConsumerDurability::Durable`][resources::ConsumerDurability::Durable], otherwise
    /// the ephemeral one (the broker assigns the name).
    ///
    /// # Errors
    ///
    /// It returns an error if the derived subject is invalid or if the request fails.
    pub fn create_consumer(
        &self,
        stream_name: impl Display,
        config: &ConsumerConfig,
    ) -> Result<Consumer, JetstreamError2> {
        let endpoint = match config.durability {
            ConsumerDurability::Durable => {
                format!("CONSUMER.DURABLE.CREATE.{stream_name}.{}", config.name)
            }
            ConsumerDurability::Ephemeral => format!("CONSUMER.CREATE.{stream_name}"),
        };
        let subject = format!("{}.{endpoint}", self.prefix)
            .try_into()
            .map_err(JetstreamError2::Subject)?;
        let payload = serde_json::to_vec(&json!({
            "stream_name": stream_name.to_string(),
            "config": config,
        }))
        .map_err(JetstreamError2::Json)?;
        let resp = self.blocking_request(subject, payload.into())?;

        match serde_json::from_slice::<Response<Consumer>>(&resp.base.payload)
            .map_err(JetstreamError2::Json)?
        {
            Response::Response(consumer) => {
                tracing::debug!(stream = %stream_name.to_string(), "created consumer");
                Ok(consumer)
            }
            Response::Error { error } => {
                tracing::warn!(stream = %stream_name.to_string(), %error, "failed to create consumer");
                Err(JetstreamError2::Status(error))
            }
        }
    }

    /// Delete the consumer `consumer_name` from the stream `stream_name`
    ///
    /// # Errors
    ///
    /// It returns an error if the derived subject is invalid or if the request fails.
    pub fn delete_consumer(
        &self,
        stream_name: impl Display,
        consumer_name: impl Display,
    ) -> Result<(), JetstreamError2> {
        let subject = format!(
            "{}.CONSUMER.DELETE.{stream_name}.{consumer_name}",
            self.prefix
        )
        .try_into()
        .map_err(JetstreamError2::Subject)?;
        let resp = self.blocking_request(subject, Bytes::new())?;

        match serde_json::from_slice::<Response<SuccessResponse>>(&resp.base.payload)
            .map_err(JetstreamError2::Json)?
        {
            Response::Response(_) => Ok(()),
            Response::Error { error } => Err(JetstreamError2::Status(error)),
        }
    }

    /// Publish `payload` to `subject` and await the broker's acknowledgement
    ///
    /// Unlike [`Client::publish`], this blocks for a `PubAck`, so the caller knows
    /// whether the message was accepted (and deduplicated) by the stream.
    ///
    /// # Errors
    ///
    /// It returns an error if the client has been closed or if the broker replies with
    /// an error (e.g. no stream covers `subject`).
    pub fn publish(
        &self,
        subject: Subject,
        headers: HeaderMap,
        payload: Bytes,
    ) -> Result<PubAck, JetstreamError2> {
        let resp = self.blocking_request_with_headers(subject, headers, payload)?;

        match serde_json::from_slice::<Response<PubAck>>(&resp.base.payload)
            .map_err(JetstreamError2::Json)?
        {
            Response::Response(ack) => Ok(ack),
            Response::Error { error } => Err(JetstreamError2::Status(error)),
        }
    }

    pub(crate) fn subject_for_request(&self, endpoint: &Subject) -> Subject {
        Subject::from_dangerous_value(format!("{}.{}", self.prefix, endpoint).into())
    }

    /// Send a request and block, driving [`Client::process`] internally, until either a
    /// response arrives or the configured request timeout elapses.
    pub(crate) fn blocking_request(
        &self,
        subject: Subject,
        payload: Bytes,
    ) -> Result<rillwater_proto::ServerMessage, JetstreamError2> {
        self.blocking_request_with_headers(subject, HeaderMap::new(), payload)
    }

    fn blocking_request_with_headers(
        &self,
        subject: Subject,
        headers: HeaderMap,
        payload: Bytes,
    ) -> Result<rillwater_proto::ServerMessage, JetstreamError2> {
        let mut handle = self
            .client
            .request(subject)
            .headers(headers)
            .response_timeout(self.request_timeout)
            .payload(payload)
            .map_err(JetstreamError2::ClientClosed)?;

        loop {
            match handle.try_recv() {
                Ok(Some(message)) if message.status_code == Some(StatusCode::NO_RESPONDERS) => {
                    return Err(JetstreamError2::ResponseError(ResponseError::NoResponders));
                }
                Ok(Some(message)) => return Ok(message),
                Ok(None) => {
                    if self.client.process(Some(POLL_TIMEOUT)).is_err() {
                        return Err(JetstreamError2::ResponseError(
                            ResponseError::SubscriptionClosed,
                        ));
                    }
                }
                Err(err) => return Err(JetstreamError2::ResponseError(err)),
            }
        }
    }

    /// Get a reference to the inner NATS Core client
    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }

    #[must_use]
    pub fn prefix(&self) -> &Subject {
        &self.prefix
    }
}

impl JetstreamError {
    /// The numeric Jetstream error code, e.g. `10071` for a wrong last sequence
    #[must_use]
    pub fn code(&self) -> JetstreamErrorCode {
        self.code
    }

    /// The human-readable description sent by the broker
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }
}

impl JetstreamErrorCode {
    pub const NOT_ENABLED: Self = Self(10076);
    pub const NOT_ENABLED_FOR_ACCOUNT: Self = Self(10039);
    pub const BAD_REQUEST: Self = Self(10003);

    pub const STREAM_NOT_FOUND: Self = Self(10059);
    pub const STREAM_NAME_IN_USE: Self = Self(10058);
    pub const STREAM_MESSAGE_NOT_FOUND: Self = Self(10037);
    pub const STREAM_WRONG_LAST_SEQUENCE: Self = Self(10071);

    pub const COULD_NOT_CREATE_CONSUMER: Self = Self(10012);
    pub const CONSUMER_NOT_FOUND: Self = Self(10014);
    pub const CONSUMER_NAME_IN_USE: Self = Self(10148);

    pub const CONSUMER_DUPLICATE_FILTER_SUBJECTS: Self = Self(10136);
    pub const CONSUMER_OVERLAPPING_FILTER_SUBJECTS: Self = Self(10138);
    pub const CONSUMER_FILTER_SUBJECTS_IS_EMPTY: Self = Self(10139);
}

impl From<u16> for JetstreamErrorCode {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

impl From<JetstreamErrorCode> for u16 {
    fn from(value: JetstreamErrorCode) -> Self {
        value.0
    }
}

use std::{
    fmt::{self, Debug},
    num::NonZeroU64,
    time::{Duration, Instant},
};

use bytes::Bytes;
use rillwater_proto::{
    error::ServerError,
    headers::{HeaderMap, HeaderName, HeaderValue},
    ServerMessage, StatusCode, Subject,
};

use crate::{
    client::{Client, ClientClosedError, TryCommandError},
    core::MultiplexedSubscription,
    subscription::Subscription,
};

use super::Publish;

/// A publishable request
#[derive(Debug, Clone)]
pub struct Request {
    pub(super) publish: Publish,
    pub(super) response_timeout: Option<Duration>,
}

/// A constructor for a publishable request
///
/// Obtained from [`Request::builder`].
#[derive(Debug)]
pub struct RequestBuilder {
    request: Request,
}

/// A constructor for a publishable request to be sent using the given client
///
/// Obtained from [`Client::request`].
pub struct ClientRequest<'a> {
    client: &'a Client,
    request: Request,
}

/// A handle to a request awaiting for a response
///
/// Obtained from [`ClientRequest::send`] or [`ClientRequest::try_send`]. Poll it with
/// [`ResponseHandle::try_recv`] from inside the thread driving [`Client::process`], or
/// any other thread, in a loop of your choosing.
#[derive(Debug)]
pub struct ResponseHandle {
    subscription: ResponseSubscription,
    deadline: Instant,
}

#[derive(Debug)]
enum ResponseSubscription {
    Multiplexed(MultiplexedSubscription),
    Subscription(Subscription),
}

/// An error encountered while waiting for a response
#[derive(Debug, thiserror::Error)]
pub enum ResponseError {
    /// The [`Subscription`] encountered a server error
    #[error("server error")]
    ServerError(#[source] ServerError),
    /// The NATS server told us that no subscriptions are present for the requested subject
    #[error("no responders")]
    NoResponders,
    /// A response hasn't been received within the timeout
    #[error("received no response within the timeout window")]
    TimedOut,
    /// The [`Subscription`] was closed without yielding any message
    ///
    /// On a multiplexed subscription this may mean that the client
    /// reconnected to the server
    #[error("subscription closed")]
    SubscriptionClosed,
}

macro_rules! request {
    () => {
        #[must_use]
        pub fn reply_subject(mut self, reply_subject: Option<Subject>) -> Self {
            self.request_mut().publish.reply_subject = reply_subject;
            self
        }

        #[must_use]
        pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
            self.request_mut().publish.headers.insert(name, value);
            self
        }

        #[must_use]
        pub fn headers(mut self, headers: HeaderMap) -> Self {
            self.request_mut().publish.headers = headers;
            self
        }

        #[must_use]
        pub fn response_timeout(mut self, timeout: Duration) -> Self {
            self.request_mut().response_timeout = Some(timeout);
            self
        }
    };
}

impl Request {
    /// Build a new [`Request`]
    #[must_use]
    pub fn builder(subject: Subject) -> RequestBuilder {
        RequestBuilder::subject(subject)
    }

    /// Publish this request to `client`, blocking until it has been enqueued
    ///
    /// # Errors
    ///
    /// It returns an error if the client has been closed.
    pub fn send(self, client: &Client) -> Result<ResponseHandle, ClientClosedError> {
        send(client, self)
    }

    /// Publish this request to `client` if there's enough immediately available
    /// space in the internal write buffer
    ///
    /// # Errors
    ///
    /// It returns an error if the client's buffer is full or if the client is closed.
    pub fn try_send(self, client: &Client) -> Result<ResponseHandle, TryCommandError> {
        try_send(client, self)
    }
}

impl RequestBuilder {
    #[must_use]
    pub fn subject(subject: Subject) -> Self {
        Self {
            request: Request {
                publish: Publish::builder(subject).payload(Bytes::new()),
                response_timeout: None,
            },
        }
    }

    request!();

    #[must_use]
    pub fn payload(mut self, payload: Bytes) -> Request {
        self.request.publish.payload = payload;
        self.request
    }

    fn request_mut(&mut self) -> &mut Request {
        &mut self.request
    }
}

impl<'a> ClientRequest<'a> {
    pub(crate) fn build(client: &'a Client, subject: Subject) -> Self {
        Self {
            client,
            request: RequestBuilder::subject(subject).request,
        }
    }

    request!();

    /// Set the payload, publish the request and block until it has been enqueued
    ///
    /// # Errors
    ///
    /// It returns an error if the client has been closed.
    pub fn payload(self, payload: Bytes) -> Result<ResponseHandle, ClientClosedError> {
        let mut request = self.request;
        request.publish = set_payload(request.publish, payload);
        request.send(self.client)
    }

    /// Set the payload and publish the request if there's enough immediately
    /// available space in the internal write buffer
    ///
    /// # Errors
    ///
    /// It returns an error if the client's buffer is full or if the client is closed.
    pub fn try_payload(self, payload: Bytes) -> Result<ResponseHandle, TryCommandError> {
        let mut request = self.request;
        request.publish = set_payload(request.publish, payload);
        request.try_send(self.client)
    }

    fn request_mut(&mut self) -> &mut Request {
        &mut self.request
    }
}

fn set_payload(publish: Publish, payload: Bytes) -> Publish {
    let mut publish = publish;
    publish.payload = payload;
    publish
}

fn try_send(client: &Client, request: Request) -> Result<ResponseHandle, TryCommandError> {
    let subscription = if let Some(reply_subject) = &request.publish.reply_subject {
        let subscription = client.try_subscribe(reply_subject.clone(), None)?;
        client.lazy_unsubscribe(subscription.id(), NonZeroU64::new(1));

        request.publish.try_send(client)?;
        ResponseSubscription::Subscription(subscription)
    } else {
        let subscription = client.try_multiplexed_request(
            request.publish.subject,
            request.publish.headers,
            request.publish.payload,
        )?;
        ResponseSubscription::Multiplexed(subscription)
    };

    Ok(ResponseHandle {
        subscription,
        deadline: Instant::now()
            + request
                .response_timeout
                .unwrap_or_else(|| client.default_response_timeout()),
    })
}

fn send(client: &Client, request: Request) -> Result<ResponseHandle, ClientClosedError> {
    let subscription = if let Some(reply_subject) = &request.publish.reply_subject {
        let subscription = client.subscribe(reply_subject.clone(), None)?;
        client.lazy_unsubscribe(subscription.id(), NonZeroU64::new(1));

        request.publish.send(client)?;
        ResponseSubscription::Subscription(subscription)
    } else {
        let subscription = client.multiplexed_request(
            request.publish.subject,
            request.publish.headers,
            request.publish.payload,
        )?;
        ResponseSubscription::Multiplexed(subscription)
    };

    Ok(ResponseHandle {
        subscription,
        deadline: Instant::now()
            + request
                .response_timeout
                .unwrap_or_else(|| client.default_response_timeout()),
    })
}

impl ResponseHandle {
    /// Poll for the response, without blocking
    ///
    /// Returns `Ok(None)` if no response has arrived yet and the timeout hasn't elapsed.
    /// Call this repeatedly, interleaved with [`Client::process`], until it returns
    /// `Ok(Some(_))` or an error.
    ///
    /// # Errors
    ///
    /// It returns an error if the server replied with an error, if no responders were
    /// present for the request's subject, if the timeout elapsed, or if the underlying
    /// subscription was closed (e.g. by a reconnect).
    pub fn try_recv(&mut self) -> Result<Option<ServerMessage>, ResponseError> {
        let message = match &mut self.subscription {
            ResponseSubscription::Multiplexed(subscription) => subscription.try_recv(),
            ResponseSubscription::Subscription(subscription) => match subscription.try_recv() {
                Some(Ok(message)) => Some(message),
                Some(Err(err)) => return Err(ResponseError::ServerError(err)),
                None => None,
            },
        };

        match message {
            Some(message) if message.status_code == Some(StatusCode::NO_RESPONDERS) => {
                Err(ResponseError::NoResponders)
            }
            Some(message) => Ok(Some(message)),
            None if Instant::now() >= self.deadline => Err(ResponseError::TimedOut),
            None => Ok(None),
        }
    }
}

impl Debug for ClientRequest<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientRequest")
            .field("request", &self.request)
            .finish_non_exhaustive()
    }
}

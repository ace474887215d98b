use bytes::Bytes;
use rillwater_proto::{
    headers::{HeaderMap, HeaderName, HeaderValue},
    MessageBase, Subject,
};

use crate::client::{Client, ClientClosedError, TryCommandError};

use super::Request;

/// A publishable message
#[derive(Debug, Clone)]
pub struct Publish {
    pub(super) subject: Subject,
    pub(super) reply_subject: Option<Subject>,
    pub(super) headers: HeaderMap,
    pub(super) payload: Bytes,
}

/// A constructor for a publishable message
///
/// Obtained from [`Publish::builder`].
#[derive(Debug)]
pub struct PublishBuilder {
    publish: Publish,
}

/// A constructor for a publishable message to be sent using the given client
///
/// Obtained from [`Client::publish`].
#[derive(Debug)]
pub struct ClientPublish<'a> {
    client: &'a Client,
    publish: Publish,
}

macro_rules! publish {
    () => {
        #[must_use]
        pub fn reply_subject(mut self, reply_subject: Option<Subject>) -> Self {
            self.publish_mut().reply_subject = reply_subject;
            self
        }

        #[must_use]
        pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
            self.publish_mut().headers.insert(name, value);
            self
        }

        #[must_use]
        pub fn headers(mut self, headers: HeaderMap) -> Self {
            self.publish_mut().headers = headers;
            self
        }
    };
}

impl Publish {
    /// Build a new [`Publish`]
    #[must_use]
    pub fn builder(subject: Subject) -> PublishBuilder {
        PublishBuilder::subject(subject)
    }

    /// Publish this message to `client`, blocking until it has been enqueued
    ///
    /// # Errors
    ///
    /// It returns an error if the client has been closed.
    pub fn send(self, client: &Client) -> Result<(), ClientClosedError> {
        client.publish_message(self.into_message_base())
    }

    /// Publish this message to `client` if there's enough immediately available
    /// space in the internal write buffer
    ///
    /// # Errors
    ///
    /// It returns an error if the client's buffer is full or if the client is closed.
    pub fn try_send(self, client: &Client) -> Result<(), TryCommandError> {
        client.try_publish(self.into_message_base())
    }

    #[must_use]
    pub fn into_request(self) -> Request {
        Request {
            publish: self,
            response_timeout: None,
        }
    }

    fn into_message_base(self) -> MessageBase {
        let Self {
            subject,
            reply_subject,
            headers,
            payload,
        } = self;
        MessageBase {
            subject,
            reply_subject,
            headers,
            payload,
        }
    }
}

impl PublishBuilder {
    #[must_use]
    pub fn subject(subject: Subject) -> Self {
        Self {
            publish: Publish {
                subject,
                reply_subject: None,
                headers: HeaderMap::new(),
                payload: Bytes::new(),
            },
        }
    }

    publish!();

    #[must_use]
    pub fn payload(mut self, payload: Bytes) -> Publish {
        self.publish.payload = payload;
        self.publish
    }

    fn publish_mut(&mut self) -> &mut Publish {
        &mut self.publish
    }
}

impl<'a> ClientPublish<'a> {
    pub(crate) fn build(client: &'a Client, subject: Subject) -> Self {
        Self {
            client,
            publish: PublishBuilder::subject(subject).publish,
        }
    }

    publish!();

    /// Set the payload and publish the message, blocking until it has been enqueued
    ///
    /// # Errors
    ///
    /// It returns an error if the client has been closed.
    pub fn payload(self, payload: Bytes) -> Result<(), ClientClosedError> {
        let mut publish = self.publish;
        publish.payload = payload;
        publish.send(self.client)
    }

    /// Set the payload and publish the message if there's enough immediately
    /// available space in the internal write buffer
    ///
    /// # Errors
    ///
    /// It returns an error if the client's buffer is full or if the client is closed.
    pub fn try_payload(self, payload: Bytes) -> Result<(), TryCommandError> {
        let mut publish = self.publish;
        publish.payload = payload;
        publish.try_send(self.client)
    }

    fn publish_mut(&mut self) -> &mut Publish {
        &mut self.publish
    }
}

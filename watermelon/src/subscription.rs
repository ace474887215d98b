use std::{collections::VecDeque, num::NonZeroU64};

use rillwater_proto::{error::ServerError, ServerMessage, SubscriptionId};

use crate::core::{error::ClientClosedError, Client};

/// A NATS subscription
///
/// Receives messages coming from the NATS server with At Most Once Delivery.
///
/// Messages are retrieved with [`Subscription::try_recv`]. This must be called regularly,
/// interleaved with [`Client::process`]: the client has no unbounded internal queue, so a
/// subscription that isn't drained will eventually stop accumulating new messages.
///
/// Obtained from [`Client::subscribe`].
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    client: Client,
    buffered: VecDeque<Result<ServerMessage, ServerError>>,
    status: SubscriptionStatus,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum SubscriptionStatus {
    Subscribed,
    Unsubscribed,
}

impl Subscription {
    pub(crate) fn new(id: SubscriptionId, client: Client) -> Self {
        Self {
            id,
            client,
            buffered: VecDeque::new(),
            status: SubscriptionStatus::Subscribed,
        }
    }

    /// The id assigned to this subscription by the client
    #[must_use]
    pub(crate) fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Retrieve the next buffered message, without blocking
    ///
    /// Returns `None` if no message is currently available; call [`Client::process`] and
    /// try again.
    pub fn try_recv(&mut self) -> Option<Result<ServerMessage, ServerError>> {
        if let Some(message) = self.buffered.pop_front() {
            return Some(message);
        }

        self.client.try_recv_subscription(self.id)
    }

    /// Immediately close the subscription
    ///
    /// Any message already buffered for this subscription is retained and can still be
    /// retrieved with [`Subscription::try_recv`].
    ///
    /// Calling this method multiple times is a NOOP.
    ///
    /// # Errors
    ///
    /// It returns an error if the client is closed.
    pub fn close(&mut self) -> Result<(), ClientClosedError> {
        if self.status == SubscriptionStatus::Unsubscribed {
            return Ok(());
        }

        self.buffered
            .extend(self.client.unsubscribe_and_drain(self.id, None)?);
        self.status = SubscriptionStatus::Unsubscribed;
        Ok(())
    }

    /// Close the subscription after `max_messages` have been delivered
    ///
    /// Ask the NATS Server to automatically close the subscription after
    /// `max_messages` have been sent to the client.
    ///
    /// <div class="warning">
    ///    Calling this method does not guarantee that exactly <code>max_messages</code>
    ///    will be delivered afterwards.
    /// </div>
    ///
    /// More or less messages may be delivered to the client due to race conditions
    /// or data loss between it and the server.
    ///
    /// # Errors
    ///
    /// It returns an error if the client is closed.
    pub fn close_after(&mut self, max_messages: NonZeroU64) -> Result<(), ClientClosedError> {
        if self.status == SubscriptionStatus::Unsubscribed {
            return Ok(());
        }

        self.client.unsubscribe_and_drain(self.id, Some(max_messages))?;
        Ok(())
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if self.status == SubscriptionStatus::Unsubscribed {
            return;
        }

        self.client.lazy_unsubscribe(self.id, None);
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use rillwater_proto::{
        headers::HeaderMap, MessageBase, ServerMessage, StatusCode, Subject, SubscriptionId,
    };

    #[test]
    fn subscribe_and_recv() {
        let mut subscription = crate::tests::with_loopback_client(|client| {
            client
                .subscribe(Subject::from_static("abcd.>"), None)
                .unwrap()
        });

        assert_eq!(SubscriptionId::from(1), subscription.id());
        assert!(subscription.try_recv().is_none());

        let message = ServerMessage {
            status_code: Some(StatusCode::OK),
            subscription_id: subscription.id(),
            base: MessageBase {
                subject: Subject::from_static("abcd.foo"),
                reply_subject: None,
                headers: HeaderMap::new(),
                payload: Bytes::from_static(b"test"),
            },
        };
        subscription.buffered.push_back(Ok(message.clone()));
        assert_eq!(Some(Ok(message)), subscription.try_recv());
        assert!(subscription.try_recv().is_none());
    }
}

use std::time::{Duration, Instant};

use serde_json::json;
use rillwater_proto::{error::ServerError, ServerMessage, StatusCode};

use crate::{
    client::{jetstream::POLL_TIMEOUT, Consumer, JetstreamClient, JetstreamError2},
    subscription::Subscription,
};

/// A consumer batch request
///
/// Obtained from [`JetstreamClient::consumer_batch`]. Each call to [`Iterator::next`] may
/// block, driving [`crate::core::Client::process`] internally, until a message arrives or
/// the batch's deadline elapses.
#[derive(Debug)]
#[must_use = "streams do nothing unless iterated"]
pub struct ConsumerBatch {
    client: JetstreamClient,
    subscription: Subscription,
    deadline: Instant,
    pending_msgs: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum ConsumerBatchError {
    #[error("an error returned by the server")]
    ServerError(#[source] ServerError),
    #[error("unexpected status code")]
    UnexpectedStatus(ServerMessage),
}

impl ConsumerBatch {
    pub(crate) fn new(
        consumer: &Consumer,
        client: JetstreamClient,
        expires: Duration,
        max_msgs: usize,
    ) -> Result<Self, JetstreamError2> {
        let subject = format!(
            "{}.CONSUMER.MSG.NEXT.{}.{}",
            client.prefix, consumer.stream_name, consumer.config.name
        )
        .try_into()
        .map_err(JetstreamError2::Subject)?;

        let incoming_subject = client.client.create_inbox_subject();
        let payload = serde_json::to_vec(&if expires.is_zero() {
            json!({
                "batch": max_msgs,
                "no_wait": true,
            })
        } else {
            json!({
                "batch": max_msgs,
                "expires": expires.as_nanos(),
                "no_wait": true
            })
        })
        .map_err(JetstreamError2::Json)?;

        let subscription = client
            .client
            .subscribe(incoming_subject.clone(), None)
            .map_err(JetstreamError2::ClientClosed)?;
        client
            .client
            .publish(subject)
            .reply_subject(Some(incoming_subject))
            .payload(payload.into())
            .map_err(JetstreamError2::ClientClosed)?;

        let deadline = Instant::now() + expires.saturating_add(client.request_timeout);
        Ok(Self {
            client,
            subscription,
            deadline,
            pending_msgs: max_msgs,
        })
    }
}

impl Iterator for ConsumerBatch {
    type Item = Result<ServerMessage, ConsumerBatchError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.pending_msgs == 0 {
                return None;
            }

            match self.subscription.try_recv() {
                Some(Ok(msg)) => match msg.status_code {
                    None | Some(StatusCode::OK) => {
                        self.pending_msgs -= 1;
                        return Some(Ok(msg));
                    }
                    Some(StatusCode::IDLE_HEARTBEAT) => continue,
                    Some(StatusCode::TIMEOUT | StatusCode::NOT_FOUND) => {
                        self.pending_msgs = 0;
                        return None;
                    }
                    _ => {
                        self.pending_msgs = 0;
                        return Some(Err(ConsumerBatchError::UnexpectedStatus(msg)));
                    }
                },
                Some(Err(err)) => {
                    self.pending_msgs = 0;
                    return Some(Err(ConsumerBatchError::ServerError(err)));
                }
                None => {
                    let now = Instant::now();
                    if now >= self.deadline {
                        self.pending_msgs = 0;
                        return None;
                    }

                    let remaining = self.deadline - now;
                    if self
                        .client
                        .client
                        .process(Some(remaining.min(POLL_TIMEOUT)))
                        .is_err()
                    {
                        self.pending_msgs = 0;
                        return None;
                    }
                }
            }
        }
    }
}

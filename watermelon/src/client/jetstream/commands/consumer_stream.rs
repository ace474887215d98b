use std::time::Duration;

use rillwater_proto::ServerMessage;

use crate::client::{Consumer, JetstreamClient, JetstreamError2};

use super::{consumer_batch::ConsumerBatchError, ConsumerBatch};

/// An iterator that repeatedly runs consumer batch requests
///
/// Obtained from [`JetstreamClient::consumer_stream`]. Each exhausted batch is transparently
/// replaced by a new one, so the iterator runs until an error occurs or it is dropped.
#[must_use = "streams do nothing unless iterated"]
pub struct ConsumerStream {
    batch: Option<ConsumerBatch>,
    consumer: Consumer,
    client: JetstreamClient,

    expires: Duration,
    max_msgs: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum ConsumerStreamError {
    #[error("consumer batch error")]
    BatchError(#[source] ConsumerBatchError),
    #[error("jetstream error")]
    Jetstream(#[source] JetstreamError2),
}

impl ConsumerStream {
    pub(crate) fn new(
        consumer: Consumer,
        client: JetstreamClient,
        expires: Duration,
        max_msgs: usize,
    ) -> Self {
        Self {
            batch: None,
            consumer,
            client,

            expires,
            max_msgs,
        }
    }
}

impl Iterator for ConsumerStream {
    type Item = Result<ServerMessage, ConsumerStreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.batch.is_none() {
                match ConsumerBatch::new(
                    &self.consumer,
                    self.client.clone(),
                    self.expires,
                    self.max_msgs,
                ) {
                    Ok(batch) => self.batch = Some(batch),
                    Err(err) => return Some(Err(ConsumerStreamError::Jetstream(err))),
                }
            }

            let batch = self.batch.as_mut().expect("batch was just set");
            match batch.next() {
                Some(Ok(msg)) => return Some(Ok(msg)),
                Some(Err(err)) => {
                    self.batch = None;
                    return Some(Err(ConsumerStreamError::BatchError(err)));
                }
                None => {
                    self.batch = None;
                }
            }
        }
    }
}

use std::{collections::VecDeque, fmt::Display};

use serde::Deserialize;
use serde_json::json;
use rillwater_proto::Subject;

use crate::client::{self, jetstream::JetstreamError2, JetstreamClient};

/// An iterator over the consumers of a stream
///
/// Obtained from [`JetstreamClient::consumers`]. Each call to [`Iterator::next`] may block,
/// driving [`crate::core::Client::process`] internally, until a page of results arrives.
#[must_use = "streams do nothing unless iterated"]
pub struct Consumers {
    client: JetstreamClient,
    offset: u32,
    partial_subject: Subject,
    buffer: VecDeque<client::Consumer>,
    exhausted: bool,
}

#[derive(Debug, Deserialize)]
struct ConsumersResponse {
    limit: u32,
    consumers: VecDeque<client::Consumer>,
}

impl Consumers {
    pub(crate) fn new(client: JetstreamClient, stream_name: impl Display) -> Self {
        let partial_subject = format!("CONSUMER.LIST.{stream_name}")
            .try_into()
            .expect("stream name is valid");
        Self {
            client,
            offset: 0,
            partial_subject,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    fn fetch_next_page(&mut self) -> Result<(), JetstreamError2> {
        let resp = self.client.blocking_request(
            self.client.subject_for_request(&self.partial_subject),
            serde_json::to_vec(&json!({
                "offset": self.offset,
            }))
            .unwrap()
            .into(),
        )?;

        let response: ConsumersResponse =
            serde_json::from_slice(&resp.base.payload).map_err(JetstreamError2::Json)?;

        self.buffer = response.consumers;
        if self.buffer.len() < response.limit as usize {
            self.exhausted = true;
        } else if !self.buffer.is_empty() {
            self.offset += 1;
        }

        Ok(())
    }
}

impl Iterator for Consumers {
    type Item = Result<client::Consumer, JetstreamError2>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(consumer) = self.buffer.pop_front() {
            return Some(Ok(consumer));
        }

        if self.exhausted {
            return None;
        }

        if let Err(err) = self.fetch_next_page() {
            self.exhausted = true;
            return Some(Err(err));
        }

        self.buffer.pop_front().map(Ok)
    }
}

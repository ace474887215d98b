use std::collections::VecDeque;

use serde::Deserialize;
use serde_json::json;
use rillwater_proto::Subject;

use crate::client::{self, jetstream::JetstreamError2, JetstreamClient};

/// An iterator over the streams present on a Jetstream context
///
/// Obtained from [`JetstreamClient::streams`]. Each call to [`Iterator::next`] may block,
/// driving [`crate::core::Client::process`] internally, until a page of results arrives.
#[must_use = "streams do nothing unless iterated"]
pub struct Streams {
    client: JetstreamClient,
    offset: u32,
    buffer: VecDeque<client::Stream>,
    exhausted: bool,
}

#[derive(Debug, Deserialize)]
struct StreamsResponse {
    limit: u32,
    streams: VecDeque<client::Stream>,
}

impl Streams {
    pub(crate) fn new(client: JetstreamClient) -> Self {
        Self {
            client,
            offset: 0,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    fn fetch_next_page(&mut self) -> Result<(), JetstreamError2> {
        let resp = self.client.blocking_request(
            self.client
                .subject_for_request(&Subject::from_static("STREAM.LIST")),
            serde_json::to_vec(&json!({
                "offset": self.offset,
            }))
            .unwrap()
            .into(),
        )?;

        let response: StreamsResponse =
            serde_json::from_slice(&resp.base.payload).map_err(JetstreamError2::Json)?;

        self.buffer = response.streams;
        if self.buffer.len() < response.limit as usize {
            self.exhausted = true;
        } else if !self.buffer.is_empty() {
            self.offset += 1;
        }

        Ok(())
    }
}

impl Iterator for Streams {
    type Item = Result<client::Stream, JetstreamError2>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(stream) = self.buffer.pop_front() {
            return Some(Ok(stream));
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

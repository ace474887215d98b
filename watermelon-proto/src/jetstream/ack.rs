use alloc::string::{String, ToString};

use crate::Subject;

/// Metadata recovered from a JetStream message's reply-to subject
///
/// JetStream encodes per-message delivery metadata into the ack reply subject
/// rather than a header, so that a client which never acks never has to parse
/// it. Two wire formats exist: the pre-JetStream-domains 9-token form and the
/// 12-token form carrying an account hash and a trailing random token. Any
/// other token count means the reply-to isn't a JetStream ack subject at all;
/// this is not an error, metadata is simply unavailable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckMetadata {
    pub domain: Option<String>,
    pub account_hash: Option<String>,
    pub stream: String,
    pub consumer: String,
    pub num_delivered: u64,
    pub stream_sequence: u64,
    pub consumer_sequence: u64,
    pub timestamp_ns: u64,
    pub num_pending: u64,
}

const PREFIX: &str = "$JS.ACK.";

impl AckMetadata {
    /// Parse a reply-to subject, returning `None` if it isn't a recognised JetStream ack subject
    #[must_use]
    pub fn parse(reply_to: &str) -> Option<Self> {
        let rest = reply_to.strip_prefix(PREFIX)?;
        let tokens = rest.split('.').collect::<alloc::vec::Vec<_>>();

        match tokens.as_slice() {
            [stream, consumer, num_delivered, stream_seq, consumer_seq, timestamp_ns, num_pending] => {
                Some(Self {
                    domain: None,
                    account_hash: None,
                    stream: (*stream).to_string(),
                    consumer: (*consumer).to_string(),
                    num_delivered: num_delivered.parse().ok()?,
                    stream_sequence: stream_seq.parse().ok()?,
                    consumer_sequence: consumer_seq.parse().ok()?,
                    timestamp_ns: timestamp_ns.parse().ok()?,
                    num_pending: num_pending.parse().ok()?,
                })
            }
            [domain, account_hash, stream, consumer, num_delivered, stream_seq, consumer_seq, timestamp_ns, num_pending, _random] =>
            {
                Some(Self {
                    domain: Some((*domain).to_string()),
                    account_hash: Some((*account_hash).to_string()),
                    stream: (*stream).to_string(),
                    consumer: (*consumer).to_string(),
                    num_delivered: num_delivered.parse().ok()?,
                    stream_sequence: stream_seq.parse().ok()?,
                    consumer_sequence: consumer_seq.parse().ok()?,
                    timestamp_ns: timestamp_ns.parse().ok()?,
                    num_pending: num_pending.parse().ok()?,
                })
            }
            _ => None,
        }
    }
}

/// A positive acknowledgement: the message was processed and should not be redelivered
#[derive(Debug, Clone, Copy)]
pub struct Ack;

/// A negative acknowledgement, optionally asking the server to delay the next redelivery
#[derive(Debug, Clone, Copy)]
pub struct Nack {
    pub delay_ns: Option<u64>,
}

/// Resets the ack-wait timer on the server without acknowledging the message
#[derive(Debug, Clone, Copy)]
pub struct Progress;

/// Tells the server to give up on the message permanently; it is never redelivered
#[derive(Debug, Clone)]
pub struct Term {
    pub subject: Subject,
    pub reason: Option<String>,
}

impl Ack {
    #[must_use]
    pub fn body() -> &'static [u8] {
        b"+ACK"
    }
}

impl Nack {
    #[must_use]
    pub fn render_body(&self) -> alloc::vec::Vec<u8> {
        match self.delay_ns {
            Some(delay_ns) => alloc::format!("-NAK {{\"delay\":{delay_ns}}}").into_bytes(),
            None => b"-NAK".to_vec(),
        }
    }
}

impl Progress {
    #[must_use]
    pub fn body() -> &'static [u8] {
        b"+WPI"
    }
}

impl Term {
    #[must_use]
    pub fn render_body(&self) -> alloc::vec::Vec<u8> {
        match &self.reason {
            Some(reason) => alloc::format!("+TERM {reason}").into_bytes(),
            None => b"+TERM".to_vec(),
        }
    }

    /// Render the full `PUB` frame for this term, as would be written to the wire
    ///
    /// Two spaces appear between the subject and the length because there is no
    /// reply subject on an ack publish: `PUB <subject> <reply> <len>` collapses
    /// to `PUB <subject>  <len>` when `<reply>` is empty.
    #[must_use]
    pub fn render(&self) -> String {
        let body = self.render_body();
        alloc::format!(
            "PUB {} {} {}\r\n{}",
            self.subject,
            "",
            body.len(),
            String::from_utf8_lossy(&body)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{AckMetadata, Term};
    use crate::Subject;

    #[test]
    fn parse_v1() {
        let meta = AckMetadata::parse(
            "$JS.ACK.mystream.myconsumer.1.3.18.1719992702186105579.0",
        )
        .unwrap();
        assert_eq!(1_719_992_702_186_105_579, meta.timestamp_ns);
        assert_eq!("mystream", meta.stream);
        assert_eq!("myconsumer", meta.consumer);
        assert!(meta.domain.is_none());
    }

    #[test]
    fn parse_v2() {
        let meta = AckMetadata::parse(
            "$JS.ACK.domain.ACCHASH.mystream.myconsumer.1.3.18.1719992702186105579.0.abc123",
        )
        .unwrap();
        assert_eq!(1_719_992_702_186_105_579, meta.timestamp_ns);
        assert_eq!(Some("domain".to_string()), meta.domain);
        assert_eq!(Some("ACCHASH".to_string()), meta.account_hash);
    }

    #[test]
    fn parse_unrelated_subject_is_none() {
        assert!(AckMetadata::parse("foo.bar").is_none());
    }

    #[test]
    fn term_render() {
        let term = Term {
            subject: Subject::from_static(
                "$JS.ACK.stream.consumer.1.3.18.1719992702186105579.0",
            ),
            reason: None,
        };
        assert_eq!(
            "PUB $JS.ACK.stream.consumer.1.3.18.1719992702186105579.0  5\r\n+TERM",
            term.render()
        );
    }

    #[test]
    fn term_render_with_reason() {
        let term = Term {
            subject: Subject::from_static(
                "$JS.ACK.stream.consumer.1.3.18.1719992702186105579.0",
            ),
            reason: Some("invalid message".to_string()),
        };
        assert_eq!(21, term.render_body().len());
    }
}

//! Stream-backed key-value buckets
//!
//! A bucket named `X` is a Jetstream stream `KV_X` with subject set `$KV.X.>`, one
//! message kept per subject up to the configured history depth, and rollup headers
//! enabled so [`Bucket::purge`] can compact away prior revisions. A KV bucket is not a
//! new wire mechanism: every operation here is a publish or a pull-consumer read against
//! that stream, using the same primitives as [`crate::jetstream`].

use std::{collections::BTreeMap, num::NonZeroU32, time::Duration};

use bytes::Bytes;
use rillwater_proto::{
    headers::{HeaderMap, HeaderName, HeaderValue},
    jetstream::AckMetadata,
    Subject,
};

use crate::{
    core::error::ResponseError,
    jetstream::{
        error::{JetstreamError2, JetstreamErrorCode},
        AckPolicy, ConsumerBatchError, ConsumerConfig, ConsumerDurability, ConsumerSpecificConfig,
        ConsumerStorage, DeliverPolicy, DiscardPolicy, JetstreamClient, ReplayPolicy,
        RetentionPolicy, Storage, StreamConfig,
    },
};

const STREAM_PREFIX: &str = "KV_";
const SUBJECT_PREFIX: &str = "$KV.";
const ENTRIES_PER_PAGE: usize = 1024;
const PULL_EXPIRES: Duration = Duration::from_millis(500);

/// A handle to a Jetstream-backed key-value bucket
#[derive(Debug, Clone)]
pub struct Bucket {
    js: JetstreamClient,
    name: String,
    stream_name: String,
}

/// An error encountered while performing an optimistic-concurrency [`Bucket::update`]
#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    /// The key's current revision didn't match the expected one
    #[error("revision mismatch")]
    RevisionMismatch,
    #[error(transparent)]
    Jetstream(#[from] JetstreamError2),
}

/// A single revision of a key, as observed through [`Bucket::get_all`] or [`Bucket::history`]
#[derive(Debug, Clone)]
pub struct Entry {
    pub key: String,
    pub value: Option<Bytes>,
    pub revision: u64,
    pub operation: Operation,
}

/// The operation that produced an [`Entry`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Put,
    Delete,
    Purge,
}

impl Bucket {
    /// Create a bucket named `name`, keeping `history` revisions per key
    ///
    /// # Errors
    ///
    /// It returns an error if `name` doesn't fit the subject grammar or the broker
    /// rejects the stream configuration (e.g. a bucket with the same name but a
    /// different history depth already exists).
    pub fn create(
        js: &JetstreamClient,
        name: impl Into<String>,
        history: NonZeroU32,
    ) -> Result<Self, JetstreamError2> {
        let name = name.into();
        let stream_name = format!("{STREAM_PREFIX}{name}");

        js.create_stream(&StreamConfig {
            name: stream_name.clone(),
            description: None,
            subjects: vec![format!("{SUBJECT_PREFIX}{name}.>")],
            retention: RetentionPolicy::Limits,
            max_consumers: None,
            max_messages: None,
            max_bytes: None,
            max_age: Duration::ZERO,
            max_messages_per_subject: Some(u64::from(history.get())),
            max_message_size: None,
            discard_policy: DiscardPolicy::New,
            storage: Storage::File,
            replicas: NonZeroU32::new(1).expect("1 is a valid replica count"),
            duplicate_window: Duration::from_secs(120),
            compression: None,
            allow_direct: true,
            mirror_direct: false,
            sealed: false,
            allow_delete: true,
            allow_purge: true,
            allow_rollup_hdrs: true,
            consumer_limits: None,
            allow_msg_schedules: None,
        })?;

        Ok(Self {
            js: js.clone(),
            name,
            stream_name,
        })
    }

    /// Look up an existing bucket named `name`
    ///
    /// # Errors
    ///
    /// It returns an error if `name` doesn't fit the subject grammar or the request fails.
    pub fn bucket(js: &JetstreamClient, name: impl Into<String>) -> Result<Option<Self>, JetstreamError2> {
        let name = name.into();
        let stream_name = format!("{STREAM_PREFIX}{name}");

        Ok(js.stream(&stream_name)?.map(|_| Self {
            js: js.clone(),
            name,
            stream_name,
        }))
    }

    fn key_subject(&self, key: &str) -> Subject {
        format!("{SUBJECT_PREFIX}{}.{key}", self.name)
            .try_into()
            .expect("bucket name and key were already validated against the subject grammar")
    }

    fn bucket_wildcard(&self) -> Subject {
        format!("{SUBJECT_PREFIX}{}.>", self.name)
            .try_into()
            .expect("bucket name was already validated against the subject grammar")
    }

    /// Store `value` under `key`, returning the revision assigned to it
    ///
    /// # Errors
    ///
    /// It returns an error if the client has been closed or the broker rejects the publish.
    pub fn put(&self, key: &str, value: Bytes) -> Result<u64, JetstreamError2> {
        Ok(self.js.publish(self.key_subject(key), HeaderMap::new(), value)?.seq)
    }

    /// Store `value` under `key`, but only if its current revision is `expected_revision`
    ///
    /// # Errors
    ///
    /// It returns [`UpdateError::RevisionMismatch`] if the key moved on to a different
    /// revision in the meantime, or a Jetstream error for any other failure.
    pub fn update(&self, key: &str, value: Bytes, expected_revision: u64) -> Result<u64, UpdateError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::EXPECTED_LAST_SUBJECT_SEQUENCE,
            HeaderValue::from_dangerous_value(expected_revision.to_string().into()),
        );

        match self.js.publish(self.key_subject(key), headers, value) {
            Ok(ack) => Ok(ack.seq),
            Err(JetstreamError2::Status(err))
                if err.code() == JetstreamErrorCode::STREAM_WRONG_LAST_SEQUENCE =>
            {
                Err(UpdateError::RevisionMismatch)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Delete `key`, leaving a tombstone behind (a future [`Bucket::history`] call still
    /// observes the deletion)
    ///
    /// # Errors
    ///
    /// It returns an error if the client has been closed or the broker rejects the publish.
    pub fn delete(&self, key: &str) -> Result<(), JetstreamError2> {
        let mut headers = HeaderMap::new();
        headers.insert(HeaderName::KV_OPERATION, HeaderValue::from_static("DEL"));
        self.js.publish(self.key_subject(key), headers, Bytes::new())?;
        Ok(())
    }

    /// Delete `key` and roll up every prior revision, so it no longer appears in history
    ///
    /// # Errors
    ///
    /// It returns an error if the client has been closed or the broker rejects the publish.
    pub fn purge(&self, key: &str) -> Result<(), JetstreamError2> {
        let mut headers = HeaderMap::new();
        headers.insert(HeaderName::KV_OPERATION, HeaderValue::from_static("PURGE"));
        headers.insert(HeaderName::ROLLUP, HeaderValue::from_static("sub"));
        self.js.publish(self.key_subject(key), headers, Bytes::new())?;
        Ok(())
    }

    /// Read the value currently stored under `key`
    ///
    /// Returns `Ok(None)` both when the key was never written and when its last
    /// operation was a delete or a purge.
    ///
    /// # Errors
    ///
    /// It returns an error if the client has been closed or the underlying read fails.
    pub fn get(&self, key: &str) -> Result<Option<Bytes>, JetstreamError2> {
        let mut entries = EntryIter::new(self, DeliverPolicy::LastPerSubject, self.key_subject(key))?;
        Ok(entries.next().transpose()?.and_then(|entry| entry.value))
    }

    /// Enumerate the latest revision of every key in the bucket
    ///
    /// # Errors
    ///
    /// It returns an error if the ephemeral consumer backing this scan can't be created.
    pub fn get_all(&self) -> Result<EntryIter, JetstreamError2> {
        EntryIter::new(self, DeliverPolicy::LastPerSubject, self.bucket_wildcard())
    }

    /// Enumerate every revision of `key`, including tombstones, oldest first
    ///
    /// # Errors
    ///
    /// It returns an error if the ephemeral consumer backing this scan can't be created.
    pub fn history(&self, key: &str) -> Result<EntryIter, JetstreamError2> {
        EntryIter::new(self, DeliverPolicy::All, self.key_subject(key))
    }
}

/// An iterator over [`Entry`] values produced by [`Bucket::get_all`] or [`Bucket::history`]
///
/// Backed by a transient ordered pull consumer; dropping the iterator deletes it.
#[must_use = "iterators do nothing unless iterated"]
pub struct EntryIter {
    js: JetstreamClient,
    stream_name: String,
    consumer_name: String,
    batch: crate::jetstream::ConsumerBatch,
}

impl EntryIter {
    fn new(bucket: &Bucket, deliver_policy: DeliverPolicy, filter: Subject) -> Result<Self, JetstreamError2> {
        let config = ConsumerConfig {
            durability: ConsumerDurability::Ephemeral,
            name: String::new(),
            description: String::new(),
            deliver_policy,
            ack_policy: AckPolicy::None,
            max_deliver: None,
            backoff: Vec::new(),
            filter_subjects: vec![filter],
            replay_policy: ReplayPolicy::Instant,
            rate_limit: None,
            flow_control: None,
            idle_heartbeat: Duration::ZERO,
            headers_only: false,
            specs: ConsumerSpecificConfig::Pull {
                max_waiting: None,
                max_request_batch: None,
                max_request_expires: Duration::ZERO,
                max_request_max_bytes: None,
            },
            inactive_threshold: Duration::from_secs(30),
            replicas: None,
            storage: ConsumerStorage::Disk,
            metadata: BTreeMap::new(),
        };

        let consumer = bucket.js.create_consumer(&bucket.stream_name, &config)?;
        let consumer_name = consumer.config.name.clone();
        let batch = bucket.js.consumer_batch(&consumer, PULL_EXPIRES, ENTRIES_PER_PAGE)?;

        Ok(Self {
            js: bucket.js.clone(),
            stream_name: bucket.stream_name.clone(),
            consumer_name,
            batch,
        })
    }
}

impl Iterator for EntryIter {
    type Item = Result<Entry, JetstreamError2>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(match self.batch.next()? {
            Ok(message) => Ok(message_to_entry(&message)),
            Err(ConsumerBatchError::ServerError(err)) => {
                Err(JetstreamError2::ResponseError(ResponseError::ServerError(err)))
            }
            Err(ConsumerBatchError::UnexpectedStatus(message)) => {
                Err(JetstreamError2::UnexpectedMessage(message))
            }
        })
    }
}

impl Drop for EntryIter {
    fn drop(&mut self) {
        let _ = self.js.delete_consumer(&self.stream_name, &self.consumer_name);
    }
}

fn message_to_entry(message: &rillwater_proto::ServerMessage) -> Entry {
    let key = message
        .base
        .subject
        .as_str()
        .rsplit('.')
        .next()
        .unwrap_or_default()
        .to_string();
    let revision = message
        .base
        .reply_subject
        .as_ref()
        .and_then(|reply_to| AckMetadata::parse(reply_to.as_str()))
        .map_or(0, |meta| meta.stream_sequence);

    let operation = match message
        .base
        .headers
        .get(&HeaderName::KV_OPERATION)
        .map(HeaderValue::as_str)
    {
        Some("DEL") => Operation::Delete,
        Some("PURGE") => Operation::Purge,
        _ => Operation::Put,
    };

    let value = match operation {
        Operation::Put => Some(message.base.payload.clone()),
        Operation::Delete | Operation::Purge => None,
    };

    Entry {
        key,
        value,
        revision,
        operation,
    }
}

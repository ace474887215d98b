use std::{num::NonZeroU32, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{compression, duration, nullable_datetime, nullable_number, opposite_bool};

/// A Jetstream stream
#[derive(Debug, Deserialize)]
pub struct Stream {
    pub config: StreamConfig,
    #[serde(rename = "created")]
    pub created_at: DateTime<Utc>,
    // TODO: `cluster`
}

/// The state of the stream
#[derive(Debug, Deserialize)]
pub struct StreamState {
    pub messages: u64,
    pub bytes: u64,
    pub first_sequence: u64,
    #[serde(with = "nullable_datetime", rename = "first_ts")]
    pub first_sequence_timestamp: Option<DateTime<Utc>>,
    pub last_sequence: u64,
    #[serde(with = "nullable_datetime", rename = "last_ts")]
    pub last_sequence_timestamp: Option<DateTime<Utc>>,
    pub consumer_count: u32,
}

/// A Jetstream stream configuration
#[derive(Debug, Serialize, Deserialize)]
#[expect(
    clippy::struct_excessive_bools,
    reason = "it is the actual config of a Jetstream"
)]
pub struct StreamConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub subjects: Vec<String>,
    #[serde(with = "nullable_number")]
    pub max_consumers: Option<u32>,
    #[serde(default)]
    pub retention: RetentionPolicy,
    #[serde(with = "nullable_number", rename = "max_msgs")]
    pub max_messages: Option<u64>,
    #[serde(with = "nullable_number")]
    pub max_bytes: Option<u64>,
    #[serde(with = "duration")]
    pub max_age: Duration,
    #[serde(with = "nullable_number", rename = "max_msgs_per_subject")]
    pub max_messages_per_subject: Option<u64>,
    #[serde(with = "nullable_number", rename = "max_msg_size")]
    pub max_message_size: Option<u32>,
    #[serde(rename = "discard")]
    pub discard_policy: DiscardPolicy,
    pub storage: Storage,
    #[serde(rename = "num_replicas")]
    pub replicas: NonZeroU32,
    #[serde(with = "duration")]
    pub duplicate_window: Duration,
    #[serde(with = "compression")]
    pub compression: Option<Compression>,
    pub allow_direct: bool,
    pub mirror_direct: bool,
    pub sealed: bool,
    #[serde(with = "opposite_bool", rename = "deny_delete")]
    pub allow_delete: bool,
    #[serde(with = "opposite_bool", rename = "deny_purge")]
    pub allow_purge: bool,
    pub allow_rollup_hdrs: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumer_limits: Option<ConsumerLimits>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_msg_schedules: Option<bool>,
}

/// Limits applied by default to every consumer created on a stream
#[derive(Debug, Serialize, Deserialize, Default)]
pub struct ConsumerLimits {
    #[serde(with = "duration", rename = "inactive_threshold")]
    pub inactive_threshold: Duration,
    #[serde(with = "nullable_number", rename = "max_ack_pending")]
    pub max_ack_pending: Option<u64>,
}

/// A streams retention policy
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionPolicy {
    #[default]
    Limits,
    Interest,
    WorkQueue,
}

/// A streams discard policy
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscardPolicy {
    Old,
    New,
}

/// Whether the disk is stored on disk or in memory
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Storage {
    File,
    Memory,
}

/// The compression algorithm used by a stream
#[derive(Debug)]
pub enum Compression {
    S2,
}

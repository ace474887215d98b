//! Wire-level helpers for the persistent-stream subsystem
//!
//! Everything here is sans-IO: subject parsing, ack body rendering, and the
//! `Nats-Schedule` grammar. The RPC layer and stream/consumer resource types
//! live in the `rillwater` crate, which is where a live connection is needed.

pub mod ack;
pub mod schedule;

pub use self::ack::{Ack, AckMetadata, Nack, Progress, Term};
pub use self::schedule::ScheduleSpec;

pub use rillwater_proto as proto;

mod atomic;
mod client;
pub mod kv;
mod multiplexed_subscription;
pub mod service;
mod subscription;
#[cfg(test)]
pub(crate) mod tests;

pub mod core {
    //! NATS Core functionality implementation

    pub use crate::client::{
        Client, ClientBuilder, DelayMode, Echo, ProcessError, ProcessOutcome, QuickInfo,
    };
    pub(crate) use crate::multiplexed_subscription::MultiplexedSubscription;
    pub use crate::subscription::Subscription;
    pub use rillwater_mini::AuthenticationMethod;

    pub mod publish {
        //! Utilities for publishing messages

        pub use crate::client::{ClientPublish, Publish, PublishBuilder};
    }

    pub mod request {
        //! Utilities for publishing messages and awaiting for a response

        pub use crate::client::{ClientRequest, Request, RequestBuilder, ResponseHandle};
    }

    pub mod error {
        //! NATS Core specific errors

        pub use crate::client::{ClientClosedError, ResponseError, TryCommandError};
    }
}

pub mod jetstream {
    //! NATS Jetstream functionality implementation
    //!
    //! Relies on NATS Core to communicate with the NATS server

    pub use crate::client::{
        AckPolicy, Compression, Consumer, ConsumerBatch, ConsumerBatchError, ConsumerConfig,
        ConsumerDurability, ConsumerLimits, ConsumerSpecificConfig, ConsumerStorage,
        ConsumerStream, ConsumerStreamError, Consumers, DeliverPolicy, DiscardPolicy,
        JetstreamClient, PubAck, ReplayPolicy, RetentionPolicy, Storage, Stream, StreamConfig,
        StreamPurgeRequest, StreamState, Streams,
    };

    pub mod error {
        //! NATS Jetstream specific errors

        pub use crate::client::{JetstreamError, JetstreamError2, JetstreamErrorCode};
    }
}

pub use self::consumer_batch::{ConsumerBatch, ConsumerBatchError};
pub use self::consumer_list::Consumers;
pub use self::consumer_stream::{ConsumerStream, ConsumerStreamError};
pub use self::stream_list::Streams;

mod consumer_batch;
mod consumer_list;
mod consumer_stream;
mod stream_list;

pub use self::publish::{ClientPublish, Publish, PublishBuilder};
pub use self::request::{ClientRequest, Request, RequestBuilder, ResponseError, ResponseHandle};

mod publish;
mod request;

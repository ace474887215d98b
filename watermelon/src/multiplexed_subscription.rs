use rillwater_proto::{ServerMessage, Subject};

use crate::core::Client;

#[derive(Debug)]
pub(crate) struct MultiplexedSubscription {
    reply_subject: Subject,
    client: Client,
    done: bool,
}

impl MultiplexedSubscription {
    pub(crate) fn new(reply_subject: Subject, client: Client) -> Self {
        Self {
            reply_subject,
            client,
            done: false,
        }
    }

    /// Retrieve the response, without blocking
    ///
    /// Returns `None` if the response hasn't arrived yet.
    pub(crate) fn try_recv(&mut self) -> Option<ServerMessage> {
        if self.done {
            return None;
        }

        let message = self.client.try_recv_multiplexed(&self.reply_subject);
        if message.is_some() {
            self.done = true;
        }
        message
    }
}

impl Drop for MultiplexedSubscription {
    fn drop(&mut self) {
        if self.done {
            return;
        }

        self.client
            .lazy_unsubscribe_multiplexed(self.reply_subject.clone());
    }
}

pub use self::connection::{connect as proto_connect, Connection, SetReadTimeout, ShutdownSocket};
pub use self::dial::connect as connect_tcp;

mod connection;
mod dial;

pub mod error {
    pub use super::connection::{ConnectError, ConnectionReadError};
}

use std::{
    io::{BufRead, BufReader, Write},
    net::{TcpListener, TcpStream},
    thread,
    time::Duration,
};

use crate::core::Client;

const FAKE_INFO: &str = concat!(
    "INFO {\"server_id\":\"test\",\"server_name\":\"test\",\"version\":\"0.0.0\",",
    "\"go\":\"go0.0.0\",\"host\":\"127.0.0.1\",\"port\":4222,\"headers\":true,",
    "\"max_payload\":1048576,\"proto\":1}\r\n"
);

/// Spin up a throwaway TCP listener that speaks just enough of the protocol to complete the
/// handshake, connect a real [`Client`] to it, and run `f` against that client.
///
/// Good enough to exercise subscription/publish bookkeeping; anything relying on a real
/// server response must push the message into the relevant queue directly.
pub(crate) fn with_loopback_client<F, T>(f: F) -> T
where
    F: FnOnce(&Client) -> T,
{
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback listener");
    let addr = listener
        .local_addr()
        .expect("loopback listener has a local address");

    let server = thread::spawn(move || {
        let (stream, _) = listener.accept().expect("accept loopback connection");
        run_fake_server(stream);
    });

    let server_addr = format!("nats://{addr}")
        .parse()
        .expect("loopback address is a valid server address");
    let client = Client::builder()
        .connect(&server_addr, Some(Duration::from_secs(5)))
        .expect("handshake against the loopback server succeeds");

    let result = f(&client);
    drop(client);
    let _ = server.join();
    result
}

fn run_fake_server(mut stream: TcpStream) {
    if stream.write_all(FAKE_INFO.as_bytes()).is_err() {
        return;
    }

    let mut reader = BufReader::new(stream.try_clone().expect("clone loopback stream"));
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) | Err(_) => return,
            Ok(_) => {
                if line.trim_end() == "PING" && stream.write_all(b"PONG\r\n").is_err() {
                    return;
                }
            }
        }
    }
}

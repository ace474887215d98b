use std::{
    io::{BufRead, BufReader, Write},
    net::{TcpListener, TcpStream},
    thread,
    time::Duration,
};

use rillwater_proto::Subject;

use crate::{core::Echo, tests::with_loopback_client};

#[test]
fn subscribe_assigns_increasing_ids() {
    with_loopback_client(|client| {
        let first = client
            .subscribe(Subject::from_static("a"), None)
            .expect("client is open");
        let second = client
            .subscribe(Subject::from_static("b"), None)
            .expect("client is open");

        assert!(second.id() > first.id());
    });
}

#[test]
fn quick_info_reflects_a_live_connection() {
    with_loopback_client(|client| {
        assert!(client.quick_info().is_connected());
    });
}

#[test]
fn close_marks_the_client_closed() {
    with_loopback_client(|client| {
        client.close();
        assert!(client
            .subscribe(Subject::from_static("a"), None)
            .is_err());
    });
}

#[test]
fn reconnect_reissues_live_subscriptions() {
    const FAKE_INFO: &str = concat!(
        "INFO {\"server_id\":\"test\",\"server_name\":\"test\",\"version\":\"0.0.0\",",
        "\"go\":\"go0.0.0\",\"host\":\"127.0.0.1\",\"port\":4222,\"headers\":true,",
        "\"max_payload\":1048576,\"proto\":1}\r\n"
    );

    let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback listener");
    let addr = listener.local_addr().expect("listener has a local address");
    let server = thread::spawn(move || {
        let (stream, _) = listener.accept().expect("accept loopback connection");
        run_fake_server(stream)
    });

    let server_addr = format!("nats://{addr}")
        .parse()
        .expect("loopback address is a valid server address");
    let client = crate::core::Client::builder()
        .connect(&server_addr, Some(Duration::from_secs(5)))
        .expect("handshake against the loopback server succeeds");
    let subscription = client
        .subscribe(Subject::from_static("orders.created"), None)
        .expect("client is open");

    let second_listener = TcpListener::bind("127.0.0.1:0").expect("bind second listener");
    let second_addr = second_listener
        .local_addr()
        .expect("listener has a local address");
    let second_server = thread::spawn(move || {
        let (stream, _) = second_listener.accept().expect("accept second connection");
        run_fake_server(stream)
    });

    let second_server_addr = format!("nats://{second_addr}")
        .parse()
        .expect("loopback address is a valid server address");
    client
        .reconnect(
            &second_server_addr,
            None,
            Echo::Prevent,
            Some(Duration::from_secs(5)),
        )
        .expect("reconnect against the second loopback server succeeds");

    // `reconnect` only enqueues the re-issued SUBs; flush them onto the wire.
    let _ = client.process(Some(Duration::from_millis(200)));

    drop(subscription);
    drop(client);
    let _ = server.join();
    let received = second_server.join().expect("second fake server thread");

    assert!(
        received
            .lines()
            .any(|line| line.starts_with("SUB orders.created ")),
        "expected a re-issued SUB for the live subscription, got: {received:?}"
    );

    fn run_fake_server(mut stream: TcpStream) -> String {
        let mut received = String::new();
        if stream.write_all(FAKE_INFO.as_bytes()).is_err() {
            return received;
        }

        let mut reader = BufReader::new(stream.try_clone().expect("clone loopback stream"));
        let mut line = String::new();
        loop {
            line.clear();
            match reader.read_line(&mut line) {
                Ok(0) | Err(_) => return received,
                Ok(_) => {
                    let trimmed = line.trim_end();
                    if trimmed == "PING" {
                        if stream.write_all(b"PONG\r\n").is_err() {
                            return received;
                        }
                    } else if !trimmed.is_empty() {
                        received.push_str(trimmed);
                        received.push('\n');
                    }
                }
            }
        }
    }
}

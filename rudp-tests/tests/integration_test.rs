//! End-to-end tests over loopback sockets
//!
//! Timeouts are kept short and every retry loop is bounded by time so a
//! regression fails instead of hanging.

use bytes::Bytes;
use rudp::{
    ConnectionState, Delivery, Endpoint, GoBackN, RetryPolicy, StopAndWait, Transport,
    TransportConfig,
};
use rudp_cli::{respond, Request, Response};
use rudp_io::ScriptedFaults;
use std::net::SocketAddr;
use std::thread;
use std::time::Duration;

fn config() -> TransportConfig {
    TransportConfig::reliable()
        .with_timeout(Duration::from_millis(100))
        .with_retry(RetryPolicy::within(Duration::from_secs(20)))
}

fn lossy_config(seed: u64) -> TransportConfig {
    config().with_loss(0.2).with_corruption(0.1).with_seed(seed)
}

fn localhost() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}

/// Bind a listening endpoint, returning it with its address
fn listener(config: TransportConfig) -> (Endpoint, SocketAddr) {
    let endpoint = Endpoint::bind(localhost(), config).unwrap();
    let addr = endpoint.local_addr().unwrap();
    (endpoint, addr)
}

#[test]
fn test_handshake_establishes_both_sides() {
    let (mut server, server_addr) = listener(config());

    let handle = thread::spawn(move || {
        let peer = server.accept().unwrap();
        (server, peer)
    });

    let mut client = Endpoint::bind(localhost(), config()).unwrap();
    client.connect(server_addr).unwrap();
    assert_eq!(client.state(), ConnectionState::Established);
    assert_eq!(client.remote_addr(), Some(server_addr));

    let (server, peer) = handle.join().unwrap();
    assert_eq!(peer, client.local_addr().unwrap());
    assert_eq!(server.state(), ConnectionState::Established);
}

#[test]
fn test_handshake_survives_lossy_channel() {
    let (mut server, server_addr) = listener(lossy_config(11));
    let handle = thread::spawn(move || server.accept().unwrap());

    let mut client = Endpoint::bind(localhost(), lossy_config(12)).unwrap();
    client.connect(server_addr).unwrap();

    assert_eq!(handle.join().unwrap(), client.local_addr().unwrap());
}

#[test]
fn test_connect_gives_up_without_server() {
    // Bound but never reading
    let (_silent, silent_addr) = listener(config());
    let mut client = Endpoint::bind(
        localhost(),
        config().with_retry(RetryPolicy::attempts(3)),
    )
    .unwrap();

    let err = client.connect(silent_addr).unwrap_err();
    assert!(err.is_retries_exhausted());
}

#[test]
fn test_stop_and_wait_retransmits_dropped_frame() {
    let (mut server, server_addr) = listener(config());
    let handle = thread::spawn(move || {
        server.accept().unwrap();
        let mut engine = StopAndWait::new(server);
        let delivery = engine.receive().unwrap();
        (delivery, engine.stats())
    });

    let mut client = Endpoint::bind_with_faults(
        localhost(),
        config(),
        ScriptedFaults::new().drops([true]),
    )
    .unwrap();
    client.connect(server_addr).unwrap();
    let mut engine = StopAndWait::new(client);
    engine.send(b"X").unwrap();

    assert_eq!(engine.endpoint().channel_stats().attempts, 2);
    assert_eq!(engine.stats().retransmissions, 1);

    let (delivery, stats) = handle.join().unwrap();
    assert_eq!(delivery, Delivery::Data(Bytes::from_static(b"X")));
    assert_eq!(stats.delivered, 1);
}

#[test]
fn test_stop_and_wait_lossy_sequence() {
    let messages: Vec<String> = (0..8).map(|i| format!("message {}", i)).collect();

    let (mut server, server_addr) = listener(lossy_config(21));
    let expected = messages.len();
    let handle = thread::spawn(move || {
        server.accept().unwrap();
        let mut engine = StopAndWait::new(server);
        let mut received = Vec::new();
        loop {
            match engine.receive().unwrap() {
                Delivery::Data(data) => received.push(data),
                Delivery::EndOfStream => break,
            }
        }
        assert_eq!(received.len(), expected);
        (received, engine.endpoint().state())
    });

    // Loss but no corruption on the closing side: once the server has seen
    // FIN it stops reading, so a corrupted final ACK could not be repeated
    let mut client =
        Endpoint::bind(localhost(), config().with_loss(0.2).with_seed(22)).unwrap();
    client.connect(server_addr).unwrap();
    let mut engine = StopAndWait::new(client);
    for message in &messages {
        engine.send(message.as_bytes()).unwrap();
    }
    engine.close().unwrap();
    assert_eq!(engine.endpoint().state(), ConnectionState::Closed);

    let (received, state) = handle.join().unwrap();
    let received: Vec<String> = received
        .iter()
        .map(|data| String::from_utf8(data.to_vec()).unwrap())
        .collect();
    assert_eq!(received, messages);
    assert_eq!(state, ConnectionState::Closed);
}

#[test]
fn test_teardown_signals_end_of_stream() {
    let (mut server, server_addr) = listener(config());
    let handle = thread::spawn(move || {
        server.accept().unwrap();
        StopAndWait::new(server).receive().unwrap()
    });

    let mut client = Endpoint::bind(localhost(), config()).unwrap();
    client.connect(server_addr).unwrap();
    let mut engine = StopAndWait::new(client);
    engine.close().unwrap();

    assert!(handle.join().unwrap().is_end_of_stream());
}

#[test]
fn test_go_back_n_lossy_in_order() {
    let payloads: Vec<Bytes> = (0..20)
        .map(|i| Bytes::from(format!("segment-{:02}", i)))
        .collect();

    let (mut server, server_addr) = listener(lossy_config(31));
    let sender_payloads = payloads.clone();

    let mut client = Endpoint::bind(localhost(), lossy_config(32)).unwrap();
    let client_addr = client.local_addr().unwrap();
    let sender = thread::spawn(move || {
        client.connect(server_addr).unwrap();
        let mut engine = GoBackN::new(client).unwrap();
        engine.send_batch(&sender_payloads).unwrap();
        engine.close().unwrap();
        engine.stats()
    });

    assert_eq!(server.accept().unwrap(), client_addr);
    let receiver = GoBackN::new(server).unwrap();
    let mut received = Vec::new();
    loop {
        match receiver.receive().unwrap() {
            Delivery::Data(data) => received.push(data),
            Delivery::EndOfStream => break,
        }
    }

    // Keep the receiver alive until the sender's FIN is acknowledged
    let stats = sender.join().unwrap();
    assert_eq!(received, payloads);
    assert!(stats.transmissions >= payloads.len() as u64);
}

#[test]
fn test_go_back_n_sequence_wraps() {
    let config = config().with_window(4, 8);
    let payloads: Vec<Bytes> = (0..30u32).map(|i| Bytes::from(i.to_string())).collect();

    let (mut server, server_addr) = listener(config.clone());
    let mut client = Endpoint::bind(localhost(), config).unwrap();
    let sender_payloads = payloads.clone();
    let sender = thread::spawn(move || {
        client.connect(server_addr).unwrap();
        let engine = GoBackN::new(client).unwrap();
        // Two batches, so the second starts mid-space
        engine.send_batch(&sender_payloads[..13]).unwrap();
        engine.send_batch(&sender_payloads[13..]).unwrap();
        engine
    });

    server.accept().unwrap();
    let receiver = GoBackN::new(server).unwrap();
    let received: Vec<Bytes> = (0..payloads.len())
        .map(|_| receiver.receive().unwrap().into_data().unwrap())
        .collect();
    assert_eq!(received, payloads);
    drop(sender.join().unwrap());
}

#[test]
fn test_http_exchange() {
    let (mut server, server_addr) = listener(config());
    let handle = thread::spawn(move || {
        server.accept().unwrap();
        let mut engine = StopAndWait::new(server);
        let mut served = 0;
        while let Delivery::Data(data) = engine.receive().unwrap() {
            let request = Request::parse(&data).unwrap();
            engine.send(&respond(&request).to_bytes()).unwrap();
            served += 1;
        }
        served
    });

    let mut client = Endpoint::bind(localhost(), config()).unwrap();
    client.connect(server_addr).unwrap();
    let mut transport: Box<dyn Transport> = Box::new(StopAndWait::new(client));

    transport.send(&Request::get("/index.html").to_bytes()).unwrap();
    let data = transport.receive().unwrap().into_data().unwrap();
    let response = Response::parse(&data).unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(
        response.body,
        "<html><body><h1>You requested /index.html</h1></body></html>"
    );

    transport
        .send(&Request::post("/submit", "name=Project").to_bytes())
        .unwrap();
    let data = transport.receive().unwrap().into_data().unwrap();
    let response = Response::parse(&data).unwrap();
    assert_eq!(
        response.body,
        "<html><body><h1>POST Received: name=Project</h1></body></html>"
    );

    transport.close().unwrap();
    assert_eq!(handle.join().unwrap(), 2);
}

#[test]
fn test_server_accepts_next_client() {
    let (server, server_addr) = listener(config());
    let handle = thread::spawn(move || {
        let mut endpoint = server;
        let mut peers = Vec::new();
        for _ in 0..2 {
            peers.push(endpoint.accept().unwrap());
            let mut transport: Box<dyn Transport> = Box::new(StopAndWait::new(endpoint));
            while transport.receive().unwrap().into_data().is_some() {}
            endpoint = transport.into_endpoint();
        }
        peers
    });

    let mut expected = Vec::new();
    for _ in 0..2 {
        let mut client = Endpoint::bind(localhost(), config()).unwrap();
        expected.push(client.local_addr().unwrap());
        client.connect(server_addr).unwrap();
        let mut engine = StopAndWait::new(client);
        engine.send(b"hello").unwrap();
        engine.close().unwrap();
    }

    assert_eq!(handle.join().unwrap(), expected);
}

mod common;

use std::io;

use bytes::Bytes;
use common::{connect_pair, eventually, wait_readable};
use sqlproxy_error::ProxyError;
use sqlproxy_network::{NetworkConfig, NetworkSocket, SocketKind, SocketState, SocketStatus};

fn listener() -> NetworkSocket {
    let mut sock = NetworkSocket::new();
    sock.src_mut().set_address("127.0.0.1:0").unwrap();
    assert_eq!(sock.bind().unwrap(), SocketStatus::Success);
    sock
}

#[test]
fn bind_requires_address_then_succeeds() {
    let mut sock = NetworkSocket::new();
    assert!(matches!(sock.bind(), Err(ProxyError::NoAddress { .. })));

    sock.src_mut().set_address("127.0.0.1:0").unwrap();
    assert_eq!(sock.bind().unwrap(), SocketStatus::Success);
    assert_eq!(sock.state(), SocketState::Listening);
    assert!(sock.is_open());
    assert_ne!(sock.src().socket_addr().unwrap().port(), 0);

    // Binding a bound socket again is a state error.
    assert!(matches!(
        sock.bind(),
        Err(ProxyError::InvalidState { op: "bind", .. })
    ));
}

#[test]
fn address_reusable_after_close() {
    let mut first = listener();
    let addr = first.src().clone();

    let mut second = NetworkSocket::new();
    *second.src_mut() = addr.clone();
    match second.bind() {
        Err(ProxyError::Io(err)) => assert_eq!(err.kind(), io::ErrorKind::AddrInUse),
        other => panic!("expected EADDRINUSE, got {other:?}"),
    }
    assert_eq!(second.state(), SocketState::Unbound);
    assert!(!second.is_open());

    first.close();
    assert_eq!(second.bind().unwrap(), SocketStatus::Success);
    assert_eq!(second.src(), &addr);
}

#[test]
fn connect_write_read_round_trip() {
    let mut listener = listener();
    assert!(listener.accept().unwrap().is_none());

    let mut client = NetworkSocket::new();
    let mut server_side = connect_pair(&mut listener, &mut client);

    assert_eq!(client.state(), SocketState::Connected);
    assert_eq!(server_side.state(), SocketState::Connected);
    assert_eq!(server_side.dst(), client.src());
    assert_eq!(server_side.src(), listener.src());
    assert!(matches!(
        client.connect(),
        Err(ProxyError::InvalidState { op: "connect", state: "connected" })
    ));

    client.send_queue_mut().append(Bytes::from_static(b"foo"));
    assert_eq!(client.write(None).unwrap(), SocketStatus::Success);
    assert!(client.send_queue().is_empty());

    wait_readable(&mut server_side, 3);
    assert_eq!(server_side.to_read_count(), 3);
    assert_eq!(server_side.read().unwrap(), SocketStatus::Success);
    assert_eq!(server_side.to_read_count(), 0);
    assert_eq!(server_side.recv_queue_mut().pop(3).unwrap(), &b"foo"[..]);

    drop(client);

    // The peer is gone: nothing pending, and the next read reports the close.
    eventually("peer close", || {
        assert_eq!(server_side.to_read().unwrap(), SocketStatus::Success);
        assert_eq!(server_side.to_read_count(), 0);
        match server_side.read() {
            Ok(_) => None,
            Err(ProxyError::ConnectionClosed) => Some(()),
            Err(err) => panic!("unexpected error {err}"),
        }
    });
    assert_eq!(server_side.state(), SocketState::Closed);
    assert!(!server_side.is_open());
}

#[test]
fn pending_bytes_are_read_before_close_is_reported() {
    let mut listener = listener();
    let mut client = NetworkSocket::new();
    let mut server_side = connect_pair(&mut listener, &mut client);

    client.send_queue_mut().append(&b"bye"[..]);
    assert_eq!(client.write(None).unwrap(), SocketStatus::Success);
    client.close();

    wait_readable(&mut server_side, 3);
    assert_eq!(server_side.read().unwrap(), SocketStatus::Success);
    assert_eq!(server_side.recv_queue_mut().pop(3).unwrap(), &b"bye"[..]);

    eventually("peer close", || {
        assert_eq!(server_side.to_read().unwrap(), SocketStatus::Success);
        match server_side.read() {
            Ok(_) => None,
            Err(ProxyError::ConnectionClosed) => Some(()),
            Err(err) => panic!("unexpected error {err}"),
        }
    });
    assert_eq!(server_side.state(), SocketState::Closed);
}

#[test]
fn listen_on_destination_address() {
    let mut listener = NetworkSocket::new();
    listener.dst_mut().set_address("127.0.0.1:0").unwrap();
    assert!(!listener.src().is_set());

    assert_eq!(listener.bind().unwrap(), SocketStatus::Success);
    assert_eq!(listener.state(), SocketState::Listening);
    assert_ne!(listener.src().socket_addr().unwrap().port(), 0);

    let mut client = NetworkSocket::new();
    let server_side = connect_pair(&mut listener, &mut client);
    assert_eq!(server_side.src(), listener.src());
    assert_eq!(server_side.dst(), client.src());
}

#[test]
fn write_respects_byte_budget() {
    let mut listener = listener();
    let mut client = NetworkSocket::new();
    let mut server_side = connect_pair(&mut listener, &mut client);

    client.send_queue_mut().append(&b"abc"[..]);
    client.send_queue_mut().append(&b"def"[..]);
    assert_eq!(client.write(Some(4)).unwrap(), SocketStatus::Success);
    assert_eq!(client.send_queue().len(), 2);
    assert_eq!(client.send_queue().peek(2).unwrap(), &b"ef"[..]);

    assert_eq!(client.write(Some(0)).unwrap(), SocketStatus::Success);
    assert_eq!(client.send_queue().len(), 2);
    assert_eq!(client.write(None).unwrap(), SocketStatus::Success);

    let mut received = Vec::new();
    eventually("six bytes", || {
        assert_eq!(server_side.to_read().unwrap(), SocketStatus::Success);
        assert_eq!(server_side.read().unwrap(), SocketStatus::Success);
        let n = server_side.recv_queue().len();
        received.extend_from_slice(&server_side.recv_queue_mut().pop(n).unwrap());
        (received.len() == 6).then_some(())
    });
    assert_eq!(received, b"abcdef");
}

#[test]
fn blocked_write_keeps_remainder_queued() {
    const TOTAL: usize = 32 << 20;

    let mut listener = listener();
    let mut client = NetworkSocket::new();
    let mut server_side = connect_pair(&mut listener, &mut client);

    let payload: Vec<u8> = (0..TOTAL).map(|i| u8::try_from(i % 251).unwrap()).collect();
    client.send_queue_mut().append(payload.clone());

    // Nobody reads yet, so the kernel buffers fill up.
    assert_eq!(client.write(None).unwrap(), SocketStatus::Retry);
    let remaining = client.send_queue().len();
    assert!(remaining > 0);
    assert!(remaining < TOTAL);

    let mut received = Vec::with_capacity(TOTAL);
    eventually("drained send queue", || {
        if !client.send_queue().is_empty() {
            let _ = client.write(None).unwrap();
        }
        loop {
            assert_eq!(server_side.to_read().unwrap(), SocketStatus::Success);
            if server_side.to_read_count() == 0 {
                break;
            }
            assert_eq!(server_side.read().unwrap(), SocketStatus::Success);
            let n = server_side.recv_queue().len();
            received.extend_from_slice(&server_side.recv_queue_mut().pop(n).unwrap());
        }
        (received.len() == TOTAL).then_some(())
    });
    assert!(client.send_queue().is_empty());
    assert!(received == payload);
}

#[test]
fn many_chunks_with_small_iovec_limit() {
    let config = NetworkConfig {
        max_iovecs: 2,
        ..NetworkConfig::default()
    };
    let mut listener = listener();
    let mut client = NetworkSocket::with_config(SocketKind::Stream, config);
    let mut server_side = connect_pair(&mut listener, &mut client);

    let mut expected = Vec::new();
    for i in 0..9u8 {
        let chunk = vec![b'a' + i; usize::from(i) + 1];
        expected.extend_from_slice(&chunk);
        client.send_queue_mut().append(chunk);
    }
    assert_eq!(client.write(None).unwrap(), SocketStatus::Success);
    assert!(client.send_queue().is_empty());

    wait_readable(&mut server_side, expected.len());
    assert_eq!(server_side.read().unwrap(), SocketStatus::Success);
    let got = server_side.recv_queue_mut().pop(expected.len()).unwrap();
    assert_eq!(got, &expected[..]);
}

#[test]
fn read_is_capped_by_max_read_chunk() {
    let config = NetworkConfig {
        max_read_chunk: 2,
        ..NetworkConfig::default()
    };
    let mut listener = NetworkSocket::with_config(SocketKind::Stream, config);
    listener.src_mut().set_address("127.0.0.1:0").unwrap();
    assert_eq!(listener.bind().unwrap(), SocketStatus::Success);

    let mut client = NetworkSocket::new();
    let mut server_side = connect_pair(&mut listener, &mut client);
    assert_eq!(server_side.config().max_read_chunk, 2);

    client.send_queue_mut().append(&b"hello"[..]);
    assert_eq!(client.write(None).unwrap(), SocketStatus::Success);
    wait_readable(&mut server_side, 5);

    assert_eq!(server_side.read().unwrap(), SocketStatus::Success);
    assert_eq!(server_side.recv_queue().len(), 2);
    assert_eq!(server_side.to_read_count(), 3);
    while server_side.to_read_count() > 0 {
        assert_eq!(server_side.read().unwrap(), SocketStatus::Success);
    }
    assert_eq!(server_side.recv_queue_mut().pop(5).unwrap(), &b"hello"[..]);
}

#[test]
fn connect_to_closed_port_fails() {
    let mut gone = listener();
    let addr = gone.src().clone();
    gone.close();

    let mut client = NetworkSocket::new();
    *client.dst_mut() = addr;
    let failure = match client.connect() {
        Err(err) => err,
        Ok(SocketStatus::Retry) => eventually("connect failure", || match client.connect_finish() {
            Ok(SocketStatus::Retry) => None,
            Ok(SocketStatus::Success) => panic!("connected to a closed port"),
            Err(err) => Some(err),
        }),
        Ok(SocketStatus::Success) => panic!("connected to a closed port"),
    };
    match failure {
        ProxyError::Io(err) => assert_eq!(err.kind(), io::ErrorKind::ConnectionRefused),
        other => panic!("unexpected error {other}"),
    }
}

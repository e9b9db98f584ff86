mod common;

use common::wait_readable;
use sqlproxy_network::{NetworkConfig, NetworkSocket, SocketKind, SocketState, SocketStatus};

fn bound_datagram() -> NetworkSocket {
    let mut sock = NetworkSocket::new_datagram();
    sock.src_mut().set_address("127.0.0.1:0").unwrap();
    assert_eq!(sock.bind().unwrap(), SocketStatus::Success);
    assert_eq!(sock.state(), SocketState::Bound);
    assert_ne!(sock.src().socket_addr().unwrap().port(), 0);
    sock
}

#[test]
fn datagram_round_trip_learns_sender() {
    let mut server = bound_datagram();
    let mut client = bound_datagram();
    *client.dst_mut() = server.src().clone();

    client.send_queue_mut().append(&b"foo"[..]);
    assert_eq!(client.write(None).unwrap(), SocketStatus::Success);
    assert!(client.send_queue().is_empty());

    wait_readable(&mut server, 3);
    assert_eq!(server.to_read_count(), 3);
    assert_eq!(server.read().unwrap(), SocketStatus::Success);
    assert_eq!(server.to_read_count(), 0);
    assert_eq!(server.recv_queue_mut().pop(3).unwrap(), &b"foo"[..]);
    assert_eq!(server.dst(), client.src());

    server.send_queue_mut().append(&b"bar"[..]);
    assert_eq!(server.write(None).unwrap(), SocketStatus::Success);
    wait_readable(&mut client, 3);
    assert_eq!(client.read().unwrap(), SocketStatus::Success);
    assert_eq!(client.recv_queue_mut().pop(3).unwrap(), &b"bar"[..]);
}

#[test]
fn each_chunk_is_one_datagram() {
    let mut server = bound_datagram();
    let mut client = NetworkSocket::new_datagram();
    *client.dst_mut() = server.src().clone();

    client.send_queue_mut().append(&b"first"[..]);
    client.send_queue_mut().append(&b"second!"[..]);
    assert_eq!(client.write(None).unwrap(), SocketStatus::Success);
    // The first write opens an implicitly bound descriptor.
    assert_eq!(client.state(), SocketState::Bound);
    assert!(client.src().is_set());

    wait_readable(&mut server, 5);
    assert_eq!(server.to_read_count(), 5);
    assert_eq!(server.read().unwrap(), SocketStatus::Success);
    assert_eq!(server.recv_queue_mut().pop(5).unwrap(), &b"first"[..]);

    wait_readable(&mut server, 7);
    assert_eq!(server.read().unwrap(), SocketStatus::Success);
    assert_eq!(server.recv_queue_mut().pop(7).unwrap(), &b"second!"[..]);
    // The implicit bind is on the wildcard address, so only the port matches.
    assert_eq!(
        server.dst().socket_addr().unwrap().port(),
        client.src().socket_addr().unwrap().port()
    );
}

#[test]
fn datagram_is_read_whole_despite_small_read_chunk() {
    let config = NetworkConfig {
        max_read_chunk: 2,
        ..NetworkConfig::default()
    };
    let mut server = NetworkSocket::with_config(SocketKind::Datagram, config);
    server.src_mut().set_address("127.0.0.1:0").unwrap();
    assert_eq!(server.bind().unwrap(), SocketStatus::Success);

    let mut client = bound_datagram();
    *client.dst_mut() = server.src().clone();
    client.send_queue_mut().append(&b"hello"[..]);
    client.send_queue_mut().append(&b"world!"[..]);
    assert_eq!(client.write(None).unwrap(), SocketStatus::Success);

    wait_readable(&mut server, 5);
    assert_eq!(server.read().unwrap(), SocketStatus::Success);
    assert_eq!(server.to_read_count(), 0);
    assert_eq!(server.recv_queue_mut().pop(5).unwrap(), &b"hello"[..]);

    wait_readable(&mut server, 6);
    assert_eq!(server.read().unwrap(), SocketStatus::Success);
    assert_eq!(server.recv_queue_mut().pop(6).unwrap(), &b"world!"[..]);
    assert!(server.recv_queue().is_empty());
}

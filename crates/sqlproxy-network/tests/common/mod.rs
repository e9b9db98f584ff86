#![allow(dead_code)]

use std::thread;
use std::time::Duration;

use sqlproxy_network::{NetworkSocket, SocketStatus};

/// Poll `f` until it yields a value; the sockets under test never block, so
/// the loopback handshake or delivery may need a few rounds.
pub fn eventually<T>(what: &str, mut f: impl FnMut() -> Option<T>) -> T {
    for _ in 0..500 {
        if let Some(value) = f() {
            return value;
        }
        thread::sleep(Duration::from_millis(5));
    }
    panic!("timed out waiting for {what}");
}

/// Connect `client` to whatever `listener` is bound to and accept the
/// server side of the connection.
pub fn connect_pair(listener: &mut NetworkSocket, client: &mut NetworkSocket) -> NetworkSocket {
    *client.dst_mut() = listener.src().clone();
    let status = client.connect().unwrap();
    let server_side = eventually("accept", || listener.accept().unwrap());
    if status == SocketStatus::Retry {
        eventually("connect_finish", || {
            (client.connect_finish().unwrap() == SocketStatus::Success).then_some(())
        });
    }
    server_side
}

/// Refresh `to_read` until at least `n` bytes are pending.
pub fn wait_readable(sock: &mut NetworkSocket, n: usize) {
    eventually("readable", || {
        assert_eq!(sock.to_read().unwrap(), SocketStatus::Success);
        (sock.to_read_count() >= n).then_some(())
    });
}

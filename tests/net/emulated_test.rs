/*!
 * Emulated Transport Tests
 * Flow control, wildcard listeners and connection refusal
 */

use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use unisockets::core::limits::{ECONNREFUSED, EPIPE};
use unisockets::net::{Address, EmulatedBackend, EmulatedConfig, EmulatedNetwork, Sockets};
use unisockets::{ShutdownMode, SocketError, PF_INET, SOCK_STREAM};

fn addr(s: &str) -> Address {
    s.parse().unwrap()
}

fn connected_pair(sockets: &Sockets<EmulatedBackend>, at: &str) -> (i32, i32, i32) {
    let listener = sockets.socket(PF_INET, SOCK_STREAM, 0).unwrap();
    sockets.bind(listener, &addr(at)).unwrap();
    sockets.listen(listener, 1).unwrap();

    let client = sockets.socket(PF_INET, SOCK_STREAM, 0).unwrap();
    sockets.connect(client, &addr(at)).unwrap();
    let (server, _) = sockets.accept(listener).unwrap();
    (listener, client, server)
}

#[test]
fn test_partial_send_when_stream_is_nearly_full() {
    let sockets = Sockets::new(EmulatedBackend::isolated(EmulatedConfig {
        stream_capacity: 8,
        ..EmulatedConfig::default()
    }));
    let (_, client, server) = connected_pair(&sockets, "10.0.0.240:1234");

    assert_eq!(sockets.send(client, b"0123456789", 0).unwrap(), 8);
    assert_eq!(sockets.recv(server, 64, 0).unwrap(), b"01234567".to_vec());
}

#[test]
fn test_send_all_loops_over_partial_writes() {
    let sockets = Arc::new(Sockets::new(EmulatedBackend::isolated(EmulatedConfig {
        stream_capacity: 4,
        ..EmulatedConfig::default()
    })));
    let (_, client, server) = connected_pair(&sockets, "10.0.0.240:1234");

    let reader = {
        let sockets = Arc::clone(&sockets);
        thread::spawn(move || {
            let mut received = Vec::new();
            while received.len() < 26 {
                received.extend(sockets.recv(server, 3, 0).unwrap());
            }
            received
        })
    };

    let message = b"abcdefghijklmnopqrstuvwxyz";
    assert_eq!(sockets.send_all(client, message, 0).unwrap(), message.len());
    assert_eq!(reader.join().unwrap(), message.to_vec());
}

#[test]
fn test_connect_without_listener_refused() {
    let sockets = Sockets::new(EmulatedBackend::isolated(EmulatedConfig::default()));
    let client = sockets.socket(PF_INET, SOCK_STREAM, 0).unwrap();
    assert_eq!(
        sockets.connect(client, &addr("10.0.0.240:1234")),
        Err(SocketError::ConnectFailed { code: ECONNREFUSED })
    );
}

#[test]
fn test_full_backlog_refuses() {
    let sockets = Sockets::new(EmulatedBackend::isolated(EmulatedConfig::default()));
    let listener = sockets.socket(PF_INET, SOCK_STREAM, 0).unwrap();
    sockets.bind(listener, &addr("10.0.0.240:1234")).unwrap();
    sockets.listen(listener, 1).unwrap();

    let first = sockets.socket(PF_INET, SOCK_STREAM, 0).unwrap();
    sockets.connect(first, &addr("10.0.0.240:1234")).unwrap();
    let second = sockets.socket(PF_INET, SOCK_STREAM, 0).unwrap();
    assert_eq!(
        sockets.connect(second, &addr("10.0.0.240:1234")),
        Err(SocketError::ConnectFailed { code: ECONNREFUSED })
    );
}

#[test]
fn test_wildcard_listener_accepts_any_host() {
    let sockets = Sockets::new(EmulatedBackend::isolated(EmulatedConfig::default()));
    let listener = sockets.socket(PF_INET, SOCK_STREAM, 0).unwrap();
    sockets.bind(listener, &addr("0.0.0.0:7000")).unwrap();
    sockets.listen(listener, 2).unwrap();

    let client = sockets.socket(PF_INET, SOCK_STREAM, 0).unwrap();
    sockets.connect(client, &addr("10.0.0.240:7000")).unwrap();
    let (server, _) = sockets.accept(listener).unwrap();
    assert_eq!(
        sockets.local_address(server).unwrap(),
        Some(addr("10.0.0.240:7000"))
    );
}

#[test]
fn test_send_after_peer_closed() {
    let sockets = Sockets::new(EmulatedBackend::isolated(EmulatedConfig::default()));
    let (_, client, server) = connected_pair(&sockets, "10.0.0.240:1234");

    sockets.shutdown(server, ShutdownMode::Both).unwrap();
    assert_eq!(
        sockets.send(client, b"anyone there?", 0),
        Err(SocketError::SendFailed { code: EPIPE })
    );
    assert_eq!(sockets.recv(client, 16, 0).unwrap(), Vec::<u8>::new());
}

#[test]
fn test_shutdown_unblocks_pending_recv() {
    let sockets = Arc::new(Sockets::new(EmulatedBackend::isolated(EmulatedConfig::default())));
    let (_, _client, server) = connected_pair(&sockets, "10.0.0.240:1234");

    let reader = {
        let sockets = Arc::clone(&sockets);
        thread::spawn(move || sockets.recv(server, 16, 0))
    };
    thread::sleep(Duration::from_millis(20));
    sockets.shutdown(server, ShutdownMode::Read).unwrap();

    assert_eq!(reader.join().unwrap(), Ok(Vec::new()));
}

#[test]
fn test_networks_are_isolated() {
    let config = EmulatedConfig::default();
    let shared = Arc::new(EmulatedNetwork::new(config.clone()));
    let a = Sockets::new(EmulatedBackend::with_network(Arc::clone(&shared)));
    let b = Sockets::new(EmulatedBackend::with_network(Arc::clone(&shared)));
    let elsewhere = Sockets::new(EmulatedBackend::isolated(config));

    let listener = a.socket(PF_INET, SOCK_STREAM, 0).unwrap();
    a.bind(listener, &addr("10.0.0.240:1234")).unwrap();
    a.listen(listener, 4).unwrap();

    let client = b.socket(PF_INET, SOCK_STREAM, 0).unwrap();
    assert_eq!(b.connect(client, &addr("10.0.0.240:1234")), Ok(()));

    let stranger = elsewhere.socket(PF_INET, SOCK_STREAM, 0).unwrap();
    assert_eq!(
        elsewhere.connect(stranger, &addr("10.0.0.240:1234")),
        Err(SocketError::ConnectFailed { code: ECONNREFUSED })
    );
}

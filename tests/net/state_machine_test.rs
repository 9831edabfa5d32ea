/*!
 * Socket State Machine Tests
 * Lifecycle enforcement through the socket API on an isolated emulated network
 */

use pretty_assertions::assert_eq;
use unisockets::core::limits::{EADDRINUSE, EMFILE, ENOTCONN};
use unisockets::net::{Address, EmulatedBackend, EmulatedConfig, SocketState, Sockets};
use unisockets::{ShutdownMode, SocketError, SocketLimits, PF_INET, SOCK_STREAM};

fn sockets() -> Sockets<EmulatedBackend> {
    Sockets::new(EmulatedBackend::isolated(EmulatedConfig::default()))
}

fn addr(s: &str) -> Address {
    s.parse().unwrap()
}

fn listening(sockets: &Sockets<EmulatedBackend>, at: &str) -> i32 {
    let handle = sockets.socket(PF_INET, SOCK_STREAM, 0).unwrap();
    sockets.bind(handle, &addr(at)).unwrap();
    sockets.listen(handle, 4).unwrap();
    handle
}

#[test]
fn test_server_lifecycle_states() {
    let sockets = sockets();
    let handle = sockets.socket(PF_INET, SOCK_STREAM, 0).unwrap();
    assert_eq!(sockets.state(handle).unwrap(), SocketState::Closed);

    sockets.bind(handle, &addr("10.0.0.240:1234")).unwrap();
    assert_eq!(sockets.state(handle).unwrap(), SocketState::Bound);

    sockets.listen(handle, 1).unwrap();
    assert_eq!(sockets.state(handle).unwrap(), SocketState::Listening);

    sockets.shutdown(handle, ShutdownMode::Both).unwrap();
    assert!(!sockets.is_open(handle));
}

#[test]
fn test_operations_rejected_in_wrong_state() {
    let sockets = sockets();
    let fresh = sockets.socket(PF_INET, SOCK_STREAM, 0).unwrap();
    let invalid = Err(SocketError::InvalidHandle { handle: fresh });

    assert_eq!(sockets.accept(fresh).map(|_| ()), invalid);
    assert_eq!(sockets.send(fresh, b"x", 0).map(|_| ()), invalid);
    assert_eq!(sockets.recv(fresh, 8, 0).map(|_| ()), invalid);

    let listener = listening(&sockets, "10.0.0.240:1234");
    assert_eq!(
        sockets.bind(listener, &addr("10.0.0.240:4321")),
        Err(SocketError::InvalidHandle { handle: listener })
    );
    assert_eq!(
        sockets.connect(listener, &addr("10.0.0.240:1234")),
        Err(SocketError::InvalidHandle { handle: listener })
    );
    assert_eq!(sockets.state(listener).unwrap(), SocketState::Listening);
    assert_eq!(sockets.state(fresh).unwrap(), SocketState::Closed);
}

#[test]
fn test_shutdown_invalidates_handle() {
    let sockets = sockets();
    let listener = listening(&sockets, "10.0.0.240:1234");
    let client = sockets.socket(PF_INET, SOCK_STREAM, 0).unwrap();
    sockets.connect(client, &addr("10.0.0.240:1234")).unwrap();

    sockets.shutdown(client, ShutdownMode::Both).unwrap();
    let invalid = Err(SocketError::InvalidHandle { handle: client });
    assert_eq!(sockets.send(client, b"x", 0).map(|_| ()), invalid);
    assert_eq!(sockets.recv(client, 8, 0).map(|_| ()), invalid);
    assert_eq!(sockets.shutdown(client, ShutdownMode::Both), invalid);
    assert_eq!(sockets.state(client), Err(SocketError::InvalidHandle { handle: client }));

    sockets.shutdown(listener, ShutdownMode::Both).unwrap();
}

#[test]
fn test_unconnected_shutdown_still_releases() {
    let sockets = sockets();
    let handle = sockets.socket(PF_INET, SOCK_STREAM, 0).unwrap();
    sockets.bind(handle, &addr("10.0.0.240:1234")).unwrap();

    assert_eq!(
        sockets.shutdown(handle, ShutdownMode::Both),
        Err(SocketError::ShutdownFailed { code: ENOTCONN })
    );
    assert!(!sockets.is_open(handle));

    // The alias went with it
    let again = sockets.socket(PF_INET, SOCK_STREAM, 0).unwrap();
    assert_eq!(sockets.bind(again, &addr("10.0.0.240:1234")), Ok(()));
}

#[test]
fn test_second_bind_to_same_address() {
    let sockets = sockets();
    let first = sockets.socket(PF_INET, SOCK_STREAM, 0).unwrap();
    let second = sockets.socket(PF_INET, SOCK_STREAM, 0).unwrap();
    sockets.bind(first, &addr("10.0.0.240:1234")).unwrap();

    let err = sockets.bind(second, &addr("10.0.0.240:1234")).unwrap_err();
    assert_eq!(err, SocketError::BindFailed { code: EADDRINUSE });
    assert_eq!(err.status(), -1);
    assert_eq!(err.to_string(), "could not bind socket, error code 98");
}

#[test]
fn test_handles_are_distinct_and_fresh() {
    let sockets = sockets();
    let a = sockets.socket(PF_INET, SOCK_STREAM, 0).unwrap();
    let b = sockets.socket(PF_INET, SOCK_STREAM, 0).unwrap();
    assert_ne!(a, b);

    sockets.shutdown(a, ShutdownMode::Both).ok();
    let c = sockets.socket(PF_INET, SOCK_STREAM, 0).unwrap();
    assert_ne!(c, a);
}

#[test]
fn test_open_handle_limit() {
    let sockets = Sockets::with_limits(
        EmulatedBackend::isolated(EmulatedConfig::default()),
        SocketLimits { max_open_handles: 2 },
    );
    sockets.socket(PF_INET, SOCK_STREAM, 0).unwrap();
    sockets.socket(PF_INET, SOCK_STREAM, 0).unwrap();
    assert_eq!(
        sockets.socket(PF_INET, SOCK_STREAM, 0),
        Err(SocketError::CreateFailed { code: EMFILE })
    );
}

#[test]
fn test_accept_assigns_connected_handle() {
    let sockets = sockets();
    let listener = listening(&sockets, "10.0.0.240:1234");
    let client = sockets.socket(PF_INET, SOCK_STREAM, 0).unwrap();
    sockets.connect(client, &addr("10.0.0.240:1234")).unwrap();

    let (accepted, peer) = sockets.accept(listener).unwrap();
    assert_ne!(accepted, listener);
    assert_ne!(accepted, client);
    assert_eq!(sockets.state(accepted).unwrap(), SocketState::Connected);
    assert_eq!(sockets.peer_address(accepted).unwrap(), Some(peer));
    assert_eq!(sockets.local_address(client).unwrap(), Some(peer));
    assert_eq!(sockets.state(listener).unwrap(), SocketState::Listening);

    let stats = sockets.stats();
    assert_eq!(stats.listening, 1);
    assert_eq!(stats.connected, 2);
}

#[test]
fn test_send_recv_and_orderly_close() {
    let sockets = sockets();
    let listener = listening(&sockets, "10.0.0.240:1234");
    let client = sockets.socket(PF_INET, SOCK_STREAM, 0).unwrap();
    sockets.connect(client, &addr("10.0.0.240:1234")).unwrap();
    let (server, _) = sockets.accept(listener).unwrap();

    assert_eq!(sockets.send(client, b"hello", 0).unwrap(), 5);
    assert_eq!(sockets.recv(server, 1024, 0).unwrap(), b"hello".to_vec());

    sockets.shutdown(client, ShutdownMode::Both).unwrap();
    assert_eq!(sockets.recv(server, 1024, 0).unwrap(), Vec::<u8>::new());
}

#[test]
fn test_recv_respects_max_len() {
    let sockets = sockets();
    let listener = listening(&sockets, "10.0.0.240:1234");
    let client = sockets.socket(PF_INET, SOCK_STREAM, 0).unwrap();
    sockets.connect(client, &addr("10.0.0.240:1234")).unwrap();
    let (server, _) = sockets.accept(listener).unwrap();

    sockets.send(client, b"abcdef", 0).unwrap();
    assert_eq!(sockets.recv(server, 4, 0).unwrap(), b"abcd".to_vec());
    assert_eq!(sockets.recv(server, 4, 0).unwrap(), b"ef".to_vec());
}

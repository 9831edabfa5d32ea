/*!
 * Native Transport Tests
 * Loopback round trips through the operating system's sockets
 */

#![cfg(unix)]

use nix::errno::Errno;
use nix::libc;
use nix::sys::socket::{setsockopt, sockopt};
use pretty_assertions::assert_eq;
use std::net::{Ipv4Addr, SocketAddrV4, TcpStream};
use std::sync::Arc;
use std::thread;
use unisockets::core::limits::EAFNOSUPPORT;
use unisockets::net::{Address, NativeBackend, SocketState, Sockets};
use unisockets::{ShutdownMode, SocketError, PF_INET, SOCK_STREAM};

fn loopback_listener(sockets: &Sockets<NativeBackend>) -> (i32, Address) {
    let listener = sockets.socket(PF_INET, SOCK_STREAM, 0).unwrap();
    sockets
        .bind(listener, &Address::new(Ipv4Addr::LOCALHOST, 0))
        .unwrap();
    sockets.listen(listener, 4).unwrap();
    let local = sockets.local_address(listener).unwrap().unwrap();
    (listener, local)
}

#[test]
fn test_create_rejects_ipv6() {
    let sockets = Sockets::new(NativeBackend::new());
    assert_eq!(
        sockets.socket(10, SOCK_STREAM, 0),
        Err(SocketError::CreateFailed { code: EAFNOSUPPORT })
    );
}

#[test]
fn test_loopback_echo() {
    let sockets = Arc::new(Sockets::new(NativeBackend::new()));
    let (listener, local) = loopback_listener(&sockets);
    assert_ne!(local.port, 0);

    let server = {
        let sockets = Arc::clone(&sockets);
        thread::spawn(move || {
            let (conn, _peer) = sockets.accept(listener).unwrap();
            let message = sockets.recv(conn, 1024, 0).unwrap();
            sockets.send_all(conn, &message, 0).unwrap();
            sockets.shutdown(conn, ShutdownMode::Both).unwrap();
        })
    };

    let client = sockets.socket(PF_INET, SOCK_STREAM, 0).unwrap();
    sockets.connect(client, &local).unwrap();
    assert_eq!(sockets.state(client).unwrap(), SocketState::Connected);

    sockets.send_all(client, b"ping", 0).unwrap();
    let mut echoed = Vec::new();
    loop {
        let chunk = sockets.recv(client, 1024, 0).unwrap();
        if chunk.is_empty() {
            break;
        }
        echoed.extend(chunk);
    }
    assert_eq!(echoed, b"ping".to_vec());

    server.join().unwrap();
    sockets.shutdown(client, ShutdownMode::Both).ok();
    sockets.shutdown(listener, ShutdownMode::Both).ok();
}

#[test]
fn test_connect_refused_keeps_closed_state() {
    let sockets = Sockets::new(NativeBackend::new());
    let (listener, local) = loopback_listener(&sockets);
    sockets.shutdown(listener, ShutdownMode::Both).ok();

    let client = sockets.socket(PF_INET, SOCK_STREAM, 0).unwrap();
    let err = sockets.connect(client, &local).unwrap_err();
    assert!(matches!(err, SocketError::ConnectFailed { .. }));
    assert_eq!(sockets.state(client).unwrap(), SocketState::Closed);
}

/// Close `stream` with a zero linger so the peer sees a reset instead of EOF
fn reset(stream: TcpStream) {
    let linger = libc::linger {
        l_onoff: 1,
        l_linger: 0,
    };
    setsockopt(&stream, sockopt::Linger, &linger).unwrap();
    drop(stream);
}

#[test]
fn test_recv_reports_reset_as_error() {
    let sockets = Sockets::new(NativeBackend::new());
    let (listener, local) = loopback_listener(&sockets);

    let client = TcpStream::connect(SocketAddrV4::from(local)).unwrap();
    let (conn, _peer) = sockets.accept(listener).unwrap();
    reset(client);

    assert_eq!(
        sockets.recv(conn, 64, 0),
        Err(SocketError::RecvFailed {
            code: Errno::ECONNRESET as i32
        })
    );
    assert_eq!(sockets.state(conn).unwrap(), SocketState::Connected);

    sockets.shutdown(conn, ShutdownMode::Both).ok();
    assert!(!sockets.is_open(conn));
    sockets.shutdown(listener, ShutdownMode::Both).ok();
}

#[test]
fn test_orderly_close_is_empty_recv() {
    let sockets = Sockets::new(NativeBackend::new());
    let (listener, local) = loopback_listener(&sockets);

    let client = TcpStream::connect(SocketAddrV4::from(local)).unwrap();
    let (conn, _peer) = sockets.accept(listener).unwrap();
    drop(client);

    assert_eq!(sockets.recv(conn, 64, 0), Ok(Vec::new()));

    sockets.shutdown(conn, ShutdownMode::Both).ok();
    sockets.shutdown(listener, ShutdownMode::Both).ok();
}

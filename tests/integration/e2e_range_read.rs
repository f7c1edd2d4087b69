//! §8 scenario 5: `GET_FILE` clamp semantics over a real wire — offset
//! clamped to file size, `limit_bytes == 0` means "read to end".

#[path = "support/mod.rs"]
mod support;

use client::handshake::{run_handshake, Credentials};
use client::session_logic::RequestClient;
use net_protocol::{RoomName, Username};
use tokio::io::AsyncReadExt;

async fn connected_client(addr: std::net::SocketAddr) -> net_transport::QuicConn {
    let conn = support::dial(addr).await;
    run_handshake(
        &conn,
        support::CLIENT_VERSION,
        &Credentials {
            room: RoomName::normalize("chat").unwrap(),
            username: Username::normalize("alice").unwrap(),
            password: "hunter2".to_owned(),
        },
    )
    .await
    .unwrap();
    conn
}

#[tokio::test]
async fn an_in_range_offset_and_limit_returns_the_exact_slice() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("six.bin"), b"abcdef").unwrap();
    let server = support::TestServer::start(vec![("chat", vec![("docs", dir.path())])]).await;
    server.create_account("chat", "alice", "hunter2");

    let conn = connected_client(server.addr).await;
    let (meta, mut bidi) = RequestClient::new(&conn).get_file("/docs/six.bin", 2, 3).await.unwrap();
    assert_eq!(meta.size_bytes, 6);
    let mut buf = Vec::new();
    bidi.copy_to_writer(&mut buf, 3).await.unwrap();
    assert_eq!(buf, b"cde");

    server.shut_down().await;
}

#[tokio::test]
async fn an_offset_past_the_end_yields_an_empty_read() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("six.bin"), b"abcdef").unwrap();
    let server = support::TestServer::start(vec![("chat", vec![("docs", dir.path())])]).await;
    server.create_account("chat", "alice", "hunter2");

    let conn = connected_client(server.addr).await;
    let (meta, mut bidi) = RequestClient::new(&conn).get_file("/docs/six.bin", 100, 0).await.unwrap();
    assert_eq!(meta.size_bytes, 6);
    let mut buf = Vec::new();
    bidi.copy_to_writer(&mut buf, 0).await.unwrap();
    assert!(buf.is_empty());

    server.shut_down().await;
}

#[tokio::test]
async fn a_zero_limit_reads_from_the_offset_to_the_end() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("six.bin"), b"abcdef").unwrap();
    let server = support::TestServer::start(vec![("chat", vec![("docs", dir.path())])]).await;
    server.create_account("chat", "alice", "hunter2");

    let conn = connected_client(server.addr).await;
    let (_meta, mut bidi) = RequestClient::new(&conn).get_file("/docs/six.bin", 1, 0).await.unwrap();
    let mut buf = Vec::new();
    bidi.copy_to_writer(&mut buf, 0).await.unwrap();
    assert_eq!(buf, b"bcdef");

    server.shut_down().await;
}

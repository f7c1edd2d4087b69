//! §8 scenario 4: a directory with 120 files is listed across three
//! `GET_DIR_FILES` pages of 50, 50, and 20 entries; `RequestClient` collects
//! them transparently.

#[path = "support/mod.rs"]
mod support;

use client::handshake::{run_handshake, Credentials};
use client::session_logic::RequestClient;
use net_protocol::{RoomName, Username};

#[tokio::test]
async fn a_120_file_directory_is_collected_across_three_pages() {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..120 {
        std::fs::write(dir.path().join(format!("f{i:03}.txt")), b"x").unwrap();
    }

    let server = support::TestServer::start(vec![("chat", vec![("docs", dir.path())])]).await;
    server.create_account("chat", "alice", "hunter2");

    let conn = support::dial(server.addr).await;
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

    let files = RequestClient::new(&conn).get_dir_files("/docs").await.unwrap();
    assert_eq!(files.len(), 120);
    assert!(files.iter().all(|f| !f.is_dir));

    let mut names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
    names.sort_unstable();
    assert_eq!(names.first().copied(), Some("f000.txt"));
    assert_eq!(names.last().copied(), Some("f119.txt"));

    server.shut_down().await;
}

#[tokio::test]
async fn online_users_listing_also_paginates_across_more_than_one_page() {
    // PAGE_SIZE is 50; 60 onboarded connections force a second ONLINE_USERS page.
    let server = support::TestServer::start(vec![("chat", vec![])]).await;
    let mut conns = Vec::new();
    for i in 0..60 {
        let username = format!("user{i:03}");
        server.create_account("chat", &username, "hunter2");
        let conn = support::dial(server.addr).await;
        run_handshake(
            &conn,
            support::CLIENT_VERSION,
            &Credentials {
                room: RoomName::normalize("chat").unwrap(),
                username: Username::normalize(&username).unwrap(),
                password: "hunter2".to_owned(),
            },
        )
        .await
        .unwrap();
        conns.push(conn);
    }

    let users = RequestClient::new(&conns[0]).get_online_users().await.unwrap();
    assert_eq!(users.len(), 60);

    server.shut_down().await;
}

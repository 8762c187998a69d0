//! End-to-end relay tests using real WebSocket clients.

mod common;

use common::{assert_silent, recv_text, send_text, TestServer};
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

#[tokio::test]
async fn message_reaches_other_members_only() {
    let server = TestServer::boot(vec![]).await;
    let mut a = server.connect("room").await;
    let mut b = server.connect("room").await;
    let mut c = server.connect("room").await;

    send_text(&mut a, "x = 1").await;

    assert_eq!(recv_text(&mut b).await, "x = 1");
    assert_eq!(recv_text(&mut c).await, "x = 1");
    assert_silent(&mut a).await;
    assert_silent(&mut b).await;
}

#[tokio::test]
async fn sessions_are_isolated() {
    let server = TestServer::boot(vec![]).await;
    let mut a = server.connect("one").await;
    let mut b = server.connect("one").await;
    let mut other = server.connect("two").await;

    send_text(&mut a, "only for one").await;
    assert_eq!(recv_text(&mut b).await, "only for one");
    assert_silent(&mut other).await;
}

#[tokio::test]
async fn payload_is_not_interpreted() {
    let server = TestServer::boot(vec![]).await;
    let mut a = server.connect("room").await;
    let mut b = server.connect("room").await;

    let payload = "{\"type\": \"edit\", broken json \u{00e9}";
    send_text(&mut a, payload).await;
    assert_eq!(recv_text(&mut b).await, payload);
}

#[tokio::test]
async fn per_sender_order_is_preserved() {
    let server = TestServer::boot(vec![]).await;
    let mut a = server.connect("room").await;
    let mut b = server.connect("room").await;

    for i in 0..50 {
        send_text(&mut a, &format!("edit {i}")).await;
    }
    for i in 0..50 {
        assert_eq!(recv_text(&mut b).await, format!("edit {i}"));
    }
}

#[tokio::test]
async fn both_directions_relay() {
    let server = TestServer::boot(vec![]).await;
    let mut a = server.connect("room").await;
    let mut b = server.connect("room").await;

    send_text(&mut a, "from a").await;
    send_text(&mut b, "from b").await;
    assert_eq!(recv_text(&mut b).await, "from a");
    assert_eq!(recv_text(&mut a).await, "from b");
}

#[tokio::test]
async fn close_removes_member_and_empty_session() {
    let server = TestServer::boot(vec![]).await;
    let mut a = server.connect("room").await;
    let mut b = server.connect("room").await;
    assert_eq!(server.handle.registry().session_count(), 1);

    a.close(None).await.unwrap();
    server.wait_for_members("room", 1).await;

    // The remaining member keeps working and no longer relays to the departed one.
    let mut c = server.connect("room").await;
    send_text(&mut b, "still here").await;
    assert_eq!(recv_text(&mut c).await, "still here");

    b.close(None).await.unwrap();
    c.close(None).await.unwrap();
    server.wait_for_members("room", 0).await;
    assert_eq!(server.handle.registry().session_count(), 0);
}

#[tokio::test]
async fn client_close_gets_close_reply() {
    let server = TestServer::boot(vec![]).await;
    let mut a = server.connect("room").await;

    a.close(None).await.unwrap();
    let reply = tokio::time::timeout(common::TIMEOUT, async {
        loop {
            match a.next().await {
                Some(Ok(Message::Close(_))) | None => return true,
                Some(Ok(_)) => continue,
                Some(Err(_)) => return false,
            }
        }
    })
    .await
    .unwrap();
    assert!(reply, "socket ended without a close handshake");
    server.wait_for_members("room", 0).await;
}

#[tokio::test]
async fn abrupt_drop_is_cleaned_up() {
    let server = TestServer::boot(vec![]).await;
    let a = server.connect("room").await;
    let mut b = server.connect("room").await;

    drop(a);
    server.wait_for_members("room", 1).await;

    let mut c = server.connect("room").await;
    send_text(&mut c, "after drop").await;
    assert_eq!(recv_text(&mut b).await, "after drop");
}

#[tokio::test]
async fn rejoin_behaves_like_fresh_member() {
    let server = TestServer::boot(vec![]).await;
    let mut a = server.connect("room").await;
    let mut b = server.connect("room").await;

    b.close(None).await.unwrap();
    server.wait_for_members("room", 1).await;

    let mut b = server.connect("room").await;
    send_text(&mut a, "welcome back").await;
    assert_eq!(recv_text(&mut b).await, "welcome back");
}

#[tokio::test]
async fn binary_utf8_frames_are_relayed_as_text() {
    let server = TestServer::boot(vec![]).await;
    let mut a = server.connect("room").await;
    let mut b = server.connect("room").await;

    a.send(Message::binary(b"print(1)".to_vec())).await.unwrap();
    assert_eq!(recv_text(&mut b).await, "print(1)");
}

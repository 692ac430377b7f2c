//! The full client/peer exchange, with the peer played by a second endpoint
//! in the same process.

use std::time::Duration;

use pathgram::{
    config::Config,
    endpoint::{Endpoint, SendError, MAX_DATAGRAM},
};

const REPLY_WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn client_exchanges_one_round_trip_with_an_echo_peer() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.local = dir.path().join("mysocket");
    config.peer = dir.path().join("serversocket");

    let peer = Endpoint::bind(&config.peer).await.unwrap();
    let client = Endpoint::bind(&config.local).await.unwrap();

    // Client sends the well-known 32 byte message.
    let sent = client.send_to(&config.peer, &config.message).await.unwrap();
    assert_eq!(sent, 32);

    // Peer receives it intact and acks back to the client's bound path.
    let got = peer.recv(MAX_DATAGRAM, Some(REPLY_WAIT)).await.unwrap();
    assert_eq!(got, config.message);
    peer.send_to(&config.local, b"ack").await.unwrap();

    let reply = client.recv(MAX_DATAGRAM, Some(REPLY_WAIT)).await.unwrap();
    assert_eq!(reply, b"ack");

    client.close().await.unwrap();
    peer.close().await.unwrap();
    assert!(!config.local.exists());
    assert!(!config.peer.exists());
}

#[tokio::test]
async fn send_fails_when_no_peer_is_bound() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.local = dir.path().join("mysocket");
    config.peer = dir.path().join("serversocket");

    let client = Endpoint::bind(&config.local).await.unwrap();

    // Nobody bound the peer path: the send is rejected at once, the client
    // never gets to wait for a reply.
    assert!(matches!(
        client.send_to(&config.peer, &config.message).await,
        Err(SendError::Io { .. })
    ));

    client.close().await.unwrap();
}

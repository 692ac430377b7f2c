use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use tracing::trace;

use crate::socket::{BindError, BoundSocket, UnlinkError};

/// Largest payload a single datagram may carry.
pub const MAX_DATAGRAM: usize = 512;

/// A bound datagram endpoint.
///
/// Owns one socket bound to a local path; peers are addressed by the paths
/// their own endpoints are bound to. A successful send only means the local
/// stack accepted the datagram: delivery is neither confirmed nor implied,
/// and nothing orders one datagram relative to another.
#[derive(Debug)]
pub struct Endpoint {
    socket: BoundSocket,
}

#[derive(thiserror::Error, Debug)]
pub enum SendError {
    #[error("payload is {len} bytes, datagrams are capped at {MAX_DATAGRAM}")]
    TooLarge { len: usize },
    #[error("transport accepted {sent} of {len} bytes")]
    Truncated { sent: usize, len: usize },
    #[error("couldn't send datagram to {peer:?}: {source}")]
    Io {
        peer: PathBuf,
        source: std::io::Error,
    },
}

#[derive(thiserror::Error, Debug)]
pub enum ReceiveError {
    #[error("no datagram arrived within {0:?}")]
    TimedOut(Duration),
    #[error("couldn't receive datagram: {0}")]
    Io(#[from] std::io::Error),
}

impl Endpoint {
    /// Binds a new endpoint to `local`, creating a filesystem entry other
    /// processes can address datagrams to.
    pub async fn bind(local: &(impl AsRef<Path> + ?Sized)) -> Result<Self, BindError> {
        let socket = BoundSocket::bind(local).await?;
        Ok(Self { socket })
    }

    /// The path this endpoint is bound to. Peers reply here.
    pub fn local_path(&self) -> &Path {
        self.socket.path()
    }

    /// Transmits `payload` as a single datagram to the endpoint bound at
    /// `peer`, returning the number of bytes the transport accepted (always
    /// `payload.len()` on success).
    ///
    /// Fails immediately when no socket is bound at `peer`; never blocks
    /// waiting for the peer to exist or to read.
    pub async fn send_to(
        &self,
        peer: &(impl AsRef<Path> + ?Sized),
        payload: &[u8],
    ) -> Result<usize, SendError> {
        let peer = peer.as_ref();
        let len = payload.len();

        // Cap before the transport sees it, so the failure mode doesn't
        // depend on the OS datagram limit.
        if len > MAX_DATAGRAM {
            return Err(SendError::TooLarge { len });
        }

        let sent = self
            .socket
            .send_to(payload, peer)
            .await
            .map_err(|source| SendError::Io {
                peer: peer.to_owned(),
                source,
            })?;

        if sent != len {
            return Err(SendError::Truncated { sent, len });
        }

        trace!("sent {sent} bytes to {peer:?}");
        Ok(sent)
    }

    /// Awaits one datagram, returning its payload truncated to `max` bytes.
    /// A larger datagram loses its excess silently: the transport doesn't
    /// hold the remainder for a later read.
    ///
    /// With `timeout: None` this waits indefinitely; only datagram arrival or
    /// process termination unblocks it.
    pub async fn recv(
        &self,
        max: usize,
        timeout: Option<Duration>,
    ) -> Result<Vec<u8>, ReceiveError> {
        let mut buf = vec![0; max];

        let len = match timeout {
            None => self.socket.recv(&mut buf).await?,
            Some(limit) => match tokio::time::timeout(limit, self.socket.recv(&mut buf)).await {
                Ok(received) => received?,
                Err(_) => return Err(ReceiveError::TimedOut(limit)),
            },
        };

        trace!("received {len} byte datagram on {:?}", self.socket.path());
        buf.truncate(len);
        Ok(buf)
    }

    /// Releases the endpoint: removes the local path from the filesystem and
    /// closes the socket. Dropping without calling this still unlinks, at the
    /// cost of blocking inside drop.
    pub async fn close(self) -> Result<(), UnlinkError> {
        self.socket.unlink().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPLY_WAIT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn round_trip_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let sender = Endpoint::bind(&dir.path().join("sender.sock")).await.unwrap();
        let receiver = Endpoint::bind(&dir.path().join("receiver.sock"))
            .await
            .unwrap();

        let payload = b"Yow!!! Are we having fun yet?!?\0";
        let sent = sender.send_to(receiver.local_path(), payload).await.unwrap();
        assert_eq!(sent, payload.len());

        let got = receiver.recv(MAX_DATAGRAM, Some(REPLY_WAIT)).await.unwrap();
        assert_eq!(got, payload);
    }

    #[tokio::test]
    async fn recv_never_returns_more_than_max() {
        let dir = tempfile::tempdir().unwrap();
        let sender = Endpoint::bind(&dir.path().join("sender.sock")).await.unwrap();
        let receiver = Endpoint::bind(&dir.path().join("receiver.sock"))
            .await
            .unwrap();

        sender
            .send_to(receiver.local_path(), b"a datagram bigger than max")
            .await
            .unwrap();

        let got = receiver.recv(8, Some(REPLY_WAIT)).await.unwrap();
        assert_eq!(got, b"a datagr");
    }

    #[tokio::test]
    async fn send_to_unbound_peer_fails_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = Endpoint::bind(&dir.path().join("lonely.sock")).await.unwrap();

        let nobody = dir.path().join("nobody.sock");
        assert!(matches!(
            endpoint.send_to(&nobody, b"anyone there?").await,
            Err(SendError::Io { .. })
        ));
    }

    #[tokio::test]
    async fn oversized_payload_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = Endpoint::bind(&dir.path().join("local.sock")).await.unwrap();

        let payload = vec![0; MAX_DATAGRAM + 1];
        assert!(matches!(
            endpoint.send_to(&dir.path().join("peer.sock"), &payload).await,
            Err(SendError::TooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn recv_times_out_when_nothing_arrives() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = Endpoint::bind(&dir.path().join("quiet.sock")).await.unwrap();

        assert!(matches!(
            endpoint
                .recv(MAX_DATAGRAM, Some(Duration::from_millis(50)))
                .await,
            Err(ReceiveError::TimedOut(_))
        ));
    }

    #[tokio::test]
    async fn close_frees_the_path_for_rebinding() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reused.sock");

        let endpoint = Endpoint::bind(&path).await.unwrap();
        endpoint.close().await.unwrap();
        assert!(!path.exists());

        let endpoint = Endpoint::bind(&path).await.unwrap();
        endpoint.close().await.unwrap();
    }
}

use std::{env, path::PathBuf};

/// Where the client binds its own socket.
pub const DEFAULT_LOCAL: &str = "/tmp/mysocket";
/// Where the peer is expected to already be bound.
pub const DEFAULT_PEER: &str = "/tmp/serversocket";
/// The message sent to the peer, trailing NUL included (32 bytes).
pub const DEFAULT_MESSAGE: &[u8] = b"Yow!!! Are we having fun yet?!?\0";

/// Runtime configuration for one exchange.
///
/// Defaults match the well-known addresses above; every field can be
/// overridden from the environment so two runs don't fight over the same
/// paths.
#[derive(Debug, Clone)]
pub struct Config {
    pub local: PathBuf,
    pub peer: PathBuf,
    pub message: Vec<u8>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            local: DEFAULT_LOCAL.into(),
            peer: DEFAULT_PEER.into(),
            message: DEFAULT_MESSAGE.to_vec(),
        }
    }
}

impl Config {
    /// Defaults overridden by `PATHGRAM_LOCAL`, `PATHGRAM_PEER` and
    /// `PATHGRAM_MESSAGE` where set.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(local) = env::var("PATHGRAM_LOCAL") {
            config.local = local.into();
        }
        if let Ok(peer) = env::var("PATHGRAM_PEER") {
            config.peer = peer.into();
        }
        if let Ok(message) = env::var("PATHGRAM_MESSAGE") {
            config.message = message.into_bytes();
        }

        config
    }
}

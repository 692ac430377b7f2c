use std::{
    collections::HashSet,
    os::linux::fs::MetadataExt as _,
    path::{Path, PathBuf},
    sync::{LazyLock, Mutex, PoisonError},
};

use tokio::net::UnixDatagram;
use tracing::{error, trace};

/// Longest address a unix datagram socket can be bound to. `sun_path` is 108
/// bytes on linux and one of those is the terminating NUL.
pub const MAX_NAME_LEN: usize = 107;

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
struct BindingId {
    dev: u64,
    ino: u64,
}

/// Every socket file currently bound by this process, keyed by dev/ino so
/// that two spellings of the same path can't slip past each other.
static LIVE_BINDINGS: LazyLock<Mutex<HashSet<BindingId>>> =
    LazyLock::new(|| Mutex::new(HashSet::new()));

/// A [`UnixDatagram`] bound to a filesystem path, with the following
/// guarantees:
///
/// # One live binding per path
/// Binding a path that a live [`BoundSocket`] in this process already owns
/// fails with [`BindError::AlreadyBound`]. A socket file at the path that no
/// live binding owns is treated as a leftover from a crashed run, unlinked,
/// and the path rebound.
///
/// # Automatic unlinking
/// The path is removed from the filesystem when the socket is
/// [dropped](Drop) (including when the program unwinds). The drop path has to
/// block to stay correct; in a normal flow of operations call
/// [`unlink`](BoundSocket::unlink) instead to release without blocking.
#[derive(Debug)]
pub struct BoundSocket {
    inner: UnixDatagram,
    path: PathBuf,
    id: BindingId,
    /// Used when dropping to ensure we don't try unlinking twice.
    is_unlinked: bool,
}

#[derive(thiserror::Error, Debug)]
pub enum BindError {
    #[error("a live socket in this process is already bound to this path")]
    AlreadyBound,
    #[error("path is {len} bytes, unix socket addresses are capped at {MAX_NAME_LEN}")]
    NameTooLong { len: usize },
    #[error("IO Error: {message} ({source})")]
    Io {
        source: std::io::Error,
        message: &'static str,
    },
    #[error("the lock around the live binding set has been poisoned")]
    Poisoned,
}

impl From<std::io::Error> for BindError {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            source,
            message: "",
        }
    }
}

impl<T> From<PoisonError<T>> for BindError {
    fn from(_: PoisonError<T>) -> Self {
        Self::Poisoned
    }
}

/// Gives you the [`BoundSocket`] back unchanged in case an error happens
/// while [unlinking](BoundSocket::unlink)
#[derive(thiserror::Error, Debug)]
#[error("couldn't unlink socket at {:?}: {source}", .socket.path)]
pub struct UnlinkError {
    pub socket: BoundSocket,
    pub source: std::io::Error,
}

async fn binding_id(path: &Path) -> Result<BindingId, BindError> {
    let stats = tokio::fs::metadata(path).await?;
    Ok(BindingId {
        dev: stats.st_dev(),
        ino: stats.st_ino(),
    })
}

async fn register(path: &Path) -> Result<BindingId, BindError> {
    trace!("registering binding at {path:?}");

    let id = binding_id(path).await?;

    let is_new = LIVE_BINDINGS.lock()?.insert(id.clone());
    if !is_new {
        error!("binding at {path:?} is still registered while absent from disk");
    }

    Ok(id)
}

impl BoundSocket {
    /// Binds a fresh datagram socket to `path`, creating a filesystem entry
    /// visible to other processes.
    ///
    /// Over-length paths are rejected, never truncated: a silently truncated
    /// address would bind a different path than the one requested.
    pub async fn bind(path: &(impl AsRef<Path> + ?Sized)) -> Result<Self, BindError> {
        let path = path.as_ref().to_owned();

        let len = path.as_os_str().len();
        if len > MAX_NAME_LEN {
            return Err(BindError::NameTooLong { len });
        }

        // Try binding once. Only keep going if the path is already occupied.
        match UnixDatagram::bind(&path) {
            Ok(inner) => {
                let id = register(&path).await?;

                return Ok(Self {
                    inner,
                    path,
                    id,
                    is_unlinked: false,
                });
            }
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => (), // Keep going
            Err(source) => {
                return Err(BindError::Io {
                    source,
                    message: "failed to bind socket",
                });
            }
        };

        // Correct to call since we know the file exists
        let id = binding_id(&path).await?;

        // A live binding in this process owns the path: refuse to double-bind.
        if LIVE_BINDINGS.lock()?.contains(&id) {
            return Err(BindError::AlreadyBound);
        }

        // Nobody here owns it, so it is leftover from a previous run.
        if let Err(source) = std::fs::remove_file(&path) {
            return Err(BindError::Io {
                source,
                message: "couldn't unlink stale socket",
            });
        }

        let inner = match UnixDatagram::bind(&path) {
            Ok(socket) => socket,
            Err(source) => {
                return Err(BindError::Io {
                    source,
                    message: "failed to bind socket",
                });
            }
        };

        let id = register(&path).await?;

        Ok(Self {
            inner,
            path,
            id,
            is_unlinked: false,
        })
    }

    /// The path this socket is bound to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Unlinks gracefully without blocking.
    ///
    /// Exists only because [`Drop`] can't be implemented non-blocking. It is
    /// totally safe to just drop a [`BoundSocket`], it just costs more.
    pub async fn unlink(mut self) -> Result<(), UnlinkError> {
        trace!("unlinking {:?} cooperatively", self.path);

        if let Err(source) = tokio::fs::remove_file(&self.path).await {
            Err(UnlinkError {
                socket: self,
                source,
            })
        } else {
            self.is_unlinked = true;
            drop(self);
            Ok(())
        }
    }
}

impl std::ops::Deref for BoundSocket {
    type Target = UnixDatagram;

    fn deref(&self) -> &UnixDatagram {
        &self.inner
    }
}

impl Drop for BoundSocket {
    fn drop(&mut self) {
        if let Ok(mut bindings) = LIVE_BINDINGS.lock() {
            let was_present = bindings.remove(&self.id);
            if !was_present {
                error!(
                    path = ?self.path,
                    "binding shouldn't have left the registry before drop"
                );
            }
        } else {
            error!(
                path = ?self.path,
                "failed to deregister binding: lock has been poisoned",
            );
        };

        if !self.is_unlinked {
            trace!("unlinking {:?} blockingly", self.path);
            // We can't tokio::spawn the removal: outside a runtime that
            // panics, and if drop runs because the runtime is stopping the
            // task would never execute anyway. The unlink method exists as
            // the non-blocking alternative.
            if let Err(err) = std::fs::remove_file(&self.path) {
                error!(
                    "failed to unlink socket at path {:?}. Got IO Error: {err}",
                    self.path
                );
            }
        }
    }
}

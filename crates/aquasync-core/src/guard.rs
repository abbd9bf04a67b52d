//! RAII release for bottle connections.
//!
//! Every sync cycle must end with a disconnect, on success and on every
//! error path. The orchestrator disconnects explicitly; this guard is the
//! safety net underneath it, so a connection can never outlive the cycle
//! that acquired it even if a path is missed.

use std::ops::Deref;

use tokio::runtime::Handle;
use tracing::warn;

use crate::error::Result;
use crate::traits::BottleConnection;

/// Releases the wrapped connection when dropped.
///
/// Prefer calling [`ConnectionGuard::disconnect`] so the release is awaited
/// and its outcome observable; the drop path spawns a best-effort task and
/// can only log.
pub struct ConnectionGuard {
    connection: Option<Box<dyn BottleConnection>>,
}

impl ConnectionGuard {
    /// Wrap a connection.
    pub fn new(connection: Box<dyn BottleConnection>) -> Self {
        Self {
            connection: Some(connection),
        }
    }

    /// Release the connection now, consuming the guard.
    pub async fn disconnect(mut self) -> Result<()> {
        match self.connection.take() {
            Some(connection) => connection.disconnect().await,
            None => Ok(()),
        }
    }

    /// Take the connection out, opting out of automatic release.
    pub fn into_inner(mut self) -> Box<dyn BottleConnection> {
        self.connection.take().expect("connection already taken")
    }
}

impl Deref for ConnectionGuard {
    type Target = dyn BottleConnection;

    fn deref(&self) -> &Self::Target {
        self.connection
            .as_deref()
            .expect("connection already taken")
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            if let Ok(handle) = Handle::try_current() {
                handle.spawn(async move {
                    if let Err(e) = connection.disconnect().await {
                        warn!("guard drop disconnect failed: {}", e);
                    }
                });
            } else {
                warn!("no tokio runtime available to release bottle connection");
            }
        }
    }
}

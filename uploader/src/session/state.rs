//! Upload client state machine
//!
//! ```text
//! Uninitialized -> Ready -> Refreshing -> Ready
//!                                      -> Stale
//! any -> Disposed
//! ```
//!
//! [`ClientState::apply`] is a pure transition function; the session layer
//! only decides which event to feed it.

use std::fmt;
use std::sync::Arc;

use strum::Display;

use super::error::RefreshFailure;
use crate::{credentials::TemporaryCredential, storage::ObjectStore};

/// Tag of a [`ClientState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ClientStatus {
    Uninitialized,
    Ready,
    Refreshing,
    Stale,
    Disposed,
}

/// State of one upload client.
///
/// `generation` counts settlements: it grows every time the client enters
/// `Ready` or `Stale`, which lets concurrent refresh callers detect that
/// someone else already settled the refresh they were about to start.
#[derive(Clone)]
pub enum ClientState {
    Uninitialized,
    Ready {
        credential: Arc<TemporaryCredential>,
        store: Arc<dyn ObjectStore>,
        generation: u64,
    },
    Refreshing {
        previous: Arc<TemporaryCredential>,
        generation: u64,
    },
    Stale {
        reason: RefreshFailure,
        generation: u64,
    },
    Disposed,
}

/// Input of [`ClientState::apply`]
pub enum ClientEvent {
    /// First credential obtained by `acquire()`
    Acquired {
        credential: TemporaryCredential,
        store: Arc<dyn ObjectStore>,
    },
    /// A refresh fetch is about to start
    RefreshStarted,
    /// The refresh fetch returned a new credential
    RefreshSucceeded {
        credential: TemporaryCredential,
        store: Arc<dyn ObjectStore>,
    },
    /// The refresh fetch failed
    RefreshFailed(RefreshFailure),
    /// The owning session ended
    Disposed,
}

impl ClientState {
    /// Next state after `event`. Events that make no sense in the current
    /// state leave it unchanged.
    #[must_use]
    pub fn apply(self, event: ClientEvent) -> Self {
        match (self, event) {
            (_, ClientEvent::Disposed) => Self::Disposed,
            (Self::Uninitialized, ClientEvent::Acquired { credential, store }) => Self::Ready {
                credential: Arc::new(credential),
                store,
                generation: 1,
            },
            (
                Self::Ready {
                    credential,
                    generation,
                    ..
                },
                ClientEvent::RefreshStarted,
            ) => Self::Refreshing {
                previous: credential,
                generation,
            },
            (Self::Refreshing { generation, .. }, ClientEvent::RefreshSucceeded { credential, store }) => {
                Self::Ready {
                    credential: Arc::new(credential),
                    store,
                    generation: generation + 1,
                }
            }
            (Self::Refreshing { generation, .. }, ClientEvent::RefreshFailed(reason)) => {
                Self::Stale {
                    reason,
                    generation: generation + 1,
                }
            }
            (state, event) => {
                tracing::debug!("Ignoring {} event in {} state", event.name(), state.status());
                state
            }
        }
    }

    #[must_use]
    pub const fn status(&self) -> ClientStatus {
        match self {
            Self::Uninitialized => ClientStatus::Uninitialized,
            Self::Ready { .. } => ClientStatus::Ready,
            Self::Refreshing { .. } => ClientStatus::Refreshing,
            Self::Stale { .. } => ClientStatus::Stale,
            Self::Disposed => ClientStatus::Disposed,
        }
    }

    /// Number of settlements so far
    #[must_use]
    pub const fn generation(&self) -> u64 {
        match self {
            Self::Uninitialized | Self::Disposed => 0,
            Self::Ready { generation, .. }
            | Self::Refreshing { generation, .. }
            | Self::Stale { generation, .. } => *generation,
        }
    }

    /// Credential currently bound, or being replaced
    #[must_use]
    pub fn credential(&self) -> Option<&TemporaryCredential> {
        match self {
            Self::Ready { credential, .. } => Some(credential.as_ref()),
            Self::Refreshing { previous, .. } => Some(previous.as_ref()),
            _ => None,
        }
    }
}

impl ClientEvent {
    const fn name(&self) -> &'static str {
        match self {
            Self::Acquired { .. } => "acquired",
            Self::RefreshStarted => "refresh_started",
            Self::RefreshSucceeded { .. } => "refresh_succeeded",
            Self::RefreshFailed(_) => "refresh_failed",
            Self::Disposed => "disposed",
        }
    }
}

impl fmt::Debug for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("ClientState");
        out.field("status", &self.status())
            .field("generation", &self.generation());
        if let Some(credential) = self.credential() {
            out.field("credential", credential);
        }
        if let Self::Stale { reason, .. } = self {
            out.field("reason", reason);
        }
        out.finish()
    }
}

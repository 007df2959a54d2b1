//! Session identity.
//!
//! Holds the current session identifier and a generation counter. Every
//! change of session bumps the counter, which lets in-flight operations
//! detect that the session they started under is gone.

use crate::model::{Session, SessionId};

/// Generation of the session an operation started under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct SessionEpoch(u64);

impl SessionEpoch {
    /// Raw counter value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

/// Current session identifier and its lifecycle.
///
/// No validation happens here; whether a session id is known remotely is
/// for the gateway to decide.
#[derive(Debug, Default)]
pub struct IdentityStore {
    current: Option<Session>,
    epoch: SessionEpoch,
}

impl IdentityStore {
    /// Create a store with no session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current session, if any.
    #[must_use]
    pub fn current_session(&self) -> Option<&Session> {
        self.current.as_ref()
    }

    /// Replace the current session.
    ///
    /// Always starts a new epoch, even if `id` equals the current one.
    pub fn set_session(&mut self, id: SessionId) -> SessionEpoch {
        self.current = Some(Session { id });
        self.epoch = self.epoch.next();
        self.epoch
    }

    /// Remove the current session.
    ///
    /// Returns `false` without touching the epoch when there was no session.
    pub fn clear(&mut self) -> bool {
        if self.current.take().is_none() {
            return false;
        }
        self.epoch = self.epoch.next();
        true
    }

    /// Current epoch.
    #[must_use]
    pub const fn epoch(&self) -> SessionEpoch {
        self.epoch
    }

    /// Returns `true` if `epoch` still identifies the current session.
    #[must_use]
    pub fn is_current(&self, epoch: SessionEpoch) -> bool {
        self.current.is_some() && self.epoch == epoch
    }
}

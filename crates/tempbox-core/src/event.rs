//! Change notifications.

use crate::model::{AddressId, SessionId};
use crate::restore::RestoreState;

/// Something observable changed in the client.
///
/// Events never carry a restore key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// The session was set, replaced or cleared. All addresses were dropped.
    SessionChanged {
        /// New session, `None` after a clear.
        session: Option<SessionId>,
    },
    /// An address became visible.
    AddressAdded {
        /// Address identifier.
        id: AddressId,
    },
    /// New mail was appended to a visible address.
    MailReceived {
        /// Address identifier.
        id: AddressId,
        /// Number of mails appended.
        count: usize,
    },
    /// An address was detached from the session.
    AddressRemoved {
        /// Address identifier.
        id: AddressId,
    },
    /// A restoration moved to a new state.
    RestoreStateChanged {
        /// New state.
        state: RestoreState,
    },
}

//! Remote query/mutation capability.
//!
//! The core never talks to the network itself. Everything remote goes
//! through [`MailGateway`], so the transport (GraphQL over HTTP, a test
//! double, ...) is the embedder's choice.

mod memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{Address, AddressId, RestoreKey, SessionId, SessionSnapshot};

pub use memory::{CallCounts, MemoryGateway};

/// Failure reported by a gateway.
///
/// `Clone` so that callers coalesced onto one request can each receive the
/// outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// The requested entity does not exist remotely.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The restore key was rejected.
    #[error("Restore key rejected")]
    InvalidKey,

    /// Network or server failure.
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Remote operations the core depends on.
#[async_trait]
pub trait MailGateway: Send + Sync {
    /// Read a session and the addresses attached to it.
    ///
    /// # Errors
    ///
    /// `NotFound` if the session id is unknown, `Transport` on network
    /// failure.
    async fn fetch_session(&self, session_id: &SessionId) -> Result<SessionSnapshot, GatewayError>;

    /// Read one address with its full mail list.
    ///
    /// # Errors
    ///
    /// `NotFound` if the address id is unknown, `Transport` on network
    /// failure.
    async fn fetch_address(&self, address_id: &AddressId) -> Result<Address, GatewayError>;

    /// Resolve a restore key to the address it belongs to.
    ///
    /// # Errors
    ///
    /// `InvalidKey` if the key is rejected or expired, `NotFound` if the
    /// address behind it is gone, `Transport` on network failure.
    async fn restore_address(&self, restore_key: &RestoreKey) -> Result<Address, GatewayError>;
}

//! # tempbox-core
//!
//! Client-side core of the `tempbox` disposable mail service.
//!
//! This crate provides:
//! - **Identity** - the anonymous session id and its lifecycle
//! - **Address registry** - addresses visible to the session, each with an
//!   append-only mail list
//! - **Mail synchronization** - idempotent merge of fetched mail snapshots
//! - **Restoration** - re-attaching an address to a new session through its
//!   restore key, with concurrent requests coalesced
//! - **Gateway** - the async capability the core uses to reach the service,
//!   plus an in-memory implementation
//!
//! Everything is reached through [`MailClient`], an explicit context object
//! with a broadcast channel of [`ClientEvent`]s for change notification.
//!
//! ```ignore
//! use std::sync::Arc;
//! use tempbox_core::{ClientConfig, MailClient, MemoryGateway};
//!
//! let client = MailClient::new(Arc::new(MemoryGateway::new()), ClientConfig::default())?;
//! let mut events = client.subscribe();
//! client.init("session-id").await?;
//! client.restore("restore-key").await?;
//! for address in client.addresses() {
//!     println!("{} ({} mails)", address.address, address.mails.len());
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod client;
pub mod config;
mod error;
pub mod event;
pub mod gateway;
pub mod identity;
pub mod logging;
pub mod model;
pub mod poll;
pub mod registry;
pub mod restore;
pub mod sync;

pub use client::{MailClient, RefreshReport};
pub use config::ClientConfig;
pub use error::{Error, Result};
pub use event::ClientEvent;
pub use gateway::{CallCounts, GatewayError, MailGateway, MemoryGateway};
pub use identity::{IdentityStore, SessionEpoch};
pub use model::{
    Address, AddressId, AddressRef, Domain, DomainId, Mail, MailId, RestoreKey, Session,
    SessionId, SessionSnapshot,
};
pub use poll::Poller;
pub use registry::{AddressRegistry, IntegrityWarning, UpsertOutcome};
pub use restore::{RestoreFlow, RestoreState};
pub use sync::{MergeOutcome, merge_mails};

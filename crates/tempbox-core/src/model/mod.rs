//! Domain models.
//!
//! Session, address, domain and mail types. They decode the remote JSON
//! shape directly (`camelCase` field names).

mod address;
mod ids;
mod mail;

pub use address::{Address, AddressRef, Domain, Session, SessionSnapshot};
pub use ids::{AddressId, DomainId, MailId, RestoreKey, SessionId};
pub use mail::Mail;

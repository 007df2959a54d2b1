//! Address, domain and session models.

use serde::{Deserialize, Serialize};

use super::{AddressId, DomainId, Mail, RestoreKey, SessionId};

/// An anonymous client context.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Session {
    /// Session identifier.
    pub id: SessionId,
}

impl Session {
    /// Create a session with the given identifier.
    #[must_use]
    pub fn new(id: impl Into<SessionId>) -> Self {
        Self { id: id.into() }
    }
}

/// A mail domain. Many addresses may share one domain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Domain {
    /// Domain identifier.
    pub id: DomainId,
    /// DNS domain name.
    pub name: String,
}

impl Domain {
    /// Create a domain.
    #[must_use]
    pub fn new(id: impl Into<DomainId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// A disposable email address, its restore key and its mail history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    /// Globally unique identifier.
    pub id: AddressId,
    /// Full address, `<login>@<domain name>`.
    pub address: String,
    /// Domain part of `address`, as an entity rather than a name.
    pub domain: Domain,
    /// Secret used to restore access to this address from another session.
    pub restore_key: RestoreKey,
    /// Mail received by this address, in storage order.
    #[serde(default)]
    pub mails: Vec<Mail>,
}

impl Address {
    /// Build an address from a login fragment and a domain.
    #[must_use]
    pub fn new(
        id: impl Into<AddressId>,
        login: &str,
        domain: Domain,
        restore_key: impl Into<RestoreKey>,
    ) -> Self {
        Self {
            id: id.into(),
            address: format!("{login}@{}", domain.name),
            domain,
            restore_key: restore_key.into(),
            mails: Vec::new(),
        }
    }

    /// Attach mail to a freshly built address.
    #[must_use]
    pub fn with_mails(mut self, mails: Vec<Mail>) -> Self {
        self.mails = mails;
        self
    }

    /// Login fragment before the `@`.
    #[must_use]
    pub fn login(&self) -> &str {
        self.address
            .split_once('@')
            .map_or(self.address.as_str(), |(login, _)| login)
    }

    /// Returns `true` if the domain part of `address` matches `domain.name`.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.address
            .rsplit_once('@')
            .is_some_and(|(login, host)| {
                !login.is_empty() && host.eq_ignore_ascii_case(&self.domain.name)
            })
    }

    /// Mail sorted by arrival time.
    ///
    /// Storage order stays untouched; ties keep their storage order.
    #[must_use]
    pub fn mails_chronological(&self) -> Vec<Mail> {
        let mut mails = self.mails.clone();
        mails.sort_by_key(|m| m.arrived_at);
        mails
    }

    /// Reference to this address without its secret.
    #[must_use]
    pub fn to_ref(&self) -> AddressRef {
        AddressRef {
            id: self.id.clone(),
            address: self.address.clone(),
        }
    }
}

/// Identity of an address without its restore key or mail.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AddressRef {
    /// Address identifier.
    pub id: AddressId,
    /// Full address string.
    pub address: String,
}

/// Session read result returned by the gateway.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Addresses attached to the session.
    #[serde(default)]
    pub addresses: Vec<Address>,
}

//! In-memory registry of the addresses visible to the current session.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::model::{Address, AddressId, AddressRef, Mail};
use crate::sync::{MergeOutcome, merge_mails};

/// Non-fatal conflict between incoming data and an immutable local field.
///
/// The local value always wins; the warning is reported so callers can
/// surface it, but the rest of the merge proceeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityWarning {
    /// Incoming address string differs from the stored one.
    AddressConflict {
        /// Address concerned.
        id: AddressId,
    },
    /// Incoming domain differs from the stored one.
    DomainConflict {
        /// Address concerned.
        id: AddressId,
    },
    /// Incoming restore key differs from the stored one.
    RestoreKeyConflict {
        /// Address concerned.
        id: AddressId,
    },
    /// Address string does not belong to the address's domain.
    InconsistentAddress {
        /// Address concerned.
        id: AddressId,
    },
}

impl IntegrityWarning {
    /// Address the warning is about.
    #[must_use]
    pub const fn address_id(&self) -> &AddressId {
        match self {
            Self::AddressConflict { id }
            | Self::DomainConflict { id }
            | Self::RestoreKeyConflict { id }
            | Self::InconsistentAddress { id } => id,
        }
    }
}

impl std::fmt::Display for IntegrityWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AddressConflict { id } => write!(f, "address {id}: incoming address string ignored"),
            Self::DomainConflict { id } => write!(f, "address {id}: incoming domain ignored"),
            Self::RestoreKeyConflict { id } => {
                write!(f, "address {id}: incoming restore key ignored")
            }
            Self::InconsistentAddress { id } => {
                write!(f, "address {id}: address string does not match its domain")
            }
        }
    }
}

/// What an upsert did to the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpsertOutcome {
    /// The address was not known before.
    pub inserted: bool,
    /// Mail appended by the merge (all of it on insert).
    pub appended: usize,
    /// Conflicts that were resolved in favour of the stored values.
    pub warnings: Vec<IntegrityWarning>,
}

impl UpsertOutcome {
    /// Returns `true` if anything observable changed.
    #[must_use]
    pub const fn changed(&self) -> bool {
        self.inserted || self.appended > 0
    }
}

/// Insertion-ordered set of addresses.
///
/// Addresses removed from the visible set are remembered as detached so
/// that a session refresh does not bring them back; an explicit upsert
/// (e.g. a restoration) re-attaches them.
#[derive(Debug, Default)]
pub struct AddressRegistry {
    addresses: Vec<Address>,
    detached: HashSet<AddressId>,
}

impl AddressRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an address, or merge it into the stored one with the same id.
    ///
    /// On merge only mail is taken from `incoming`. `address`, `domain` and
    /// `restore_key` keep their first-seen values.
    pub fn upsert_address(&mut self, incoming: Address) -> UpsertOutcome {
        let mut outcome = UpsertOutcome::default();
        self.detached.remove(&incoming.id);

        let Some(index) = self.addresses.iter().position(|a| a.id == incoming.id) else {
            if !incoming.is_consistent() {
                outcome.warnings.push(IntegrityWarning::InconsistentAddress {
                    id: incoming.id.clone(),
                });
            }
            // Mail goes through the merge path so duplicate ids in the
            // payload collapse.
            let mut address = incoming;
            let mails = std::mem::take(&mut address.mails);
            outcome.appended = merge_mails(&mut address.mails, &mails).appended;
            outcome.inserted = true;
            debug!(address_id = %address.id, mails = outcome.appended, "Address inserted");
            self.addresses.push(address);
            log_warnings(&outcome.warnings);
            return outcome;
        };
        let existing = &mut self.addresses[index];

        if existing.address != incoming.address {
            outcome.warnings.push(IntegrityWarning::AddressConflict {
                id: existing.id.clone(),
            });
        }
        if existing.domain != incoming.domain {
            outcome.warnings.push(IntegrityWarning::DomainConflict {
                id: existing.id.clone(),
            });
        }
        if existing.restore_key != incoming.restore_key {
            outcome.warnings.push(IntegrityWarning::RestoreKeyConflict {
                id: existing.id.clone(),
            });
        }

        outcome.appended = merge_mails(&mut existing.mails, &incoming.mails).appended;
        if outcome.appended > 0 {
            debug!(address_id = %existing.id, appended = outcome.appended, "Mail merged");
        }
        log_warnings(&outcome.warnings);
        outcome
    }

    /// Merge a mail snapshot into a stored address.
    ///
    /// Returns `None` if the address is unknown.
    pub fn merge_mails(&mut self, id: &AddressId, snapshot: &[Mail]) -> Option<MergeOutcome> {
        let address = self.addresses.iter_mut().find(|a| &a.id == id)?;
        Some(merge_mails(&mut address.mails, snapshot))
    }

    /// Get an address by id.
    #[must_use]
    pub fn get_address(&self, id: &AddressId) -> Option<&Address> {
        self.addresses.iter().find(|a| &a.id == id)
    }

    /// Returns `true` if the address is visible.
    #[must_use]
    pub fn contains(&self, id: &AddressId) -> bool {
        self.get_address(id).is_some()
    }

    /// All addresses, in insertion order.
    #[must_use]
    pub fn list_addresses(&self) -> &[Address] {
        &self.addresses
    }

    /// Address references without restore keys or mail.
    #[must_use]
    pub fn list_refs(&self) -> Vec<AddressRef> {
        self.addresses.iter().map(Address::to_ref).collect()
    }

    /// Detach an address from the visible set.
    ///
    /// The remote entity is untouched. Unknown ids are ignored.
    pub fn remove_address(&mut self, id: &AddressId) -> Option<Address> {
        let index = self.addresses.iter().position(|a| &a.id == id)?;
        self.detached.insert(id.clone());
        Some(self.addresses.remove(index))
    }

    /// Returns `true` if the address was removed from the visible set and
    /// not re-attached since.
    #[must_use]
    pub fn is_detached(&self, id: &AddressId) -> bool {
        self.detached.contains(id)
    }

    /// Drop every address and forget detachments.
    pub fn clear(&mut self) {
        self.addresses.clear();
        self.detached.clear();
    }

    /// Number of visible addresses.
    #[must_use]
    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    /// Returns `true` if no address is visible.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}

fn log_warnings(warnings: &[IntegrityWarning]) {
    for warning in warnings {
        warn!(address_id = %warning.address_id(), "Data integrity warning: {warning}");
    }
}

//! In-memory gateway.
//!
//! Holds sessions, addresses and restore keys in maps. Used by the test
//! suite and by embedders that want to run the core without a server.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use super::{GatewayError, MailGateway};
use crate::model::{Address, AddressId, Mail, RestoreKey, SessionId, SessionSnapshot};

/// Number of calls received per operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    /// `fetch_session` calls.
    pub fetch_session: usize,
    /// `fetch_address` calls.
    pub fetch_address: usize,
    /// `restore_address` calls.
    pub restore_address: usize,
}

#[derive(Debug, Default)]
struct State {
    sessions: HashMap<SessionId, Vec<AddressId>>,
    addresses: HashMap<AddressId, Address>,
    restore_keys: HashMap<RestoreKey, AddressId>,
    expired_keys: HashSet<RestoreKey>,
    fail_next: Option<GatewayError>,
    delay: Option<Duration>,
    calls: CallCounts,
}

/// Gateway backed by in-process maps.
#[derive(Debug, Default)]
pub struct MemoryGateway {
    state: Mutex<State>,
}

impl MemoryGateway {
    /// Create an empty gateway.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every answer by `delay`.
    #[must_use]
    pub fn with_delay(self, delay: Duration) -> Self {
        self.state.lock().delay = Some(delay);
        self
    }

    /// Register a session with no addresses.
    pub fn add_session(&self, session_id: impl Into<SessionId>) {
        self.state.lock().sessions.entry(session_id.into()).or_default();
    }

    /// Store an address and attach it to a session, creating the session
    /// if needed.
    pub fn add_address(&self, session_id: impl Into<SessionId>, address: Address) {
        let mut state = self.state.lock();
        let id = address.id.clone();
        state
            .restore_keys
            .insert(address.restore_key.clone(), id.clone());
        state.addresses.insert(id.clone(), address);
        let attached = state.sessions.entry(session_id.into()).or_default();
        if !attached.contains(&id) {
            attached.push(id);
        }
    }

    /// Deliver a mail to an address. Returns `false` if the address is unknown.
    pub fn deliver(&self, address_id: &AddressId, mail: Mail) -> bool {
        let mut state = self.state.lock();
        let Some(address) = state.addresses.get_mut(address_id) else {
            return false;
        };
        address.mails.push(mail);
        true
    }

    /// Replace the mail list reported for an address.
    pub fn set_mails(&self, address_id: &AddressId, mails: Vec<Mail>) -> bool {
        let mut state = self.state.lock();
        let Some(address) = state.addresses.get_mut(address_id) else {
            return false;
        };
        address.mails = mails;
        true
    }

    /// Overwrite a stored address wholesale, including fields the client
    /// treats as immutable.
    pub fn replace_address(&self, address: Address) {
        self.state.lock().addresses.insert(address.id.clone(), address);
    }

    /// Delete an address. Its restore key keeps resolving, to `NotFound`.
    pub fn delete_address(&self, address_id: &AddressId) {
        let mut state = self.state.lock();
        state.addresses.remove(address_id);
        for attached in state.sessions.values_mut() {
            attached.retain(|id| id != address_id);
        }
    }

    /// Mark a restore key as expired.
    pub fn expire_key(&self, key: &RestoreKey) {
        self.state.lock().expired_keys.insert(key.clone());
    }

    /// Make the next call, whatever it is, fail with `error`.
    pub fn fail_next_with(&self, error: GatewayError) {
        self.state.lock().fail_next = Some(error);
    }

    /// Calls received so far.
    #[must_use]
    pub fn calls(&self) -> CallCounts {
        self.state.lock().calls
    }

    async fn pause(&self) {
        let delay = self.state.lock().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl MailGateway for MemoryGateway {
    async fn fetch_session(&self, session_id: &SessionId) -> Result<SessionSnapshot, GatewayError> {
        self.state.lock().calls.fetch_session += 1;
        self.pause().await;

        let mut state = self.state.lock();
        if let Some(err) = state.fail_next.take() {
            return Err(err);
        }
        let ids = state
            .sessions
            .get(session_id)
            .ok_or_else(|| GatewayError::NotFound(format!("session {session_id}")))?;
        let addresses = ids
            .iter()
            .filter_map(|id| state.addresses.get(id).cloned())
            .collect();
        debug!(%session_id, "Served session");
        Ok(SessionSnapshot { addresses })
    }

    async fn fetch_address(&self, address_id: &AddressId) -> Result<Address, GatewayError> {
        self.state.lock().calls.fetch_address += 1;
        self.pause().await;

        let mut state = self.state.lock();
        if let Some(err) = state.fail_next.take() {
            return Err(err);
        }
        state
            .addresses
            .get(address_id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(format!("address {address_id}")))
    }

    async fn restore_address(&self, restore_key: &RestoreKey) -> Result<Address, GatewayError> {
        self.state.lock().calls.restore_address += 1;
        self.pause().await;

        let mut state = self.state.lock();
        if let Some(err) = state.fail_next.take() {
            return Err(err);
        }
        if restore_key.is_empty() || state.expired_keys.contains(restore_key) {
            return Err(GatewayError::InvalidKey);
        }
        let id = state
            .restore_keys
            .get(restore_key)
            .ok_or(GatewayError::InvalidKey)?;
        state
            .addresses
            .get(id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(format!("address {id}")))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::model::Domain;

    fn address(id: &str, key: &str) -> Address {
        Address::new(id, "x", Domain::new("d1", "mail.test"), key)
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let gateway = MemoryGateway::new();
        let err = gateway.fetch_session(&"nope".into()).await.unwrap_err();
        assert!(matches!(err, GatewayError::NotFound(_)));
    }

    #[tokio::test]
    async fn session_lists_attached_addresses() {
        let gateway = MemoryGateway::new();
        gateway.add_address("s1", address("a1", "k1"));
        gateway.add_address("s1", address("a2", "k2"));
        gateway.add_address("s2", address("a3", "k3"));

        let snapshot = gateway.fetch_session(&"s1".into()).await.unwrap();
        let ids: Vec<_> = snapshot.addresses.iter().map(|a| a.id.to_string()).collect();
        assert_eq!(ids, ["a1", "a2"]);
    }

    #[tokio::test]
    async fn delivered_mail_is_served() {
        let gateway = MemoryGateway::new();
        gateway.add_address("s1", address("a1", "k1"));
        assert!(gateway.deliver(&"a1".into(), Mail::new("m1", Utc::now())));
        assert!(!gateway.deliver(&"zz".into(), Mail::new("m1", Utc::now())));

        let addr = gateway.fetch_address(&"a1".into()).await.unwrap();
        assert_eq!(addr.mails.len(), 1);
    }

    #[tokio::test]
    async fn restore_key_outcomes() {
        let gateway = MemoryGateway::new();
        gateway.add_address("s1", address("a1", "good"));
        gateway.add_address("s1", address("a2", "old"));
        gateway.add_address("s1", address("a3", "orphan"));
        gateway.expire_key(&"old".into());
        gateway.delete_address(&"a3".into());

        assert_eq!(
            gateway.restore_address(&"good".into()).await.unwrap().id,
            AddressId::from("a1")
        );
        assert_eq!(
            gateway.restore_address(&"old".into()).await.unwrap_err(),
            GatewayError::InvalidKey
        );
        assert_eq!(
            gateway.restore_address(&"bad-key".into()).await.unwrap_err(),
            GatewayError::InvalidKey
        );
        assert!(matches!(
            gateway.restore_address(&"orphan".into()).await.unwrap_err(),
            GatewayError::NotFound(_)
        ));
        assert_eq!(gateway.calls().restore_address, 4);
    }

    #[tokio::test]
    async fn injected_failure_applies_once() {
        let gateway = MemoryGateway::new();
        gateway.add_session("s1");
        gateway.fail_next_with(GatewayError::Transport("down".to_string()));

        assert_eq!(
            gateway.fetch_session(&"s1".into()).await.unwrap_err(),
            GatewayError::Transport("down".to_string())
        );
        assert!(gateway.fetch_session(&"s1".into()).await.is_ok());
        assert_eq!(gateway.calls().fetch_session, 2);
    }
}

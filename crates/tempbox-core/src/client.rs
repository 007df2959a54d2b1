//! Client context.
//!
//! [`MailClient`] ties the identity store, the address registry, the
//! restoration flow and the gateway together. It is the only entry point
//! the presentation layer needs: it exposes read-only snapshots, the flow
//! operations and a change subscription.
//!
//! Registry and identity live behind one lock so that a session change and
//! a registry mutation can never interleave. Events are sent while that lock
//! is held, so subscribers see them in the order the changes were applied.
//! The lock is never held across a gateway call: every async operation
//! records the session epoch before calling out and discards its result if
//! the epoch moved in the meantime.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::event::ClientEvent;
use crate::gateway::MailGateway;
use crate::identity::{IdentityStore, SessionEpoch};
use crate::model::{Address, AddressId, AddressRef, Mail, RestoreKey, Session, SessionId};
use crate::registry::{AddressRegistry, IntegrityWarning, UpsertOutcome};
use crate::restore::{RestoreFlow, RestoreState};
use crate::{Error, Result};

/// Summary of what a refresh changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    /// Addresses that became visible.
    pub added: usize,
    /// Mails appended across all addresses.
    pub appended: usize,
    /// Conflicts resolved in favour of stored values.
    pub warnings: Vec<IntegrityWarning>,
    /// Per-address failures, for refreshes that cover several addresses.
    pub failures: Vec<(AddressId, Error)>,
}

impl RefreshReport {
    fn record(&mut self, outcome: UpsertOutcome) {
        if outcome.inserted {
            self.added += 1;
        } else {
            self.appended += outcome.appended;
        }
        self.warnings.extend(outcome.warnings);
    }

    fn absorb(&mut self, other: Self) {
        self.added += other.added;
        self.appended += other.appended;
        self.warnings.extend(other.warnings);
        self.failures.extend(other.failures);
    }

    /// Returns `true` if the refresh changed anything visible.
    #[must_use]
    pub const fn changed(&self) -> bool {
        self.added > 0 || self.appended > 0
    }
}

#[derive(Debug, Default)]
struct ClientState {
    identity: IdentityStore,
    registry: AddressRegistry,
}

struct Inner {
    gateway: Arc<dyn MailGateway>,
    state: Mutex<ClientState>,
    restore: RestoreFlow,
    events: broadcast::Sender<ClientEvent>,
    config: ClientConfig,
}

/// Session, address and mail state of one client.
///
/// Cloning is cheap and every clone shares the same state.
#[derive(Clone)]
pub struct MailClient {
    inner: Arc<Inner>,
}

impl MailClient {
    /// Create a client with no session.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the configuration is invalid.
    pub fn new(gateway: Arc<dyn MailGateway>, config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let (events, _) = broadcast::channel(config.event_capacity);
        Ok(Self {
            inner: Arc::new(Inner {
                gateway,
                state: Mutex::new(ClientState::default()),
                restore: RestoreFlow::new(events.clone()),
                events,
                config,
            }),
        })
    }

    /// Configuration this client was built with.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Subscribe to change notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.inner.events.subscribe()
    }

    // ---- session lifecycle ----

    /// Start a session and load its addresses.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial fetch fails. The session stays set
    /// so the fetch can be retried with [`MailClient::refresh_session`].
    pub async fn init(&self, session_id: impl Into<SessionId>) -> Result<RefreshReport> {
        self.set_session(session_id);
        self.refresh_session().await
    }

    /// End the current session.
    pub fn teardown(&self) {
        self.clear_session();
    }

    /// Current session, if any.
    #[must_use]
    pub fn session(&self) -> Option<Session> {
        self.inner.state.lock().identity.current_session().cloned()
    }

    /// Replace the current session. Every visible address is dropped.
    pub fn set_session(&self, session_id: impl Into<SessionId>) {
        let session_id = session_id.into();
        let mut state = self.inner.state.lock();
        state.identity.set_session(session_id.clone());
        state.registry.clear();
        self.inner.restore.reset();
        info!(%session_id, "Session set");
        self.emit(ClientEvent::SessionChanged {
            session: Some(session_id),
        });
    }

    /// Start a session with a freshly generated identifier.
    pub fn start_new_session(&self) -> SessionId {
        let session_id = SessionId::generate();
        self.set_session(session_id.clone());
        session_id
    }

    /// Clear the current session. Returns `false` if there was none.
    pub fn clear_session(&self) -> bool {
        let mut state = self.inner.state.lock();
        if !state.identity.clear() {
            return false;
        }
        state.registry.clear();
        self.inner.restore.reset();
        info!("Session cleared");
        self.emit(ClientEvent::SessionChanged { session: None });
        true
    }

    // ---- synchronization ----

    /// Fetch the session's addresses and merge them into the registry.
    ///
    /// Addresses the user removed stay removed.
    ///
    /// # Errors
    ///
    /// `NoSession` without a session, `NotFound`/`Transport` from the
    /// gateway, `SessionChanged` if the session moved during the fetch.
    pub async fn refresh_session(&self) -> Result<RefreshReport> {
        let (session_id, epoch) = self.active()?;
        debug!(%session_id, "Refreshing session");
        let snapshot = self.inner.gateway.fetch_session(&session_id).await?;

        let mut report = RefreshReport::default();
        let mut state = self.inner.state.lock();
        Self::check_epoch(&state, epoch)?;
        for address in snapshot.addresses {
            if state.registry.is_detached(&address.id) {
                continue;
            }
            let id = address.id.clone();
            let outcome = state.registry.upsert_address(address);
            self.emit_all(change_event(&id, &outcome));
            report.record(outcome);
        }
        Ok(report)
    }

    /// Fetch one visible address and merge its mail.
    ///
    /// # Errors
    ///
    /// `NotFound` if the address is not visible locally or remotely,
    /// `Transport` on gateway failure, `NoSession`/`SessionChanged` as for
    /// [`MailClient::refresh_session`].
    pub async fn refresh_address(&self, id: &AddressId) -> Result<RefreshReport> {
        let (_, epoch) = self.active()?;
        if !self.inner.state.lock().registry.contains(id) {
            return Err(Error::NotFound(format!("address {id}")));
        }
        let address = self.inner.gateway.fetch_address(id).await?;
        if &address.id != id {
            return Err(Error::Transport(format!(
                "asked for address {id}, got {}",
                address.id
            )));
        }

        let mut report = RefreshReport::default();
        let mut state = self.inner.state.lock();
        Self::check_epoch(&state, epoch)?;
        if !state.registry.contains(id) {
            debug!(address_id = %id, "Address removed during refresh, dropping result");
            return Ok(report);
        }
        let outcome = state.registry.upsert_address(address);
        self.emit_all(change_event(id, &outcome));
        report.record(outcome);
        Ok(report)
    }

    /// Refresh every visible address one after the other.
    ///
    /// A failing address does not stop the others; its error is collected
    /// in [`RefreshReport::failures`].
    ///
    /// # Errors
    ///
    /// `NoSession` without a session, `SessionChanged` if the session moved
    /// while refreshing.
    pub async fn refresh_all(&self) -> Result<RefreshReport> {
        self.active()?;
        let ids: Vec<AddressId> = self
            .inner
            .state
            .lock()
            .registry
            .list_addresses()
            .iter()
            .map(|a| a.id.clone())
            .collect();

        let mut report = RefreshReport::default();
        for id in ids {
            match self.refresh_address(&id).await {
                Ok(one) => report.absorb(one),
                Err(Error::SessionChanged) => return Err(Error::SessionChanged),
                Err(err) => {
                    warn!(address_id = %id, error = %err, "Address refresh failed");
                    report.failures.push((id, err));
                }
            }
        }
        Ok(report)
    }

    // ---- restoration ----

    /// Re-attach the address behind `key` to the current session.
    ///
    /// Concurrent calls with the same key share one gateway request and
    /// observe the same outcome. Returns the address as now held locally.
    ///
    /// # Errors
    ///
    /// `NoSession` without a session; `InvalidKey`, `NotFound` or
    /// `Transport` from the gateway; `SessionChanged` if the session moved
    /// during the request. The registry is untouched on error.
    pub async fn restore(&self, key: impl Into<RestoreKey>) -> Result<Address> {
        let key = key.into();
        let (_, epoch) = self.active()?;

        let client = self.clone();
        let request_key = key.clone();
        self.inner
            .restore
            .run(&key, epoch, move || async move {
                client.restore_and_apply(&request_key, epoch).await
            })
            .await
    }

    /// State of the restoration for `key`.
    #[must_use]
    pub fn restore_state(&self, key: &RestoreKey) -> RestoreState {
        self.inner.restore.state(key)
    }

    async fn restore_and_apply(&self, key: &RestoreKey, epoch: SessionEpoch) -> Result<Address> {
        let address = self.inner.gateway.restore_address(key).await?;
        if &address.restore_key != key {
            warn!(address_id = %address.id, "Restored address carries a different restore key");
        }

        let id = address.id.clone();
        let mut state = self.inner.state.lock();
        Self::check_epoch(&state, epoch)?;
        let outcome = state.registry.upsert_address(address);
        self.emit_all(change_event(&id, &outcome));
        state
            .registry
            .get_address(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("address {id}")))
    }

    // ---- registry access ----

    /// Detach an address from the session. The remote address is kept.
    ///
    /// Returns `false` if the address was not visible.
    pub fn remove_address(&self, id: &AddressId) -> bool {
        let mut state = self.inner.state.lock();
        let removed = state.registry.remove_address(id).is_some();
        if removed {
            debug!(address_id = %id, "Address removed");
            self.emit(ClientEvent::AddressRemoved { id: id.clone() });
        }
        removed
    }

    /// Snapshot of the visible addresses, in insertion order.
    #[must_use]
    pub fn addresses(&self) -> Vec<Address> {
        self.inner.state.lock().registry.list_addresses().to_vec()
    }

    /// Visible addresses without restore keys or mail.
    #[must_use]
    pub fn address_refs(&self) -> Vec<AddressRef> {
        self.inner.state.lock().registry.list_refs()
    }

    /// Snapshot of one address.
    #[must_use]
    pub fn address(&self, id: &AddressId) -> Option<Address> {
        self.inner.state.lock().registry.get_address(id).cloned()
    }

    /// Snapshot of one address's mail, in storage order.
    #[must_use]
    pub fn mails(&self, id: &AddressId) -> Option<Vec<Mail>> {
        self.inner
            .state
            .lock()
            .registry
            .get_address(id)
            .map(|a| a.mails.clone())
    }

    // ---- helpers ----

    fn active(&self) -> Result<(SessionId, SessionEpoch)> {
        let state = self.inner.state.lock();
        let session = state.identity.current_session().ok_or(Error::NoSession)?;
        Ok((session.id.clone(), state.identity.epoch()))
    }

    fn check_epoch(state: &ClientState, epoch: SessionEpoch) -> Result<()> {
        if state.identity.is_current(epoch) {
            Ok(())
        } else {
            debug!("Session changed while in flight, discarding result");
            Err(Error::SessionChanged)
        }
    }

    fn emit(&self, event: ClientEvent) {
        // No subscribers is fine.
        let _ = self.inner.events.send(event);
    }

    fn emit_all(&self, events: impl IntoIterator<Item = ClientEvent>) {
        for event in events {
            self.emit(event);
        }
    }
}

impl std::fmt::Debug for MailClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("MailClient")
            .field("session", &state.identity.current_session())
            .field("addresses", &state.registry.len())
            .field("restore", &self.inner.restore)
            .finish_non_exhaustive()
    }
}

/// Event describing what an upsert changed, if anything.
fn change_event(id: &AddressId, outcome: &UpsertOutcome) -> Option<ClientEvent> {
    if outcome.inserted {
        Some(ClientEvent::AddressAdded { id: id.clone() })
    } else if outcome.appended > 0 {
        Some(ClientEvent::MailReceived {
            id: id.clone(),
            count: outcome.appended,
        })
    } else {
        None
    }
}

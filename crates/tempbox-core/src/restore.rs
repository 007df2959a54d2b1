//! Address restoration.
//!
//! A restore key moves through `Idle -> Requesting -> {Restored, Failed}`.
//! Failure drops the key back to `Idle` so the user can retry. Only one
//! request per key is in flight at a time within a session: callers that
//! arrive while a request is running wait for its outcome instead of
//! issuing their own. A request every caller abandoned puts the key back
//! to `Idle`.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OnceCell, broadcast};
use tracing::{debug, info};

use crate::event::ClientEvent;
use crate::identity::SessionEpoch;
use crate::model::{Address, AddressId, RestoreKey};
use crate::{Error, Result};

/// Observable state of a restore key.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RestoreState {
    /// No restoration in progress.
    #[default]
    Idle,
    /// A request is in flight.
    Requesting,
    /// The key resolved and the address is visible.
    Restored(AddressId),
    /// The key was rejected or the request failed. Transient: the key
    /// returns to `Idle` right after.
    Failed(Error),
}

impl RestoreState {
    /// Returns `true` while a request is in flight.
    #[must_use]
    pub const fn is_requesting(&self) -> bool {
        matches!(self, Self::Requesting)
    }
}

type Outcome = Result<Address>;

struct Flight {
    epoch: SessionEpoch,
    cell: Arc<OnceCell<Outcome>>,
    waiters: usize,
}

/// A caller attached to a flight. Dropping it before the outcome is known
/// detaches the caller.
struct Waiter<'a> {
    flow: &'a RestoreFlow,
    key: &'a RestoreKey,
    cell: Arc<OnceCell<Outcome>>,
}

impl Drop for Waiter<'_> {
    fn drop(&mut self) {
        self.flow.leave(self.key, &self.cell);
    }
}

#[derive(Default)]
struct FlowState {
    flights: HashMap<RestoreKey, Flight>,
    states: HashMap<RestoreKey, RestoreState>,
}

/// Coalesces restoration requests and tracks per-key state.
pub struct RestoreFlow {
    state: Mutex<FlowState>,
    events: broadcast::Sender<ClientEvent>,
}

impl RestoreFlow {
    /// Create a flow that reports transitions on `events`.
    #[must_use]
    pub fn new(events: broadcast::Sender<ClientEvent>) -> Self {
        Self {
            state: Mutex::new(FlowState::default()),
            events,
        }
    }

    /// Current state of `key`.
    #[must_use]
    pub fn state(&self, key: &RestoreKey) -> RestoreState {
        self.state
            .lock()
            .states
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    /// Run `request` for `key`, or join the request already running for it
    /// under the same session epoch.
    ///
    /// `request` is expected to both call the gateway and apply the result,
    /// so the application happens once no matter how many callers joined.
    ///
    /// # Errors
    ///
    /// Returns whatever `request` returned; every joined caller gets the
    /// same value.
    pub async fn run<F, Fut>(&self, key: &RestoreKey, epoch: SessionEpoch, request: F) -> Outcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Outcome>,
    {
        let waiter = Waiter {
            flow: self,
            key,
            cell: self.join(key, epoch),
        };
        let outcome = waiter.cell.get_or_init(request).await.clone();
        self.finish(key, &waiter.cell, &outcome);
        outcome
    }

    /// Forget every flight and state. In-flight requests still complete for
    /// their callers but no longer update the flow.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.flights.clear();
        state.states.clear();
    }

    fn join(&self, key: &RestoreKey, epoch: SessionEpoch) -> Arc<OnceCell<Outcome>> {
        let mut state = self.state.lock();
        if let Some(flight) = state.flights.get_mut(key)
            && flight.epoch == epoch
        {
            debug!("Joining in-flight restoration");
            flight.waiters += 1;
            return Arc::clone(&flight.cell);
        }

        let cell = Arc::new(OnceCell::new());
        state.flights.insert(
            key.clone(),
            Flight {
                epoch,
                cell: Arc::clone(&cell),
                waiters: 1,
            },
        );
        state.states.insert(key.clone(), RestoreState::Requesting);
        drop(state);

        self.emit(RestoreState::Requesting);
        cell
    }

    /// Record the outcome. Only the first caller to finish a given flight
    /// updates the state.
    fn finish(&self, key: &RestoreKey, cell: &Arc<OnceCell<Outcome>>, outcome: &Outcome) {
        let mut state = self.state.lock();
        let owns_flight = state
            .flights
            .get(key)
            .is_some_and(|flight| Arc::ptr_eq(&flight.cell, cell));
        if !owns_flight {
            return;
        }
        state.flights.remove(key);

        match outcome {
            Ok(address) => {
                info!(address_id = %address.id, "Address restored");
                let restored = RestoreState::Restored(address.id.clone());
                state.states.insert(key.clone(), restored.clone());
                drop(state);
                self.emit(restored);
            }
            Err(err) => {
                info!(error = %err, "Restoration failed");
                state.states.remove(key);
                drop(state);
                self.emit(RestoreState::Failed(err.clone()));
                self.emit(RestoreState::Idle);
            }
        }
    }

    /// Detach a caller. When the last caller of an unfinished flight goes
    /// away, the flight is dropped and the key returns to `Idle`.
    fn leave(&self, key: &RestoreKey, cell: &Arc<OnceCell<Outcome>>) {
        let mut state = self.state.lock();
        let Some(flight) = state.flights.get_mut(key) else {
            return;
        };
        if !Arc::ptr_eq(&flight.cell, cell) {
            return;
        }
        flight.waiters = flight.waiters.saturating_sub(1);
        if flight.waiters > 0 || cell.initialized() {
            return;
        }
        state.flights.remove(key);
        state.states.remove(key);
        drop(state);

        debug!("Restoration abandoned");
        self.emit(RestoreState::Idle);
    }

    fn emit(&self, state: RestoreState) {
        // No subscribers is fine.
        let _ = self.events.send(ClientEvent::RestoreStateChanged { state });
    }
}

impl std::fmt::Debug for RestoreFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("RestoreFlow")
            .field("in_flight", &state.flights.len())
            .field("tracked", &state.states.len())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::model::Domain;

    fn flow() -> (RestoreFlow, broadcast::Receiver<ClientEvent>) {
        let (tx, rx) = broadcast::channel(16);
        (RestoreFlow::new(tx), rx)
    }

    fn address() -> Address {
        Address::new("a1", "x", Domain::new("d1", "mail.test"), "rk")
    }

    fn drain(rx: &mut broadcast::Receiver<ClientEvent>) -> Vec<RestoreState> {
        let mut states = Vec::new();
        while let Ok(ClientEvent::RestoreStateChanged { state }) = rx.try_recv() {
            states.push(state);
        }
        states
    }

    #[tokio::test]
    async fn success_moves_to_restored() {
        let (flow, mut rx) = flow();
        let key = RestoreKey::from("rk");
        let epoch = SessionEpoch::default();

        let result = flow.run(&key, epoch, || async { Ok(address()) }).await;
        assert_eq!(result.unwrap().id, AddressId::from("a1"));
        assert_eq!(flow.state(&key), RestoreState::Restored("a1".into()));
        assert_eq!(
            drain(&mut rx),
            vec![RestoreState::Requesting, RestoreState::Restored("a1".into())]
        );
    }

    #[tokio::test]
    async fn failure_reports_then_returns_to_idle() {
        let (flow, mut rx) = flow();
        let key = RestoreKey::from("bad-key");

        let result = flow
            .run(&key, SessionEpoch::default(), || async { Err(Error::InvalidKey) })
            .await;
        assert_eq!(result.unwrap_err(), Error::InvalidKey);
        assert_eq!(flow.state(&key), RestoreState::Idle);
        assert_eq!(
            drain(&mut rx),
            vec![
                RestoreState::Requesting,
                RestoreState::Failed(Error::InvalidKey),
                RestoreState::Idle
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_calls_share_one_request() {
        let (flow, _rx) = flow();
        let key = RestoreKey::from("rk");
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let request = || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(address())
        };

        let (a, b) = tokio::join!(
            flow.run(&key, SessionEpoch::default(), request),
            flow.run(&key, SessionEpoch::default(), request),
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn retry_after_failure_issues_new_request() {
        let (flow, _rx) = flow();
        let key = RestoreKey::from("rk");
        let counter = AtomicUsize::new(0);
        let calls = &counter;

        let first = flow
            .run(&key, SessionEpoch::default(), || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::Transport("down".to_string()))
            })
            .await;
        assert!(first.is_err());

        let second = flow
            .run(&key, SessionEpoch::default(), || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(address())
            })
            .await;
        assert!(second.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_request_returns_to_idle() {
        let (flow, mut rx) = flow();
        let key = RestoreKey::from("rk");

        let abandoned = tokio::time::timeout(
            Duration::from_millis(10),
            flow.run(&key, SessionEpoch::default(), || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(address())
            }),
        )
        .await;
        assert!(abandoned.is_err());
        assert!(!flow.state(&key).is_requesting());
        assert_eq!(flow.state(&key), RestoreState::Idle);
        assert_eq!(
            drain(&mut rx),
            vec![RestoreState::Requesting, RestoreState::Idle]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn remaining_caller_completes_after_other_abandons() {
        let (flow, mut rx) = flow();
        let key = RestoreKey::from("rk");
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let request = || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(address())
        };

        let (abandoned, kept) = tokio::join!(
            tokio::time::timeout(
                Duration::from_millis(10),
                flow.run(&key, SessionEpoch::default(), request),
            ),
            flow.run(&key, SessionEpoch::default(), request),
        );
        assert!(abandoned.is_err());
        assert_eq!(kept.unwrap().id, AddressId::from("a1"));
        // The remaining caller takes over the request.
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(flow.state(&key), RestoreState::Restored("a1".into()));
        assert_eq!(
            drain(&mut rx),
            vec![RestoreState::Requesting, RestoreState::Restored("a1".into())]
        );
    }

    #[tokio::test]
    async fn reset_forgets_states() {
        let (flow, _rx) = flow();
        let key = RestoreKey::from("rk");
        flow.run(&key, SessionEpoch::default(), || async { Ok(address()) })
            .await
            .unwrap();
        flow.reset();
        assert_eq!(flow.state(&key), RestoreState::Idle);
    }
}

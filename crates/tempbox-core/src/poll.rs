//! Periodic refresh.
//!
//! The core spawns nothing. [`Poller`] only waits for the next tick of a
//! timer and then refreshes the session; the embedder owns the loop:
//!
//! ```ignore
//! let mut poller = Poller::new(client.clone());
//! loop {
//!     if let Err(e) = poller.tick().await {
//!         tracing::warn!("refresh failed: {e}");
//!     }
//! }
//! ```

use std::time::Duration;

use tokio::time::{Interval, MissedTickBehavior};

use crate::client::{MailClient, RefreshReport};
use crate::Result;

/// Drives session refreshes from a timer.
#[derive(Debug)]
pub struct Poller {
    client: MailClient,
    period: Duration,
    interval: Option<Interval>,
}

impl Poller {
    /// Poll at the client's configured refresh interval.
    #[must_use]
    pub fn new(client: MailClient) -> Self {
        let period = client.config().refresh_interval;
        Self::with_period(client, period)
    }

    /// Poll at a custom period.
    #[must_use]
    pub const fn with_period(client: MailClient, period: Duration) -> Self {
        Self {
            client,
            period,
            interval: None,
        }
    }

    /// Period between refreshes.
    #[must_use]
    pub const fn period(&self) -> Duration {
        self.period
    }

    /// Wait for the next tick, then refresh the session.
    ///
    /// The first tick completes immediately. Ticks missed while a refresh
    /// was running are skipped rather than fired in a burst.
    ///
    /// # Errors
    ///
    /// Whatever [`MailClient::refresh_session`] returns.
    pub async fn tick(&mut self) -> Result<RefreshReport> {
        let period = self.period;
        let interval = self.interval.get_or_insert_with(|| {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval
        });
        interval.tick().await;
        self.client.refresh_session().await
    }
}

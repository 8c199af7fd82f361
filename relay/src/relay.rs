use crate::connection::{ConnectionId, ConnectionRegistry};
use crate::error::Error;
use crate::mailbox::{MailboxEntry, MailboxStore};
use crate::record::{ClientKey, Record};
use crate::waiter::{PollOutcome, WaiterRegistry};
use log::*;
use serde::Serialize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::{Duration, Instant};

/// Timing parameters of a relay instance.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Maximum age of an undelivered record before the sweep purges it.
    pub record_ttl: Duration,
    /// How often the expiry sweep runs.
    pub sweep_interval: Duration,
    /// How long a keyed poll is held open waiting for a record.
    pub poll_timeout: Duration,
    /// Maximum age of the undelivered frontend record.
    pub frontend_ttl: Duration,
    /// How long a frontend poll is held open.
    pub frontend_poll_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            record_ttl: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(25),
            poll_timeout: Duration::from_secs(20),
            frontend_ttl: Duration::from_secs(30),
            frontend_poll_timeout: Duration::from_secs(5),
        }
    }
}

/// How `produce` got a record on its way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Written to the client's live connection.
    Pushed,
    /// Handed to this many held poll requests.
    FannedOut(usize),
    /// Nobody was listening; kept in the mailbox until polled or expired.
    Stored,
}

/// What one expiry sweep removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub expired_records: usize,
    pub expired_frontend: usize,
    pub stale_waiters: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.expired_records + self.expired_frontend + self.stale_waiters
    }
}

/// Point-in-time sizes of the relay stores.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayStats {
    pub pending_records: usize,
    pub waiting_polls: usize,
    pub open_connections: usize,
    pub frontend_pending: bool,
    pub frontend_waiting: usize,
}

#[derive(Debug, Default)]
struct RelayState {
    mailbox: MailboxStore<ClientKey>,
    waiters: WaiterRegistry<ClientKey>,
    connections: ConnectionRegistry,
    frontend: MailboxStore<()>,
    frontend_waiters: WaiterRegistry<()>,
}

/// The mailbox relay: one instance per process, shared by every handler.
///
/// All stores live behind a single lock and no operation awaits while holding
/// it, so each `produce`, `poll` registration, connect and sweep runs to
/// completion before the next one touches the same state. That rules out a
/// record being stored while a waiter for the same key is registering.
#[derive(Debug)]
pub struct Relay {
    config: RelayConfig,
    state: Mutex<RelayState>,
}

impl Relay {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            config,
            state: Mutex::new(RelayState::default()),
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, RelayState> {
        // Nothing panics while holding the lock, a poisoned state is still consistent
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Routes a record to its client key: live connection first, then held
    /// polls, then the mailbox.
    pub fn produce(&self, record: Record) -> Result<Delivery, Error> {
        let key = record.client_key()?;
        let mut state = self.lock();

        let record = match state.connections.try_send(&key, record) {
            Ok(()) => {
                debug!("Pushed record to connected client {key}");
                return Ok(Delivery::Pushed);
            }
            Err(record) => record,
        };

        if state.waiters.has_waiters(&key) {
            let delivered = state.waiters.fulfill_all(&key, &record);
            if delivered > 0 {
                info!("Sending data to {delivered} waiting client(s) for {key}");
                return Ok(Delivery::FannedOut(delivered));
            }
        }

        debug!("No listener for {key}, storing record");
        state.mailbox.put(key, record);
        Ok(Delivery::Stored)
    }

    /// Long-poll for `key`: returns the pending record at once, otherwise holds
    /// until one is produced or the poll window closes.
    ///
    /// Dropping the returned future abandons the poll and deregisters it.
    pub async fn poll(&self, key: &ClientKey) -> PollOutcome {
        let ticket = {
            let mut state = self.lock();
            if let Some(entry) = state
                .mailbox
                .take(key, Instant::now(), self.config.record_ttl)
            {
                return PollOutcome::Record(entry.record);
            }
            state.waiters.register(key.clone(), self.config.poll_timeout)
        };

        ticket
            .wait(|key, id| self.lock().waiters.remove(key, id))
            .await
    }

    /// Registers a push connection for `key` and drains any pending record into it.
    pub fn connect(&self, key: ClientKey, sender: UnboundedSender<Record>) -> ConnectionId {
        let mut state = self.lock();
        let id = state.connections.register(key.clone(), sender);
        info!("Registered push connection {} for {key}", id.as_str());

        if let Some(MailboxEntry {
            record,
            inserted_at,
        }) = state
            .mailbox
            .take(&key, Instant::now(), self.config.record_ttl)
        {
            match state.connections.try_send(&key, record) {
                Ok(()) => debug!("Drained pending record for {key} on connect"),
                // The channel closed before we got to it, keep the record for a later poll
                Err(record) => state.mailbox.insert_entry(
                    key,
                    MailboxEntry {
                        record,
                        inserted_at,
                    },
                ),
            }
        }
        id
    }

    /// Removes the push connection `id` for `key`, unless it was already replaced.
    pub fn disconnect(&self, key: &ClientKey, id: &ConnectionId) {
        if self.lock().connections.unregister(key, id) {
            info!("Unregistered push connection {} for {key}", id.as_str());
        }
    }

    /// Updates the frontend display feed: fans out to held frontend polls, or
    /// keeps the record in the single frontend slot.
    pub fn publish_frontend(&self, record: Record) -> Delivery {
        let mut state = self.lock();

        if state.frontend_waiters.has_waiters(&()) {
            let delivered = state.frontend_waiters.fulfill_all(&(), &record);
            if delivered > 0 {
                debug!("Sent frontend update to {delivered} waiting client(s)");
                return Delivery::FannedOut(delivered);
            }
        }

        state.frontend.put((), record);
        Delivery::Stored
    }

    /// Long-poll on the frontend display feed.
    pub async fn poll_frontend(&self) -> PollOutcome {
        let ticket = {
            let mut state = self.lock();
            if let Some(entry) = state
                .frontend
                .take(&(), Instant::now(), self.config.frontend_ttl)
            {
                return PollOutcome::Record(entry.record);
            }
            state
                .frontend_waiters
                .register((), self.config.frontend_poll_timeout)
        };

        ticket
            .wait(|key, id| self.lock().frontend_waiters.remove(key, id))
            .await
    }

    /// Purges expired records and any waiter left behind past its deadline.
    pub fn sweep_expired(&self) -> SweepReport {
        let now = Instant::now();
        let mut state = self.lock();

        SweepReport {
            expired_records: state.mailbox.sweep(now, self.config.record_ttl),
            expired_frontend: state.frontend.sweep(now, self.config.frontend_ttl),
            stale_waiters: state.waiters.purge_expired(now)
                + state.frontend_waiters.purge_expired(now),
        }
    }

    pub fn stats(&self) -> RelayStats {
        let state = self.lock();
        RelayStats {
            pending_records: state.mailbox.len(),
            waiting_polls: state.waiters.len(),
            open_connections: state.connections.len(),
            frontend_pending: !state.frontend.is_empty(),
            frontend_waiting: state.frontend_waiters.len(),
        }
    }
}

impl Default for Relay {
    fn default() -> Self {
        Self::new(RelayConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RelayErrorKind;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn record(value: Value) -> Record {
        Record::from_slice(value.to_string().as_bytes()).unwrap()
    }

    fn key(s: &str) -> ClientKey {
        ClientKey::new(s).unwrap()
    }

    async fn until_waiting(relay: &Relay, count: usize) {
        while relay.stats().waiting_polls < count {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_produce_then_poll_delivers_exactly_once() {
        let relay = Relay::default();
        let sent = record(json!({"localip": "10.0.0.5", "temp": 42}));

        assert_eq!(relay.produce(sent.clone()).unwrap(), Delivery::Stored);
        assert_eq!(relay.poll(&key("10.0.0.5")).await, PollOutcome::Record(sent));

        // The second poll holds for the whole window, then reports no data
        let started = Instant::now();
        assert_eq!(relay.poll(&key("10.0.0.5")).await, PollOutcome::NoData);
        assert_eq!(started.elapsed(), Duration::from_secs(20));
        assert_eq!(relay.stats(), RelayStats::default());
    }

    #[tokio::test]
    async fn test_waiting_poll_is_fulfilled_without_touching_the_mailbox() {
        let relay = Arc::new(Relay::default());
        let poller = {
            let relay = Arc::clone(&relay);
            tokio::spawn(async move { relay.poll(&key("K")).await })
        };
        until_waiting(&relay, 1).await;

        let sent = record(json!({"localip": "K", "on": true}));
        assert_eq!(relay.produce(sent.clone()).unwrap(), Delivery::FannedOut(1));

        assert_eq!(poller.await.unwrap(), PollOutcome::Record(sent));
        assert_eq!(relay.stats().pending_records, 0);
        assert_eq!(relay.stats().waiting_polls, 0);
    }

    #[tokio::test]
    async fn test_concurrent_polls_all_receive_the_broadcast() {
        let relay = Arc::new(Relay::default());
        let pollers: Vec<_> = (0..2)
            .map(|_| {
                let relay = Arc::clone(&relay);
                tokio::spawn(async move { relay.poll(&key("K")).await })
            })
            .collect();
        until_waiting(&relay, 2).await;

        let sent = record(json!({"localip": "K", "n": 1}));
        assert_eq!(relay.produce(sent.clone()).unwrap(), Delivery::FannedOut(2));

        for poller in pollers {
            assert_eq!(poller.await.unwrap(), PollOutcome::Record(sent.clone()));
        }
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let relay = Relay::default();
        relay.produce(record(json!({"localip": "K", "n": 1}))).unwrap();
        relay.produce(record(json!({"localip": "K", "n": 2}))).unwrap();

        assert_eq!(
            relay.poll(&key("K")).await,
            PollOutcome::Record(record(json!({"localip": "K", "n": 2})))
        );
        assert_eq!(relay.stats().pending_records, 0);
    }

    #[tokio::test]
    async fn test_produce_without_key_changes_nothing() {
        let relay = Relay::default();

        for body in [json!({"temp": 42}), json!({"localip": ""})] {
            let err = relay.produce(record(body)).unwrap_err();
            assert_eq!(err.error_kind, RelayErrorKind::MissingClientKey);
        }
        assert_eq!(relay.stats(), RelayStats::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_record_is_never_returned() {
        let relay = Relay::default();
        relay.produce(record(json!({"localip": "K", "n": 1}))).unwrap();

        tokio::time::advance(Duration::from_secs(31)).await;
        let report = relay.sweep_expired();
        assert_eq!(report.expired_records, 1);

        assert_eq!(relay.poll(&key("K")).await, PollOutcome::NoData);
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_past_ttl_is_not_returned_before_the_sweep_runs() {
        let relay = Relay::default();
        relay.produce(record(json!({"localip": "K", "n": 1}))).unwrap();

        tokio::time::advance(Duration::from_secs(45)).await;

        assert_eq!(relay.poll(&key("K")).await, PollOutcome::NoData);
        assert_eq!(relay.stats().pending_records, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_does_not_drain_a_record_past_ttl() {
        let relay = Relay::default();
        relay.produce(record(json!({"localip": "K", "n": 1}))).unwrap();

        tokio::time::advance(Duration::from_secs(31)).await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        relay.connect(key("K"), tx);

        assert!(rx.try_recv().is_err());
        assert_eq!(relay.stats().pending_records, 0);
    }

    #[tokio::test]
    async fn test_connect_drains_pending_record_and_later_records_are_pushed() {
        let relay = Relay::default();
        let first = record(json!({"localip": "K", "n": 1}));
        relay.produce(first.clone()).unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        relay.connect(key("K"), tx);
        assert_eq!(rx.try_recv().unwrap(), first);
        assert_eq!(relay.stats().pending_records, 0);

        let second = record(json!({"localip": "K", "n": 2}));
        assert_eq!(relay.produce(second.clone()).unwrap(), Delivery::Pushed);
        assert_eq!(rx.try_recv().unwrap(), second);
        assert_eq!(relay.stats().pending_records, 0);
    }

    #[tokio::test]
    async fn test_connection_wins_over_waiting_polls() {
        let relay = Arc::new(Relay::default());
        let poller = {
            let relay = Arc::clone(&relay);
            tokio::spawn(async move { relay.poll(&key("K")).await })
        };
        until_waiting(&relay, 1).await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        relay.connect(key("K"), tx);

        let sent = record(json!({"localip": "K"}));
        assert_eq!(relay.produce(sent.clone()).unwrap(), Delivery::Pushed);
        assert_eq!(rx.try_recv().unwrap(), sent);
        assert_eq!(relay.stats().waiting_polls, 1);
        poller.abort();
    }

    #[tokio::test]
    async fn test_closed_connection_falls_back_to_mailbox() {
        let relay = Relay::default();
        let (tx, rx) = mpsc::unbounded_channel();
        relay.connect(key("K"), tx);
        drop(rx);

        let sent = record(json!({"localip": "K"}));
        assert_eq!(relay.produce(sent.clone()).unwrap(), Delivery::Stored);
        assert_eq!(relay.stats().open_connections, 0);
        assert_eq!(relay.poll(&key("K")).await, PollOutcome::Record(sent));
    }

    #[tokio::test]
    async fn test_disconnect_of_replaced_connection_keeps_the_new_one() {
        let relay = Relay::default();
        let (old_tx, _old_rx) = mpsc::unbounded_channel();
        let (new_tx, mut new_rx) = mpsc::unbounded_channel();
        let old_id = relay.connect(key("K"), old_tx);
        relay.connect(key("K"), new_tx);

        relay.disconnect(&key("K"), &old_id);
        assert_eq!(relay.stats().open_connections, 1);

        relay.produce(record(json!({"localip": "K"}))).unwrap();
        assert!(new_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_cancelled_poll_is_deregistered() {
        let relay = Arc::new(Relay::default());
        let poller = {
            let relay = Arc::clone(&relay);
            tokio::spawn(async move { relay.poll(&key("K")).await })
        };
        until_waiting(&relay, 1).await;

        poller.abort();
        assert!(poller.await.unwrap_err().is_cancelled());
        assert_eq!(relay.stats().waiting_polls, 0);

        // With nobody listening the next record is stored, not lost
        assert_eq!(
            relay.produce(record(json!({"localip": "K"}))).unwrap(),
            Delivery::Stored
        );
    }

    #[tokio::test]
    async fn test_keys_do_not_interfere() {
        let relay = Relay::default();
        relay.produce(record(json!({"localip": "A"}))).unwrap();
        assert!(relay.produce(record(json!({"temp": 1}))).is_err());

        assert_eq!(relay.stats().pending_records, 1);
        assert_eq!(
            relay.poll(&key("A")).await,
            PollOutcome::Record(record(json!({"localip": "A"})))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_frontend_feed_is_a_single_slot() {
        let relay = Relay::default();
        relay.publish_frontend(record(json!({"localip": "A"})));
        relay.publish_frontend(record(json!({"localip": "B"})));

        assert_eq!(
            relay.poll_frontend().await,
            PollOutcome::Record(record(json!({"localip": "B"})))
        );

        let started = Instant::now();
        assert_eq!(relay.poll_frontend().await, PollOutcome::NoData);
        assert_eq!(started.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_frontend_feed_fans_out_to_waiting_polls() {
        let relay = Arc::new(Relay::default());
        let poller = {
            let relay = Arc::clone(&relay);
            tokio::spawn(async move { relay.poll_frontend().await })
        };
        while relay.stats().frontend_waiting < 1 {
            tokio::task::yield_now().await;
        }

        let sent = record(json!({"localip": "A"}));
        assert_eq!(relay.publish_frontend(sent.clone()), Delivery::FannedOut(1));
        assert_eq!(poller.await.unwrap(), PollOutcome::Record(sent));
        assert!(!relay.stats().frontend_pending);
    }

    #[tokio::test]
    async fn test_frontend_and_keyed_channels_are_independent() {
        let relay = Relay::default();
        relay.publish_frontend(record(json!({"localip": "A"})));

        let stats = relay.stats();
        assert!(stats.frontend_pending);
        assert_eq!(stats.pending_records, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_purges_expired_frontend_record() {
        let relay = Relay::default();
        relay.publish_frontend(record(json!({"localip": "A"})));

        tokio::time::advance(Duration::from_secs(31)).await;
        let report = relay.sweep_expired();

        assert_eq!(report.expired_frontend, 1);
        assert_eq!(report.expired_records, 0);
        assert!(!relay.stats().frontend_pending);
        assert_eq!(relay.poll_frontend().await, PollOutcome::NoData);
    }

    #[tokio::test(start_paused = true)]
    async fn test_frontend_record_past_ttl_is_not_returned_before_the_sweep_runs() {
        let relay = Relay::default();
        relay.publish_frontend(record(json!({"localip": "A"})));

        tokio::time::advance(Duration::from_secs(31)).await;

        assert_eq!(relay.poll_frontend().await, PollOutcome::NoData);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_purges_waiters_left_past_their_deadline() {
        let relay = Relay::default();
        let key = key("K");

        // A poll that registered and was then leaked without ever completing
        // or being dropped keeps its waiter until the sweep removes it
        let mut poll = Box::pin(relay.poll(&key));
        assert!(tokio::time::timeout(Duration::ZERO, &mut poll)
            .await
            .is_err());
        std::mem::forget(poll);
        assert_eq!(relay.stats().waiting_polls, 1);

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(relay.sweep_expired().stale_waiters, 0);

        tokio::time::advance(Duration::from_secs(11)).await;
        let report = relay.sweep_expired();
        assert_eq!(report.stale_waiters, 1);
        assert_eq!(relay.stats().waiting_polls, 0);
    }
}

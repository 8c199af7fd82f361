use crate::record::Record;
use log::*;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use tokio::sync::oneshot;
use tokio::time::{Duration, Instant};

/// Identifies one held request within a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WaiterId(u64);

/// What a held poll request ends up answering with.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Record(Record),
    NoData,
}

#[derive(Debug)]
struct Waiter {
    id: WaiterId,
    deadline: Instant,
    sender: oneshot::Sender<Record>,
}

/// The consumer side of a registered waiter. Completes through [`Ticket::wait`].
#[derive(Debug)]
pub struct Ticket<K> {
    pub key: K,
    pub id: WaiterId,
    pub deadline: Instant,
    receiver: oneshot::Receiver<Record>,
}

/// Held (long-poll) requests per key, each waiting for the next record.
///
/// A waiter's sender is consumed when it is fulfilled, so a record can be handed
/// to a given waiter at most once. All removal goes through the registry, which
/// lets timeout, cancellation and fan-out race without double delivery.
#[derive(Debug)]
pub struct WaiterRegistry<K> {
    waiters: HashMap<K, Vec<Waiter>>,
    next_id: u64,
}

impl<K> WaiterRegistry<K>
where
    K: Eq + Hash + Clone + Debug,
{
    pub fn new() -> Self {
        Self {
            waiters: HashMap::new(),
            next_id: 0,
        }
    }

    /// Adds a waiter for `key` that gives up after `timeout`.
    pub fn register(&mut self, key: K, timeout: Duration) -> Ticket<K> {
        let (sender, receiver) = oneshot::channel();
        let id = WaiterId(self.next_id);
        self.next_id += 1;
        let deadline = Instant::now() + timeout;

        self.waiters.entry(key.clone()).or_default().push(Waiter {
            id,
            deadline,
            sender,
        });

        Ticket {
            key,
            id,
            deadline,
            receiver,
        }
    }

    /// Whether `key` has at least one waiter whose request is still alive.
    pub fn has_waiters(&self, key: &K) -> bool {
        self.waiters
            .get(key)
            .is_some_and(|set| set.iter().any(|waiter| !waiter.sender.is_closed()))
    }

    /// Hands `record` to every waiter of `key` and clears the set.
    ///
    /// The set is detached from the map before delivery starts. Returns the number
    /// of waiters that actually received the record.
    pub fn fulfill_all(&mut self, key: &K, record: &Record) -> usize {
        let Some(snapshot) = self.waiters.remove(key) else {
            return 0;
        };

        let mut delivered = 0;
        for waiter in snapshot {
            match waiter.sender.send(record.clone()) {
                Ok(()) => delivered += 1,
                Err(_) => debug!("Waiter {:?} for {key:?} went away before delivery", waiter.id),
            }
        }
        delivered
    }

    /// Removes a single waiter. Returns false if it had already been fulfilled or removed.
    pub fn remove(&mut self, key: &K, id: WaiterId) -> bool {
        let Some(set) = self.waiters.get_mut(key) else {
            return false;
        };
        let before = set.len();
        set.retain(|waiter| waiter.id != id);
        let removed = set.len() != before;

        if set.is_empty() {
            self.waiters.remove(key);
        }
        removed
    }

    /// Drops waiters past their deadline or whose request was abandoned.
    pub fn purge_expired(&mut self, now: Instant) -> usize {
        let mut purged = 0;
        self.waiters.retain(|_, set| {
            let before = set.len();
            set.retain(|waiter| waiter.deadline > now && !waiter.sender.is_closed());
            purged += before - set.len();
            !set.is_empty()
        });
        purged
    }

    /// Total number of registered waiters across all keys.
    pub fn len(&self) -> usize {
        self.waiters.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }
}

impl<K> Default for WaiterRegistry<K>
where
    K: Eq + Hash + Clone + Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> Ticket<K>
where
    K: Debug,
{
    /// Suspends until the waiter is fulfilled or its deadline passes.
    ///
    /// `deregister` must remove the waiter from the registry it came from and
    /// report whether it was still there. It runs on timeout, and on drop if this
    /// future is abandoned before completing (the caller went away).
    pub async fn wait<F>(self, deregister: F) -> PollOutcome
    where
        F: FnMut(&K, WaiterId) -> bool,
    {
        let Ticket {
            key,
            id,
            deadline,
            mut receiver,
        } = self;
        let mut registration = Registration {
            key,
            id,
            deregister,
            armed: true,
        };

        match tokio::time::timeout_at(deadline, &mut receiver).await {
            Ok(Ok(record)) => {
                registration.armed = false;
                PollOutcome::Record(record)
            }
            // Sender dropped unfulfilled, the registry already forgot this waiter
            Ok(Err(_)) => {
                registration.armed = false;
                PollOutcome::NoData
            }
            Err(_) => {
                if registration.release() {
                    return PollOutcome::NoData;
                }
                // Lost the race against a fan-out: the record is already in the channel
                match receiver.try_recv() {
                    Ok(record) => PollOutcome::Record(record),
                    Err(_) => PollOutcome::NoData,
                }
            }
        }
    }
}

struct Registration<K, F>
where
    K: Debug,
    F: FnMut(&K, WaiterId) -> bool,
{
    key: K,
    id: WaiterId,
    deregister: F,
    armed: bool,
}

impl<K, F> Registration<K, F>
where
    K: Debug,
    F: FnMut(&K, WaiterId) -> bool,
{
    fn release(&mut self) -> bool {
        self.armed = false;
        (self.deregister)(&self.key, self.id)
    }
}

impl<K, F> Drop for Registration<K, F>
where
    K: Debug,
    F: FnMut(&K, WaiterId) -> bool,
{
    fn drop(&mut self) {
        if self.armed && (self.deregister)(&self.key, self.id) {
            debug!("Poll for {:?} cancelled, waiter {:?} removed", self.key, self.id);
        }
    }
}

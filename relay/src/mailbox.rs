use crate::record::Record;
use log::*;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use tokio::time::{Duration, Instant};

/// A record waiting to be picked up, tagged with when it was stored.
#[derive(Debug, Clone)]
pub struct MailboxEntry {
    pub record: Record,
    pub inserted_at: Instant,
}

/// Single-slot store: at most one pending record per key, last write wins.
///
/// The frontend display feed uses the same store keyed by `()`, which gives it
/// a cardinality of exactly zero or one.
#[derive(Debug)]
pub struct MailboxStore<K> {
    entries: HashMap<K, MailboxEntry>,
}

impl<K> MailboxStore<K>
where
    K: Eq + Hash + Debug,
{
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Stores `record` for `key`, replacing whatever was pending there.
    pub fn put(&mut self, key: K, record: Record) {
        self.insert_entry(
            key,
            MailboxEntry {
                record,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Stores an entry keeping its original insertion time.
    pub(crate) fn insert_entry(&mut self, key: K, entry: MailboxEntry) {
        if let Some(previous) = self.entries.insert(key, entry) {
            debug!(
                "Overwrote undelivered record stored {:?} ago",
                previous.inserted_at.elapsed()
            );
        }
    }

    /// Removes and returns the pending entry for `key`.
    ///
    /// An entry older than `ttl` at `now` is dropped instead of returned, so a
    /// stale record is never handed out between two sweeps.
    pub fn take(&mut self, key: &K, now: Instant, ttl: Duration) -> Option<MailboxEntry> {
        let entry = self.entries.remove(key)?;
        let age = now.saturating_duration_since(entry.inserted_at);
        if age > ttl {
            info!("Discarding stale data for {key:?} (age {}s)", age.as_secs());
            return None;
        }
        Some(entry)
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Drops every entry older than `ttl` at `now`. Returns how many were dropped.
    pub fn sweep(&mut self, now: Instant, ttl: Duration) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, entry| {
            let age = now.saturating_duration_since(entry.inserted_at);
            if age > ttl {
                info!("Removing stale data for {key:?} (age {}s)", age.as_secs());
                false
            } else {
                true
            }
        });
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K> Default for MailboxStore<K>
where
    K: Eq + Hash + Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

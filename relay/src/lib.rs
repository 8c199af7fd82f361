//! In-memory mailbox relay between producers and intermittently connected clients.
//!
//! A producer drops a keyed record; the relay gets it to the client holding that
//! key exactly once, whether the client is connected right now or shows up later
//! within the record TTL.
//!
//! # Architecture
//!
//! - **Mailbox store**: at most one pending record per client key, last write wins.
//! - **Waiter registry**: held long-poll requests per key, each with a deadline.
//!   A produced record is broadcast to every waiter of its key.
//! - **Connection registry**: at most one live push channel per key. Connecting
//!   drains a pending record straight into the new channel.
//! - **Relay**: the delivery orchestrator. `produce` prefers a live connection,
//!   then waiting polls, and only stores the record when nobody is listening.
//! - **Frontend feed**: the same single-slot store and waiter list for an
//!   unkeyed display feed.
//! - **Sweeper**: periodic task purging records older than the TTL.
//!
//! State is per process and lives only in memory.
//!
//! # Example
//!
//! ```rust,ignore
//! let relay = Arc::new(Relay::new(RelayConfig::default()));
//! relay::sweeper::spawn(Arc::clone(&relay));
//!
//! relay.produce(Record::from_slice(br#"{"localip":"10.0.0.5","temp":42}"#)?)?;
//! let outcome = relay.poll(&ClientKey::new("10.0.0.5")?).await;
//! ```

pub mod connection;
pub mod error;
pub mod mailbox;
pub mod record;
pub mod relay;
pub mod sweeper;
pub mod waiter;

pub use connection::ConnectionId;
pub use error::{Error, RelayErrorKind};
pub use record::{ClientKey, Record, CLIENT_KEY_FIELD};
pub use relay::{Delivery, Relay, RelayConfig, RelayStats, SweepReport};
pub use waiter::PollOutcome;

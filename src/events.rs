//! Broadcast channel of store events.
//!
//! Subscribing is purely observational: events are published whether or not
//! anyone listens, and a slow subscriber only loses its own backlog.

use std::fmt;

use sea_orm::DbBackend;
use tokio::sync::broadcast;

use crate::error::{ConnectionError, StoreError};

/// Store operation an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    /// [`SqlStore::get`](crate::SqlStore::get), also behind `SessionStore::load`.
    Get,
    /// [`SqlStore::all`](crate::SqlStore::all).
    All,
    /// [`SqlStore::set`](crate::SqlStore::set), also behind `SessionStore::save`.
    Set,
    /// Insert of a fresh record through `SessionStore::create`.
    Create,
    /// [`SqlStore::touch`](crate::SqlStore::touch).
    Touch,
    /// [`SqlStore::destroy`](crate::SqlStore::destroy), also behind `SessionStore::delete`.
    Destroy,
    /// [`SqlStore::destroy_expired`](crate::SqlStore::destroy_expired), run by hand or by the sweep.
    DestroyExpired,
    /// [`SqlStore::length`](crate::SqlStore::length).
    Length,
    /// [`SqlStore::clear`](crate::SqlStore::clear).
    Clear,
}

impl Verb {
    /// Snake case name used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Get => "get",
            Verb::All => "all",
            Verb::Set => "set",
            Verb::Create => "create",
            Verb::Touch => "touch",
            Verb::Destroy => "destroy",
            Verb::DestroyExpired => "destroy_expired",
            Verb::Length => "length",
            Verb::Clear => "clear",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event published by a [`SqlStore`](crate::SqlStore).
#[derive(Debug, Clone)]
pub enum StoreEvent {
    /// A connection attempt succeeded.
    Connected { backend: DbBackend },
    /// A connection attempt failed for good.
    Error(ConnectionError),
    /// A store operation failed. The caller received the same error.
    SessionError { verb: Verb, error: StoreError },
}

/// Multi-subscriber event publisher.
#[derive(Debug, Clone)]
pub(crate) struct EventBus {
    sender: broadcast::Sender<StoreEvent>,
}

impl EventBus {
    pub(crate) fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.sender.subscribe()
    }

    pub(crate) fn publish(&self, event: StoreEvent) {
        // No subscribers is fine
        let _ = self.sender.send(event);
    }
}

//! Lazily established, shared database connection.
//!
//! The [`ConnectionManager`] owns the only handle to the backing pool and is the
//! only component allowed to change its state. A connect is started by the first
//! caller that finds the handle unusable; callers arriving while it is in flight
//! await the same attempt and observe the same outcome.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection};
use tracing::{debug, error, info, warn};

use crate::config::RetryPolicy;
use crate::error::ConnectionError;
use crate::events::{EventBus, StoreEvent};

/// Hook run once per successful connection attempt.
pub(crate) type ConnectHook = Arc<dyn Fn() + Send + Sync>;

type ConnectAttempt = Shared<BoxFuture<'static, Result<DatabaseConnection, ConnectionError>>>;

/// Observable state of the backing connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// No connection has been opened yet, or the last one failed or was lost.
    Unconnected,
    /// A connection attempt is in flight.
    Connecting,
    /// Queries can run without connecting first.
    Connected,
    /// The connection was closed through [`SqlStore::close`](crate::SqlStore::close).
    Closed,
}

enum State {
    Unconnected,
    Connecting {
        generation: u64,
        attempt: ConnectAttempt,
    },
    Connected {
        generation: u64,
        conn: DatabaseConnection,
    },
    Closed,
}

impl State {
    fn status(&self) -> ConnectionStatus {
        match self {
            State::Unconnected => ConnectionStatus::Unconnected,
            State::Connecting { .. } => ConnectionStatus::Connecting,
            State::Connected { .. } => ConnectionStatus::Connected,
            State::Closed => ConnectionStatus::Closed,
        }
    }
}

/// A ready connection together with the generation of the attempt that opened it.
#[derive(Clone)]
pub(crate) struct Lease {
    pub(crate) generation: u64,
    pub(crate) conn: DatabaseConnection,
}

/// Attempt counter for connection retries with linear backoff.
#[derive(Debug, Clone)]
pub(crate) struct Backoff {
    policy: RetryPolicy,
    attempts: u32,
}

impl Backoff {
    pub(crate) fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
        }
    }

    /// Record a failed attempt and return the delay before the next one, or
    /// `None` once the retry budget is spent.
    pub(crate) fn next_delay(&mut self) -> Option<Duration> {
        self.attempts = self.attempts.saturating_add(1);
        if self.attempts > self.policy.retries {
            return None;
        }
        Some(self.policy.retry_delay.saturating_mul(self.attempts))
    }

    /// Number of failed attempts recorded so far.
    pub(crate) fn attempts(&self) -> u32 {
        self.attempts
    }
}

pub(crate) struct ConnectionManager {
    options: ConnectOptions,
    policy: RetryPolicy,
    events: EventBus,
    on_connect: Option<ConnectHook>,
    state: Mutex<State>,
    next_generation: AtomicU64,
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("url", &self.options.get_url())
            .field("policy", &self.policy)
            .field("status", &self.status())
            .finish()
    }
}

impl ConnectionManager {
    pub(crate) fn new(
        options: ConnectOptions,
        policy: RetryPolicy,
        events: EventBus,
        on_connect: Option<ConnectHook>,
    ) -> Self {
        Self {
            options,
            policy,
            events,
            on_connect,
            state: Mutex::new(State::Unconnected),
            next_generation: AtomicU64::new(1),
        }
    }

    pub(crate) fn status(&self) -> ConnectionStatus {
        self.state.lock().status()
    }

    /// Return a ready connection, connecting first if needed.
    ///
    /// Never starts a second attempt while one is in flight.
    pub(crate) async fn ensure_ready(&self) -> Result<Lease, ConnectionError> {
        let (generation, attempt) = {
            let mut state = self.state.lock();
            match &*state {
                State::Connected { generation, conn } => {
                    return Ok(Lease {
                        generation: *generation,
                        conn: conn.clone(),
                    });
                }
                State::Connecting {
                    generation,
                    attempt,
                } => (*generation, attempt.clone()),
                State::Unconnected | State::Closed => {
                    let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                    let attempt = connect(
                        self.options.clone(),
                        self.policy,
                        self.events.clone(),
                        self.on_connect.clone(),
                    )
                    .boxed()
                    .shared();
                    *state = State::Connecting {
                        generation,
                        attempt: attempt.clone(),
                    };
                    (generation, attempt)
                }
            }
        };

        let outcome = attempt.await;

        let mut state = self.state.lock();
        // Only the attempt that is still current may settle the state
        if matches!(&*state, State::Connecting { generation: current, .. } if *current == generation)
        {
            *state = match &outcome {
                Ok(conn) => State::Connected {
                    generation,
                    conn: conn.clone(),
                },
                Err(_) => State::Unconnected,
            };
        }

        outcome.map(|conn| Lease { generation, conn })
    }

    /// Forget a connection that turned out to be unusable.
    pub(crate) fn invalidate(&self, generation: u64) {
        let mut state = self.state.lock();
        if matches!(&*state, State::Connected { generation: current, .. } if *current == generation)
        {
            warn!(generation, "connection lost, reconnecting on next use");
            *state = State::Unconnected;
        }
    }

    /// Close the cached connection. The next [`ensure_ready`](Self::ensure_ready)
    /// opens a fresh one.
    pub(crate) async fn close(&self) -> Result<(), ConnectionError> {
        let previous = std::mem::replace(&mut *self.state.lock(), State::Closed);
        match previous {
            State::Connected { conn, .. } => {
                info!("closing session store connection");
                conn.close()
                    .await
                    .map_err(|e| ConnectionError::Close(Arc::new(e)))
            }
            _ => Ok(()),
        }
    }
}

async fn connect(
    options: ConnectOptions,
    policy: RetryPolicy,
    events: EventBus,
    on_connect: Option<ConnectHook>,
) -> Result<DatabaseConnection, ConnectionError> {
    let mut backoff = Backoff::new(policy);
    loop {
        debug!(attempt = backoff.attempts() + 1, "connecting session store");
        match Database::connect(options.clone()).await {
            Ok(conn) => {
                let backend = conn.get_database_backend();
                info!(?backend, "session store connected");
                events.publish(StoreEvent::Connected { backend });
                if let Some(hook) = &on_connect {
                    hook();
                }
                return Ok(conn);
            }
            Err(err) => match backoff.next_delay() {
                Some(delay) => {
                    warn!(
                        attempt = backoff.attempts(),
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "connection attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                None => {
                    let err = ConnectionError::Exhausted {
                        attempts: backoff.attempts(),
                        source: Arc::new(err),
                    };
                    error!(error = %err, "giving up on session store connection");
                    events.publish(StoreEvent::Error(err.clone()));
                    return Err(err);
                }
            },
        }
    }
}

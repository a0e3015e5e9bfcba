//! Store configuration.
//!
//! A [`StoreConfig`] is resolved once, handed to [`SqlStore::new`](crate::SqlStore::new)
//! and never mutated afterwards. Building a store with different settings means
//! building a new store.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};

use crate::error::StoreError;

/// Default table holding session rows.
pub const DEFAULT_TABLE: &str = "sessions";

/// Default lifetime of a session whose cookie carries no fixed expiry (24 hours).
pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60 * 24);

/// Default period between two expiry sweeps (10 minutes).
pub const DEFAULT_AUTO_REMOVE_INTERVAL: Duration = Duration::from_secs(60 * 10);

/// Default delay unit between connection attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Default buffer of the event broadcast channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Hook invoked after every sweep with the sweep's error, if any.
pub type AutoRemoveCallback = Arc<dyn Fn(Option<&StoreError>) + Send + Sync>;

/// Hook awaited before every sweep deletes anything.
pub type PreRemoveCallback = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Names of the three columns of the session table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnNames {
    /// Primary key column holding the session id.
    pub sid: String,
    /// Long-text column holding the JSON encoded session.
    pub session: String,
    /// Timestamp column holding the expiry of the row.
    pub expires: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            sid: "sid".to_string(),
            session: "session".to_string(),
            expires: "expires".to_string(),
        }
    }
}

impl ColumnNames {
    /// Override the session id column.
    pub fn with_sid(mut self, sid: impl Into<String>) -> Self {
        self.sid = sid.into();
        self
    }

    /// Override the session payload column.
    pub fn with_session(mut self, session: impl Into<String>) -> Self {
        self.session = session.into();
        self
    }

    /// Override the expiry column.
    pub fn with_expires(mut self, expires: impl Into<String>) -> Self {
        self.expires = expires.into();
        self
    }
}

/// Retry policy applied while establishing the backing connection.
///
/// Queries are never retried; only connection attempts are.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Number of additional attempts after the first one fails.
    pub retries: u32,
    /// Delay unit. Attempt `n` waits `retry_delay * n` before attempt `n + 1`.
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 0,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// Settings of a [`SqlStore`](crate::SqlStore).
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use tower_sessions_seaorm_sql_store::{ColumnNames, StoreConfig};
///
/// let config = StoreConfig::default()
///     .with_table("app_sessions")
///     .with_column_names(ColumnNames::default().with_sid("session_id"))
///     .with_ttl(Duration::from_secs(3600))
///     .with_auto_remove(true)
///     .with_retries(3);
///
/// assert_eq!(config.table(), "app_sessions");
/// assert_eq!(config.column_names().sid, "session_id");
/// ```
#[derive(Clone)]
pub struct StoreConfig {
    table: String,
    columns: ColumnNames,
    ttl: Duration,
    auto_remove: bool,
    auto_remove_interval: Duration,
    auto_remove_callback: Option<AutoRemoveCallback>,
    pre_remove_callback: Option<PreRemoveCallback>,
    use_utc: bool,
    retry: RetryPolicy,
    event_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            table: DEFAULT_TABLE.to_string(),
            columns: ColumnNames::default(),
            ttl: DEFAULT_TTL,
            auto_remove: false,
            auto_remove_interval: DEFAULT_AUTO_REMOVE_INTERVAL,
            auto_remove_callback: None,
            pre_remove_callback: None,
            use_utc: true,
            retry: RetryPolicy::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("table", &self.table)
            .field("columns", &self.columns)
            .field("ttl", &self.ttl)
            .field("auto_remove", &self.auto_remove)
            .field("auto_remove_interval", &self.auto_remove_interval)
            .field(
                "auto_remove_callback",
                &self.auto_remove_callback.as_ref().map(|_| "..."),
            )
            .field(
                "pre_remove_callback",
                &self.pre_remove_callback.as_ref().map(|_| "..."),
            )
            .field("use_utc", &self.use_utc)
            .field("retry", &self.retry)
            .field("event_capacity", &self.event_capacity)
            .finish()
    }
}

impl StoreConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the session table. A dotted name such as `auth.sessions` is schema qualified.
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Override the column names.
    pub fn with_column_names(mut self, columns: ColumnNames) -> Self {
        self.columns = columns;
        self
    }

    /// Set the lifetime given to sessions without a fixed cookie expiry.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Enable or disable the periodic expiry sweep.
    pub fn with_auto_remove(mut self, enabled: bool) -> Self {
        self.auto_remove = enabled;
        self
    }

    /// Set the period between two sweeps.
    pub fn with_auto_remove_interval(mut self, interval: Duration) -> Self {
        self.auto_remove_interval = interval;
        self
    }

    /// Set the hook invoked after each sweep.
    pub fn with_auto_remove_callback(
        mut self,
        callback: impl Fn(Option<&StoreError>) + Send + Sync + 'static,
    ) -> Self {
        self.auto_remove_callback = Some(Arc::new(callback));
        self
    }

    /// Set the hook awaited before each sweep deletes expired rows.
    pub fn with_pre_remove_callback<F, Fut>(mut self, callback: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.pre_remove_callback = Some(Arc::new(move || callback().boxed()));
        self
    }

    /// Compare expiries against UTC (`true`) or local server wall time (`false`).
    pub fn with_utc(mut self, use_utc: bool) -> Self {
        self.use_utc = use_utc;
        self
    }

    /// Set the number of connection retries.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retry.retries = retries;
        self
    }

    /// Set the delay unit between connection retries.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry.retry_delay = delay;
        self
    }

    /// Set the buffer of the event channel.
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Session table, possibly schema qualified.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Column names of the session table.
    pub fn column_names(&self) -> &ColumnNames {
        &self.columns
    }

    /// Lifetime given to sessions without a fixed cookie expiry.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Whether expired sessions are swept periodically.
    pub fn auto_remove(&self) -> bool {
        self.auto_remove
    }

    /// Period between two sweeps.
    pub fn auto_remove_interval(&self) -> Duration {
        self.auto_remove_interval
    }

    /// Whether expiries are compared in UTC rather than local wall time.
    pub fn use_utc(&self) -> bool {
        self.use_utc
    }

    /// Connection retry policy.
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Buffer of the event channel per subscriber.
    pub fn event_capacity(&self) -> usize {
        self.event_capacity
    }

    pub(crate) fn auto_remove_callback(&self) -> Option<&AutoRemoveCallback> {
        self.auto_remove_callback.as_ref()
    }

    pub(crate) fn pre_remove_callback(&self) -> Option<&PreRemoveCallback> {
        self.pre_remove_callback.as_ref()
    }
}

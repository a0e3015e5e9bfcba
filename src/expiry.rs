//! Session payloads and the expiration-date rule.

use std::ops::{Deref, DerefMut};
use std::time::Duration;

use chrono::{DateTime, Local, TimeDelta, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Schema-agnostic session payload.
///
/// The store only looks at `cookie.expires`; everything else is stored as-is
/// and comes back unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionPayload(Map<String, Value>);

/// Interpretation of a payload's `cookie.expires` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CookieExpiry {
    /// A fixed expiry instant.
    At(DateTime<Utc>),
    /// A boolean sentinel: the cookie lives for the browser session only.
    SessionOnly,
    /// No usable expiry.
    Absent,
}

impl SessionPayload {
    /// An empty payload.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `cookie.expires` to an RFC 3339 timestamp, creating `cookie` if needed.
    pub fn with_cookie_expires(mut self, at: DateTime<Utc>) -> Self {
        let cookie = self
            .0
            .entry("cookie")
            .or_insert_with(|| Value::Object(Map::new()));
        if !cookie.is_object() {
            *cookie = Value::Object(Map::new());
        }
        if let Value::Object(cookie) = cookie {
            cookie.insert("expires".to_string(), Value::String(at.to_rfc3339()));
        }
        self
    }

    /// Read `cookie.expires`.
    ///
    /// RFC 3339 strings and integer epoch milliseconds are timestamps; a boolean
    /// is the session-only sentinel; anything else counts as absent.
    pub fn cookie_expiry(&self) -> CookieExpiry {
        let Some(expires) = self.0.get("cookie").and_then(|cookie| cookie.get("expires")) else {
            return CookieExpiry::Absent;
        };
        match expires {
            Value::Bool(_) => CookieExpiry::SessionOnly,
            Value::String(text) => DateTime::parse_from_rfc3339(text)
                .map(|at| CookieExpiry::At(at.with_timezone(&Utc)))
                .unwrap_or(CookieExpiry::Absent),
            Value::Number(number) => number
                .as_i64()
                .and_then(DateTime::<Utc>::from_timestamp_millis)
                .map(CookieExpiry::At)
                .unwrap_or(CookieExpiry::Absent),
            _ => CookieExpiry::Absent,
        }
    }

    /// The underlying JSON object.
    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for SessionPayload {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<SessionPayload> for Value {
    fn from(payload: SessionPayload) -> Self {
        Value::Object(payload.0)
    }
}

impl Deref for SessionPayload {
    type Target = Map<String, Value>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for SessionPayload {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

/// Clock the store compares expiries against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Clock {
    Utc,
    /// Local server wall time, stored as if it were UTC.
    Local,
}

impl Clock {
    pub(crate) fn from_use_utc(use_utc: bool) -> Self {
        if use_utc {
            Clock::Utc
        } else {
            Clock::Local
        }
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.frame(Utc::now())
    }

    /// Express an instant in this clock's frame.
    pub(crate) fn frame(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Clock::Utc => at,
            Clock::Local => at.with_timezone(&Local).naive_local().and_utc(),
        }
    }

    /// Inverse of [`frame`](Self::frame). Ambiguous local times resolve to the
    /// earlier instant; nonexistent ones are kept as they are.
    pub(crate) fn unframe(&self, framed: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Clock::Utc => framed,
            Clock::Local => Local
                .from_local_datetime(&framed.naive_utc())
                .earliest()
                .map(|at| at.with_timezone(&Utc))
                .unwrap_or(framed),
        }
    }
}

/// Latest storable expiry, 9999-12-31T23:59:59Z.
///
/// Later years render with a sign and more than four digits, which breaks the
/// text ordering of timestamp columns on SQLite.
const LATEST_EXPIRY_SECS: i64 = 253_402_300_799;

fn clamp_expiry(at: DateTime<Utc>) -> DateTime<Utc> {
    if at.timestamp() < LATEST_EXPIRY_SECS {
        return at;
    }
    DateTime::from_timestamp(LATEST_EXPIRY_SECS, 0).unwrap_or(at)
}

/// Expiry of the row storing `payload`.
///
/// A genuine cookie timestamp wins; a missing or session-only expiry becomes
/// `now + ttl`. The result never passes the end of year 9999.
pub(crate) fn expires_at(
    payload: &SessionPayload,
    ttl: Duration,
    clock: Clock,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    let expires = match payload.cookie_expiry() {
        CookieExpiry::At(at) => clock.frame(at),
        CookieExpiry::SessionOnly | CookieExpiry::Absent => {
            let ttl = TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX);
            now.checked_add_signed(ttl)
                .unwrap_or(DateTime::<Utc>::MAX_UTC)
        }
    };
    clamp_expiry(expires)
}

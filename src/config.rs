//! Client configuration and scope resolution.

use std::fmt;
use std::time::Duration;

use crate::protocol::DEFAULT_MAX_PAYLOAD_SIZE;
use crate::writer::DEFAULT_CHANNEL_CAPACITY;

/// Scope used when the application never picks one.
pub const DEFAULT_SCOPE: &str = "@thingsdb";

/// First sleep after a failed reconnect attempt.
pub const DEFAULT_INITIAL_RECONNECT_WAIT: Duration = Duration::from_secs(1);

/// Ceiling for the doubling reconnect sleep.
pub const DEFAULT_MAX_RECONNECT_WAIT: Duration = Duration::from_secs(120);

/// Connect timeout for the first reconnect attempt.
pub const DEFAULT_INITIAL_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Ceiling for the per-attempt connect timeout.
pub const DEFAULT_MAX_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Amount the connect timeout grows after each failed cycle.
pub const DEFAULT_CONNECT_TIMEOUT_STEP: Duration = Duration::from_secs(1);

/// Timeout for an explicit `connect()` call.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeout for authentication requests.
pub const DEFAULT_AUTH_TIMEOUT: Duration = Duration::from_secs(5);

/// How long a replaced transport stays open before it is closed.
pub const DEFAULT_CLOSE_GRACE_PERIOD: Duration = Duration::from_secs(10);

/// A namespace sent with every request, always in its `@` form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Scope(String);

impl Scope {
    /// Resolve a scope name.
    ///
    /// - `"@..."` is kept as is
    /// - `":name"` becomes `"@:name"`
    /// - `"name"` becomes `"@:name"`
    pub fn new(scope: &str) -> Self {
        if scope.starts_with('@') {
            Self(scope.to_string())
        } else if scope.starts_with(':') {
            Self(format!("@{}", scope))
        } else {
            Self(format!("@:{}", scope))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self(DEFAULT_SCOPE.to_string())
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Scope {
    fn from(scope: &str) -> Self {
        Self::new(scope)
    }
}

impl From<String> for Scope {
    fn from(scope: String) -> Self {
        Self::new(&scope)
    }
}

impl AsRef<str> for Scope {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Configuration for a [`Client`](crate::Client).
///
/// Set through [`ClientBuilder`](crate::ClientBuilder); every field has a
/// `DEFAULT_*` constant.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Scope for requests that do not name one.
    pub default_scope: Scope,
    /// Reconnect on transport loss and issue the default watch after auth.
    pub auto_reconnect: bool,
    pub initial_reconnect_wait: Duration,
    pub max_reconnect_wait: Duration,
    pub initial_connect_timeout: Duration,
    pub max_connect_timeout: Duration,
    pub connect_timeout_step: Duration,
    /// Timeout for an explicit `connect()`.
    pub connect_timeout: Duration,
    pub auth_timeout: Duration,
    pub close_grace_period: Duration,
    /// Largest inbound payload accepted before the connection is dropped.
    pub max_payload_size: u32,
    /// Capacity of the per-connection writer queue.
    pub writer_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            default_scope: Scope::default(),
            auto_reconnect: true,
            initial_reconnect_wait: DEFAULT_INITIAL_RECONNECT_WAIT,
            max_reconnect_wait: DEFAULT_MAX_RECONNECT_WAIT,
            initial_connect_timeout: DEFAULT_INITIAL_CONNECT_TIMEOUT,
            max_connect_timeout: DEFAULT_MAX_CONNECT_TIMEOUT,
            connect_timeout_step: DEFAULT_CONNECT_TIMEOUT_STEP,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            auth_timeout: DEFAULT_AUTH_TIMEOUT,
            close_grace_period: DEFAULT_CLOSE_GRACE_PERIOD,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            writer_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

//! Request payloads.
//!
//! Every request body is a MessagePack array led by the scope, except
//! authentication (a token string or a `[username, password]` pair) and ping
//! (empty).

use std::fmt;
use std::time::Duration;

use serde::ser::{SerializeSeq, Serializer};
use serde::Serialize;

use crate::codec::MsgPackCodec;
use crate::config::Scope;
use crate::error::Result;

/// Credentials replayed on every (re)connect.
#[derive(Clone, PartialEq, Eq)]
pub enum Auth {
    Token(String),
    Credentials { username: String, password: String },
}

impl Auth {
    pub fn token(token: impl Into<String>) -> Self {
        Self::Token(token.into())
    }

    pub fn credentials(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Credentials {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Token(_) => f.write_str("Auth::Token(..)"),
            Self::Credentials { username, .. } => {
                write!(f, "Auth::Credentials {{ username: {:?}, .. }}", username)
            }
        }
    }
}

impl Serialize for Auth {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Token(token) => serializer.serialize_str(token),
            Self::Credentials { username, password } => {
                let mut seq = serializer.serialize_seq(Some(2))?;
                seq.serialize_element(username)?;
                seq.serialize_element(password)?;
                seq.end()
            }
        }
    }
}

/// Per-query overrides.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Scope to run in instead of the client's current scope.
    pub scope: Option<Scope>,
    /// Binary attachments, referenced from the code as `blob[n]`.
    pub blobs: Vec<Vec<u8>>,
    /// Fail with a timeout error if no response arrives in time.
    pub timeout: Option<Duration>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scope(mut self, scope: &str) -> Self {
        self.scope = Some(Scope::new(scope));
        self
    }

    pub fn blob(mut self, blob: impl Into<Vec<u8>>) -> Self {
        self.blobs.push(blob.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

struct QueryBody<'a> {
    scope: &'a Scope,
    code: &'a str,
    blobs: &'a [Vec<u8>],
}

impl Serialize for QueryBody<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(2 + self.blobs.len()))?;
        seq.serialize_element(self.scope.as_str())?;
        seq.serialize_element(self.code)?;
        for blob in self.blobs {
            seq.serialize_element(serde_bytes::Bytes::new(blob))?;
        }
        seq.end()
    }
}

struct RunBody<'a, A> {
    scope: &'a Scope,
    procedure: &'a str,
    args: &'a [A],
}

impl<A: Serialize> Serialize for RunBody<'_, A> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(2 + self.args.len()))?;
        seq.serialize_element(self.scope.as_str())?;
        seq.serialize_element(self.procedure)?;
        for arg in self.args {
            seq.serialize_element(arg)?;
        }
        seq.end()
    }
}

struct WatchBody<'a> {
    scope: &'a Scope,
    ids: &'a [u64],
}

impl Serialize for WatchBody<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(1 + self.ids.len()))?;
        seq.serialize_element(self.scope.as_str())?;
        for id in self.ids {
            seq.serialize_element(id)?;
        }
        seq.end()
    }
}

/// `token` or `[username, password]`.
pub fn auth_payload(auth: &Auth) -> Result<Vec<u8>> {
    MsgPackCodec::encode(auth)
}

/// `[scope, code, blob...]`.
pub fn query_payload(scope: &Scope, code: &str, blobs: &[Vec<u8>]) -> Result<Vec<u8>> {
    MsgPackCodec::encode(&QueryBody { scope, code, blobs })
}

/// `[scope, procedure, arg...]`.
pub fn run_payload<A: Serialize>(scope: &Scope, procedure: &str, args: &[A]) -> Result<Vec<u8>> {
    MsgPackCodec::encode(&RunBody {
        scope,
        procedure,
        args,
    })
}

/// `[scope, id...]`, shared by watch and unwatch.
pub fn watch_payload(scope: &Scope, ids: &[u64]) -> Result<Vec<u8>> {
    MsgPackCodec::encode(&WatchBody { scope, ids })
}

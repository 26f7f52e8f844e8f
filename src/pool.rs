//! Endpoints and the rotating endpoint pool.

use std::fmt;
use std::str::FromStr;

use crate::error::{ClientError, Result};

/// Port used when an endpoint string carries none.
pub const DEFAULT_PORT: u16 = 9200;

/// A server address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Parses `host`, `host:port` and `[v6addr]:port`.
impl FromStr for Endpoint {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ClientError::InvalidEndpoint(s.to_string()));
        }

        if let Some(rest) = s.strip_prefix('[') {
            let (host, tail) = rest
                .split_once(']')
                .ok_or_else(|| ClientError::InvalidEndpoint(s.to_string()))?;
            let port = match tail.strip_prefix(':') {
                Some(port) => parse_port(s, port)?,
                None if tail.is_empty() => DEFAULT_PORT,
                None => return Err(ClientError::InvalidEndpoint(s.to_string())),
            };
            return Ok(Self::new(host, port));
        }

        match s.rsplit_once(':') {
            // a bare IPv6 address has more than one colon
            Some((host, port)) if !host.contains(':') => {
                if host.is_empty() {
                    return Err(ClientError::InvalidEndpoint(s.to_string()));
                }
                Ok(Self::new(host, parse_port(s, port)?))
            }
            _ => Ok(Self::new(s, DEFAULT_PORT)),
        }
    }
}

fn parse_port(endpoint: &str, port: &str) -> Result<u16> {
    port.parse()
        .map_err(|_| ClientError::InvalidEndpoint(endpoint.to_string()))
}

impl From<(&str, u16)> for Endpoint {
    fn from((host, port): (&str, u16)) -> Self {
        Self::new(host, port)
    }
}

/// Ordered endpoints plus a cursor at the next candidate to try.
///
/// Only explicit calls move the cursor; each [`Pool::next_endpoint`] hands out the
/// current endpoint and advances, wrapping modulo the pool size.
#[derive(Debug, Clone)]
pub struct Pool {
    endpoints: Vec<Endpoint>,
    cursor: usize,
}

impl Pool {
    /// Create a pool. Fails on an empty endpoint list.
    pub fn new(endpoints: Vec<Endpoint>) -> Result<Self> {
        if endpoints.is_empty() {
            return Err(ClientError::InvalidEndpoint("empty pool".to_string()));
        }
        Ok(Self {
            endpoints,
            cursor: 0,
        })
    }

    /// Parse every entry with [`Endpoint::from_str`].
    pub fn parse<I, S>(addresses: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let endpoints = addresses
            .into_iter()
            .map(|a| a.as_ref().parse())
            .collect::<Result<Vec<Endpoint>>>()?;
        Self::new(endpoints)
    }

    /// Return the current candidate and advance the cursor.
    pub fn next_endpoint(&mut self) -> Endpoint {
        let endpoint = self.endpoints[self.cursor].clone();
        self.cursor = (self.cursor + 1) % self.endpoints.len();
        endpoint
    }

    /// The endpoint the next call to [`Pool::next_endpoint`] returns.
    pub fn peek(&self) -> &Endpoint {
        &self.endpoints[self.cursor]
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }
}

impl From<Endpoint> for Pool {
    fn from(endpoint: Endpoint) -> Self {
        Self {
            endpoints: vec![endpoint],
            cursor: 0,
        }
    }
}

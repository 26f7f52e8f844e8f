//! Package type tags.
//!
//! Ranges:
//! - `16..=31`: push events, server to client, no correlation id
//! - `32..=63`: client requests
//! - `64..=95`: responses
//! - `96..=127`: error responses

/// Initial data for a watched thing: `{event, thing: {"#": id, ...}}`.
pub const ON_WATCH_INI: u8 = 16;
/// Changes on a watched thing: `{event, "#": id, jobs: [...]}`.
pub const ON_WATCH_UPD: u8 = 17;
/// A watched thing was removed: `{"#": id}`.
pub const ON_WATCH_DEL: u8 = 18;
/// Node status string.
pub const ON_NODE_STATUS: u8 = 19;
/// Warning: `{warn_msg, warn_code}`.
pub const ON_WARN: u8 = 20;

pub const REQ_PING: u8 = 32;
/// `token` or `[username, password]`.
pub const REQ_AUTH: u8 = 33;
/// `[scope, code, blob...]`.
pub const REQ_QUERY: u8 = 34;
/// `[scope, procedure, arg...]`.
pub const REQ_RUN: u8 = 37;
/// `[scope, id...]`.
pub const REQ_WATCH: u8 = 48;
/// `[scope, id...]`.
pub const REQ_UNWATCH: u8 = 49;

pub const RES_PING: u8 = 64;
pub const RES_AUTH: u8 = 65;
pub const RES_QUERY: u8 = 66;
pub const RES_RUN: u8 = 69;
pub const RES_WATCH: u8 = 80;
pub const RES_UNWATCH: u8 = 81;

pub const ERR_OVERFLOW: u8 = 96;
pub const ERR_ZERO_DIV: u8 = 97;
pub const ERR_MAX_QUOTA: u8 = 98;
pub const ERR_AUTH: u8 = 99;
pub const ERR_FORBIDDEN: u8 = 100;
pub const ERR_INDEX: u8 = 101;
pub const ERR_BAD_REQUEST: u8 = 102;
pub const ERR_QUERY: u8 = 103;
pub const ERR_NODE: u8 = 104;
pub const ERR_INTERNAL: u8 = 127;

/// Check if a tag is a success response.
#[inline]
pub fn is_response(tp: u8) -> bool {
    (64..=95).contains(&tp)
}

/// Check if a tag is an error response.
#[inline]
pub fn is_error(tp: u8) -> bool {
    (96..=127).contains(&tp)
}

/// Unsolicited package kinds. Closed set; anything else is correlated by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushKind {
    NodeStatus,
    Warning,
    WatchInit,
    WatchUpdate,
    WatchDelete,
}

impl PushKind {
    /// Look up the push kind for a type tag.
    pub fn from_tag(tp: u8) -> Option<Self> {
        match tp {
            ON_NODE_STATUS => Some(Self::NodeStatus),
            ON_WARN => Some(Self::Warning),
            ON_WATCH_INI => Some(Self::WatchInit),
            ON_WATCH_UPD => Some(Self::WatchUpdate),
            ON_WATCH_DEL => Some(Self::WatchDelete),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_table() {
        assert_eq!(PushKind::from_tag(16), Some(PushKind::WatchInit));
        assert_eq!(PushKind::from_tag(17), Some(PushKind::WatchUpdate));
        assert_eq!(PushKind::from_tag(18), Some(PushKind::WatchDelete));
        assert_eq!(PushKind::from_tag(19), Some(PushKind::NodeStatus));
        assert_eq!(PushKind::from_tag(20), Some(PushKind::Warning));
        assert_eq!(PushKind::from_tag(RES_QUERY), None);
        assert_eq!(PushKind::from_tag(ERR_AUTH), None);
    }

    #[test]
    fn test_ranges() {
        assert!(is_response(RES_PING));
        assert!(is_response(RES_UNWATCH));
        assert!(!is_response(ERR_OVERFLOW));
        assert!(is_error(ERR_OVERFLOW));
        assert!(is_error(ERR_INTERNAL));
        assert!(!is_error(REQ_QUERY));
    }
}

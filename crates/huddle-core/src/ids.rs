//! Identifier newtypes.
//!
//! Groups and peers are keyed by caller-supplied strings that the relay never
//! validates. Wrapping them keeps a group id from being passed where a peer
//! identity is expected.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

opaque_id!(
    /// Name of a rendezvous group, taken verbatim from the connection path.
    GroupId
);

opaque_id!(
    /// Key of a peer within one group.
    ///
    /// Either a caller-supplied string or the first 16 bytes of a binary
    /// frame rendered as hyphenated lowercase hex.
    ClientIdentity
);

impl GroupId {
    /// Wrap a group name. Any string is accepted, including the empty one.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl From<String> for GroupId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for GroupId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl ClientIdentity {
    /// Number of leading frame bytes that carry a binary identity.
    pub const WIRE_LEN: usize = 16;

    /// Build an identity from a caller-supplied string.
    ///
    /// Returns `None` for the empty string, which never identifies a peer.
    pub fn parse(value: &str) -> Option<Self> {
        (!value.is_empty()).then(|| Self(value.to_owned()))
    }

    /// Build an identity from the leading bytes of a binary frame.
    ///
    /// Returns `None` when fewer than [`Self::WIRE_LEN`] bytes are available.
    pub fn from_wire(data: &[u8]) -> Option<Self> {
        let raw: [u8; Self::WIRE_LEN] = data.get(..Self::WIRE_LEN)?.try_into().ok()?;
        Some(Self(Uuid::from_bytes(raw).hyphenated().to_string()))
    }
}

/// Process-unique handle for one accepted transport.
///
/// Two connections may claim the same [`ClientIdentity`]; this id tells them
/// apart.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Allocate a fresh, time-ordered connection id.
    #[must_use]
    pub fn new() -> Self {
        Self(format!("conn_{}", Uuid::now_v7().simple()))
    }

    /// Return the inner string as a slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_id_is_case_sensitive() {
        assert_ne!(GroupId::from("Room"), GroupId::from("room"));
    }

    #[test]
    fn group_id_accepts_anything() {
        assert_eq!(GroupId::new("").as_str(), "");
        assert_eq!(GroupId::new("a/b c").to_string(), "a/b c");
    }

    #[test]
    fn identity_from_string() {
        let id = ClientIdentity::parse("alice").unwrap();
        assert_eq!(id.as_str(), "alice");
    }

    #[test]
    fn empty_identity_is_none() {
        assert!(ClientIdentity::parse("").is_none());
    }

    #[test]
    fn identity_from_wire_uses_uuid_grouping() {
        let bytes: Vec<u8> = (0u8..16).collect();
        let id = ClientIdentity::from_wire(&bytes).unwrap();
        assert_eq!(id.as_str(), "00010203-0405-0607-0809-0a0b0c0d0e0f");
    }

    #[test]
    fn identity_from_wire_ignores_trailing_bytes() {
        let mut bytes = vec![0xab; 16];
        bytes.extend_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        let id = ClientIdentity::from_wire(&bytes).unwrap();
        assert_eq!(id.as_str(), "abababab-abab-abab-abab-abababababab");
    }

    #[test]
    fn identity_from_short_wire_is_none() {
        assert!(ClientIdentity::from_wire(&[0u8; 15]).is_none());
        assert!(ClientIdentity::from_wire(&[]).is_none());
    }

    #[test]
    fn identity_serializes_transparently() {
        let id = ClientIdentity::parse("peer-1").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), r#""peer-1""#);
    }

    #[test]
    fn connection_ids_are_unique() {
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("conn_"));
    }
}

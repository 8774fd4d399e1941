use crate::{
    error::{ErrorClass, ErrorOrigin, InternalError},
    value::Value,
};
use derive_more::Display;
use std::fmt;
use thiserror::Error as ThisError;
use ulid::Ulid;

///
/// KeyKind
///
/// Declared primary-key kind for an entity type. Drives decoding of
/// wire id payloads back into typed [`Key`] values.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum KeyKind {
    Int,
    Uint,
    Text,
    Ulid,
}

impl KeyKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Uint => "uint",
            Self::Text => "text",
            Self::Ulid => "ulid",
        }
    }
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

///
/// Key
///
/// Persisted primary-key value. The wire payload form is plain text:
/// decimal digits for the integer kinds, the canonical 26-character
/// form for ulids, and the raw string for text keys.
///

#[derive(Clone, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Key {
    Int(i64),
    Uint(u64),
    Text(String),
    Ulid(Ulid),
}

impl Key {
    #[must_use]
    pub const fn kind(&self) -> KeyKind {
        match self {
            Self::Int(_) => KeyKind::Int,
            Self::Uint(_) => KeyKind::Uint,
            Self::Text(_) => KeyKind::Text,
            Self::Ulid(_) => KeyKind::Ulid,
        }
    }

    /// The raw wire payload for this key.
    #[must_use]
    pub fn payload(&self) -> String {
        self.to_string()
    }

    /// Parse a wire id payload into the declared key kind.
    pub fn parse(kind: KeyKind, payload: &str) -> Result<Self, KeyDecodeError> {
        match kind {
            KeyKind::Int => payload
                .parse::<i64>()
                .map(Self::Int)
                .map_err(|_| KeyDecodeError::Malformed {
                    kind,
                    payload: payload.to_string(),
                }),
            KeyKind::Uint => payload
                .parse::<u64>()
                .map(Self::Uint)
                .map_err(|_| KeyDecodeError::Malformed {
                    kind,
                    payload: payload.to_string(),
                }),
            KeyKind::Text => Ok(Self::Text(payload.to_string())),
            KeyKind::Ulid => Ulid::from_string(payload)
                .map(Self::Ulid)
                .map_err(|_| KeyDecodeError::Malformed {
                    kind,
                    payload: payload.to_string(),
                }),
        }
    }

    /// Convert this key into a scalar value for snapshots and property maps.
    #[must_use]
    pub fn as_value(&self) -> Value {
        match self {
            Self::Int(v) => Value::Int(*v),
            Self::Uint(v) => Value::Uint(*v),
            Self::Text(v) => Value::Text(v.clone()),
            Self::Ulid(v) => Value::Ulid(*v),
        }
    }
}

///
/// KeyDecodeError
///

#[derive(Debug, ThisError)]
pub enum KeyDecodeError {
    #[error("malformed {kind} key payload: '{payload}'")]
    Malformed { kind: KeyKind, payload: String },

    #[error("ephemeral key '{0}' has no persisted id to decode")]
    Ephemeral(String),
}

impl From<KeyDecodeError> for InternalError {
    fn from(err: KeyDecodeError) -> Self {
        Self::new(ErrorClass::Unsupported, ErrorOrigin::Decode, err.to_string())
    }
}

// Wire markers for the ephemeral flag (do not change; protocol-level).
const MARKER_EPHEMERAL: &str = "IS";
const MARKER_PERSISTED: &str = "NO";

///
/// EntityKey
///
/// Identity of one entity referenced within a single request:
/// the raw id payload, whether the id is a client-assigned ephemeral
/// placeholder, and the proxy type token. Equality covers all three
/// fields; used as a map key throughout request processing and
/// discarded when the request ends.
///
/// Wire form is `"<id>-<IS|NO>-<token>"`. Parsing splits from the
/// right so textual id payloads may themselves contain `-`; proxy
/// tokens are rejected at registration if they contain `-`.
///

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct EntityKey {
    pub id: String,
    pub ephemeral: bool,
    pub proxy_token: String,
}

impl EntityKey {
    /// A persisted key from a typed id.
    #[must_use]
    pub fn persisted(key: &Key, proxy_token: impl Into<String>) -> Self {
        Self {
            id: key.payload(),
            ephemeral: false,
            proxy_token: proxy_token.into(),
        }
    }

    /// An ephemeral key from a client-assigned placeholder payload.
    #[must_use]
    pub fn ephemeral(id: impl Into<String>, proxy_token: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ephemeral: true,
            proxy_token: proxy_token.into(),
        }
    }

    /// Parse the `"<id>-<IS|NO>-<token>"` wire encoding.
    pub fn parse(encoded: &str) -> Result<Self, EntityKeyParseError> {
        let mut parts = encoded.rsplitn(3, '-');
        let (Some(token), Some(marker), Some(id)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(EntityKeyParseError::Malformed(encoded.to_string()));
        };

        let ephemeral = match marker {
            MARKER_EPHEMERAL => true,
            MARKER_PERSISTED => false,
            other => return Err(EntityKeyParseError::BadMarker(other.to_string())),
        };

        if id.is_empty() || token.is_empty() {
            return Err(EntityKeyParseError::Malformed(encoded.to_string()));
        }

        Ok(Self {
            id: id.to_string(),
            ephemeral,
            proxy_token: token.to_string(),
        })
    }

    /// Decode the persisted id payload into a typed key.
    ///
    /// Calling this on an ephemeral key is a caller bug, reported as a
    /// decode error rather than a panic.
    pub fn decoded_key(&self, kind: KeyKind) -> Result<Key, KeyDecodeError> {
        if self.ephemeral {
            return Err(KeyDecodeError::Ephemeral(self.to_string()));
        }

        Key::parse(kind, &self.id)
    }

    /// The `"<token>-<id>"` form used for side-effect and related-map keys.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}-{}", self.proxy_token, self.id)
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = if self.ephemeral {
            MARKER_EPHEMERAL
        } else {
            MARKER_PERSISTED
        };
        write!(f, "{}-{}-{}", self.id, marker, self.proxy_token)
    }
}

///
/// EntityKeyParseError
///

#[derive(Debug, ThisError)]
pub enum EntityKeyParseError {
    #[error("malformed entity key: '{0}'")]
    Malformed(String),

    #[error("unknown ephemeral marker: '{0}'")]
    BadMarker(String),
}

impl From<EntityKeyParseError> for InternalError {
    fn from(err: EntityKeyParseError) -> Self {
        Self::new(ErrorClass::Unsupported, ErrorOrigin::Decode, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn persisted_key_round_trips() {
        let key = EntityKey::persisted(&Key::Uint(42), "demo.SongProxy");
        let encoded = key.to_string();
        assert_eq!(encoded, "42-NO-demo.SongProxy");
        assert_eq!(EntityKey::parse(&encoded).unwrap(), key);
    }

    #[test]
    fn ephemeral_key_round_trips() {
        let key = EntityKey::ephemeral("7", "demo.SongProxy");
        let encoded = key.to_string();
        assert_eq!(encoded, "7-IS-demo.SongProxy");
        assert_eq!(EntityKey::parse(&encoded).unwrap(), key);
    }

    #[test]
    fn negative_int_id_survives_the_separator() {
        let key = EntityKey::persisted(&Key::Int(-5), "demo.SongProxy");
        let parsed = EntityKey::parse(&key.to_string()).unwrap();
        assert_eq!(parsed.decoded_key(KeyKind::Int).unwrap(), Key::Int(-5));
    }

    #[test]
    fn bad_marker_is_rejected() {
        let err = EntityKey::parse("7-XX-demo.SongProxy").unwrap_err();
        assert!(matches!(err, EntityKeyParseError::BadMarker(_)));
    }

    #[test]
    fn decoding_an_ephemeral_key_is_an_error() {
        let key = EntityKey::ephemeral("7", "demo.SongProxy");
        assert!(matches!(
            key.decoded_key(KeyKind::Uint),
            Err(KeyDecodeError::Ephemeral(_))
        ));
    }

    #[test]
    fn address_uses_token_then_id() {
        let key = EntityKey::persisted(&Key::Text("a-b".into()), "demo.SongProxy");
        assert_eq!(key.address(), "demo.SongProxy-a-b");
    }

    proptest! {
        // Textual ids may contain the separator; the right-hand split
        // must still recover all three fields.
        #[test]
        fn wire_encoding_round_trips(id in "[a-zA-Z0-9._-]{1,24}", ephemeral: bool) {
            let key = EntityKey {
                id,
                ephemeral,
                proxy_token: "demo.SongProxy".to_string(),
            };
            let parsed = EntityKey::parse(&key.to_string()).unwrap();
            prop_assert_eq!(parsed, key);
        }
    }
}

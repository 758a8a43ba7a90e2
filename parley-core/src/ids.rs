//! Identifier types
//!
//! Room and message identifiers are integers on the wire, but callers often
//! hold them as strings (route params, form fields). [`IdInput`] accepts
//! either form and normalizes to the integer newtypes before anything is
//! transmitted.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// A numeric identifier as supplied by a caller: a number or a numeric string
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IdInput {
    Number(i64),
    Text(String),
}

impl IdInput {
    /// Normalize to an integer.
    ///
    /// Surrounding whitespace is ignored. Anything that is not a base-10
    /// integer is rejected.
    pub fn normalize(&self) -> Result<i64, ProtocolError> {
        match self {
            IdInput::Number(n) => Ok(*n),
            IdInput::Text(s) => s
                .trim()
                .parse::<i64>()
                .map_err(|_| ProtocolError::InvalidId { value: s.clone() }),
        }
    }
}

impl fmt::Display for IdInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdInput::Number(n) => write!(f, "{n}"),
            IdInput::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for IdInput {
    fn from(n: i64) -> Self {
        IdInput::Number(n)
    }
}

impl From<i32> for IdInput {
    fn from(n: i32) -> Self {
        IdInput::Number(n.into())
    }
}

impl From<u32> for IdInput {
    fn from(n: u32) -> Self {
        IdInput::Number(n.into())
    }
}

impl From<&str> for IdInput {
    fn from(s: &str) -> Self {
        IdInput::Text(s.to_string())
    }
}

impl From<String> for IdInput {
    fn from(s: String) -> Self {
        IdInput::Text(s)
    }
}

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "IdInput", into = "i64")]
        pub struct $name(i64);

        impl $name {
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl TryFrom<IdInput> for $name {
            type Error = ProtocolError;

            fn try_from(input: IdInput) -> Result<Self, Self::Error> {
                input.normalize().map(Self)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl From<$name> for IdInput {
            fn from(id: $name) -> Self {
                IdInput::Number(id.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

numeric_id! {
    /// Identifier of a chat room
    ChatId
}

numeric_id! {
    /// Identifier of a single chat message
    MessageId
}

/// Opaque identity of a chat user
///
/// Backends disagree on whether user ids are strings or numbers. The id keeps
/// whichever JSON type it was built from and is sent back in that type, so a
/// numeric id received from the server round-trips as a number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(IdInput);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(IdInput::Text(id.into()))
    }

    /// Numeric user id, sent as a JSON number
    pub fn numeric(id: i64) -> Self {
        Self(IdInput::Number(id))
    }

    pub fn is_empty(&self) -> bool {
        match &self.0 {
            IdInput::Number(_) => false,
            IdInput::Text(s) => s.trim().is_empty(),
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self.0, IdInput::Number(_))
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self::numeric(id)
    }
}

impl From<IdInput> for UserId {
    fn from(input: IdInput) -> Self {
        Self(input)
    }
}

impl From<&UserId> for UserId {
    fn from(id: &UserId) -> Self {
        id.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_string_and_number_normalize_identically() {
        let from_text = ChatId::try_from(IdInput::from("42")).unwrap();
        let from_number = ChatId::try_from(IdInput::from(42)).unwrap();
        assert_eq!(from_text, from_number);
        assert_eq!(from_text.get(), 42);
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        assert_eq!(IdInput::from(" 7 ").normalize().unwrap(), 7);
    }

    #[test]
    fn non_numeric_text_is_rejected() {
        let err = ChatId::try_from(IdInput::from("abc")).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidId { value } if value == "abc"));
    }

    #[test]
    fn trailing_garbage_is_rejected() {
        assert!(IdInput::from("42abc").normalize().is_err());
    }

    #[test]
    fn chat_id_deserializes_from_string_or_number() {
        let a: ChatId = serde_json::from_str("\"9\"").unwrap();
        let b: ChatId = serde_json::from_str("9").unwrap();
        assert_eq!(a, b);
        assert_eq!(serde_json::to_string(&a).unwrap(), "9");
    }

    #[test]
    fn message_id_rejects_non_numeric_json() {
        assert!(serde_json::from_str::<MessageId>("\"nope\"").is_err());
    }

    #[test]
    fn blank_user_id_is_empty() {
        assert!(UserId::new("  ").is_empty());
        assert!(!UserId::new("u1").is_empty());
    }

    #[test]
    fn user_id_accepts_numeric_json() {
        let id: UserId = serde_json::from_str("17").unwrap();
        assert!(id.is_numeric());
        assert_eq!(id.to_string(), "17");
    }

    #[test]
    fn user_id_keeps_its_json_type() {
        let text = serde_json::to_string(&UserId::new("u1")).unwrap();
        assert_eq!(text, "\"u1\"");

        let numeric: UserId = serde_json::from_str("17").unwrap();
        assert_eq!(serde_json::to_string(&numeric).unwrap(), "17");
        assert_eq!(numeric, UserId::numeric(17));
        assert_ne!(numeric, UserId::new("17"));
    }
}

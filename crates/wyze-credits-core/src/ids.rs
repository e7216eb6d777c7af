//! Identifier types for wyze-credits.
//!
//! User identifiers come from the authentication layer and are treated as opaque
//! strings. Ledger rows use ULIDs so that they sort by creation time.
//!
//! # Macro-based ID Types
//!
//! The `ulid_id_type!` macro generates the row identifiers, ensuring consistent
//! implementation of serialization, parsing, and display traits.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Maximum accepted length of a user identifier, in bytes.
pub const MAX_USER_ID_LEN: usize = 255;

/// Macro to define a ULID-based identifier type with standard trait implementations.
///
/// This macro generates a newtype wrapper around `ulid::Ulid` with implementations for:
/// - `Clone`, `Copy`, `PartialEq`, `Eq`, `Hash`, `PartialOrd`, `Ord`
/// - `Serialize`, `Deserialize` (as string)
/// - `FromStr`, `Display`, `Debug`
/// - `TryFrom<String>`, `Into<String>`
///
/// # Example
///
/// ```ignore
/// ulid_id_type!(MyId, "A custom identifier type.");
/// let id = MyId::generate();
/// let parsed: MyId = id.to_string().parse().unwrap();
/// ```
macro_rules! ulid_id_type {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(Ulid);

        impl $name {
            /// Generate a new identifier with the current timestamp.
            #[must_use]
            pub fn generate() -> Self {
                Self(Ulid::new())
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let ulid = Ulid::from_string(s).map_err(|_| IdError::InvalidUlid)?;
                Ok(Self(ulid))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0.to_string()
            }
        }
    };
}

ulid_id_type!(TransactionId, "A ledger transaction identifier (ULID, time-ordered).");
ulid_id_type!(UsageId, "A usage tracking record identifier (ULID, time-ordered).");

/// A user identifier issued by the authentication layer.
///
/// The ledger never interprets the contents; it only requires a non-empty
/// token without surrounding whitespace that fits the database column.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    /// Generate a random user identifier (primarily for testing).
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Return the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for UserId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(IdError::EmptyUserId);
        }
        if s.len() > MAX_USER_ID_LEN {
            return Err(IdError::UserIdTooLong(s.len()));
        }
        if s.trim() != s {
            return Err(IdError::UserIdWhitespace);
        }
        Ok(Self(s.to_string()))
    }
}

impl fmt::Debug for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserId({})", self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for UserId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0
    }
}

impl AsRef<str> for UserId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Errors that can occur when parsing identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// The input is not a valid ULID.
    #[error("invalid ULID format")]
    InvalidUlid,

    /// The user identifier is empty.
    #[error("user id must not be empty")]
    EmptyUserId,

    /// The user identifier exceeds [`MAX_USER_ID_LEN`].
    #[error("user id is too long ({0} bytes)")]
    UserIdTooLong(usize),

    /// The user identifier has leading or trailing whitespace.
    #[error("user id must not have surrounding whitespace")]
    UserIdWhitespace,
}

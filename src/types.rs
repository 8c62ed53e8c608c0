//! NewType wrappers for strong typing throughout the identity layer.
//!
//! These types prevent accidental mixing of semantically different strings
//! (e.g., passing a username where a record key is expected).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Macro to generate a NewType wrapper with standard trait implementations.
macro_rules! newtype_string {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Get the inner value as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume and return the inner String.
            pub fn into_inner(self) -> String {
                self.0
            }

            /// Whether the wrapped value is empty.
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

newtype_string!(
    /// Key part of an admin or user record id (the `abc` in `user:abc`).
    ///
    /// This is what goes into token claims and API payloads; the table
    /// name is implied by the record type.
    RecordKey
);

newtype_string!(
    /// Unique handle of a user record.
    ///
    /// Usernames are unique within the `user` table. Auto-provisioned users
    /// get one derived from a fixed prefix and a random suffix.
    Username
);

newtype_string!(
    /// Per-record secret mixed into the token signing key.
    ///
    /// Rotating it invalidates every token previously issued for the
    /// record. Never serialized into API responses.
    TokenKey
);

//! NewType wrappers for the identifiers and credentials handled by the authority.
//!
//! These keep semantically different strings apart (e.g., passing a username
//! where a user id is expected, or a digest where a cleartext password is).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Macro to generate a NewType wrapper with standard trait implementations.
macro_rules! newtype_string {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
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
    /// Tenant identifier chosen by the administrator at project creation.
    ///
    /// Unique across the authority and immutable for the project's lifetime.
    /// Used as the `aud` claim of every token issued for the project.
    ProjectId
);

newtype_string!(
    /// Display name of a project.
    ProjectName
);

newtype_string!(
    /// Shared project credential, generated by the authority.
    ///
    /// Revealed to the caller exactly once, in the create-project response.
    ProjectSecret
);

newtype_string!(
    /// System-generated user identifier (a v4 UUID).
    ///
    /// Stable for the user's lifetime. Doubles as the password salt and as
    /// the `sub` claim of issued tokens.
    UserId
);

newtype_string!(
    /// Login name, unique within a project.
    Username
);

newtype_string!(
    /// Hex-encoded one-way digest of a user's password.
    ///
    /// Cleartext passwords are never persisted; only this value is stored
    /// and compared.
    PasswordDigest
);

newtype_string!(
    /// Explicit identifier of the active signing key (`kid`).
    ///
    /// Supplied through configuration, never derived from a file path.
    KeyId
);

newtype_string!(
    /// A signed compact token: `header.claims.signature`, base64url segments.
    CompactToken
);

impl UserId {
    /// Generate a fresh random user identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

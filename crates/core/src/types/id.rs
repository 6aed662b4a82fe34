//! Newtype IDs for type-safe document references.
//!
//! Documents are identified by opaque strings assigned by the store. Use the
//! `define_id!` macro to create wrappers that prevent accidentally mixing
//! IDs from different collections.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Macro to define a type-safe document ID wrapper.
///
/// Creates a newtype wrapper around `String` with:
/// - `Serialize`/`Deserialize` with `#[serde(transparent)]`
/// - `Debug`, `Clone`, `PartialEq`, `Eq`, `Hash`, `PartialOrd`, `Ord`
/// - Conversion methods: `new()`, `as_str()`, `into_inner()`
/// - `From<String>`, `From<&str>` and `AsRef<str>` implementations
///
/// # Example
///
/// ```rust
/// # use atelier_core::define_id;
/// define_id!(InvoiceId);
/// define_id!(PaymentId);
///
/// let invoice = InvoiceId::new("a1b2c3");
/// let payment = PaymentId::new("a1b2c3");
///
/// // These are different types, so this won't compile:
/// // let _: InvoiceId = payment;
/// # let _ = (invoice, payment);
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new ID from a store-assigned document id.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Get the underlying document id.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume the ID and return the underlying document id.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

// Define standard document IDs
define_id!(ClientId);
define_id!(OrderId);
define_id!(EmployeeId);
define_id!(ServiceId);
define_id!(TemplateId);

/// Errors that can occur when parsing an [`OwnerId`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum OwnerIdError {
    /// The input string is empty.
    #[error("owner identity cannot be empty")]
    Empty,
    /// The input contains a path separator.
    #[error("owner identity cannot contain '/'")]
    PathSeparator,
}

/// The authenticated principal that scopes all per-owner collections.
///
/// The value is opaque (an auth provider's user id). It is embedded in
/// collection paths such as `users/{owner}/orders`, so it must be non-empty
/// and must not contain `/`.
///
/// ```
/// use atelier_core::OwnerId;
///
/// assert!(OwnerId::parse("uid-42").is_ok());
/// assert!(OwnerId::parse("").is_err());
/// assert!(OwnerId::parse("a/b").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OwnerId(String);

impl OwnerId {
    /// Parse an `OwnerId` from a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is empty or contains `/`.
    pub fn parse(s: &str) -> Result<Self, OwnerIdError> {
        if s.is_empty() {
            return Err(OwnerIdError::Empty);
        }
        if s.contains('/') {
            return Err(OwnerIdError::PathSeparator);
        }
        Ok(Self(s.to_owned()))
    }

    /// Returns the owner identity as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for OwnerId {
    type Err = OwnerIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for OwnerId {
    type Error = OwnerIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<OwnerId> for String {
    fn from(owner: OwnerId) -> Self {
        owner.0
    }
}

impl AsRef<str> for OwnerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_document_id_display_and_conversions() {
        let id = ClientId::new("abc123");
        assert_eq!(id.to_string(), "abc123");
        assert_eq!(id.as_str(), "abc123");
        assert_eq!(ClientId::from("abc123"), id);
        assert_eq!(String::from(id), "abc123");
    }

    #[test]
    fn test_document_id_serializes_transparently() {
        let id = OrderId::new("o-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"o-1\"");
        let back: OrderId = serde_json::from_str("\"o-1\"").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_owner_id_rejects_empty_and_separator() {
        assert_eq!(OwnerId::parse(""), Err(OwnerIdError::Empty));
        assert_eq!(OwnerId::parse("users/x"), Err(OwnerIdError::PathSeparator));
    }

    #[test]
    fn test_owner_id_deserialize_validates() {
        assert!(serde_json::from_str::<OwnerId>("\"\"").is_err());
        let owner: OwnerId = serde_json::from_str("\"uid-1\"").unwrap();
        assert_eq!(owner.as_str(), "uid-1");
    }
}

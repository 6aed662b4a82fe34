//! Six-digit client codes and pin codes.
//!
//! Both are 6-digit numeric strings in `100000..=999999`. A [`ClientCode`] is
//! unique across the whole store and is the key external actors use to find
//! their client record; a [`PinCode`] is a per-client secret with no
//! uniqueness requirement.

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`ClientCode`] or [`PinCode`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CodeError {
    /// The input is not exactly six characters long.
    #[error("code must be exactly {expected} digits (got {actual})")]
    WrongLength {
        /// Required length.
        expected: usize,
        /// Length of the input.
        actual: usize,
    },
    /// The input contains a non-digit character.
    #[error("code must contain only ASCII digits")]
    NonDigit,
    /// The value is outside `100000..=999999`.
    #[error("code {0} is outside the range 100000..=999999")]
    OutOfRange(u32),
}

macro_rules! define_code {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Number of digits in a code.
            pub const LENGTH: usize = 6;
            /// Smallest valid code value.
            pub const MIN: u32 = 100_000;
            /// Largest valid code value.
            pub const MAX: u32 = 999_999;
            /// Number of distinct codes.
            pub const SPAN: u32 = Self::MAX - Self::MIN + 1;

            /// Parse a code from its string form.
            ///
            /// # Errors
            ///
            /// Returns an error if the input is not six ASCII digits or has
            /// a leading zero.
            pub fn parse(s: &str) -> Result<Self, CodeError> {
                if s.len() != Self::LENGTH {
                    return Err(CodeError::WrongLength {
                        expected: Self::LENGTH,
                        actual: s.chars().count(),
                    });
                }
                if !s.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(CodeError::NonDigit);
                }
                let value: u32 = s.parse().map_err(|_| CodeError::NonDigit)?;
                Self::from_number(value)
            }

            /// Build a code from its numeric value.
            ///
            /// # Errors
            ///
            /// Returns [`CodeError::OutOfRange`] if `value` is outside
            /// `100000..=999999`.
            pub fn from_number(value: u32) -> Result<Self, CodeError> {
                if !(Self::MIN..=Self::MAX).contains(&value) {
                    return Err(CodeError::OutOfRange(value));
                }
                Ok(Self(value.to_string()))
            }

            /// Build a code from an offset into the valid range.
            ///
            /// Offsets wrap, so any `u32` maps to a valid code; drawing the
            /// offset uniformly from `0..SPAN` yields a uniform code.
            #[must_use]
            pub fn from_offset(offset: u32) -> Self {
                Self((Self::MIN + offset % Self::SPAN).to_string())
            }

            /// Returns the code as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl ::std::str::FromStr for $name {
            type Err = CodeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = CodeError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::parse(&value)
            }
        }

        impl From<$name> for String {
            fn from(code: $name) -> Self {
                code.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_code!(
    /// Globally unique, human-shareable client code.
    ///
    /// ```
    /// use atelier_core::ClientCode;
    ///
    /// assert!(ClientCode::parse("123456").is_ok());
    /// assert!(ClientCode::parse("012345").is_err()); // below 100000
    /// assert!(ClientCode::parse("12345a").is_err());
    /// ```
    ClientCode
);

define_code!(
    /// Six-digit pin handed to a client together with their code.
    PinCode
);

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_codes() {
        assert_eq!(ClientCode::parse("100000").unwrap().as_str(), "100000");
        assert_eq!(ClientCode::parse("999999").unwrap().as_str(), "999999");
        assert!(PinCode::parse("424242").is_ok());
    }

    #[test]
    fn test_parse_wrong_length() {
        assert_eq!(
            ClientCode::parse("12345"),
            Err(CodeError::WrongLength {
                expected: 6,
                actual: 5
            })
        );
        assert!(matches!(
            ClientCode::parse("1234567"),
            Err(CodeError::WrongLength { .. })
        ));
        assert!(matches!(
            ClientCode::parse(""),
            Err(CodeError::WrongLength { .. })
        ));
    }

    #[test]
    fn test_parse_non_digit() {
        assert_eq!(ClientCode::parse("12a456"), Err(CodeError::NonDigit));
        assert_eq!(PinCode::parse("+12345"), Err(CodeError::NonDigit));
    }

    #[test]
    fn test_parse_leading_zero_is_out_of_range() {
        assert_eq!(ClientCode::parse("099999"), Err(CodeError::OutOfRange(99_999)));
    }

    #[test]
    fn test_from_number_bounds() {
        assert!(ClientCode::from_number(99_999).is_err());
        assert!(ClientCode::from_number(1_000_000).is_err());
        assert_eq!(ClientCode::from_number(543_210).unwrap().as_str(), "543210");
    }

    #[test]
    fn test_from_offset_wraps_into_range() {
        assert_eq!(ClientCode::from_offset(0).as_str(), "100000");
        assert_eq!(ClientCode::from_offset(ClientCode::SPAN - 1).as_str(), "999999");
        assert_eq!(ClientCode::from_offset(ClientCode::SPAN).as_str(), "100000");
        assert_eq!(PinCode::from_offset(u32::MAX).as_str().len(), 6);
    }

    #[test]
    fn test_deserialize_validates() {
        assert!(serde_json::from_str::<ClientCode>("\"abc\"").is_err());
        let code: ClientCode = serde_json::from_str("\"654321\"").unwrap();
        assert_eq!(code.to_string(), "654321");
        assert_eq!(serde_json::to_string(&code).unwrap(), "\"654321\"");
    }
}

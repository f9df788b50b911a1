//! Closed status sets.
//!
//! Every lifecycle field is a closed enum; string values are parsed once at
//! the boundary and unknown values are rejected there.

use thiserror::Error;

use crate::DomainError;

/// A string did not name any member of a closed status set.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown {kind} '{value}', expected one of: {}", .expected.join(", "))]
pub struct UnknownStatus {
    pub kind: &'static str,
    pub value: String,
    pub expected: &'static [&'static str],
}

impl From<UnknownStatus> for DomainError {
    fn from(value: UnknownStatus) -> Self {
        DomainError::Validation(value.to_string())
    }
}

/// Implements `as_str`, `ALL`, `Display` and a case-insensitive `FromStr`
/// for a fieldless status enum.
///
/// ```ignore
/// closed_status!(DocumentStatus, "document status" {
///     Pending => "PENDING",
///     Approved => "APPROVED",
/// });
/// ```
#[macro_export]
macro_rules! closed_status {
    ($t:ident, $kind:literal { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $t {
            /// Every member of the set, in declaration order.
            pub const ALL: &'static [$t] = &[$($t::$variant),+];

            /// Canonical wire representation.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($t::$variant => $text),+
                }
            }
        }

        impl ::core::fmt::Display for $t {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ::core::str::FromStr for $t {
            type Err = $crate::status::UnknownStatus;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let candidate = s.trim();
                $(
                    if candidate.eq_ignore_ascii_case($text) {
                        return Ok($t::$variant);
                    }
                )+
                Err($crate::status::UnknownStatus {
                    kind: $kind,
                    value: s.to_string(),
                    expected: &[$($text),+],
                })
            }
        }
    };
}

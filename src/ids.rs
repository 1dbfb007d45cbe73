//! Typed identifiers for blocks and connections.
//!
//! Both wrap a ULID (time-ordered, never reused), so an id that outlives its
//! block or connection fails lookup instead of aliasing a newer object.

use std::fmt;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// A block identifier.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(Ulid);

/// A connection identifier.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Ulid);

macro_rules! impl_typed_id {
    ($T:ident, $name:literal) => {
        impl $T {
            /// Create a fresh identifier.
            pub fn new() -> Self {
                Self(Ulid::new())
            }

            /// Wrap an existing ULID (used when restoring saved programs).
            pub fn from_ulid(ulid: Ulid) -> Self {
                Self(ulid)
            }

            pub fn as_ulid(&self) -> Ulid {
                self.0
            }

            /// Last 6 characters of the ULID, for log lines only.
            pub fn short(&self) -> String {
                let text = self.0.to_string();
                text[text.len() - 6..].to_string()
            }
        }

        impl Default for $T {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl fmt::Debug for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $name, self.short())
            }
        }
    };
}

impl_typed_id!(BlockId, "BlockId");
impl_typed_id!(ConnectionId, "ConnectionId");

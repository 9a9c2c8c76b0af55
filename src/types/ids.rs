//! Strongly-typed identifiers.
//!
//! All IDs are validated at construction time and implement common traits.
//! Tool and toolkit identifiers are case-sensitive: `Add` and `add` are
//! distinct tools.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Macro to define a strongly-typed ID newtype wrapper.
///
/// Generates: struct, `from_string()`, `as_str()`, Display, Serialize,
/// Deserialize (validated through `TryFrom<String>`).
/// Optionally generates `new()` (UUID v4) and `Default` if `uuid` flag is passed.
macro_rules! define_id {
    ($name:ident, uuid) => {
        define_id!($name);

        impl $name {
            pub fn new() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }
    };
    ($name:ident) => {
        #[derive(
            Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
        )]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            pub fn from_string(s: String) -> Result<Self, &'static str> {
                if s.is_empty() {
                    return Err(concat!(stringify!($name), " cannot be empty"));
                }
                if s.chars().any(char::is_whitespace) {
                    return Err(concat!(stringify!($name), " cannot contain whitespace"));
                }
                Ok(Self(s))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = &'static str;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                Self::from_string(s)
            }
        }

        impl TryFrom<&str> for $name {
            type Error = &'static str;

            fn try_from(s: &str) -> Result<Self, Self::Error> {
                Self::from_string(s.to_string())
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

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id!(ToolId);
define_id!(ToolkitId);
define_id!(CallerId);
define_id!(InvocationId, uuid);

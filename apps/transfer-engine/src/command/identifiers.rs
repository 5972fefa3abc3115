//! Identifier types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Macro to define string-based ID types.
macro_rules! define_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new identifier from a string.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Generate a new unique identifier using UUID v4.
            #[must_use]
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            /// Get the inner string value.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume and return the inner string.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

define_id!(AccountId, "Ledger account (subject, counterparty or holding account).");
define_id!(RecordId, "Identifier of a durable transfer record.");
define_id!(CommandId, "Identifier of one compensating command execution.");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_id_new_and_display() {
        let id = AccountId::new("alice");
        assert_eq!(id.as_str(), "alice");
        assert_eq!(id.to_string(), "alice");
        assert_eq!(id.into_inner(), "alice");
    }

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(CommandId::generate(), CommandId::generate());
        assert_ne!(RecordId::generate(), RecordId::generate());
    }

    #[test]
    fn ids_serialize_transparently() {
        let json = serde_json::to_string(&RecordId::from("r-1")).unwrap();
        assert_eq!(json, "\"r-1\"");
    }
}

//! Typed identifiers for routes and modules.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Routes and modules are both named by plain strings in configuration.
/// Wrapping them keeps a route name from being passed where a module
/// reference is expected. No format is enforced.
macro_rules! string_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create an identifier from anything that converts to `String`.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// True when the identifier is the empty string.
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(RouteId, "Name of a route whose legs carry interceptor chains.");
string_id!(
    ModuleRef,
    "Reference to a registered module. Chains hold these, resolved once at registration."
);

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn ids_serialize_as_bare_strings() {
        let json = serde_json::to_string(&ModuleRef::new("enrich")).unwrap();
        assert_eq!(json, "\"enrich\"");
        let back: RouteId = serde_json::from_str("\"orders\"").unwrap();
        assert_eq!(back.as_str(), "orders");
    }

    #[test]
    fn borrow_allows_str_lookups() {
        let mut map = HashMap::new();
        map.insert(ModuleRef::from("a"), 1);
        assert_eq!(map.get("a"), Some(&1));
    }
}

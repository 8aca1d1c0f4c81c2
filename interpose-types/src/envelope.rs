//! The envelope: payload, headers, and direction for one message leg.

use crate::policy::FailurePolicy;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Which pass of a message a chain runs on.
///
/// `Request` is inbound before forwarding to the destination; `Response`
/// is outbound before returning to the original caller. The same type is
/// stamped on the envelope as its `direction`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Leg {
    /// Before the message is forwarded.
    #[serde(alias = "outbound")]
    Request,
    /// Before the response is returned to the caller.
    #[serde(alias = "inbound")]
    Response,
}

impl Leg {
    /// Both legs, request first.
    pub const ALL: [Leg; 2] = [Leg::Request, Leg::Response];

    /// Wire name of the leg.
    pub fn as_str(&self) -> &'static str {
        match self {
            Leg::Request => "request",
            Leg::Response => "response",
        }
    }

    /// Failure policy a chain on this leg gets unless configured otherwise.
    ///
    /// Requests fail closed so a broken interceptor cannot be used to
    /// bypass policy; responses fail open so a broken post-processor never
    /// drops a response.
    pub fn default_failure_policy(&self) -> FailurePolicy {
        match self {
            Leg::Request => FailurePolicy::FailClosed,
            Leg::Response => FailurePolicy::FailOpen,
        }
    }
}

impl fmt::Display for Leg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Leg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "request" | "outbound" => Ok(Leg::Request),
            "response" | "inbound" => Ok(Leg::Response),
            other => Err(format!("unknown leg {other:?} (expected request or response)")),
        }
    }
}

/// Header set with case-insensitive keys.
///
/// Lookups and overwrites compare keys by their ASCII-lowercase form. The
/// spelling kept for output is the one most recently written. Iteration
/// is ordered by lowercase key so encoded envelopes are byte-stable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    // lowercase key -> (key as written, value)
    entries: BTreeMap<String, (String, String)>,
}

impl Headers {
    /// An empty header set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a header, returning the previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let name = name.into();
        self.entries
            .insert(name.to_ascii_lowercase(), (name, value.into()))
            .map(|(_, old)| old)
    }

    /// Value of a header, matched case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .get(&name.to_ascii_lowercase())
            .map(|(_, v)| v.as_str())
    }

    /// True when a header with this name is present in any casing.
    pub fn contains_key(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_ascii_lowercase())
    }

    /// Remove a header, returning its value.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.entries
            .remove(&name.to_ascii_lowercase())
            .map(|(_, v)| v)
    }

    /// Number of distinct headers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when there are no headers.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate `(name, value)` pairs in lowercase-key order, names in
    /// their written casing.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .values()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Overwrite every key present in `updates`; keep all other keys.
    ///
    /// Keys cannot be deleted this way: a key missing from `updates` is
    /// left untouched.
    pub fn apply(&mut self, updates: Headers) {
        for (lower, entry) in updates.entries {
            self.entries.insert(lower, entry);
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (k, v) in iter {
            headers.insert(k, v);
        }
        headers
    }
}

impl Serialize for Headers {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.iter())
    }
}

impl<'de> Deserialize<'de> for Headers {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<String, String>::deserialize(deserializer)?;
        Ok(raw.into_iter().collect())
    }
}

/// Optional routing metadata forwarded to modules as hints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteHints {
    /// Destination the message is bound for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Request path, when the transport has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Request method, when the transport has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
}

impl RouteHints {
    /// Hints naming only a target.
    pub fn target(target: impl Into<String>) -> Self {
        Self {
            target: Some(target.into()),
            ..Self::default()
        }
    }
}

/// One in-flight message leg as seen by the interceptor chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Message content. Any JSON value; its shape is owned by whichever
    /// module last replaced it.
    pub payload: serde_json::Value,
    /// Message metadata.
    #[serde(default)]
    pub headers: Headers,
    /// Leg this envelope is travelling on.
    pub direction: Leg,
    /// Routing hints, if the transport supplied any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<RouteHints>,
}

impl Envelope {
    /// A new envelope with no headers and no route hints.
    pub fn new(payload: serde_json::Value, direction: Leg) -> Self {
        Self {
            payload,
            headers: Headers::new(),
            direction,
            route: None,
        }
    }

    /// Add a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Attach route hints.
    pub fn with_route(mut self, route: RouteHints) -> Self {
        self.route = Some(route);
        self
    }
}

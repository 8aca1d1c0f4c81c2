#![deny(missing_docs)]
//! Envelope codec for module invocations.
//!
//! A module receives one invocation document on its input and answers
//! with either nothing at all or one response document:
//!
//! ```text
//! in:  {"payload": <any>, "headers": {..}, "direction": "request", "target"?: .., "path"?: .., "method"?: ..}
//! out: <zero bytes>  |  {"payload": <any>, "headers"?: {..}}
//! ```
//!
//! Zero bytes is not an error: it means the module requests no mutation.
//! Anything else that is not a response document is rejected with
//! [`CodecError::Malformed`]. The codec never assumes a payload schema; a
//! module may return a payload of a different shape than it received.

use interpose_types::{CodecError, Envelope, Headers, Leg, RouteHints};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Keys of the invocation document a module may echo back. They are
/// accepted in a response and ignored.
const ECHOED_KEYS: [&str; 4] = ["direction", "target", "path", "method"];

/// The document a module reads from its input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationDocument {
    /// Current payload.
    pub payload: Value,
    /// Current headers.
    #[serde(default)]
    pub headers: Headers,
    /// Leg the message is on.
    pub direction: Leg,
    /// Destination hint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Path hint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Method hint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
}

impl InvocationDocument {
    /// Copy an envelope into its wire form.
    pub fn from_envelope(envelope: &Envelope) -> Self {
        let route = envelope.route.clone().unwrap_or_default();
        Self {
            payload: envelope.payload.clone(),
            headers: envelope.headers.clone(),
            direction: envelope.direction,
            target: route.target,
            path: route.path,
            method: route.method,
        }
    }

    /// Rebuild the envelope this document was encoded from.
    pub fn into_envelope(self) -> Envelope {
        let route = RouteHints {
            target: self.target,
            path: self.path,
            method: self.method,
        };
        let has_route = route != RouteHints::default();
        Envelope {
            payload: self.payload,
            headers: self.headers,
            direction: self.direction,
            route: has_route.then_some(route),
        }
    }

    /// Parse an invocation document, as a plugin receives it.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CodecError> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::Malformed(e.to_string()))
    }
}

/// The document a module writes to answer with a mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseDocument {
    /// Replacement payload.
    pub payload: Value,
    /// Header updates. `None` leaves headers as they were.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Headers>,
}

impl ResponseDocument {
    /// A response replacing only the payload.
    pub fn payload(payload: Value) -> Self {
        Self {
            payload,
            headers: None,
        }
    }

    /// Add header updates.
    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = Some(headers);
        self
    }

    /// Serialize for writing to the module's output.
    pub fn to_vec(&self) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(self).map_err(|e| CodecError::Encode(e.to_string()))
    }
}

/// A decoded module response.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// The module wrote nothing.
    Unchanged,
    /// The module answered with a response document.
    Transformed {
        /// Replacement payload.
        payload: Value,
        /// Header updates, if any.
        headers: Option<Headers>,
    },
}

/// Serialize an envelope into the invocation document bytes.
///
/// Absent route hints are left out rather than written as `null`. Header
/// order is stable, so equal envelopes encode to equal bytes.
pub fn encode(envelope: &Envelope) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(&InvocationDocument::from_envelope(envelope))
        .map_err(|e| CodecError::Encode(e.to_string()))
}

/// Parse a module's raw output.
///
/// Zero bytes decodes to [`Decoded::Unchanged`]. Whitespace is output, so
/// a module that writes only a newline has written something malformed.
pub fn decode(bytes: &[u8]) -> Result<Decoded, CodecError> {
    if bytes.is_empty() {
        return Ok(Decoded::Unchanged);
    }

    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| CodecError::Malformed(format!("output is not JSON: {e}")))?;
    let Value::Object(mut doc) = value else {
        return Err(CodecError::Malformed(format!(
            "expected a JSON object, got {}",
            json_type(&value)
        )));
    };

    if let Some(key) = doc
        .keys()
        .find(|k| k.as_str() != "payload" && k.as_str() != "headers" && !ECHOED_KEYS.contains(&k.as_str()))
    {
        return Err(CodecError::Malformed(format!("unexpected key {key:?}")));
    }

    let payload = doc
        .remove("payload")
        .ok_or_else(|| CodecError::Malformed("missing \"payload\"".into()))?;

    let headers = match doc.remove("headers") {
        None | Some(Value::Null) => None,
        Some(Value::Object(map)) => Some(decode_headers(map)?),
        Some(other) => {
            return Err(CodecError::Malformed(format!(
                "\"headers\" must be an object, got {}",
                json_type(&other)
            )));
        }
    };

    Ok(Decoded::Transformed { payload, headers })
}

fn decode_headers(map: Map<String, Value>) -> Result<Headers, CodecError> {
    let mut headers = Headers::new();
    for (name, value) in map {
        match value {
            Value::String(v) => {
                headers.insert(name, v);
            }
            other => {
                return Err(CodecError::Malformed(format!(
                    "header {name:?} must be a string, got {}",
                    json_type(&other)
                )));
            }
        }
    }
    Ok(headers)
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

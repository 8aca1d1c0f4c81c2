//! In-process plugins the CLI makes available to `type: local` modules.

use interpose_codec::ResponseDocument;
use interpose_coordinator::PluginCatalog;
use interpose_runtime_local::{PluginError, json_plugin};
use serde_json::{Value, json};

/// Every built-in plugin, by catalog name.
pub fn builtin() -> PluginCatalog {
    PluginCatalog::new().with(
        "value_category",
        json_plugin(|doc| value_category(doc.payload).map(|p| p.map(ResponseDocument::payload))),
    )
}

/// Tags an order by its `amount`: `high` from 500, `medium` from 100,
/// `low` below. Payloads without a numeric amount pass through untouched.
pub fn value_category(mut payload: Value) -> Result<Option<Value>, PluginError> {
    let Some(fields) = payload.as_object_mut() else {
        return Err(PluginError::InvalidInput("payload is not an object".into()));
    };
    let Some(amount) = fields.get("amount").and_then(Value::as_f64) else {
        return Ok(None);
    };
    let category = if amount >= 500.0 {
        "high"
    } else if amount >= 100.0 {
        "medium"
    } else {
        "low"
    };
    fields.insert("value_category".into(), json!(category));
    Ok(Some(payload))
}

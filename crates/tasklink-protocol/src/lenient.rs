//! Field deserializers for descriptive payload values.
//!
//! Only the fields the client acts on (`status`, `bbox`, step and dispatch
//! labels, overlay `source`/`data`) are strict. Everything else is read
//! through these helpers so one odd value never fails the whole frame.

use serde::Deserialize;
use serde::de::{DeserializeOwned, Deserializer};
use serde_json::Value;

/// `Some` when the value parses as `T`, `None` otherwise.
pub(crate) fn option<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// Strings pass through; other scalars and documents keep their JSON text.
pub(crate) fn text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::String(text) => Some(text),
        other => Some(other.to_string()),
    })
}

/// Like [`text`], with `null` read as the empty string.
pub(crate) fn text_or_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(text(deserializer)?.unwrap_or_default())
}

/// Arrays pass through, `null` is empty, and a lone value becomes one item.
pub(crate) fn values<'de, D>(deserializer: D) -> Result<Vec<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => Vec::new(),
        Value::Array(items) => items,
        other => vec![other],
    })
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct Sample {
        #[serde(default, deserialize_with = "super::option")]
        count: Option<u64>,
        #[serde(default, deserialize_with = "super::text")]
        label: Option<String>,
        #[serde(default, deserialize_with = "super::text_or_empty")]
        note: String,
        #[serde(default, deserialize_with = "super::values")]
        items: Vec<serde_json::Value>,
    }

    #[test]
    fn mistyped_values_do_not_fail_the_document() {
        let sample: Sample = serde_json::from_value(json!({
            "count": "three",
            "label": 7,
            "note": null,
            "items": {"a": 1},
        }))
        .unwrap();
        assert_eq!(sample.count, None);
        assert_eq!(sample.label.as_deref(), Some("7"));
        assert_eq!(sample.note, "");
        assert_eq!(sample.items, vec![json!({"a": 1})]);
    }

    #[test]
    fn well_typed_and_missing_values_read_normally() {
        let sample: Sample = serde_json::from_value(json!({"count": 3, "label": "a"})).unwrap();
        assert_eq!(sample.count, Some(3));
        assert_eq!(sample.label.as_deref(), Some("a"));
        assert_eq!(sample.note, "");
        assert!(sample.items.is_empty());
    }
}

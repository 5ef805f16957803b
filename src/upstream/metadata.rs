//! Field lookups in NFT metadata

use crate::error::{Error, Result};
use crate::types::NOT_AVAILABLE;
use serde_json::Value;

/// Keys holding the field identifier, in order of preference
const FIELD_ID_KEYS: [&str; 2] = ["id_long", "id"];

/// Field identifier from NFT metadata
///
/// Metadata is either a JSON document or a string containing one. The whole
/// tree is searched for `id_long` first, then `id`; string and numeric values
/// are accepted. Returns `"N/A"` when neither key is present.
pub fn extract_field_id(metadata: Option<&Value>) -> String {
    let parsed;
    let root = match metadata {
        Some(Value::String(raw)) => match serde_json::from_str::<Value>(raw) {
            Ok(value) => {
                parsed = value;
                &parsed
            }
            Err(_) => return NOT_AVAILABLE.to_string(),
        },
        Some(value) => value,
        None => return NOT_AVAILABLE.to_string(),
    };

    FIELD_ID_KEYS
        .iter()
        .find_map(|key| find_key(root, key))
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

fn find_key(value: &Value, key: &str) -> Option<String> {
    match value {
        Value::Object(map) => {
            if let Some(found) = map.get(key).and_then(scalar_to_string) {
                return Some(found);
            }
            map.values().find_map(|child| find_key(child, key))
        }
        Value::Array(items) => items.iter().find_map(|child| find_key(child, key)),
        _ => None,
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Decode a token uid as it appears in a transaction listing
pub fn decode_token_uid(raw: &str) -> Result<String> {
    let decoded = urlencoding::decode(raw)
        .map_err(|e| Error::validation("nft_uid", format!("invalid token uid '{}': {}", raw, e)))?;
    let decoded = decoded.trim();
    if decoded.is_empty() {
        return Err(Error::validation("nft_uid", "token uid is empty"));
    }
    Ok(decoded.to_string())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_id_long_preferred_over_id() {
        let metadata = json!({
            "721": { "policy": { "Field": { "id": "short", "details": { "id_long": "F-0001-LONG" } } } }
        });
        assert_eq!(extract_field_id(Some(&metadata)), "F-0001-LONG");
    }

    #[test]
    fn test_falls_back_to_id() {
        let metadata = json!({ "721": { "p": { "a": { "id": 42 } } } });
        assert_eq!(extract_field_id(Some(&metadata)), "42");
    }

    #[test]
    fn test_metadata_as_json_string() {
        let metadata = Value::String(r#"{"attrs":[{"id_long":"F-9"}]}"#.to_string());
        assert_eq!(extract_field_id(Some(&metadata)), "F-9");
    }

    #[test]
    fn test_missing_or_unparseable_metadata() {
        assert_eq!(extract_field_id(None), NOT_AVAILABLE);
        assert_eq!(
            extract_field_id(Some(&Value::String("not json".into()))),
            NOT_AVAILABLE
        );
        assert_eq!(extract_field_id(Some(&json!({"name": "x"}))), NOT_AVAILABLE);
        assert_eq!(extract_field_id(Some(&json!({"id": ""}))), NOT_AVAILABLE);
    }

    #[test]
    fn test_decode_token_uid() {
        assert_eq!(decode_token_uid("abc%2D123").unwrap(), "abc-123");
        assert_eq!(decode_token_uid("  plain ").unwrap(), "plain");
        assert!(decode_token_uid("%20").is_err());
        assert!(decode_token_uid("%FF").is_err());
    }
}

use serde_json::{Map, Value};

/// Replacement text for redacted values.
pub const MASK: &str = "********";

const SENSITIVE_KEYWORDS: &[&str] = &[
    "password",
    "secret",
    "token",
    "apikey",
    "api_key",
    "authorization",
    "credential",
    "private_key",
    "access_key",
];

/// Whether a key name looks like it holds a secret.
pub fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    SENSITIVE_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

/// Produce a display copy of `value` with secrets redacted.
///
/// Objects carrying `"sensitive": true` get their `value` replaced (or are
/// replaced entirely when they have no `value`). Values under sensitive key
/// names are replaced too. The input is never modified.
pub fn mask_sensitive(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            if map.get("sensitive").and_then(Value::as_bool) == Some(true) {
                if !map.contains_key("value") {
                    return Value::String(MASK.to_string());
                }
                let mut masked: Map<String, Value> = map
                    .iter()
                    .map(|(k, v)| (k.clone(), mask_sensitive(v)))
                    .collect();
                masked.insert("value".to_string(), Value::String(MASK.to_string()));
                return Value::Object(masked);
            }
            Value::Object(
                map.iter()
                    .map(|(k, v)| {
                        let masked = if is_sensitive_key(k) && !v.is_null() {
                            Value::String(MASK.to_string())
                        } else {
                            mask_sensitive(v)
                        };
                        (k.clone(), masked)
                    })
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(mask_sensitive).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sensitive_keys() {
        assert!(is_sensitive_key("Authorization"));
        assert!(is_sensitive_key("db_password"));
        assert!(is_sensitive_key("X-Api_Key"));
        assert!(!is_sensitive_key("username"));
    }

    #[test]
    fn test_mask_by_key_name() {
        let input = json!({
            "user": "ann",
            "password": "hunter2",
            "headers": {"Authorization": "Bearer abc", "Accept": "json"}
        });
        let masked = mask_sensitive(&input);
        assert_eq!(masked["user"], "ann");
        assert_eq!(masked["password"], MASK);
        assert_eq!(masked["headers"]["Authorization"], MASK);
        assert_eq!(masked["headers"]["Accept"], "json");
        // original untouched
        assert_eq!(input["password"], "hunter2");
    }

    #[test]
    fn test_mask_flagged_objects() {
        let input = json!({
            "headers": [
                {"name": "X-Key", "value": "abc", "sensitive": true},
                {"name": "Accept", "value": "json"}
            ],
            "opaque": {"sensitive": true, "raw": "xyz"}
        });
        let masked = mask_sensitive(&input);
        assert_eq!(masked["headers"][0]["value"], MASK);
        assert_eq!(masked["headers"][0]["name"], "X-Key");
        assert_eq!(masked["headers"][1]["value"], "json");
        assert_eq!(masked["opaque"], MASK);
    }
}

// sanitize.rs — Redaction of sensitive parameter values.
//
// Tool params can carry credential references and tokens. The router
// forwards the raw params to the provider (backends need them) but
// everything it *records* — input hashes, approval payloads — is
// redacted first. Matching is by exact key name at any nesting depth,
// so a token inside `params.auth.token` is caught too.

use serde_json::Value;

/// Keys whose values are replaced wherever they appear.
const SENSITIVE_KEYS: [&str; 5] = ["credential_ref", "token", "secret", "password", "api_key"];

const REDACTED: &str = "***REDACTED***";

/// Return a copy of `value` with every sensitive key's value replaced.
///
/// Arrays and nested objects are walked recursively. Non-object values
/// pass through unchanged.
pub fn redact(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, val) in map {
                if SENSITIVE_KEYS.contains(&key.as_str()) {
                    out.insert(key.clone(), Value::String(REDACTED.to_string()));
                } else {
                    out.insert(key.clone(), redact(val));
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn top_level_keys_are_redacted() {
        let params = json!({
            "system_id": "sys-1",
            "credential_ref": "arn:aws:secretsmanager:us-east-1:123:secret/x",
            "api_key": "sk-live-abc123",
        });
        let clean = redact(&params);

        assert_eq!(clean["system_id"], "sys-1");
        assert_eq!(clean["credential_ref"], "***REDACTED***");
        assert_eq!(clean["api_key"], "***REDACTED***");
    }

    #[test]
    fn nested_keys_are_redacted() {
        let params = json!({
            "scope": {
                "regions": ["us-east-1"],
                "auth": { "token": "t-123", "role": "reader" },
            },
            "targets": [
                { "host": "a", "password": "hunter2" },
                { "host": "b" },
            ],
        });
        let clean = redact(&params);

        assert_eq!(clean["scope"]["auth"]["token"], "***REDACTED***");
        assert_eq!(clean["scope"]["auth"]["role"], "reader");
        assert_eq!(clean["targets"][0]["password"], "***REDACTED***");
        assert_eq!(clean["targets"][0]["host"], "a");
        assert_eq!(clean["targets"][1]["host"], "b");
    }

    #[test]
    fn non_objects_pass_through() {
        assert_eq!(redact(&json!("token")), json!("token"));
        assert_eq!(redact(&json!(42)), json!(42));
        assert_eq!(redact(&Value::Null), Value::Null);
    }

    #[test]
    fn similar_but_distinct_keys_are_kept() {
        // Matching is exact, not substring: "token_count" is data.
        let params = json!({ "token_count": 9000, "secrets_scanned": true });
        let clean = redact(&params);
        assert_eq!(clean["token_count"], 9000);
        assert_eq!(clean["secrets_scanned"], true);
    }
}

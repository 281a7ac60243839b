//! Canonical JSON serialization
//!
//! Deterministic byte encoding for JSON values: compact output, object keys
//! sorted bytewise at every depth. Two structurally equal values always
//! encode to the same bytes, so they produce the same signature for the
//! same key. Used as the signing payload encoding.

use serde_json::Value;

/// Encode a JSON value to its canonical byte form.
pub fn to_bytes(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    write_value(&mut out, value);
    out
}

fn write_value(out: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Null => out.extend_from_slice(b"null"),
        Value::Bool(true) => out.extend_from_slice(b"true"),
        Value::Bool(false) => out.extend_from_slice(b"false"),
        Value::Number(n) => out.extend_from_slice(n.to_string().as_bytes()),
        Value::String(s) => write_string(out, s),
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_value(out, item);
            }
            out.push(b']');
        }
        Value::Object(map) => {
            // Sort keys bytewise regardless of insertion order
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();

            out.push(b'{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_string(out, key);
                out.push(b':');
                write_value(out, &map[key.as_str()]);
            }
            out.push(b'}');
        }
    }
}

fn write_string(out: &mut Vec<u8>, s: &str) {
    out.push(b'"');
    let mut buf = [0u8; 4];
    for c in s.chars() {
        match c {
            '"' => out.extend_from_slice(b"\\\""),
            '\\' => out.extend_from_slice(b"\\\\"),
            '\u{8}' => out.extend_from_slice(b"\\b"),
            '\u{c}' => out.extend_from_slice(b"\\f"),
            '\n' => out.extend_from_slice(b"\\n"),
            '\r' => out.extend_from_slice(b"\\r"),
            '\t' => out.extend_from_slice(b"\\t"),
            c if (c as u32) < 0x20 => {
                let escaped = format!("\\u{:04x}", c as u32);
                out.extend_from_slice(escaped.as_bytes());
            }
            c => out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes()),
        }
    }
    out.push(b'"');
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalars() {
        assert_eq!(to_bytes(&json!(null)), b"null");
        assert_eq!(to_bytes(&json!(true)), b"true");
        assert_eq!(to_bytes(&json!(42)), b"42");
        assert_eq!(to_bytes(&json!("hi")), b"\"hi\"");
    }

    #[test]
    fn test_key_order_is_irrelevant() {
        let a: Value = serde_json::from_str(r#"{"b":1,"a":2}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"a":2,"b":1}"#).unwrap();
        assert_eq!(to_bytes(&a), to_bytes(&b));
        assert_eq!(to_bytes(&a), br#"{"a":2,"b":1}"#);
    }

    #[test]
    fn test_nested_objects_sorted() {
        let v = json!({
            "z": {"y": [1, 2, {"c": 3, "b": 4}], "x": null},
            "a": "s"
        });
        assert_eq!(
            String::from_utf8(to_bytes(&v)).unwrap(),
            r#"{"a":"s","z":{"x":null,"y":[1,2,{"b":4,"c":3}]}}"#
        );
    }

    #[test]
    fn test_no_whitespace() {
        let v = json!({"amount": 5});
        assert_eq!(to_bytes(&v), br#"{"amount":5}"#);
    }

    #[test]
    fn test_string_escaping() {
        let v = json!({"msg": "a\"b\\c\n"});
        assert_eq!(
            String::from_utf8(to_bytes(&v)).unwrap(),
            r#"{"msg":"a\"b\\c\n"}"#
        );
    }
}

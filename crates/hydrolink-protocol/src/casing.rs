//! Key-casing transforms for dialects that do not speak camelCase.
//!
//! FrequenC uses snake_case keys on the wire while the canonical schema is
//! camelCase, so its driver rewrites every request body on the way out and
//! every message on the way in. The rewrite recurses into nested objects
//! and arrays, skips keys that are already in the target casing, and is
//! idempotent: converting an already-converted payload changes nothing.
//!
//! The walk is depth-bounded. JSON parsed from the wire cannot be cyclic,
//! but payloads assembled in memory are not under our control, and a
//! pathological depth should degrade to a no-op rather than recurse until
//! the stack dies.

use serde_json::{Map, Value};

/// Nesting depth at which the walk stops rewriting and passes values
/// through unchanged.
const MAX_DEPTH: usize = 64;

#[derive(Clone, Copy)]
enum Target {
    Snake,
    Camel,
}

/// Rewrites camelCase object keys to snake_case, recursively.
///
/// Keys already matching `lower(_lowerdigit)*` are left untouched, so the
/// transform is idempotent and mixed-casing payloads converge.
pub fn camel_to_snake(value: Value) -> Value {
    convert(value, Target::Snake, 0)
}

/// Rewrites snake_case (and kebab-case) object keys to camelCase,
/// recursively.
///
/// Only keys containing a `_` or `-` separator followed by a letter are
/// rewritten; everything else passes through unchanged.
pub fn snake_to_camel(value: Value) -> Value {
    convert(value, Target::Camel, 0)
}

fn convert(value: Value, target: Target, depth: usize) -> Value {
    if depth >= MAX_DEPTH {
        return value;
    }
    match value {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, inner) in map {
                let key = match target {
                    Target::Snake if !is_snake(&key) => snake_key(&key),
                    Target::Camel if has_convertible_separator(&key) => camel_key(&key),
                    _ => key,
                };
                out.insert(key, convert(inner, target, depth + 1));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| convert(item, target, depth + 1))
                .collect(),
        ),
        other => other,
    }
}

// ---------------------------------------------------------------------------
// Key pattern checks
// ---------------------------------------------------------------------------

/// `true` for keys of the shape `lower(_lowerdigit)*`: a lowercase first
/// segment, then underscore-separated segments of lowercase and digits.
fn is_snake(key: &str) -> bool {
    let mut segments = key.split('_');
    let Some(head) = segments.next() else {
        return false;
    };
    if head.is_empty() || !head.bytes().all(|b| b.is_ascii_lowercase()) {
        return false;
    }
    segments.all(|segment| {
        !segment.is_empty()
            && segment
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
    })
}

/// `true` when the key contains a `_` or `-` directly followed by a
/// lowercase letter, i.e. a separator the camel transform would consume.
fn has_convertible_separator(key: &str) -> bool {
    key.as_bytes()
        .windows(2)
        .any(|pair| (pair[0] == b'_' || pair[0] == b'-') && pair[1].is_ascii_lowercase())
}

/// `userId` -> `user_id`: each uppercase letter becomes `_` + lowercase.
fn snake_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for ch in key.chars() {
        if ch.is_ascii_uppercase() {
            out.push('_');
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

/// `user_id` / `client-info` -> `userId` / `clientInfo`: the key is
/// lowercased, then each separator+letter pair collapses to an uppercase
/// letter. Separators not followed by a letter survive as-is.
fn camel_key(key: &str) -> String {
    let lower = key.to_lowercase();
    let mut out = String::with_capacity(lower.len());
    let mut chars = lower.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '_' || ch == '-' {
            if let Some(&next) = chars.peek() {
                if next.is_ascii_lowercase() {
                    chars.next();
                    out.push(next.to_ascii_uppercase());
                    continue;
                }
            }
        }
        out.push(ch);
    }
    out
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // -----------------------------------------------------------------------
    // camel -> snake
    // -----------------------------------------------------------------------

    #[test]
    fn test_camel_to_snake_rewrites_nested_keys() {
        let input = json!({
            "guildId": "123",
            "voice": { "sessionId": "abc", "endpoint": "us-west" },
        });
        let expected = json!({
            "guild_id": "123",
            "voice": { "session_id": "abc", "endpoint": "us-west" },
        });
        assert_eq!(camel_to_snake(input), expected);
    }

    #[test]
    fn test_camel_to_snake_recurses_into_arrays() {
        let input = json!({
            "equalizer": [
                { "bandIndex": 0, "gain": 0.25 },
                { "bandIndex": 1, "gain": -0.25 },
            ],
        });
        let expected = json!({
            "equalizer": [
                { "band_index": 0, "gain": 0.25 },
                { "band_index": 1, "gain": -0.25 },
            ],
        });
        assert_eq!(camel_to_snake(input), expected);
    }

    #[test]
    fn test_camel_to_snake_skips_snake_keys() {
        let input = json!({ "session_id": "abc", "volume_2": 100, "timeout": 60 });
        assert_eq!(camel_to_snake(input.clone()), input);
    }

    #[test]
    fn test_camel_to_snake_is_idempotent() {
        let input = json!({
            "guildId": "123",
            "trackInfo": { "sourceName": "youtube", "isStream": false },
            "bands": [{ "bandIndex": 3 }],
        });
        let once = camel_to_snake(input);
        let twice = camel_to_snake(once.clone());
        assert_eq!(once, twice);
        assert_eq!(
            serde_json::to_string(&once).unwrap(),
            serde_json::to_string(&twice).unwrap()
        );
    }

    // -----------------------------------------------------------------------
    // snake -> camel
    // -----------------------------------------------------------------------

    #[test]
    fn test_snake_to_camel_rewrites_nested_keys() {
        let input = json!({
            "session_id": "abc",
            "player_state": { "guild_id": "123", "connected": true },
        });
        let expected = json!({
            "sessionId": "abc",
            "playerState": { "guildId": "123", "connected": true },
        });
        assert_eq!(snake_to_camel(input), expected);
    }

    #[test]
    fn test_snake_to_camel_handles_kebab_keys() {
        let input = json!({ "client-info": "hydrolink/0.1.0" });
        let expected = json!({ "clientInfo": "hydrolink/0.1.0" });
        assert_eq!(snake_to_camel(input), expected);
    }

    #[test]
    fn test_snake_to_camel_skips_camel_keys() {
        let input = json!({ "guildId": "123", "volume": 100 });
        assert_eq!(snake_to_camel(input.clone()), input);
    }

    #[test]
    fn test_snake_to_camel_leaves_bare_separators() {
        // `_2x` has no letter after the separator, so nothing to consume.
        let input = json!({ "band_2x": 1 });
        assert_eq!(snake_to_camel(input.clone()), input);
    }

    #[test]
    fn test_snake_to_camel_is_idempotent() {
        let input = json!({
            "load_type": "track",
            "data": { "plugin_info": {}, "user_data": { "requester_id": "9" } },
        });
        let once = snake_to_camel(input);
        let twice = snake_to_camel(once.clone());
        assert_eq!(once, twice);
    }

    // -----------------------------------------------------------------------
    // Round trip
    // -----------------------------------------------------------------------

    #[test]
    fn test_casing_round_trip_restores_camel() {
        let input = json!({
            "guildId": "123",
            "track": { "userData": { "requesterId": "9" } },
        });
        let restored = snake_to_camel(camel_to_snake(input.clone()));
        assert_eq!(restored, input);
    }

    #[test]
    fn test_casing_passes_scalars_through() {
        assert_eq!(camel_to_snake(json!("aString")), json!("aString"));
        assert_eq!(snake_to_camel(json!(42)), json!(42));
        assert_eq!(camel_to_snake(Value::Null), Value::Null);
    }
}

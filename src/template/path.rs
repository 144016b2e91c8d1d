use serde_json::{Map, Value};

use crate::error::{NodeError, NodeResult};

/// How far past the end of an array `set_path` may write. Gaps are padded
/// with `null`.
pub const MAX_INDEX_GAP: usize = 1024;

/// One segment of a value path such as `a.b[0]['c d']`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// Parse a dot/bracket path. Quoted bracket segments lose their quotes.
pub fn parse_path(path: &str) -> Vec<PathSegment> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = path.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '.' => push_key(&mut segments, &mut current),
            '[' => {
                push_key(&mut segments, &mut current);
                let mut inner = String::new();
                for c in chars.by_ref() {
                    if c == ']' {
                        break;
                    }
                    inner.push(c);
                }
                let inner = inner.trim();
                if let Ok(index) = inner.parse::<usize>() {
                    segments.push(PathSegment::Index(index));
                } else {
                    let unquoted = strip_quotes(inner);
                    if !unquoted.is_empty() {
                        segments.push(PathSegment::Key(unquoted.to_string()));
                    }
                }
            }
            _ => current.push(c),
        }
    }
    push_key(&mut segments, &mut current);
    segments
}

fn push_key(segments: &mut Vec<PathSegment>, current: &mut String) {
    let key = current.trim();
    if !key.is_empty() {
        segments.push(PathSegment::Key(strip_quotes(key).to_string()));
    }
    current.clear();
}

fn strip_quotes(s: &str) -> &str {
    let bytes = s.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'\'' && last == b'\'') || (first == b'"' && last == b'"') {
            return &s[1..s.len() - 1];
        }
    }
    s
}

/// Walk `segments` into `value`.
///
/// A non-numeric key applied to an array descends into the array's first
/// element, so `items.name` works when `items` is a one-record list.
pub fn get_path<'a>(value: &'a Value, segments: &[PathSegment]) -> Option<&'a Value> {
    let mut current = value;
    for segment in segments {
        current = match segment {
            PathSegment::Index(index) => match current {
                Value::Array(items) => items.get(*index)?,
                Value::Object(map) => map.get(&index.to_string())?,
                _ => return None,
            },
            PathSegment::Key(key) => {
                let mut target = current;
                loop {
                    match target {
                        Value::Array(items) => match key.parse::<usize>() {
                            Ok(index) => break items.get(index)?,
                            Err(_) => target = items.first()?,
                        },
                        Value::Object(map) => break map.get(key)?,
                        _ => return None,
                    }
                }
            }
        };
    }
    Some(current)
}

/// Write `new_value` at `segments`, creating intermediate containers as needed.
///
/// An index more than [`MAX_INDEX_GAP`] past the end of its array is a
/// `TypeError`; keys that did not exist before are not created then.
pub fn set_path(target: &mut Value, segments: &[PathSegment], new_value: Value) -> NodeResult<()> {
    let Some((first, rest)) = segments.split_first() else {
        *target = new_value;
        return Ok(());
    };

    match first {
        PathSegment::Index(index) => {
            let len = target.as_array().map_or(0, Vec::len);
            if *index > len.saturating_add(MAX_INDEX_GAP) {
                return Err(NodeError::TypeError(format!(
                    "Index {} is too far past the end of an array of length {}",
                    index, len
                )));
            }
            if !target.is_array() {
                *target = Value::Array(Vec::new());
            }
            if let Value::Array(items) = target {
                if items.len() <= *index {
                    items.resize(*index + 1, Value::Null);
                }
                set_path(&mut items[*index], rest, new_value)?;
            }
        }
        PathSegment::Key(key) => {
            if !target.is_object() {
                *target = Value::Object(Map::new());
            }
            if let Value::Object(map) = target {
                match map.get_mut(key) {
                    Some(slot) => set_path(slot, rest, new_value)?,
                    None => {
                        let mut slot = Value::Null;
                        set_path(&mut slot, rest, new_value)?;
                        map.insert(key.clone(), slot);
                    }
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_dots_and_brackets() {
        assert_eq!(
            parse_path("a.b[0].c"),
            vec![
                PathSegment::Key("a".into()),
                PathSegment::Key("b".into()),
                PathSegment::Index(0),
                PathSegment::Key("c".into()),
            ]
        );
    }

    #[test]
    fn test_parse_quoted_segments() {
        assert_eq!(
            parse_path("['first name'].\"x\""),
            vec![
                PathSegment::Key("first name".into()),
                PathSegment::Key("x".into()),
            ]
        );
        assert!(parse_path("").is_empty());
    }

    #[test]
    fn test_get_path_nested() {
        let v = json!({"a": {"b": [{"c": 7}]}});
        assert_eq!(get_path(&v, &parse_path("a.b[0].c")), Some(&json!(7)));
        assert_eq!(get_path(&v, &parse_path("a.missing")), None);
    }

    #[test]
    fn test_get_path_auto_unwraps_array() {
        let v = json!([{"name": "Bob"}, {"name": "Eve"}]);
        assert_eq!(get_path(&v, &parse_path("name")), Some(&json!("Bob")));
        assert_eq!(get_path(&v, &parse_path("1.name")), Some(&json!("Eve")));
        assert_eq!(get_path(&json!([]), &parse_path("name")), None);
    }

    #[test]
    fn test_set_path_creates_objects() {
        let mut v = json!({"keep": 1});
        set_path(&mut v, &parse_path("user.name"), json!("Ann")).unwrap();
        assert_eq!(v, json!({"keep": 1, "user": {"name": "Ann"}}));
    }

    #[test]
    fn test_set_path_array_index() {
        let mut v = json!({});
        set_path(&mut v, &parse_path("tags[1]"), json!("b")).unwrap();
        assert_eq!(v, json!({"tags": [null, "b"]}));
    }

    #[test]
    fn test_set_path_rejects_huge_index() {
        let mut v = json!({"tags": ["a"]});
        for path in ["tags[18446744073709551615]", "tags[100000000000]", "rows[1026]"] {
            assert!(matches!(
                set_path(&mut v, &parse_path(path), json!("x")),
                Err(NodeError::TypeError(_))
            ));
        }
        assert_eq!(v, json!({"tags": ["a"]}));

        set_path(&mut v, &parse_path("tags[1025]"), json!("z")).unwrap();
        assert_eq!(v["tags"].as_array().unwrap().len(), 1026);
    }
}

use regex::Regex;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::LazyLock;

use super::path::{get_path, parse_path};

static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*((?:steps\.|\$)[^{}]*?)\s*\}\}").expect("token pattern is valid")
});

/// Values visible to `{{...}}` tokens while a step is being resolved.
///
/// Keys are `steps.<outputKey>` for upstream outputs and `$item`, `$index`,
/// `$total`, `$batchIndex` inside loop invocations.
#[derive(Debug, Clone, Default)]
pub struct TokenContext {
    values: HashMap<String, Value>,
}

impl TokenContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `steps.<key>` to `value`.
    pub fn set_step(&mut self, key: &str, value: Value) {
        self.values.insert(format!("steps.{}", key), value);
    }

    /// Bind a `$name` loop variable. `name` is given without the `$`.
    pub fn set_var(&mut self, name: &str, value: Value) {
        self.values.insert(format!("${}", name), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn step(&self, key: &str) -> Option<&Value> {
        self.values.get(&format!("steps.{}", key))
    }

    pub fn contains_step(&self, key: &str) -> bool {
        self.values.contains_key(&format!("steps.{}", key))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Look up a token expression such as `steps.a.items[0].id` or `$item.name`.
    pub fn lookup(&self, expression: &str) -> Option<&Value> {
        let (root, path) = split_expression(expression)?;
        let base = self.values.get(&root)?;
        if path.is_empty() {
            return Some(base);
        }
        get_path(base, &parse_path(path))
    }
}

impl FromIterator<(String, Value)> for TokenContext {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// Split an expression into its context key and the remaining path.
fn split_expression(expression: &str) -> Option<(String, &str)> {
    let expression = expression.trim();
    if let Some(rest) = expression.strip_prefix("steps.") {
        let end = rest.find(['.', '[']).unwrap_or(rest.len());
        let key = &rest[..end];
        if key.is_empty() {
            return None;
        }
        Some((format!("steps.{}", key), &rest[end..]))
    } else if expression.starts_with('$') {
        let end = expression.find(['.', '[']).unwrap_or(expression.len());
        Some((expression[..end].to_string(), &expression[end..]))
    } else {
        None
    }
}

/// Step key referenced by a token expression, if it is a `steps.*` token.
fn expression_step_key(expression: &str) -> Option<String> {
    let (root, _) = split_expression(expression)?;
    root.strip_prefix("steps.").map(str::to_string)
}

/// Whether `s` consists of exactly one token and nothing else.
pub fn is_pure_token(s: &str) -> bool {
    let trimmed = s.trim();
    let mut matches = TOKEN_RE.find_iter(trimmed);
    match (matches.next(), matches.next()) {
        (Some(m), None) => m.start() == 0 && m.end() == trimmed.len(),
        _ => false,
    }
}

/// Render a value for substitution inside surrounding text.
pub fn stringify_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

/// Resolve every token inside `value`.
///
/// A string that is exactly one token yields the referenced value with its
/// JSON type intact (`null` when missing). Tokens embedded in text are
/// stringified in place (empty when missing).
pub fn resolve(value: &Value, ctx: &TokenContext) -> Value {
    match value {
        Value::String(s) => resolve_string_value(s, ctx),
        Value::Array(items) => Value::Array(items.iter().map(|v| resolve(v, ctx)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), resolve(v, ctx)))
                .collect::<Map<String, Value>>(),
        ),
        other => other.clone(),
    }
}

fn resolve_string_value(s: &str, ctx: &TokenContext) -> Value {
    if !s.contains("{{") {
        return Value::String(s.to_string());
    }
    if is_pure_token(s) {
        let trimmed = s.trim();
        if let Some(caps) = TOKEN_RE.captures(trimmed) {
            return ctx.lookup(&caps[1]).cloned().unwrap_or(Value::Null);
        }
    }
    Value::String(resolve_str(s, ctx))
}

/// Resolve tokens embedded in `text`, always producing a string.
pub fn resolve_str(text: &str, ctx: &TokenContext) -> String {
    TOKEN_RE
        .replace_all(text, |caps: &regex::Captures<'_>| {
            ctx.lookup(&caps[1]).map(stringify_value).unwrap_or_default()
        })
        .into_owned()
}

/// Index every token found in `config`, keyed by the config path it sits at.
pub fn extract_tokens(config: &Value) -> BTreeMap<String, Vec<String>> {
    let mut found = BTreeMap::new();
    collect_tokens(config, String::new(), &mut found);
    found
}

fn collect_tokens(value: &Value, path: String, found: &mut BTreeMap<String, Vec<String>>) {
    match value {
        Value::String(s) => {
            let tokens: Vec<String> = TOKEN_RE
                .find_iter(s)
                .map(|m| m.as_str().to_string())
                .collect();
            if !tokens.is_empty() {
                found.insert(path, tokens);
            }
        }
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                collect_tokens(item, format!("{}[{}]", path, index), found);
            }
        }
        Value::Object(map) => {
            for (key, item) in map {
                let child = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", path, key)
                };
                collect_tokens(item, child, found);
            }
        }
        _ => {}
    }
}

/// Step keys referenced by `{{steps.*}}` tokens anywhere in `config`.
pub fn referenced_steps(config: &Value) -> BTreeSet<String> {
    let mut keys = BTreeSet::new();
    for tokens in extract_tokens(config).values() {
        for token in tokens {
            if let Some(caps) = TOKEN_RE.captures(token) {
                if let Some(key) = expression_step_key(&caps[1]) {
                    keys.insert(key);
                }
            }
        }
    }
    keys
}

//! Capability normalization.
//!
//! Hosts advertise capabilities as a map whose values are integers, plain
//! strings, or semi-structured strings such as
//! `{"vendor":"intel","features":["sse","avx"],"topology":{"cores":4}}`.
//! The placement engine only ever looks at a flat key → value map, produced
//! here.
//!
//! Two modes exist:
//!
//! - [`CapabilityMode::Legacy`] walks the comma-separated segments of a
//!   structured string and keeps only the innermost key of every
//!   `key:value` segment. Outer keys (`cpu_info`, `topology`) are dropped
//!   and repeated inner keys overwrite each other. Existing extra specs are
//!   written against this shape.
//! - [`CapabilityMode::Nested`] parses the string as a tree and keeps every
//!   level, joining keys with `.` (`cpu_info.topology.cores`).

use std::collections::BTreeMap;
use std::fmt;

use fleetgrid_state::CapabilityReport;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;

/// A normalized capability value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CapabilityValue {
    Integer(i64),
    Text(String),
}

impl CapabilityValue {
    /// Integer if `raw` parses as one, text otherwise.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().parse::<i64>() {
            Ok(n) => CapabilityValue::Integer(n),
            Err(_) => CapabilityValue::Text(raw.to_string()),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            CapabilityValue::Integer(n) => Some(*n),
            CapabilityValue::Text(_) => None,
        }
    }

    /// Numeric reading of the value, parsing text as a float.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CapabilityValue::Integer(n) => Some(*n as f64),
            CapabilityValue::Text(s) => s.trim().parse().ok(),
        }
    }

    /// The comma-separated items of the value.
    pub fn items(&self) -> Vec<String> {
        match self {
            CapabilityValue::Integer(n) => vec![n.to_string()],
            CapabilityValue::Text(s) => s.split(',').map(|item| item.trim().to_string()).collect(),
        }
    }
}

impl fmt::Display for CapabilityValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapabilityValue::Integer(n) => write!(f, "{n}"),
            CapabilityValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for CapabilityValue {
    fn from(value: i64) -> Self {
        CapabilityValue::Integer(value)
    }
}

impl From<&str> for CapabilityValue {
    fn from(value: &str) -> Self {
        CapabilityValue::Text(value.to_string())
    }
}

/// Flat capability map of one host and topic.
///
/// Only valid for the snapshot it was derived from; never cached.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedCapability {
    values: BTreeMap<String, CapabilityValue>,
}

impl NormalizedCapability {
    pub fn get(&self, key: &str) -> Option<&CapabilityValue> {
        self.values.get(key)
    }

    /// Integer capability, accepting numeric text.
    pub fn integer(&self, key: &str) -> Option<i64> {
        match self.values.get(key)? {
            CapabilityValue::Integer(n) => Some(*n),
            CapabilityValue::Text(s) => s.trim().parse().ok(),
        }
    }

    /// `false` only when the host advertises `enabled` as false or 0.
    pub fn is_enabled(&self) -> bool {
        match self.values.get("enabled") {
            Some(CapabilityValue::Integer(0)) => false,
            Some(CapabilityValue::Text(s)) => !s.trim().eq_ignore_ascii_case("false"),
            _ => true,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &CapabilityValue)> {
        self.values.iter()
    }

    fn insert(&mut self, key: String, value: CapabilityValue) {
        self.values.insert(key, value);
    }
}

impl<K: Into<String>, V: Into<CapabilityValue>> FromIterator<(K, V)> for NormalizedCapability {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// How structured capability strings are flattened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityMode {
    /// Innermost key of each segment only (lossy).
    #[default]
    Legacy,
    /// Dotted paths for every nesting level.
    Nested,
}

/// A capability report that cannot be normalized.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CapabilityError {
    #[error("capability {entry:?}: {message} at offset {offset}")]
    Syntax {
        entry: String,
        offset: usize,
        message: String,
    },
}

/// Flatten one topic's capability report.
pub fn normalize(
    report: &CapabilityReport,
    mode: CapabilityMode,
) -> Result<NormalizedCapability, CapabilityError> {
    let mut out = NormalizedCapability::default();

    for (entry, raw) in report {
        match raw {
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(n) => out.insert(entry.clone(), CapabilityValue::Integer(n)),
                None => trace!(%entry, "non-integer number skipped"),
            },
            serde_json::Value::Bool(b) => {
                out.insert(entry.clone(), CapabilityValue::Text(b.to_string()))
            }
            serde_json::Value::String(s) if !s.contains(':') && !s.contains(',') => {
                out.insert(entry.clone(), CapabilityValue::parse(s))
            }
            serde_json::Value::String(s) => match mode {
                CapabilityMode::Legacy => flatten_legacy(entry, s, &mut out),
                CapabilityMode::Nested => {
                    let node = NestedParser::new(entry, s).document()?;
                    flatten_node(entry.clone(), node, &mut out);
                }
            },
            serde_json::Value::Array(_) | serde_json::Value::Object(_)
                if mode == CapabilityMode::Nested =>
            {
                flatten_node(entry.clone(), Node::from_json(raw), &mut out);
            }
            _ => trace!(%entry, "unsupported capability value skipped"),
        }
    }

    Ok(out)
}

// ── Legacy flattening ──────────────────────────────────────────────

/// Strip whitespace, quotes and bracket characters around a token.
fn unquote(token: &str) -> &str {
    token.trim_matches(|c: char| {
        c.is_whitespace() || matches!(c, '"' | '\'' | '{' | '}' | '[' | ']')
    })
}

/// One pass over the comma-separated segments of `raw`.
///
/// A `key:value` segment flushes the pending pair and starts a new one
/// keyed by the last-but-one colon field. A bare segment is appended to
/// the pending value. The final pending pair is flushed at the end.
///
/// A segment whose key field is empty (`fe80::1`) starts no pair; it and
/// the bare segments after it are dropped until the next keyed segment.
fn flatten_legacy(entry: &str, raw: &str, out: &mut NormalizedCapability) {
    let mut pending: Option<(String, String)> = None;

    for segment in raw.split(',') {
        if segment.contains(':') {
            if let Some((key, value)) = pending.take() {
                out.insert(key, CapabilityValue::parse(&value));
            }
            let mut fields = segment.rsplit(':');
            let value = unquote(fields.next().unwrap_or_default());
            let key = unquote(fields.next().unwrap_or_default());
            if key.is_empty() {
                trace!(%entry, %segment, "segment without key dropped");
                continue;
            }
            pending = Some((key.to_string(), value.to_string()));
        } else {
            let item = unquote(segment);
            if item.is_empty() {
                continue;
            }
            match pending.as_mut() {
                Some((_, value)) if value.is_empty() => value.push_str(item),
                Some((_, value)) => {
                    value.push(',');
                    value.push_str(item);
                }
                None => trace!(%entry, %segment, "keyless segment dropped"),
            }
        }
    }

    if let Some((key, value)) = pending {
        out.insert(key, CapabilityValue::parse(&value));
    }
}

// ── Nested flattening ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Scalar(String),
    List(Vec<Node>),
    Map(Vec<(String, Node)>),
}

impl Node {
    fn from_json(value: &serde_json::Value) -> Node {
        match value {
            serde_json::Value::String(s) => Node::Scalar(s.clone()),
            serde_json::Value::Array(items) => {
                Node::List(items.iter().map(Node::from_json).collect())
            }
            serde_json::Value::Object(map) => Node::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), Node::from_json(v)))
                    .collect(),
            ),
            serde_json::Value::Null => Node::List(Vec::new()),
            other => Node::Scalar(other.to_string()),
        }
    }
}

fn flatten_node(path: String, node: Node, out: &mut NormalizedCapability) {
    match node {
        Node::Scalar(s) => out.insert(path, CapabilityValue::parse(&s)),
        Node::List(items) if items.iter().all(|i| matches!(i, Node::Scalar(_))) => {
            let joined: Vec<String> = items
                .into_iter()
                .filter_map(|i| match i {
                    Node::Scalar(s) => Some(s),
                    _ => None,
                })
                .collect();
            match joined.as_slice() {
                [] => trace!(%path, "empty list skipped"),
                [single] => out.insert(path, CapabilityValue::parse(single)),
                _ => out.insert(path, CapabilityValue::Text(joined.join(","))),
            }
        }
        Node::List(items) => {
            for (idx, item) in items.into_iter().enumerate() {
                flatten_node(format!("{path}.{idx}"), item, out);
            }
        }
        Node::Map(pairs) => {
            for (key, value) in pairs {
                flatten_node(format!("{path}.{key}"), value, out);
            }
        }
    }
}

/// Recursive-descent parser for relaxed JSON-like capability strings.
///
/// Keys and scalars may be quoted or bare; the outermost braces may be
/// omitted (`vendor:"intel",features:["a","b"]`).
struct NestedParser<'a> {
    entry: &'a str,
    src: &'a str,
    pos: usize,
}

impl<'a> NestedParser<'a> {
    fn new(entry: &'a str, src: &'a str) -> Self {
        Self { entry, src, pos: 0 }
    }

    fn document(&mut self) -> Result<Node, CapabilityError> {
        self.skip_ws();
        let node = if self.peek() == Some('{') {
            self.bump();
            self.sequence(Some('}'))?
        } else {
            self.sequence(None)?
        };
        self.skip_ws();
        match self.peek() {
            None => Ok(node),
            Some(c) => Err(self.error(format!("unexpected trailing {c:?}"))),
        }
    }

    fn sequence(&mut self, close: Option<char>) -> Result<Node, CapabilityError> {
        let mut pairs = Vec::new();
        let mut items = Vec::new();

        loop {
            self.skip_ws();
            if self.peek().is_none() || self.peek() == close {
                break;
            }

            let head = self.value()?;
            self.skip_ws();
            if self.peek() == Some(':') {
                self.bump();
                let Node::Scalar(key) = head else {
                    return Err(self.error("key must be a scalar".into()));
                };
                if key.is_empty() {
                    return Err(self.error("empty key".into()));
                }
                let value = self.value()?;
                pairs.push((key, value));
            } else {
                items.push(head);
            }

            self.skip_ws();
            match self.peek() {
                Some(',') => self.bump(),
                next if next == close => {}
                Some(c) => return Err(self.error(format!("unexpected {c:?}"))),
                None => {}
            }
        }

        if let Some(expected) = close {
            if self.peek() != Some(expected) {
                return Err(self.error(format!("expected {expected:?}")));
            }
            self.bump();
        }

        match (pairs.is_empty(), items.is_empty()) {
            (false, false) => Err(self.error("mixed keyed and keyless members".into())),
            (false, true) => Ok(Node::Map(pairs)),
            _ => Ok(Node::List(items)),
        }
    }

    fn value(&mut self) -> Result<Node, CapabilityError> {
        self.skip_ws();
        match self.peek() {
            Some('{') => {
                self.bump();
                self.sequence(Some('}'))
            }
            Some('[') => {
                self.bump();
                self.sequence(Some(']'))
            }
            Some(quote @ ('"' | '\'')) => {
                self.bump();
                self.quoted(quote).map(Node::Scalar)
            }
            Some(_) => {
                let start = self.pos;
                while let Some(c) = self.peek() {
                    if matches!(c, ',' | ':' | '{' | '}' | '[' | ']') {
                        break;
                    }
                    self.bump();
                }
                let atom = self.src[start..self.pos].trim();
                if atom.is_empty() {
                    return Err(self.error("expected a value".into()));
                }
                Ok(Node::Scalar(atom.to_string()))
            }
            None => Err(self.error("expected a value".into())),
        }
    }

    fn quoted(&mut self, quote: char) -> Result<String, CapabilityError> {
        let mut out = String::new();
        loop {
            match self.peek() {
                Some('\\') => {
                    self.bump();
                    if let Some(c) = self.peek() {
                        out.push(c);
                        self.bump();
                    }
                }
                Some(c) if c == quote => {
                    self.bump();
                    return Ok(out);
                }
                Some(c) => {
                    out.push(c);
                    self.bump();
                }
                None => return Err(self.error("unterminated string".into())),
            }
        }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += c.len_utf8();
        }
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn error(&self, message: String) -> CapabilityError {
        CapabilityError::Syntax {
            entry: self.entry.to_string(),
            offset: self.pos,
            message,
        }
    }
}

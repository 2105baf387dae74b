//! Attribute matchers over decoded messages.
//!
//! Two matching modes are used by stubs:
//!
//! - [`includes`]: every expected key must be a declared field and its value
//!   must satisfy the expected matcher. Other fields are ignored.
//! - [`matches_fully`]: like `includes`, but fields absent from the expected
//!   map must hold their default.
//!
//! A literal nested object compares against the whole nested message, so
//! `{"date": {"month": 10}}` does not match a date that also has a day.
//! Use [`AttrMatcher::including`] for a partial nested match.

use crate::schema::{FieldDescriptor, FieldKind, Message, Value};
use regex::Regex;
use serde_json::{Map, Value as Json};
use std::fmt;
use std::sync::Arc;

/// Coarse value kinds for type-only matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Integer,
    Float,
    String,
    Bool,
    Bytes,
    Enum,
    Message,
    List,
}

impl ValueKind {
    pub fn parse(name: &str) -> Option<Self> {
        let kind = match name.to_ascii_lowercase().as_str() {
            "integer" | "int" => ValueKind::Integer,
            "float" | "double" => ValueKind::Float,
            "string" => ValueKind::String,
            "bool" | "boolean" => ValueKind::Bool,
            "bytes" => ValueKind::Bytes,
            "enum" => ValueKind::Enum,
            "message" => ValueKind::Message,
            "list" => ValueKind::List,
            _ => return None,
        };
        Some(kind)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::Integer => "integer",
            ValueKind::Float => "float",
            ValueKind::String => "string",
            ValueKind::Bool => "bool",
            ValueKind::Bytes => "bytes",
            ValueKind::Enum => "enum",
            ValueKind::Message => "message",
            ValueKind::List => "list",
        }
    }

    fn matches(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (
                ValueKind::Integer,
                Value::I32(_) | Value::I64(_) | Value::U32(_) | Value::U64(_)
            ) | (ValueKind::Float, Value::F32(_) | Value::F64(_))
                | (ValueKind::String, Value::String(_))
                | (ValueKind::Bool, Value::Bool(_))
                | (ValueKind::Bytes, Value::Bytes(_))
                | (ValueKind::Enum, Value::Enum(_))
                | (ValueKind::Message, Value::Message(_))
                | (ValueKind::List, Value::List(_))
        )
    }
}

/// Matches a single field value.
#[derive(Clone)]
pub enum AttrMatcher {
    /// Literal, converted to the field's type before comparing.
    Eq(Json),
    /// String fields (and enum names) matching a pattern.
    Regex(Regex),
    Anything,
    Kind(ValueKind),
    /// Nested message, partial match.
    Including(Attrs),
    /// Nested message, complete match with per-field matchers.
    Fields(Attrs),
    Satisfies(Arc<dyn Fn(&Value) -> bool + Send + Sync>),
}

impl AttrMatcher {
    pub fn regex(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(pattern).map(AttrMatcher::Regex)
    }

    pub fn anything() -> Self {
        AttrMatcher::Anything
    }

    pub fn kind(kind: ValueKind) -> Self {
        AttrMatcher::Kind(kind)
    }

    pub fn including(attrs: Attrs) -> Self {
        AttrMatcher::Including(attrs)
    }

    pub fn satisfies<F>(f: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        AttrMatcher::Satisfies(Arc::new(f))
    }

    /// Parse the JSON form used in configuration.
    ///
    /// Objects with a single `$`-prefixed key select a matcher
    /// (`$regex`, `$anything`, `$kind`, `$including`). Other objects are
    /// complete nested matches; everything else is a literal.
    pub fn from_json(json: &Json) -> Result<Self, String> {
        let Json::Object(map) = json else {
            return Ok(AttrMatcher::Eq(json.clone()));
        };

        if map.len() == 1 {
            if let Some((key, arg)) = map.iter().next().filter(|(k, _)| k.starts_with('$')) {
                return match key.as_str() {
                    "$regex" => {
                        let pattern = arg
                            .as_str()
                            .ok_or_else(|| format!("$regex expects a string, found {}", arg))?;
                        AttrMatcher::regex(pattern).map_err(|e| format!("invalid regex: {}", e))
                    }
                    "$anything" => Ok(AttrMatcher::Anything),
                    "$kind" => arg
                        .as_str()
                        .and_then(ValueKind::parse)
                        .map(AttrMatcher::Kind)
                        .ok_or_else(|| format!("unknown $kind: {}", arg)),
                    "$including" => Attrs::from_json(arg).map(AttrMatcher::Including),
                    other => Err(format!("unknown matcher {}", other)),
                };
            }
        }

        Attrs::from_json(json).map(AttrMatcher::Fields)
    }

    /// JSON form, the inverse of [`AttrMatcher::from_json`].
    pub fn to_json(&self) -> Json {
        match self {
            AttrMatcher::Eq(v) => v.clone(),
            AttrMatcher::Regex(re) => single("$regex", Json::String(re.as_str().to_string())),
            AttrMatcher::Anything => single("$anything", Json::Bool(true)),
            AttrMatcher::Kind(k) => single("$kind", Json::String(k.as_str().to_string())),
            AttrMatcher::Including(attrs) => single("$including", attrs.to_json()),
            AttrMatcher::Fields(attrs) => attrs.to_json(),
            AttrMatcher::Satisfies(_) => Json::String("{ ... }".to_string()),
        }
    }

    /// Does a field value satisfy this matcher?
    pub fn matches_field(&self, field: &FieldDescriptor, actual: &Value) -> bool {
        match self {
            AttrMatcher::Eq(Json::Null) => field.is_default(actual),
            AttrMatcher::Eq(expected) => field
                .value_from_json(expected)
                .map(|expected| expected == *actual)
                .unwrap_or(false),
            AttrMatcher::Regex(re) => match (actual, &field.kind) {
                (Value::String(s), _) => re.is_match(s),
                (Value::Enum(n), FieldKind::Enum(t)) => {
                    t.name_of(*n).map(|name| re.is_match(name)).unwrap_or(false)
                }
                _ => false,
            },
            AttrMatcher::Anything => true,
            AttrMatcher::Kind(kind) => kind.matches(actual),
            AttrMatcher::Including(attrs) => actual
                .as_message()
                .map(|m| includes(m, attrs))
                .unwrap_or(false),
            AttrMatcher::Fields(attrs) => actual
                .as_message()
                .map(|m| matches_fully(m, attrs))
                .unwrap_or(false),
            AttrMatcher::Satisfies(f) => f(actual),
        }
    }
}

fn single(key: &str, value: Json) -> Json {
    let mut map = Map::new();
    map.insert(key.to_string(), value);
    Json::Object(map)
}

impl fmt::Debug for AttrMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl fmt::Display for AttrMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl From<Json> for AttrMatcher {
    fn from(v: Json) -> Self {
        AttrMatcher::Eq(v)
    }
}

impl From<&str> for AttrMatcher {
    fn from(v: &str) -> Self {
        AttrMatcher::Eq(Json::String(v.to_string()))
    }
}

impl From<String> for AttrMatcher {
    fn from(v: String) -> Self {
        AttrMatcher::Eq(Json::String(v))
    }
}

impl From<i64> for AttrMatcher {
    fn from(v: i64) -> Self {
        AttrMatcher::Eq(Json::from(v))
    }
}

impl From<i32> for AttrMatcher {
    fn from(v: i32) -> Self {
        AttrMatcher::Eq(Json::from(v))
    }
}

impl From<bool> for AttrMatcher {
    fn from(v: bool) -> Self {
        AttrMatcher::Eq(Json::Bool(v))
    }
}

impl From<Regex> for AttrMatcher {
    fn from(re: Regex) -> Self {
        AttrMatcher::Regex(re)
    }
}

impl From<ValueKind> for AttrMatcher {
    fn from(kind: ValueKind) -> Self {
        AttrMatcher::Kind(kind)
    }
}

/// An ordered map of field name to matcher.
#[derive(Clone, Default)]
pub struct Attrs(Vec<(String, AttrMatcher)>);

impl Attrs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) the matcher for a field.
    pub fn attr(mut self, name: impl Into<String>, matcher: impl Into<AttrMatcher>) -> Self {
        let name = name.into();
        let matcher = matcher.into();
        match self.0.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = matcher,
            None => self.0.push((name, matcher)),
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&AttrMatcher> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, m)| m)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttrMatcher)> {
        self.0.iter().map(|(n, m)| (n.as_str(), m))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parse a JSON object of field matchers.
    pub fn from_json(json: &Json) -> Result<Self, String> {
        let map = json
            .as_object()
            .ok_or_else(|| format!("expected an object of attributes, found {}", json))?;
        let mut attrs = Attrs::new();
        for (key, value) in map {
            let matcher =
                AttrMatcher::from_json(value).map_err(|e| format!("{}: {}", key, e))?;
            attrs.0.push((key.clone(), matcher));
        }
        Ok(attrs)
    }

    pub fn to_json(&self) -> Json {
        Json::Object(
            self.0
                .iter()
                .map(|(name, matcher)| (name.clone(), matcher.to_json()))
                .collect(),
        )
    }
}

impl fmt::Debug for Attrs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl<K, M> FromIterator<(K, M)> for Attrs
where
    K: Into<String>,
    M: Into<AttrMatcher>,
{
    fn from_iter<I: IntoIterator<Item = (K, M)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Attrs::new(), |attrs, (k, m)| attrs.attr(k, m))
    }
}

/// Partial match: every expected key is a declared field whose value
/// satisfies its matcher.
pub fn includes(message: &Message, expected: &Attrs) -> bool {
    expected
        .iter()
        .all(|(name, matcher)| match message.message_type().field(name) {
            Some(field) => matcher.matches_field(field, &message.field_value(field)),
            None => false,
        })
}

/// Complete match: fields missing from `expected` must hold their default.
pub fn matches_fully(message: &Message, expected: &Attrs) -> bool {
    let message_type = message.message_type();
    if expected
        .iter()
        .any(|(name, _)| message_type.field(name).is_none())
    {
        return false;
    }

    message_type.fields().iter().all(|field| {
        let actual = message.field_value(field);
        match expected.get(&field.name) {
            Some(matcher) => matcher.matches_field(field, &actual),
            None => field.is_default(&actual),
        }
    })
}

//! Dynamic protobuf messages.
//!
//! Message and enum types are described at runtime. Messages hold typed
//! field values and encode to (and decode from) the protobuf binary wire
//! format with proto3 semantics: singular fields equal to their default are
//! not written, numeric repeated fields are packed, unknown fields are
//! skipped on decode.

use base64::Engine;
use bytes::{Buf, BufMut};
use prost::encoding::{decode_key, decode_varint, encode_key, encode_varint, WireType};
use serde_json::{Map, Value as Json};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors from the message system.
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("failed to decode {message}: {source}")]
    Decode {
        message: String,
        #[source]
        source: prost::DecodeError,
    },

    #[error("malformed {message}: {reason}")]
    Malformed { message: String, reason: String },

    #[error("unknown field {field} for {message}")]
    UnknownField { message: String, field: String },

    #[error("invalid value for {message}.{field}: {reason}")]
    InvalidValue {
        message: String,
        field: String,
        reason: String,
    },
}

/// A protobuf enum type.
#[derive(Clone)]
pub struct EnumType(Arc<EnumInner>);

struct EnumInner {
    name: String,
    values: Vec<(String, i32)>,
}

impl EnumType {
    /// Create an enum type. The first value is the default.
    pub fn new<I, S>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = (S, i32)>,
        S: Into<String>,
    {
        Self(Arc::new(EnumInner {
            name: name.into(),
            values: values.into_iter().map(|(n, v)| (n.into(), v)).collect(),
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn default_number(&self) -> i32 {
        self.0.values.first().map(|(_, n)| *n).unwrap_or(0)
    }

    pub fn name_of(&self, number: i32) -> Option<&str> {
        self.0
            .values
            .iter()
            .find(|(_, n)| *n == number)
            .map(|(name, _)| name.as_str())
    }

    pub fn number_of(&self, name: &str) -> Option<i32> {
        self.0
            .values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, number)| *number)
    }
}

impl PartialEq for EnumType {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0.name == other.0.name
    }
}

impl fmt::Debug for EnumType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.name)
    }
}

/// Field value kinds.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldKind {
    Bool,
    Int32,
    Int64,
    UInt32,
    UInt64,
    Float,
    Double,
    String,
    Bytes,
    Enum(EnumType),
    Message(MessageType),
}

impl FieldKind {
    /// Parse a scalar type name as written in a `.proto` file.
    pub fn scalar(name: &str) -> Option<Self> {
        let kind = match name {
            "bool" => FieldKind::Bool,
            "int32" => FieldKind::Int32,
            "int64" => FieldKind::Int64,
            "uint32" => FieldKind::UInt32,
            "uint64" => FieldKind::UInt64,
            "float" => FieldKind::Float,
            "double" => FieldKind::Double,
            "string" => FieldKind::String,
            "bytes" => FieldKind::Bytes,
            _ => return None,
        };
        Some(kind)
    }

    pub fn type_name(&self) -> String {
        match self {
            FieldKind::Bool => "bool".to_string(),
            FieldKind::Int32 => "int32".to_string(),
            FieldKind::Int64 => "int64".to_string(),
            FieldKind::UInt32 => "uint32".to_string(),
            FieldKind::UInt64 => "uint64".to_string(),
            FieldKind::Float => "float".to_string(),
            FieldKind::Double => "double".to_string(),
            FieldKind::String => "string".to_string(),
            FieldKind::Bytes => "bytes".to_string(),
            FieldKind::Enum(t) => t.name().to_string(),
            FieldKind::Message(t) => t.full_name().to_string(),
        }
    }

    fn wire_type(&self) -> WireType {
        match self {
            FieldKind::Float => WireType::ThirtyTwoBit,
            FieldKind::Double => WireType::SixtyFourBit,
            FieldKind::String | FieldKind::Bytes | FieldKind::Message(_) => {
                WireType::LengthDelimited
            }
            _ => WireType::Varint,
        }
    }

    fn is_packable(&self) -> bool {
        !matches!(
            self,
            FieldKind::String | FieldKind::Bytes | FieldKind::Message(_)
        )
    }

    fn default_value(&self) -> Value {
        match self {
            FieldKind::Bool => Value::Bool(false),
            FieldKind::Int32 => Value::I32(0),
            FieldKind::Int64 => Value::I64(0),
            FieldKind::UInt32 => Value::U32(0),
            FieldKind::UInt64 => Value::U64(0),
            FieldKind::Float => Value::F32(0.0),
            FieldKind::Double => Value::F64(0.0),
            FieldKind::String => Value::String(String::new()),
            FieldKind::Bytes => Value::Bytes(Vec::new()),
            FieldKind::Enum(t) => Value::Enum(t.default_number()),
            FieldKind::Message(t) => Value::Message(t.new_message()),
        }
    }
}

/// A declared message field.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldDescriptor {
    pub name: String,
    pub number: u32,
    pub kind: FieldKind,
    pub repeated: bool,
}

impl FieldDescriptor {
    /// The schema default for this field.
    pub fn default_value(&self) -> Value {
        if self.repeated {
            Value::List(Vec::new())
        } else {
            self.kind.default_value()
        }
    }

    pub fn is_default(&self, value: &Value) -> bool {
        match value {
            Value::List(items) => items.is_empty(),
            Value::Message(m) => m.is_empty(),
            other => *other == self.kind.default_value(),
        }
    }

    /// Convert a JSON value into a value of this field's type.
    pub fn value_from_json(&self, json: &Json) -> Result<Value, String> {
        if self.repeated {
            let items = json
                .as_array()
                .ok_or_else(|| format!("expected a list, found {}", json))?;
            return items
                .iter()
                .map(|item| kind_from_json(&self.kind, item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List);
        }
        kind_from_json(&self.kind, json)
    }

    /// Render a value of this field as JSON.
    pub fn value_to_json(&self, value: &Value) -> Json {
        match value {
            Value::List(items) => {
                Json::Array(items.iter().map(|v| kind_to_json(&self.kind, v)).collect())
            }
            other => kind_to_json(&self.kind, other),
        }
    }

    fn coerce(&self, value: Value) -> Result<Value, String> {
        if self.repeated {
            match value {
                Value::List(items) => items
                    .into_iter()
                    .map(|item| coerce(&self.kind, item))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::List),
                other => Err(format!("expected a list, found {}", other.kind_name())),
            }
        } else {
            coerce(&self.kind, value)
        }
    }
}

/// A protobuf message type.
#[derive(Clone)]
pub struct MessageType(Arc<MessageInner>);

struct MessageInner {
    full_name: String,
    fields: Vec<FieldDescriptor>,
}

impl MessageType {
    pub fn builder(full_name: impl Into<String>) -> MessageTypeBuilder {
        MessageTypeBuilder {
            full_name: full_name.into(),
            fields: Vec::new(),
        }
    }

    pub fn full_name(&self) -> &str {
        &self.0.full_name
    }

    /// Declared fields, in declaration order.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.0.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.0.fields.iter().find(|f| f.name == name)
    }

    pub fn field_by_number(&self, number: u32) -> Option<&FieldDescriptor> {
        self.0.fields.iter().find(|f| f.number == number)
    }

    /// A zero-valued instance.
    pub fn new_message(&self) -> Message {
        Message {
            message_type: self.clone(),
            values: BTreeMap::new(),
        }
    }

    /// Build a message from a JSON object of field values.
    ///
    /// Unlisted fields keep their defaults; `null` values are ignored.
    pub fn from_json(&self, json: &Json) -> Result<Message, SchemaError> {
        let map = json.as_object().ok_or_else(|| SchemaError::Malformed {
            message: self.full_name().to_string(),
            reason: format!("expected an object, found {}", json),
        })?;

        let mut message = self.new_message();
        for (key, value) in map {
            let field = self.field(key).ok_or_else(|| SchemaError::UnknownField {
                message: self.full_name().to_string(),
                field: key.clone(),
            })?;
            if value.is_null() {
                continue;
            }
            let value = field
                .value_from_json(value)
                .map_err(|reason| self.invalid_value(field, reason))?;
            message.values.insert(field.number, value);
        }
        Ok(message)
    }

    /// Decode a message from protobuf wire bytes.
    pub fn decode(&self, mut buf: &[u8]) -> Result<Message, SchemaError> {
        let mut message = self.new_message();

        while buf.has_remaining() {
            let (number, wire_type) = decode_key(&mut buf).map_err(|e| self.decode_error(e))?;

            let Some(field) = self.field_by_number(number) else {
                self.skip_field(wire_type, &mut buf)?;
                continue;
            };

            if field.repeated {
                let mut items = Vec::new();
                if wire_type == WireType::LengthDelimited && field.kind.is_packable() {
                    let mut packed = self.take_length_delimited(&mut buf)?;
                    while packed.has_remaining() {
                        items.push(self.read_value(&field.kind, &mut packed)?);
                    }
                } else {
                    self.check_wire_type(field, wire_type)?;
                    items.push(self.read_value(&field.kind, &mut buf)?);
                }

                match message.values.entry(number) {
                    std::collections::btree_map::Entry::Occupied(mut existing) => {
                        if let Value::List(list) = existing.get_mut() {
                            list.extend(items);
                        }
                    }
                    std::collections::btree_map::Entry::Vacant(slot) => {
                        slot.insert(Value::List(items));
                    }
                }
            } else {
                self.check_wire_type(field, wire_type)?;
                let value = self.read_value(&field.kind, &mut buf)?;
                message.values.insert(number, value);
            }
        }

        Ok(message)
    }

    fn check_wire_type(
        &self,
        field: &FieldDescriptor,
        wire_type: WireType,
    ) -> Result<(), SchemaError> {
        if wire_type == field.kind.wire_type() {
            Ok(())
        } else {
            Err(self.malformed(format!(
                "field {} has wire type {:?}, expected {:?}",
                field.name,
                wire_type,
                field.kind.wire_type()
            )))
        }
    }

    fn read_value(&self, kind: &FieldKind, buf: &mut &[u8]) -> Result<Value, SchemaError> {
        let value = match kind {
            FieldKind::Bool => Value::Bool(self.read_varint(buf)? != 0),
            FieldKind::Int32 => Value::I32(self.read_varint(buf)? as i32),
            FieldKind::Int64 => Value::I64(self.read_varint(buf)? as i64),
            FieldKind::UInt32 => Value::U32(self.read_varint(buf)? as u32),
            FieldKind::UInt64 => Value::U64(self.read_varint(buf)?),
            FieldKind::Enum(_) => Value::Enum(self.read_varint(buf)? as i32),
            FieldKind::Float => {
                self.ensure_remaining(buf, 4)?;
                Value::F32(buf.get_f32_le())
            }
            FieldKind::Double => {
                self.ensure_remaining(buf, 8)?;
                Value::F64(buf.get_f64_le())
            }
            FieldKind::String => {
                let raw = self.take_length_delimited(buf)?;
                let text = std::str::from_utf8(raw)
                    .map_err(|e| self.malformed(format!("invalid utf-8 string: {}", e)))?;
                Value::String(text.to_string())
            }
            FieldKind::Bytes => Value::Bytes(self.take_length_delimited(buf)?.to_vec()),
            FieldKind::Message(t) => {
                let raw = self.take_length_delimited(buf)?;
                Value::Message(t.decode(raw)?)
            }
        };
        Ok(value)
    }

    fn read_varint(&self, buf: &mut &[u8]) -> Result<u64, SchemaError> {
        decode_varint(buf).map_err(|e| self.decode_error(e))
    }

    fn take_length_delimited<'a>(&self, buf: &mut &'a [u8]) -> Result<&'a [u8], SchemaError> {
        let len = self.read_varint(buf)? as usize;
        self.ensure_remaining(buf, len)?;
        let slice: &'a [u8] = buf;
        let (head, tail) = slice.split_at(len);
        *buf = tail;
        Ok(head)
    }

    fn skip_field(&self, wire_type: WireType, buf: &mut &[u8]) -> Result<(), SchemaError> {
        match wire_type {
            WireType::Varint => {
                self.read_varint(buf)?;
            }
            WireType::SixtyFourBit => {
                self.ensure_remaining(buf, 8)?;
                buf.advance(8);
            }
            WireType::ThirtyTwoBit => {
                self.ensure_remaining(buf, 4)?;
                buf.advance(4);
            }
            WireType::LengthDelimited => {
                self.take_length_delimited(buf)?;
            }
            WireType::StartGroup | WireType::EndGroup => {
                return Err(self.malformed("groups are not supported"));
            }
        }
        Ok(())
    }

    fn ensure_remaining(&self, buf: &[u8], needed: usize) -> Result<(), SchemaError> {
        if buf.len() < needed {
            Err(self.malformed(format!(
                "buffer underflow: needed {} bytes, {} remaining",
                needed,
                buf.len()
            )))
        } else {
            Ok(())
        }
    }

    fn decode_error(&self, source: prost::DecodeError) -> SchemaError {
        SchemaError::Decode {
            message: self.full_name().to_string(),
            source,
        }
    }

    fn malformed(&self, reason: impl Into<String>) -> SchemaError {
        SchemaError::Malformed {
            message: self.full_name().to_string(),
            reason: reason.into(),
        }
    }

    fn invalid_value(&self, field: &FieldDescriptor, reason: String) -> SchemaError {
        SchemaError::InvalidValue {
            message: self.full_name().to_string(),
            field: field.name.clone(),
            reason,
        }
    }
}

impl PartialEq for MessageType {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0.full_name == other.0.full_name
    }
}

impl fmt::Debug for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.full_name)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.full_name)
    }
}

/// Builder for [`MessageType`].
pub struct MessageTypeBuilder {
    full_name: String,
    fields: Vec<FieldDescriptor>,
}

impl MessageTypeBuilder {
    pub fn field(mut self, name: impl Into<String>, number: u32, kind: FieldKind) -> Self {
        self.fields.push(FieldDescriptor {
            name: name.into(),
            number,
            kind,
            repeated: false,
        });
        self
    }

    pub fn repeated(mut self, name: impl Into<String>, number: u32, kind: FieldKind) -> Self {
        self.fields.push(FieldDescriptor {
            name: name.into(),
            number,
            kind,
            repeated: true,
        });
        self
    }

    pub fn build(self) -> MessageType {
        MessageType(Arc::new(MessageInner {
            full_name: self.full_name,
            fields: self.fields,
        }))
    }
}

/// A field value.
///
/// Floats compare equal when both are NaN, so every value equals itself.
#[derive(Clone, Debug)]
pub enum Value {
    Bool(bool),
    I32(i32),
    I64(i64),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    String(String),
    Bytes(Vec<u8>),
    Enum(i32),
    Message(Message),
    List(Vec<Value>),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::I32(a), Value::I32(b)) => a == b,
            (Value::I64(a), Value::I64(b)) => a == b,
            (Value::U32(a), Value::U32(b)) => a == b,
            (Value::U64(a), Value::U64(b)) => a == b,
            (Value::F32(a), Value::F32(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::F64(a), Value::F64(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Enum(a), Value::Enum(b)) => a == b,
            (Value::Message(a), Value::Message(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            _ => false,
        }
    }
}

impl Value {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::I32(_) => "int32",
            Value::I64(_) => "int64",
            Value::U32(_) => "uint32",
            Value::U64(_) => "uint64",
            Value::F32(_) => "float",
            Value::F64(_) => "double",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Enum(_) => "enum",
            Value::Message(_) => "message",
            Value::List(_) => "list",
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::I32(v) | Value::Enum(v) => Some(i64::from(*v)),
            Value::I64(v) => Some(*v),
            Value::U32(v) => Some(i64::from(*v)),
            Value::U64(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::U32(v) => Some(u64::from(*v)),
            Value::U64(v) => Some(*v),
            other => other.as_i64().and_then(|v| u64::try_from(v).ok()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::F32(v) => Some(f64::from(*v)),
            Value::F64(v) => Some(*v),
            other => other.as_i64().map(|v| v as f64),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_message(&self) -> Option<&Message> {
        match self {
            Value::Message(m) => Some(m),
            _ => None,
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v.into())
                }
            }
        )*
    };
}

value_from! {
    bool => Bool,
    i32 => I32,
    i64 => I64,
    u32 => U32,
    u64 => U64,
    f32 => F32,
    f64 => F64,
    String => String,
    &str => String,
    Vec<u8> => Bytes,
    Message => Message,
}

fn coerce(kind: &FieldKind, value: Value) -> Result<Value, String> {
    let mismatch = format!("expected {}, found {}", kind.type_name(), value.kind_name());
    let coerced = match (kind, value) {
        (FieldKind::Bool, Value::Bool(b)) => Some(Value::Bool(b)),
        (FieldKind::Int32, v) => v
            .as_i64()
            .and_then(|n| i32::try_from(n).ok())
            .map(Value::I32),
        (FieldKind::Int64, v) => v.as_i64().map(Value::I64),
        (FieldKind::UInt32, v) => v
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .map(Value::U32),
        (FieldKind::UInt64, v) => v.as_u64().map(Value::U64),
        (FieldKind::Float, v) => v.as_f64().map(|n| Value::F32(n as f32)),
        (FieldKind::Double, v) => v.as_f64().map(Value::F64),
        (FieldKind::String, Value::String(s)) => Some(Value::String(s)),
        (FieldKind::Bytes, Value::Bytes(b)) => Some(Value::Bytes(b)),
        (FieldKind::Enum(t), Value::String(name)) => t.number_of(&name).map(Value::Enum),
        (FieldKind::Enum(_), v) => v
            .as_i64()
            .and_then(|n| i32::try_from(n).ok())
            .map(Value::Enum),
        (FieldKind::Message(t), Value::Message(m)) if *m.message_type() == *t => {
            Some(Value::Message(m))
        }
        _ => None,
    };
    coerced.ok_or(mismatch)
}

fn kind_from_json(kind: &FieldKind, json: &Json) -> Result<Value, String> {
    let invalid = || format!("expected {}, found {}", kind.type_name(), json);
    match kind {
        FieldKind::Bool => json.as_bool().map(Value::Bool).ok_or_else(invalid),
        FieldKind::Int32 => json_i64(json)
            .and_then(|n| i32::try_from(n).ok())
            .map(Value::I32)
            .ok_or_else(invalid),
        FieldKind::Int64 => json_i64(json).map(Value::I64).ok_or_else(invalid),
        FieldKind::UInt32 => json_u64(json)
            .and_then(|n| u32::try_from(n).ok())
            .map(Value::U32)
            .ok_or_else(invalid),
        FieldKind::UInt64 => json_u64(json).map(Value::U64).ok_or_else(invalid),
        FieldKind::Float => json_f64(json)
            .map(|n| Value::F32(n as f32))
            .ok_or_else(invalid),
        FieldKind::Double => json_f64(json).map(Value::F64).ok_or_else(invalid),
        FieldKind::String => json
            .as_str()
            .map(|s| Value::String(s.to_string()))
            .ok_or_else(invalid),
        FieldKind::Bytes => json
            .as_str()
            .and_then(|s| base64::engine::general_purpose::STANDARD.decode(s).ok())
            .map(Value::Bytes)
            .ok_or_else(invalid),
        FieldKind::Enum(t) => match json {
            Json::String(name) => t.number_of(name).map(Value::Enum).ok_or_else(invalid),
            other => json_i64(other)
                .and_then(|n| i32::try_from(n).ok())
                .map(Value::Enum)
                .ok_or_else(invalid),
        },
        FieldKind::Message(t) => t
            .from_json(json)
            .map(Value::Message)
            .map_err(|e| e.to_string()),
    }
}

fn kind_to_json(kind: &FieldKind, value: &Value) -> Json {
    match value {
        Value::Bool(b) => Json::Bool(*b),
        Value::I32(v) => Json::from(*v),
        Value::I64(v) => Json::from(*v),
        Value::U32(v) => Json::from(*v),
        Value::U64(v) => Json::from(*v),
        Value::F32(v) => float_to_json(f64::from(*v)),
        Value::F64(v) => float_to_json(*v),
        Value::String(s) => Json::String(s.clone()),
        Value::Bytes(b) => Json::String(base64::engine::general_purpose::STANDARD.encode(b)),
        Value::Enum(n) => match kind {
            FieldKind::Enum(t) => t
                .name_of(*n)
                .map(|name| Json::String(name.to_string()))
                .unwrap_or_else(|| Json::from(*n)),
            _ => Json::from(*n),
        },
        Value::Message(m) => Json::Object(m.normalized()),
        Value::List(items) => Json::Array(items.iter().map(|v| kind_to_json(kind, v)).collect()),
    }
}

// Non-finite floats use the proto3 JSON string forms.
fn float_to_json(v: f64) -> Json {
    if v.is_nan() {
        Json::String("NaN".to_string())
    } else if v.is_infinite() {
        let name = if v > 0.0 { "Infinity" } else { "-Infinity" };
        Json::String(name.to_string())
    } else {
        Json::from(v)
    }
}

// Proto3 JSON permits integers written as strings.
fn json_i64(json: &Json) -> Option<i64> {
    match json {
        Json::Number(n) => n.as_i64(),
        Json::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn json_u64(json: &Json) -> Option<u64> {
    match json {
        Json::Number(n) => n.as_u64(),
        Json::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn json_f64(json: &Json) -> Option<f64> {
    match json {
        Json::Number(n) => n.as_f64(),
        Json::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// A message instance.
///
/// Only explicitly set fields are stored; reads of unset fields yield the
/// schema default. Equality compares field values, so a field explicitly
/// set to its default equals the same field left unset.
#[derive(Clone)]
pub struct Message {
    message_type: MessageType,
    values: BTreeMap<u32, Value>,
}

impl Message {
    pub fn message_type(&self) -> &MessageType {
        &self.message_type
    }

    /// Value of a declared field, or `None` if the field does not exist.
    pub fn get(&self, name: &str) -> Option<Cow<'_, Value>> {
        self.message_type.field(name).map(|f| self.field_value(f))
    }

    /// Value of a field, falling back to its default.
    pub fn field_value(&self, field: &FieldDescriptor) -> Cow<'_, Value> {
        match self.values.get(&field.number) {
            Some(value) => Cow::Borrowed(value),
            None => Cow::Owned(field.default_value()),
        }
    }

    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<(), SchemaError> {
        let field = self
            .message_type
            .field(name)
            .ok_or_else(|| SchemaError::UnknownField {
                message: self.message_type.full_name().to_string(),
                field: name.to_string(),
            })?;
        let value = field
            .coerce(value.into())
            .map_err(|reason| self.message_type.invalid_value(field, reason))?;
        self.values.insert(field.number, value);
        Ok(())
    }

    /// Chainable form of [`Message::set`].
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Result<Self, SchemaError> {
        self.set(name, value)?;
        Ok(self)
    }

    /// True when every field holds its default.
    pub fn is_empty(&self) -> bool {
        self.message_type
            .fields()
            .iter()
            .all(|f| f.is_default(&self.field_value(f)))
    }

    /// Encode to protobuf wire bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode_raw(&mut buf);
        buf
    }

    fn encode_raw(&self, buf: &mut Vec<u8>) {
        for (number, value) in &self.values {
            let Some(field) = self.message_type.field_by_number(*number) else {
                continue;
            };

            match value {
                Value::List(items) if items.is_empty() => {}
                Value::List(items) if field.kind.is_packable() => {
                    let mut packed = Vec::new();
                    for item in items {
                        encode_scalar(item, &mut packed);
                    }
                    encode_key(*number, WireType::LengthDelimited, buf);
                    encode_varint(packed.len() as u64, buf);
                    buf.extend_from_slice(&packed);
                }
                Value::List(items) => {
                    for item in items {
                        encode_field(*number, &field.kind, item, buf);
                    }
                }
                // Set sub-messages are written even when empty.
                Value::Message(_) => encode_field(*number, &field.kind, value, buf),
                other if field.is_default(other) => {}
                other => encode_field(*number, &field.kind, other, buf),
            }
        }
    }

    /// Normalized form: field name to JSON value in declaration order,
    /// omitting fields that hold their default.
    pub fn normalized(&self) -> Map<String, Json> {
        let mut map = Map::new();
        for field in self.message_type.fields() {
            let value = self.field_value(field);
            if field.is_default(&value) {
                continue;
            }
            map.insert(field.name.clone(), field.value_to_json(&value));
        }
        map
    }

    pub fn to_json(&self) -> Json {
        Json::Object(self.normalized())
    }
}

fn encode_field(number: u32, kind: &FieldKind, value: &Value, buf: &mut Vec<u8>) {
    encode_key(number, kind.wire_type(), buf);
    match value {
        Value::String(s) => {
            encode_varint(s.len() as u64, buf);
            buf.extend_from_slice(s.as_bytes());
        }
        Value::Bytes(b) => {
            encode_varint(b.len() as u64, buf);
            buf.extend_from_slice(b);
        }
        Value::Message(m) => {
            let inner = m.encode();
            encode_varint(inner.len() as u64, buf);
            buf.extend_from_slice(&inner);
        }
        scalar => encode_scalar(scalar, buf),
    }
}

fn encode_scalar(value: &Value, buf: &mut Vec<u8>) {
    match value {
        Value::Bool(b) => encode_varint(u64::from(*b), buf),
        // Negative int32 values are sign-extended to ten bytes.
        Value::I32(v) | Value::Enum(v) => encode_varint(i64::from(*v) as u64, buf),
        Value::I64(v) => encode_varint(*v as u64, buf),
        Value::U32(v) => encode_varint(u64::from(*v), buf),
        Value::U64(v) => encode_varint(*v, buf),
        Value::F32(v) => buf.put_f32_le(*v),
        Value::F64(v) => buf.put_f64_le(*v),
        _ => {}
    }
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.message_type == other.message_type
            && self
                .message_type
                .fields()
                .iter()
                .all(|f| self.field_value(f) == other.field_value(f))
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.message_type.full_name(), self.to_json())
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}: {}>", self.message_type.full_name(), self.to_json())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{complex_message_type, echo_request_type};
    use serde_json::json;

    #[test]
    fn test_encode_matches_wire_format() {
        let msg = echo_request_type().new_message().with("msg", "woof").unwrap();
        assert_eq!(msg.encode(), vec![0x0a, 0x04, b'w', b'o', b'o', b'f']);

        let empty = echo_request_type().new_message();
        assert!(empty.encode().is_empty());
    }

    #[test]
    fn test_round_trip() {
        let t = complex_message_type();
        let msg = t
            .from_json(&json!({
                "msg": {"msg": "woof", "count": -3},
                "uid": 123,
                "date": {"month": 10, "day": 16},
                "type": "ECHO_DOUBLE",
                "tags": ["a", "b"],
                "scores": [1, 2, 300],
                "ratio": 0.5,
                "payload": "aGk="
            }))
            .unwrap();

        let decoded = t.decode(&msg.encode()).unwrap();
        assert_eq!(decoded, msg);
        assert_eq!(decoded.get("uid").unwrap().as_i64(), Some(123));
    }

    #[test]
    fn test_non_finite_floats() {
        let t = complex_message_type();
        let msg = t.new_message().with("ratio", f32::NAN).unwrap();
        assert_eq!(msg, msg.clone());
        assert_eq!(t.decode(&msg.encode()).unwrap(), msg);
        assert_eq!(Json::Object(msg.normalized()), json!({"ratio": "NaN"}));
        assert_eq!(t.from_json(&json!({"ratio": "NaN"})).unwrap(), msg);

        let msg = t.new_message().with("ratio", f32::NEG_INFINITY).unwrap();
        assert_eq!(Json::Object(msg.normalized()), json!({"ratio": "-Infinity"}));
        assert_eq!(t.from_json(&json!({"ratio": "-Infinity"})).unwrap(), msg);
        assert_ne!(msg, t.new_message().with("ratio", f32::INFINITY).unwrap());
    }

    #[test]
    fn test_negative_int32_round_trip() {
        let msg = echo_request_type().new_message().with("count", -1).unwrap();
        let bytes = msg.encode();
        // key + ten byte varint
        assert_eq!(bytes.len(), 11);
        let decoded = echo_request_type().decode(&bytes).unwrap();
        assert_eq!(decoded.get("count").unwrap().as_i64(), Some(-1));
    }

    #[test]
    fn test_normalized_omits_defaults() {
        let msg = echo_request_type()
            .new_message()
            .with("msg", "hi")
            .unwrap()
            .with("count", 0)
            .unwrap();
        assert_eq!(Json::Object(msg.normalized()), json!({"msg": "hi"}));

        let empty = complex_message_type().new_message();
        assert!(empty.normalized().is_empty());
        assert_eq!(empty.normalized(), empty.normalized());
    }

    #[test]
    fn test_normalized_preserves_declaration_order() {
        let msg = echo_request_type()
            .from_json(&json!({"count": 2, "msg": "hi"}))
            .unwrap();
        let keys: Vec<_> = msg.normalized().keys().cloned().collect();
        assert_eq!(keys, vec!["msg", "count"]);
    }

    #[test]
    fn test_explicit_default_equals_unset() {
        let t = echo_request_type();
        let explicit = t.new_message().with("msg", "").unwrap();
        assert_eq!(explicit, t.new_message());
    }

    #[test]
    fn test_enum_renders_by_name() {
        let msg = complex_message_type()
            .from_json(&json!({"type": 1}))
            .unwrap();
        assert_eq!(msg.to_json(), json!({"type": "ECHO_DOUBLE"}));
    }

    #[test]
    fn test_from_json_rejects_unknown_field() {
        let err = echo_request_type()
            .from_json(&json!({"nope": 1}))
            .unwrap_err();
        assert!(matches!(err, SchemaError::UnknownField { .. }));
    }

    #[test]
    fn test_from_json_accepts_numeric_strings() {
        let msg = echo_request_type()
            .from_json(&json!({"count": "42"}))
            .unwrap();
        assert_eq!(msg.get("count").unwrap().as_i64(), Some(42));
    }

    #[test]
    fn test_set_type_checks() {
        let mut msg = echo_request_type().new_message();
        assert!(msg.set("msg", 5).is_err());
        assert!(msg.set("count", i64::MAX).is_err());
        assert!(msg.set("count", 7u32).is_ok());
    }

    #[test]
    fn test_decode_unpacked_repeated() {
        let t = complex_message_type();
        // field 7 (scores) written unpacked, twice
        let bytes = [0x38, 0x01, 0x38, 0x02];
        let msg = t.decode(&bytes).unwrap();
        assert_eq!(
            msg.get("scores").unwrap().into_owned(),
            Value::List(vec![Value::I32(1), Value::I32(2)])
        );
    }

    #[test]
    fn test_decode_skips_unknown_fields() {
        // field 15 varint, then msg = "a"
        let bytes = [0x78, 0x05, 0x0a, 0x01, b'a'];
        let msg = echo_request_type().decode(&bytes).unwrap();
        assert_eq!(msg.get("msg").unwrap().as_str(), Some("a"));
    }

    #[test]
    fn test_decode_rejects_truncated_input() {
        let bytes = [0x0a, 0x09, b'a'];
        assert!(echo_request_type().decode(&bytes).is_err());
    }

    #[test]
    fn test_decode_rejects_wrong_wire_type() {
        // msg (field 1) sent as varint
        let bytes = [0x08, 0x01];
        assert!(echo_request_type().decode(&bytes).is_err());
    }
}

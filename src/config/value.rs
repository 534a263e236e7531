use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value as JsonValue;

/// Sentinel string meaning "inherit from the lower layer" in merges and
/// "unchanged at this index" in array diffs.
pub const DEFAULT_VALUE: &str = "__default__";

/// Reserved key listing config paths to load before the document itself.
pub const INCLUDE: &str = "__include__";

/// File extension picked up when an include path is a directory.
pub const INCLUDE_EXT: &str = ".config";

/// A recursively typed configuration value.
///
/// Integer widths are distinct types on purpose: merge, diff and schema
/// validation all treat `Int32(1)` and `Int64(1)` as a type change, the
/// same way the wire format does. Maps use `BTreeMap` so serialization
/// order is canonical.
#[derive(Clone, Debug, PartialEq)]
pub enum ConfigValue {
    Null,
    Bool(bool),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Double(f64),
    String(String),
    Array(Vec<ConfigValue>),
    Map(BTreeMap<String, ConfigValue>),
}

/// Type discriminant of a [`ConfigValue`], used for type-match rules.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ValueKind {
    Null,
    Bool,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Double,
    String,
    Array,
    Map,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Null => "null",
            ValueKind::Bool => "bool",
            ValueKind::Int32 => "int32",
            ValueKind::UInt32 => "uint32",
            ValueKind::Int64 => "int64",
            ValueKind::UInt64 => "uint64",
            ValueKind::Double => "double",
            ValueKind::String => "string",
            ValueKind::Array => "array",
            ValueKind::Map => "map",
        };
        f.write_str(name)
    }
}

impl ConfigValue {
    #[inline]
    pub fn kind(&self) -> ValueKind {
        match self {
            ConfigValue::Null => ValueKind::Null,
            ConfigValue::Bool(_) => ValueKind::Bool,
            ConfigValue::Int32(_) => ValueKind::Int32,
            ConfigValue::UInt32(_) => ValueKind::UInt32,
            ConfigValue::Int64(_) => ValueKind::Int64,
            ConfigValue::UInt64(_) => ValueKind::UInt64,
            ConfigValue::Double(_) => ValueKind::Double,
            ConfigValue::String(_) => ValueKind::String,
            ConfigValue::Array(_) => ValueKind::Array,
            ConfigValue::Map(_) => ValueKind::Map,
        }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, ConfigValue::Null)
    }

    /// Is this the `"__default__"` placeholder?
    #[inline]
    pub fn is_default_sentinel(&self) -> bool {
        matches!(self, ConfigValue::String(s) if s == DEFAULT_VALUE)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, ConfigValue>> {
        match self {
            ConfigValue::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[ConfigValue]> {
        match self {
            ConfigValue::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Map member lookup; `None` for missing keys and non-maps.
    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.as_map().and_then(|m| m.get(key))
    }

    /// Empty map, the usual document root.
    pub fn map() -> ConfigValue {
        ConfigValue::Map(BTreeMap::new())
    }

    /// Build from parsed JSON. Integers land in the narrowest width that
    /// holds them: Int32, then UInt32, then Int64, then UInt64; anything
    /// non-integral becomes Double.
    pub fn from_json(v: &JsonValue) -> ConfigValue {
        match v {
            JsonValue::Null => ConfigValue::Null,
            JsonValue::Bool(b) => ConfigValue::Bool(*b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    if i >= i32::MIN as i64 && i <= i32::MAX as i64 {
                        ConfigValue::Int32(i as i32)
                    } else if i >= 0 && i <= u32::MAX as i64 {
                        ConfigValue::UInt32(i as u32)
                    } else {
                        ConfigValue::Int64(i)
                    }
                } else if let Some(u) = n.as_u64() {
                    ConfigValue::UInt64(u)
                } else {
                    ConfigValue::Double(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            JsonValue::String(s) => ConfigValue::String(s.clone()),
            JsonValue::Array(items) => {
                ConfigValue::Array(items.iter().map(ConfigValue::from_json).collect())
            }
            JsonValue::Object(obj) => ConfigValue::Map(
                obj.iter()
                    .map(|(k, v)| (k.clone(), ConfigValue::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Render back to JSON for serialization.
    pub fn to_json(&self) -> JsonValue {
        match self {
            ConfigValue::Null => JsonValue::Null,
            ConfigValue::Bool(b) => JsonValue::Bool(*b),
            ConfigValue::Int32(i) => JsonValue::from(*i),
            ConfigValue::UInt32(u) => JsonValue::from(*u),
            ConfigValue::Int64(i) => JsonValue::from(*i),
            ConfigValue::UInt64(u) => JsonValue::from(*u),
            ConfigValue::Double(d) => {
                serde_json::Number::from_f64(*d).map_or(JsonValue::Null, JsonValue::Number)
            }
            ConfigValue::String(s) => JsonValue::String(s.clone()),
            ConfigValue::Array(items) => {
                JsonValue::Array(items.iter().map(ConfigValue::to_json).collect())
            }
            ConfigValue::Map(m) => JsonValue::Object(
                m.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    /// Parse a JSON document string.
    pub fn from_json_str(s: &str) -> Result<ConfigValue, serde_json::Error> {
        serde_json::from_str::<JsonValue>(s).map(|v| ConfigValue::from_json(&v))
    }
}

impl From<&JsonValue> for ConfigValue {
    fn from(v: &JsonValue) -> Self {
        ConfigValue::from_json(v)
    }
}

impl From<&str> for ConfigValue {
    fn from(s: &str) -> Self {
        ConfigValue::String(s.to_string())
    }
}

impl From<bool> for ConfigValue {
    fn from(b: bool) -> Self {
        ConfigValue::Bool(b)
    }
}

impl From<i32> for ConfigValue {
    fn from(i: i32) -> Self {
        ConfigValue::Int32(i)
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

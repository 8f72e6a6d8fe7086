//! Value transcoding.
//!
//! A transcoder turns an application [`Value`] into the opaque byte payload
//! stored on the server plus a 32-bit type tag, which travels in the item's
//! flags. On the way back the tag tells the client which transcoder produced
//! the bytes; a transcoder refuses tags it does not own instead of guessing.
//!
//! | Transcoder | Tag    | Accepts                         |
//! |------------|--------|---------------------------------|
//! | `Raw`      | `0x01` | [`Value::Bytes`] only           |
//! | `Json`     | `0x02` | everything except `Bytes`       |
//! | `Native`   | `0x03` | everything (bincode)            |
//! | `Custom`   | chosen by the implementation             |
//!
//! Tag `0` is reserved for "untagged": such payloads are handed back as raw
//! bytes and never run through a transcoder.
use std::{collections::BTreeMap, fmt, sync::Arc};

use bincode::{
    Decode, Encode,
    config::{BigEndian, Configuration, Fixint},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const RAW_TAG: u32 = 0x01;
pub const JSON_TAG: u32 = 0x02;
pub const NATIVE_TAG: u32 = 0x03;

const NATIVE_CONFIG: Configuration<BigEndian, Fixint> = bincode::config::standard()
    .with_big_endian()
    .with_fixed_int_encoding();

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("data type tag {0:#x} is not owned by this transcoder")]
    InvalidDataType(u32),
    #[error("{transcoder} transcoder cannot represent {kind} values")]
    Unsupported {
        transcoder: &'static str,
        kind: &'static str,
    },
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("native encode: {0}")]
    NativeEncode(#[from] bincode::error::EncodeError),
    #[error("native decode: {0}")]
    NativeDecode(#[from] bincode::error::DecodeError),
    #[error("{0}")]
    Custom(String),
}

/// Application-level value stored in the cache.
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    fn to_json(&self) -> Result<serde_json::Value, TranscodeError> {
        use serde_json::Value as Json;

        Ok(match self {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Integer(i) => Json::from(*i),
            Value::Float(f) => Json::Number(serde_json::Number::from_f64(*f).ok_or(
                TranscodeError::Unsupported {
                    transcoder: "json",
                    kind: "non-finite float",
                },
            )?),
            Value::Text(s) => Json::String(s.clone()),
            Value::Bytes(_) => {
                return Err(TranscodeError::Unsupported {
                    transcoder: "json",
                    kind: self.kind(),
                });
            }
            Value::List(items) => {
                Json::Array(items.iter().map(Value::to_json).collect::<Result<_, _>>()?)
            }
            Value::Map(map) => Json::Object(
                map.iter()
                    .map(|(k, v)| Ok((k.clone(), v.to_json()?)))
                    .collect::<Result<_, TranscodeError>>()?,
            ),
        })
    }

    fn from_json(json: serde_json::Value) -> Self {
        use serde_json::Value as Json;

        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => n
                .as_i64()
                .map(Value::Integer)
                .unwrap_or_else(|| Value::Float(n.as_f64().unwrap_or(f64::NAN))),
            Json::String(s) => Value::Text(s),
            Json::Array(items) => Value::List(items.into_iter().map(Value::from_json).collect()),
            Json::Object(map) => Value::Map(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from_json(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Bytes(value)
    }
}

impl From<&[u8]> for Value {
    fn from(value: &[u8]) -> Self {
        Value::Bytes(value.to_vec())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

/// User-supplied codec for [`Transcoder::Custom`].
pub trait Transcode: fmt::Debug + Send + Sync {
    /// Tag written to the item's flags; must not collide with the built-in tags.
    fn tag(&self) -> u32;
    fn encode(&self, value: &Value) -> Result<Vec<u8>, TranscodeError>;
    fn decode(&self, bytes: &[u8]) -> Result<Value, TranscodeError>;
}

/// Selects how values are encoded for storage.
#[derive(Debug, Clone, Default)]
pub enum Transcoder {
    Raw,
    #[default]
    Json,
    Native,
    Custom(Arc<dyn Transcode>),
}

impl Transcoder {
    pub fn tag(&self) -> u32 {
        match self {
            Transcoder::Raw => RAW_TAG,
            Transcoder::Json => JSON_TAG,
            Transcoder::Native => NATIVE_TAG,
            Transcoder::Custom(inner) => inner.tag(),
        }
    }

    pub fn encode(&self, value: &Value) -> Result<(Vec<u8>, u32), TranscodeError> {
        let bytes = match self {
            Transcoder::Raw => match value {
                Value::Bytes(bytes) => bytes.clone(),
                other => {
                    return Err(TranscodeError::Unsupported {
                        transcoder: "raw",
                        kind: other.kind(),
                    });
                }
            },
            Transcoder::Json => serde_json::to_vec(&value.to_json()?)?,
            Transcoder::Native => bincode::encode_to_vec(value, NATIVE_CONFIG)?,
            Transcoder::Custom(inner) => inner.encode(value)?,
        };
        Ok((bytes, self.tag()))
    }

    /// Decode `bytes` stored under `tag`; a tag owned by another transcoder
    /// fails without touching the bytes.
    pub fn decode(&self, bytes: &[u8], tag: u32) -> Result<Value, TranscodeError> {
        if tag != self.tag() {
            return Err(TranscodeError::InvalidDataType(tag));
        }

        match self {
            Transcoder::Raw => Ok(Value::Bytes(bytes.to_vec())),
            Transcoder::Json => Ok(Value::from_json(serde_json::from_slice(bytes)?)),
            Transcoder::Native => {
                let (value, read) = bincode::decode_from_slice(bytes, NATIVE_CONFIG)?;
                if read != bytes.len() {
                    return Err(TranscodeError::Custom(format!(
                        "native decode left {} trailing bytes",
                        bytes.len() - read
                    )));
                }
                Ok(value)
            }
            Transcoder::Custom(inner) => inner.decode(bytes),
        }
    }
}

/// Configuration-facing selector for the built-in transcoders.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Raw,
    #[default]
    Json,
    Native,
}

impl From<ValueType> for Transcoder {
    fn from(value: ValueType) -> Self {
        match value {
            ValueType::Raw => Transcoder::Raw,
            ValueType::Json => Transcoder::Json,
            ValueType::Native => Transcoder::Native,
        }
    }
}

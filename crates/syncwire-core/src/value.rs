use crate::error::{ErrorClass, ErrorOrigin, InternalError};
use serde_json::Value as Json;
use thiserror::Error as ThisError;
use ulid::Ulid;

///
/// ValueKind
///
/// Schema-level classification of scalar wire values. Field models and
/// parameter shapes are declared in terms of kinds; the codec uses the
/// declared kind to pick the decode target.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ValueKind {
    Bool,
    Int,
    Uint,
    Float,
    Text,
    Timestamp,
    Ulid,
}

impl ValueKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Uint => "uint",
            Self::Float => "float",
            Self::Text => "text",
            Self::Timestamp => "timestamp",
            Self::Ulid => "ulid",
        }
    }
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

///
/// ValueCodecError
///
/// Decode failures for scalar wire values. Always a protocol-level
/// problem: the client sent a payload that does not fit the declared
/// schema kind.
///

#[derive(Debug, ThisError)]
pub enum ValueCodecError {
    #[error("expected {expected} value, found {found}")]
    KindMismatch { expected: ValueKind, found: String },

    #[error("number {value} out of range for {kind}")]
    OutOfRange { kind: ValueKind, value: String },

    #[error("invalid ulid text: {0}")]
    InvalidUlid(String),
}

impl From<ValueCodecError> for InternalError {
    fn from(err: ValueCodecError) -> Self {
        Self::new(ErrorClass::Unsupported, ErrorOrigin::Decode, err.to_string())
    }
}

///
/// Value
///
/// Scalar wire value. `Timestamp` rides as epoch milliseconds; `Ulid`
/// as its canonical 26-character text form. `List` only ever contains
/// scalars (reference lists are modelled at the domain layer).
///
/// Equality is structural; floats compare by bit pattern so snapshot
/// diffing stays stable in the presence of NaN.
///

#[derive(Clone, Debug)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    Text(String),
    Timestamp(i64),
    Ulid(Ulid),
    List(Vec<Value>),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Uint(a), Self::Uint(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Timestamp(a), Self::Timestamp(b)) => a == b,
            (Self::Ulid(a), Self::Ulid(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Value {
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Encode this value for the JSON wire format.
    #[must_use]
    pub fn to_json(&self) -> Json {
        match self {
            Self::Null => Json::Null,
            Self::Bool(v) => Json::Bool(*v),
            Self::Int(v) => Json::from(*v),
            Self::Uint(v) => Json::from(*v),
            Self::Float(v) => serde_json::Number::from_f64(*v).map_or(Json::Null, Json::Number),
            Self::Text(v) => Json::String(v.clone()),
            Self::Timestamp(v) => Json::from(*v),
            Self::Ulid(v) => Json::String(v.to_string()),
            Self::List(items) => Json::Array(items.iter().map(Self::to_json).collect()),
        }
    }

    /// Decode a JSON wire value into the declared scalar kind.
    ///
    /// JSON null decodes to `Value::Null` regardless of kind; the
    /// nullability decision belongs to the caller.
    pub fn from_json(kind: ValueKind, json: &Json) -> Result<Self, ValueCodecError> {
        if json.is_null() {
            return Ok(Self::Null);
        }

        let mismatch = |found: &Json| ValueCodecError::KindMismatch {
            expected: kind,
            found: json_type_name(found).to_string(),
        };

        match kind {
            ValueKind::Bool => json.as_bool().map(Self::Bool).ok_or_else(|| mismatch(json)),
            ValueKind::Int => match json.as_i64() {
                Some(v) => Ok(Self::Int(v)),
                None if json.is_number() => Err(ValueCodecError::OutOfRange {
                    kind,
                    value: json.to_string(),
                }),
                None => Err(mismatch(json)),
            },
            ValueKind::Uint => match json.as_u64() {
                Some(v) => Ok(Self::Uint(v)),
                None if json.is_number() => Err(ValueCodecError::OutOfRange {
                    kind,
                    value: json.to_string(),
                }),
                None => Err(mismatch(json)),
            },
            ValueKind::Float => json.as_f64().map(Self::Float).ok_or_else(|| mismatch(json)),
            ValueKind::Text => json
                .as_str()
                .map(|s| Self::Text(s.to_string()))
                .ok_or_else(|| mismatch(json)),
            ValueKind::Timestamp => match json.as_i64() {
                Some(v) => Ok(Self::Timestamp(v)),
                None if json.is_number() => Err(ValueCodecError::OutOfRange {
                    kind,
                    value: json.to_string(),
                }),
                None => Err(mismatch(json)),
            },
            ValueKind::Ulid => {
                let text = json.as_str().ok_or_else(|| mismatch(json))?;
                Ulid::from_string(text)
                    .map(Self::Ulid)
                    .map_err(|_| ValueCodecError::InvalidUlid(text.to_string()))
            }
        }
    }

    /// Decode a JSON array of scalars of one declared kind.
    pub fn list_from_json(kind: ValueKind, json: &Json) -> Result<Self, ValueCodecError> {
        let Json::Array(items) = json else {
            return Err(ValueCodecError::KindMismatch {
                expected: kind,
                found: json_type_name(json).to_string(),
            });
        };

        let mut out = Vec::with_capacity(items.len());
        for item in items {
            out.push(Self::from_json(kind, item)?);
        }

        Ok(Self::List(out))
    }
}

const fn json_type_name(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "bool",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

//! Wire messages: the call envelope and the tagged call result.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::pipeline::types::{CallError, ErrorKind};

/// One call: an operation name plus its named arguments.
///
/// Serialized flat, e.g. `{"operation": "evict", "urls": ["http://x/a"]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallEnvelope {
    pub operation: String,
    #[serde(flatten)]
    pub arguments: Map<String, Value>,
}

impl CallEnvelope {
    /// Build an envelope from any argument struct that serializes to an object.
    pub fn new(operation: impl Into<String>, arguments: impl Serialize) -> Result<Self, serde_json::Error> {
        let arguments = match serde_json::to_value(arguments)? {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(serde::ser::Error::custom(format!(
                    "call arguments must be an object, got {other}"
                )))
            }
        };
        Ok(Self {
            operation: operation.into(),
            arguments,
        })
    }

    /// Deserialize the arguments into the operation's typed argument struct.
    pub fn decode_arguments<T: DeserializeOwned>(&self) -> Result<T, CallError> {
        serde_json::from_value(Value::Object(self.arguments.clone())).map_err(|e| {
            CallError::InvalidArguments {
                operation: self.operation.clone(),
                message: e.to_string(),
            }
        })
    }
}

/// Structured description of a failed call, enough to re-raise it remotely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDescriptor {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
}

impl From<&CallError> for ErrorDescriptor {
    fn from(err: &CallError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
            code: err.code(),
        }
    }
}

impl fmt::Display for ErrorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(code) = self.code {
            write!(f, " (code {code})")?;
        }
        Ok(())
    }
}

impl std::error::Error for ErrorDescriptor {}

/// The single value written back on every connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CallResult {
    Ok { value: Value },
    Error { error: ErrorDescriptor },
}

impl CallResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, CallResult::Ok { .. })
    }

    pub fn into_result(self) -> Result<Value, ErrorDescriptor> {
        match self {
            CallResult::Ok { value } => Ok(value),
            CallResult::Error { error } => Err(error),
        }
    }
}

impl From<Result<Value, CallError>> for CallResult {
    fn from(result: Result<Value, CallError>) -> Self {
        match result {
            Ok(value) => CallResult::Ok { value },
            Err(err) => CallResult::Error {
                error: ErrorDescriptor::from(&err),
            },
        }
    }
}

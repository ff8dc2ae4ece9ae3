//! Request/response descriptors and the pipeline error type.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// An outbound HTTP request as built by the client process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    /// Base64 on the wire.
    #[serde(default, with = "body_encoding::optional")]
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: "GET".to_string(),
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn post(url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            method: "POST".to_string(),
            url: url.into(),
            headers: Vec::new(),
            body: Some(body.into()),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// True when the request carries a non-empty body.
    pub fn is_body_bearing(&self) -> bool {
        self.body.as_ref().is_some_and(|body| !body.is_empty())
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint {
            url: self.url.clone(),
            body_bearing: self.is_body_bearing(),
        }
    }
}

/// A fully buffered upstream response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpResponse {
    pub status: u16,
    /// Final URL. Equal to the request URL since redirects are never followed.
    pub url: String,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    /// Base64 on the wire.
    #[serde(default, with = "body_encoding")]
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// First header value matching `name`, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Serde adapters carrying byte bodies as standard base64 strings.
mod body_encoding {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(D::Error::custom)
    }

    pub mod optional {
        use base64::engine::general_purpose::STANDARD;
        use base64::Engine;
        use serde::de::Error as _;
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            body: &Option<Vec<u8>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match body {
                Some(bytes) => super::serialize(bytes, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Vec<u8>>, D::Error> {
            Option::<String>::deserialize(deserializer)?
                .map(|encoded| STANDARD.decode(encoded).map_err(D::Error::custom))
                .transpose()
        }
    }
}

/// Cache key: the request URL plus whether the request carries a body.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    pub url: String,
    pub body_bearing: bool,
}

impl Fingerprint {
    /// Coarse method label used in diagnostics.
    pub fn method_label(&self) -> &'static str {
        if self.body_bearing {
            "POST"
        } else {
            "GET"
        }
    }

    /// True when this entry belongs to `url` once both are normalized.
    pub fn matches_url(&self, url: &str) -> bool {
        normalize_url(&self.url) == normalize_url(url)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method_label(), self.url)
    }
}

/// Strip one trailing `.json` and then one trailing slash.
pub fn normalize_url(url: &str) -> &str {
    let url = url.strip_suffix(".json").unwrap_or(url);
    url.strip_suffix('/').unwrap_or(url)
}

/// Proxy URLs keyed by scheme (`http`, `https` or `all`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProxySettings(BTreeMap<String, String>);

impl ProxySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, scheme: impl Into<String>, proxy_url: impl Into<String>) -> Self {
        self.0.insert(scheme.into(), proxy_url.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Per-call execution options that travel next to the request.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    pub proxies: ProxySettings,
    /// Overrides the executor's default timeout.
    pub timeout: Option<Duration>,
}

/// Failure category carried across the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnknownOperation,
    InvalidArguments,
    InvalidUrl,
    Connect,
    Timeout,
    Io,
    InvalidRequest,
    ExecutorClosed,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::UnknownOperation => "unknown_operation",
            ErrorKind::InvalidArguments => "invalid_arguments",
            ErrorKind::InvalidUrl => "invalid_url",
            ErrorKind::Connect => "connect",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Io => "io",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::ExecutorClosed => "executor_closed",
            ErrorKind::Internal => "internal",
        }
    }

    /// Connect, read, timeout and shutdown failures all count as IO.
    pub fn is_io(&self) -> bool {
        matches!(
            self,
            ErrorKind::Connect | ErrorKind::Timeout | ErrorKind::Io | ErrorKind::ExecutorClosed
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while executing a call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    #[error("unknown operation `{0}`")]
    UnknownOperation(String),

    #[error("invalid arguments for `{operation}`: {message}")]
    InvalidArguments { operation: String, message: String },

    #[error("invalid url `{url}`: {message}")]
    InvalidUrl { url: String, message: String },

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("transport error: {message}")]
    Io { message: String, status: Option<u16> },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("HTTP executor is closed")]
    ExecutorClosed,

    #[error("internal error: {0}")]
    Internal(String),
}

impl CallError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CallError::UnknownOperation(_) => ErrorKind::UnknownOperation,
            CallError::InvalidArguments { .. } => ErrorKind::InvalidArguments,
            CallError::InvalidUrl { .. } => ErrorKind::InvalidUrl,
            CallError::Connect(_) => ErrorKind::Connect,
            CallError::Timeout(_) => ErrorKind::Timeout,
            CallError::Io { .. } => ErrorKind::Io,
            CallError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            CallError::ExecutorClosed => ErrorKind::ExecutorClosed,
            CallError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Upstream HTTP status attached to the failure, if any.
    pub fn code(&self) -> Option<u16> {
        match self {
            CallError::Io { status, .. } => *status,
            _ => None,
        }
    }

    /// Classify a transport failure from the outbound client.
    pub fn from_transport(err: &reqwest::Error) -> Self {
        let message = error_chain(err);
        if err.is_timeout() {
            CallError::Timeout(message)
        } else if err.is_connect() {
            CallError::Connect(message)
        } else if err.is_builder() {
            CallError::InvalidRequest(message)
        } else {
            CallError::Io {
                message,
                status: err.status().map(|s| s.as_u16()),
            }
        }
    }
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

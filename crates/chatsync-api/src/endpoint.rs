// ── Endpoint descriptor ──
//
// An opaque description of one remote call. The full endpoint catalogue
// lives outside this crate; the sync engine only builds the handful of
// descriptors its workers need.

use serde::Serialize;

/// HTTP method of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl From<Method> for reqwest::Method {
    fn from(m: Method) -> Self {
        match m {
            Method::Get => Self::GET,
            Method::Post => Self::POST,
            Method::Put => Self::PUT,
            Method::Patch => Self::PATCH,
            Method::Delete => Self::DELETE,
        }
    }
}

/// A single remote call: path, method, query, and optional JSON body.
///
/// `path` is relative to the API base URL (no leading slash).
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
    /// The server needs the realtime connection id to attach this call's
    /// side effects (e.g. watching channels) to the live connection.
    pub requires_connection_id: bool,
}

impl Endpoint {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            requires_connection_id: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Attach a JSON body. Serialization failures surface when the body is
    /// built, not when the request is sent.
    pub fn with_body<B: Serialize>(mut self, body: &B) -> Result<Self, crate::Error> {
        let value = serde_json::to_value(body).map_err(|e| crate::Error::Deserialization {
            message: e.to_string(),
            body: String::new(),
        })?;
        self.body = Some(value);
        Ok(self)
    }

    pub fn requiring_connection_id(mut self) -> Self {
        self.requires_connection_id = true;
        self
    }
}

//! Request description and decoded response bodies.

use std::time::Duration;

pub use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::SynclineError;

/// Body of an outgoing request.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(serde_json::Value),
    Form(Vec<(String, String)>),
    Bytes {
        content_type: String,
        data: Vec<u8>,
    },
}

/// One logical API call, independent of provider and credentials.
///
/// `path` is joined onto the adapter's base URL unless it is already an
/// absolute `http(s)://` URL. Query entries with a `None` value are omitted.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use syncline::client::RequestSpec;
///
/// let spec = RequestSpec::get("/customers")
///     .query("limit", 50)
///     .query_opt("after", None::<String>)
///     .timeout(Duration::from_secs(10));
/// assert_eq!(spec.query.len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, Option<String>)>,
    pub body: Option<RequestBody>,
    /// Overrides the client-wide timeout for each attempt.
    pub timeout: Option<Duration>,
    pub skip_retry: bool,
    /// Applied after the default headers, so they win.
    pub headers: Vec<(String, String)>,
    pub cancel: Option<CancellationToken>,
}

impl RequestSpec {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            timeout: None,
            skip_retry: false,
            headers: Vec::new(),
            cancel: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), Some(value.to_string())));
        self
    }

    pub fn query_opt<V: ToString>(mut self, key: impl Into<String>, value: Option<V>) -> Self {
        self.query
            .push((key.into(), value.map(|value| value.to_string())));
        self
    }

    pub fn json_value(mut self, body: serde_json::Value) -> Self {
        self.body = Some(RequestBody::Json(body));
        self
    }

    /// Serialize `body` as the JSON payload.
    pub fn json<B: Serialize + ?Sized>(self, body: &B) -> Result<Self, SynclineError> {
        Ok(self.json_value(serde_json::to_value(body)?))
    }

    pub fn form(mut self, fields: Vec<(String, String)>) -> Self {
        self.body = Some(RequestBody::Form(fields));
        self
    }

    pub fn bytes(mut self, content_type: impl Into<String>, data: Vec<u8>) -> Self {
        self.body = Some(RequestBody::Bytes {
            content_type: content_type.into(),
            data,
        });
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Make exactly one attempt, whatever the failure.
    pub fn skip_retry(mut self) -> Self {
        self.skip_retry = true;
        self
    }

    pub fn cancel_on(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn is_absolute(&self) -> bool {
        self.path.starts_with("https://") || self.path.starts_with("http://")
    }
}

/// Decoded body of a successful response.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(serde_json::Value),
    Binary(Vec<u8>),
    /// 204 or a zero-length body.
    Empty,
}

/// Successful response as returned by `execute_raw`.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: ResponseBody,
}

impl ApiResponse {
    /// Decode the JSON body; an empty body decodes from `null`.
    pub fn into_json<T: DeserializeOwned>(self) -> Result<T, SynclineError> {
        match self.body {
            ResponseBody::Json(value) => Ok(serde_json::from_value(value)?),
            ResponseBody::Empty => Ok(serde_json::from_value(serde_json::Value::Null)?),
            ResponseBody::Binary(_) => Err(SynclineError::InvalidResponse(format!(
                "expected JSON, got {}",
                self.content_type.as_deref().unwrap_or("binary content")
            ))),
        }
    }

    pub fn into_bytes(self) -> Result<Vec<u8>, SynclineError> {
        match self.body {
            ResponseBody::Binary(data) => Ok(data),
            ResponseBody::Empty => Ok(Vec::new()),
            ResponseBody::Json(_) => Err(SynclineError::InvalidResponse(
                "expected binary content, got JSON".to_string(),
            )),
        }
    }
}

/// Decode raw bytes by status and content type.
pub(crate) fn decode_body(
    status: u16,
    content_type: Option<&str>,
    data: Vec<u8>,
) -> Result<ResponseBody, SynclineError> {
    if status == 204 || data.is_empty() {
        return Ok(ResponseBody::Empty);
    }

    let media_type = content_type
        .and_then(|value| value.split(';').next())
        .map(|value| value.trim().to_ascii_lowercase());

    match media_type.as_deref() {
        Some(media) if media.ends_with("json") => Ok(ResponseBody::Json(serde_json::from_slice(&data)?)),
        Some(media) if media.starts_with("text/") => Ok(ResponseBody::Json(
            serde_json::from_slice(&data)
                .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(&data).into_owned())),
        )),
        Some(_) => Ok(ResponseBody::Binary(data)),
        None => Ok(serde_json::from_slice(&data)
            .map(ResponseBody::Json)
            .unwrap_or(ResponseBody::Binary(data))),
    }
}

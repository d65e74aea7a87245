//! Turns a logical request into a transport-ready `HttpRequest`.
//!
//! Query parameters are appended to the parsed URL in insertion order and
//! form-encoded by `url`. A JSON body sets `content-type: application/json`.

use serde::Serialize;
use tracing::debug;
use url::Url;

use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, QueryValue};

#[derive(Debug, Clone)]
pub struct RequestBuilder {
    method: HttpMethod,
    path: String,
    query: Vec<(String, QueryValue)>,
    body: Option<Result<String, String>>,
}

impl RequestBuilder {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Put, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, path)
    }

    pub fn query(mut self, key: &str, value: impl Into<QueryValue>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }

    /// Serialize `body` as the JSON request body. A serialization failure is
    /// reported by `build`.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Self {
        self.body = Some(serde_json::to_string(body).map_err(|e| e.to_string()));
        self
    }

    pub fn build(self) -> Result<HttpRequest, ApiError> {
        let mut url = Url::parse(&self.path).map_err(|e| ApiError::MalformedUrl {
            url: self.path.clone(),
            reason: e.to_string(),
        })?;
        if !self.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &self.query {
                pairs.append_pair(key, &value.to_string());
            }
        }
        debug!(method = %self.method, url = %url, "built request");

        let (headers, body) = match self.body {
            Some(Ok(body)) => (
                vec![("content-type".to_string(), "application/json".to_string())],
                Some(body),
            ),
            Some(Err(reason)) => return Err(ApiError::Serialization(reason)),
            None => (Vec::new(), None),
        };

        Ok(HttpRequest {
            method: self.method,
            url: url.into(),
            headers,
            body,
        })
    }
}

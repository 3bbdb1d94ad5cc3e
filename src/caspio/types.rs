use crate::error::Result;
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

/// Field of a response body holding the row records.
pub const RESULT_FIELD: &str = "Result";

pub(crate) const WHERE_KEY: &str = "where";
pub(crate) const PAGE_SIZE_KEY: &str = "pageSize";
pub(crate) const PAGE_NUMBER_KEY: &str = "pageNumber";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    #[default]
    Json,
    Xml,
}

impl ResponseFormat {
    /// Unrecognised names fall back to JSON.
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "xml" => ResponseFormat::Xml,
            _ => ResponseFormat::Json,
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ResponseFormat::Json => "application/json",
            ResponseFormat::Xml => "application/xml",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Tables,
    Views,
}

impl ResourceKind {
    pub fn path(&self) -> &'static str {
        match self {
            ResourceKind::Tables => "tables",
            ResourceKind::Views => "views",
        }
    }
}

/// Row filter and paging options, sent as URL-encoded JSON in the `q` parameter.
///
/// Keys other than `where`, `pageSize` and `pageNumber` are passed through verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Query(Map<String, Value>);

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn where_clause(predicate: impl Into<String>) -> Self {
        Self::new().with(WHERE_KEY, predicate.into())
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Derive the query for one page, overriding any caller-supplied paging keys.
    pub fn page(&self, page_size: usize, page_number: usize) -> Self {
        self.clone()
            .with(PAGE_SIZE_KEY, page_size)
            .with(PAGE_NUMBER_KEY, page_number)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl From<Map<String, Value>> for Query {
    fn from(map: Map<String, Value>) -> Self {
        Query(map)
    }
}

#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub url: Url,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            body: None,
        }
    }

    pub fn put(url: Url, body: Value) -> Self {
        Self {
            method: Method::PUT,
            url,
            body: Some(body),
        }
    }

    pub fn post(url: Url, body: Value) -> Self {
        Self {
            method: Method::POST,
            url,
            body: Some(body),
        }
    }

    pub fn delete(url: Url) -> Self {
        Self {
            method: Method::DELETE,
            url,
            body: None,
        }
    }
}

/// One backend response, returned to callers whatever its status.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// Parsed JSON, the raw text as a string when it is not JSON, or `null` when empty.
    pub body: Value,
}

impl ApiResponse {
    pub(crate) async fn read(response: reqwest::Response) -> Result<Self> {
        let status = response.status();
        let headers = response.headers().clone();
        let text = response.text().await?;

        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            let parsed: std::result::Result<Value, _> = serde_json::from_str(&text);
            match parsed {
                Ok(value) => value,
                Err(_) => Value::String(text),
            }
        };

        Ok(Self {
            status,
            headers,
            body,
        })
    }

    pub fn is_ok(&self) -> bool {
        self.status == StatusCode::OK
    }

    /// Row records, or `None` when the body has no `Result` array.
    pub fn rows(&self) -> Option<&Vec<Value>> {
        self.body.get(RESULT_FIELD)?.as_array()
    }

    pub fn into_rows(self) -> Option<Vec<Value>> {
        match self.body {
            Value::Object(mut map) => match map.remove(RESULT_FIELD) {
                Some(Value::Array(rows)) => Some(rows),
                _ => None,
            },
            _ => None,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_helpers {
    use super::*;
    use serde_json::json;

    pub(crate) fn mock_rows(start: usize, count: usize) -> Vec<Value> {
        (start..start + count)
            .map(|id| json!({ "PK_ID": id, "Status": "Open" }))
            .collect()
    }

    pub(crate) fn mock_response(status: u16, body: Value) -> ApiResponse {
        ApiResponse {
            status: StatusCode::from_u16(status).unwrap(),
            headers: HeaderMap::new(),
            body,
        }
    }

    pub(crate) fn mock_page(start: usize, count: usize) -> ApiResponse {
        mock_response(200, json!({ RESULT_FIELD: mock_rows(start, count) }))
    }
}

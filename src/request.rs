//! Request description and the response handed back to callers.

use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use serde::de::DeserializeOwned;
use std::borrow::Cow;

/// Body sent with a request.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// Raw bytes, sent as-is.
    Bytes(Vec<u8>),
    /// URL-encoded form fields.
    Form(Vec<(String, String)>),
}

/// Everything needed to issue one top-level request. Immutable once built.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub method: Method,
    pub url: String,
    /// Extra headers; these win over the configured defaults.
    pub headers: HeaderMap,
    pub params: Vec<(String, String)>,
    pub body: Option<RequestBody>,
}

impl RequestSpec {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            params: Vec::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers.extend(headers);
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(RequestBody::Bytes(body.into()));
        self
    }

    pub fn form<K, V>(mut self, fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let fields = fields.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self.body = Some(RequestBody::Form(fields));
        self
    }
}

/// A response received from a transport.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: StatusCode, headers: HeaderMap, body: Vec<u8>) -> Self {
        Self { status, headers, body }
    }

    /// Read a reqwest response to completion.
    pub(crate) async fn read(response: reqwest::Response) -> Result<Self, reqwest::Error> {
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();
        Ok(Self { status, headers, body })
    }

    pub fn is_ok(&self) -> bool {
        self.status == StatusCode::OK
    }

    /// The body as text, replacing invalid UTF-8.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::{ACCEPT, CONTENT_TYPE};

    #[test]
    fn builder_collects_parts() {
        let spec = RequestSpec::post("https://example.com/api")
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .query("first", "250")
            .query("locale", "en-US")
            .body(r#"{"q":1}"#);

        assert_eq!(spec.method, Method::POST);
        assert_eq!(spec.headers[CONTENT_TYPE], "application/json");
        assert_eq!(spec.params.len(), 2);
        assert_eq!(spec.body, Some(RequestBody::Bytes(br#"{"q":1}"#.to_vec())));
    }

    #[test]
    fn later_headers_replace_earlier_ones() {
        let mut extra = HeaderMap::new();
        extra.insert(ACCEPT, HeaderValue::from_static("text/html"));
        let spec = RequestSpec::get("https://example.com")
            .header(ACCEPT, HeaderValue::from_static("*/*"))
            .headers(extra);
        assert_eq!(spec.headers.get_all(ACCEPT).iter().count(), 1);
        assert_eq!(spec.headers[ACCEPT], "text/html");
    }

    #[test]
    fn json_and_text_decode_body() {
        let response = Response::new(
            StatusCode::OK,
            HeaderMap::new(),
            br#"{"data":{"chartTitles":{"edges":[]}}}"#.to_vec(),
        );
        let value: serde_json::Value = response.json().unwrap();
        assert!(value["data"]["chartTitles"]["edges"].is_array());
        assert!(response.text().starts_with("{\"data\""));
        assert!(response.is_ok());
    }
}

//! Asynchronous HTTP client with a per-host session cache.
//!
//! Every hostname gets one reusable [`reqwest::Client`], created lazily and
//! kept for the process lifetime, so connection pools are shared between
//! requests to the same exchange. Responses are parsed as JSON when
//! possible; a non-JSON success body is returned as a plain string with a
//! warning. There is no automatic retry — callers decide.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use serde_json::Value;
use url::Url;

use crate::error::{QuantError, Result};

/// Request body shapes accepted by [`HttpClient::fetch`].
#[derive(Debug, Clone)]
pub enum RequestBody {
    /// Pre-serialized body sent verbatim with `Content-Type: application/json`.
    Raw(String),
    /// Value serialized to JSON by the client.
    Json(Value),
}

/// HTTP client holding one session per hostname.
pub struct HttpClient {
    proxy: Option<String>,
    sessions: Mutex<HashMap<String, reqwest::Client>>,
}

impl HttpClient {
    /// Create a client. `proxy` applies to every session built afterwards.
    pub fn new(proxy: Option<String>) -> Self {
        Self {
            proxy,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Perform an HTTP request.
    ///
    /// Returns the status code and the parsed body. A status outside
    /// 200-206 maps to [`QuantError::HttpStatus`]; transport failures map
    /// to [`QuantError::Http`].
    pub async fn fetch(
        &self,
        method: Method,
        url: &str,
        params: Option<&[(&str, String)]>,
        body: Option<RequestBody>,
        headers: Option<HeaderMap>,
        timeout: Duration,
    ) -> Result<(StatusCode, Value)> {
        let session = self.session_for(url)?;

        let mut request = session.request(method.clone(), url).timeout(timeout);
        if let Some(params) = params {
            request = request.query(params);
        }
        if let Some(headers) = headers {
            request = request.headers(headers);
        }
        request = match body {
            Some(RequestBody::Raw(text)) => request
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(text),
            Some(RequestBody::Json(value)) => request.json(&value),
            None => request,
        };

        tracing::debug!(%method, %url, "HTTP request");
        let response = request.send().await?;

        let status = response.status();
        let bytes = response.bytes().await.unwrap_or_default();
        if !(200..=206).contains(&status.as_u16()) {
            let body = String::from_utf8_lossy(&bytes).into_owned();
            tracing::error!(%method, %url, %status, body = %body, "HTTP error response");
            return Err(QuantError::HttpStatus { status, body });
        }

        let value = match serde_json::from_slice::<Value>(&bytes) {
            Ok(value) => value,
            Err(_) => {
                let text = String::from_utf8_lossy(&bytes).into_owned();
                tracing::warn!(%method, %url, "response body is not JSON");
                Value::String(text)
            }
        };
        Ok((status, value))
    }

    /// Get (or build) the session for `url`'s host.
    fn session_for(&self, url: &str) -> Result<reqwest::Client> {
        let parsed = Url::parse(url)?;
        let key = match (parsed.host_str(), parsed.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_owned(),
            (None, _) => {
                return Err(QuantError::InvalidArgument(format!("url has no host: {url}")));
            }
        };

        let mut sessions = self.sessions.lock().expect("http session cache poisoned");
        if let Some(session) = sessions.get(&key) {
            return Ok(session.clone());
        }

        let mut builder = reqwest::Client::builder();
        if let Some(proxy) = &self.proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }
        let session = builder.build()?;
        sessions.insert(key, session.clone());
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sessions_are_cached_per_host() {
        let client = HttpClient::new(None);
        client.session_for("https://api.binance.com/api/v3/time").unwrap();
        client.session_for("https://api.binance.com/api/v3/depth").unwrap();
        client.session_for("https://www.okex.com/api/spot/v3/accounts").unwrap();
        assert_eq!(client.sessions.lock().unwrap().len(), 2);
    }

    #[test]
    fn host_with_port_is_a_distinct_session() {
        let client = HttpClient::new(None);
        client.session_for("https://stream.binance.com:9443/ws/x").unwrap();
        client.session_for("https://stream.binance.com/ws/x").unwrap();
        assert_eq!(client.sessions.lock().unwrap().len(), 2);
    }

    #[test]
    fn url_without_host_is_rejected() {
        let client = HttpClient::new(None);
        assert!(client.session_for("unix:/tmp/sock").is_err());
    }
}

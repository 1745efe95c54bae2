//! Thin JSON-over-HTTPS client for the catalog server (§4.I).

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use tangent_domain::config::CatalogConfig;
use tangent_domain::{Error, Result};

/// A bearer token plus its expiry, used to decide whether a request is
/// signed with it or falls back to the static API key (§4.I auth policy).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BearerAuth {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl BearerAuth {
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// Per-request options (§4.I): method, path, query string, JSON body.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl RequestOptions {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::POST,
            path: path.into(),
            query: Vec::new(),
            body: Some(body),
        }
    }

    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::PUT,
            path: path.into(),
            query: Vec::new(),
            body: Some(body),
        }
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }
}

/// The well-known error envelope the catalog wraps non-2xx bodies in.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

/// A streamed response body, for the orchestrator to consume ndjson
/// progressively (`StreamRequest` in §4.I).
pub struct StreamBody {
    response: reqwest::Response,
}

impl StreamBody {
    /// Pull the next chunk of bytes off the wire, or `None` at EOF.
    pub async fn next_chunk(&mut self) -> Result<Option<bytes::Bytes>> {
        self.response
            .chunk()
            .await
            .map_err(|e| Error::FailedRequestToCatalog(format!("reading stream chunk: {e}")))
    }
}

/// Thin JSON-over-HTTPS client for the catalog server.
///
/// Authentication policy (§4.I): if a bearer token is present and
/// unexpired, use it; else fall back to the static API key resolved from
/// `catalog.api_key_env`; else send no auth header at all.
pub struct CatalogClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl CatalogClient {
    pub fn new(config: &CatalogConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| Error::FailedRequestToCatalog(format!("building http client: {e}")))?;

        let api_key = std::env::var(&config.api_key_env).ok().filter(|s| !s.is_empty());

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn build(&self, opts: &RequestOptions, auth: Option<&BearerAuth>) -> reqwest::RequestBuilder {
        let mut rb = self
            .http
            .request(opts.method.clone(), self.url(&opts.path))
            .query(&opts.query);

        rb = match auth {
            Some(bearer) if !bearer.is_expired() => rb.bearer_auth(&bearer.token),
            _ => match &self.api_key {
                Some(key) => rb.header("X-Api-Key", key),
                None => rb,
            },
        };

        if let Some(body) = &opts.body {
            rb = rb.json(body);
        }
        rb
    }

    /// Send a request and decode a JSON body, mapping non-2xx responses to
    /// `Error::FailedRequestToCatalog` via the `{result, error}` envelope.
    pub async fn request(&self, opts: RequestOptions, auth: Option<&BearerAuth>) -> Result<Value> {
        if let Some(bearer) = auth {
            if bearer.is_expired() {
                return Err(Error::TokenExpired);
            }
        }

        let resp = self
            .build(&opts, auth)
            .send()
            .await
            .map_err(|e| Error::FailedRequestToCatalog(format!("{} {}: {e}", opts.method, opts.path)))?;

        let status = resp.status();
        if status.is_success() {
            resp.json::<Value>()
                .await
                .map_err(|e| Error::FailedRequestToCatalog(format!("decoding response body: {e}")))
        } else {
            let text = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorEnvelope>(&text)
                .ok()
                .and_then(|env| env.error)
                .unwrap_or(text);
            Err(Error::FailedRequestToCatalog(format!(
                "{} {} -> {}: {}",
                opts.method, opts.path, status, message
            )))
        }
    }

    /// Variant of [`Self::request`] that returns the body as a reader so the
    /// caller can consume it progressively (ndjson, etc).
    pub async fn stream_request(
        &self,
        opts: RequestOptions,
        auth: Option<&BearerAuth>,
    ) -> Result<StreamBody> {
        if let Some(bearer) = auth {
            if bearer.is_expired() {
                return Err(Error::TokenExpired);
            }
        }

        let resp = self
            .build(&opts, auth)
            .send()
            .await
            .map_err(|e| Error::FailedRequestToCatalog(format!("{} {}: {e}", opts.method, opts.path)))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::FailedRequestToCatalog(format!(
                "{} {} -> {}: {}",
                opts.method, opts.path, status, text
            )));
        }

        Ok(StreamBody { response: resp })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_auth_expiry() {
        let expired = BearerAuth {
            token: "tok".into(),
            expires_at: Utc::now() - chrono::Duration::seconds(1),
        };
        assert!(expired.is_expired());

        let fresh = BearerAuth {
            token: "tok".into(),
            expires_at: Utc::now() + chrono::Duration::seconds(60),
        };
        assert!(!fresh.is_expired());
    }

    #[test]
    fn request_options_builders() {
        let opts = RequestOptions::get("/sessions/execution-state")
            .with_query("code", "abc")
            .with_query("code_verifier", "xyz");
        assert_eq!(opts.method, Method::GET);
        assert_eq!(opts.query.len(), 2);
        assert!(opts.body.is_none());
    }

    #[test]
    fn url_joins_base_and_path_without_double_slash() {
        let client = CatalogClient {
            http: reqwest::Client::new(),
            base_url: "https://catalog.example.com".into(),
            api_key: None,
        };
        assert_eq!(
            client.url("/skillsets/acme/billing"),
            "https://catalog.example.com/skillsets/acme/billing"
        );
    }
}

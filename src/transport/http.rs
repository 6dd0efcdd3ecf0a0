//! Transport over HTTP using `reqwest`.

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, Url};
use serde_json::Value;
use std::time::{Duration, Instant};

use super::{assigned_key, Transport};
use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::log::{debug, trace, warn};
use crate::path::{Query, ResourcePath};

/// Talks to the backend at `base_url`. The static credential, if any, is sent as the `auth`
/// query parameter on every request.
#[derive(Clone)]
pub struct HttpTransport {
    base_url: Url,
    auth: Option<String>,
    http_client: reqwest::Client,
}

impl HttpTransport {
    /// # Errors
    /// Returns `StoreError` if `base_url` does not parse or the HTTP client cannot be
    /// constructed.
    pub fn new(
        base_url: &str,
        auth: Option<String>,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| StoreError::StoreError(format!("invalid base url {base_url}: {e}")))?;
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url,
            auth,
            http_client,
        })
    }

    /// # Errors
    /// Returns `StoreError` if the base URL does not parse or the HTTP client cannot be built.
    pub fn from_config(config: &StoreConfig) -> Result<Self, StoreError> {
        Self::new(&config.base_url, config.auth.clone(), config.request_timeout)
    }

    /// The request URL for `path`. Segments are already escaped for the backend, and each is
    /// percent-encoded once more here so a server that decodes the URL path gets the escaped
    /// key back rather than the characters it stands for.
    fn url(&self, path: &ResourcePath) -> Result<Url, StoreError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|()| {
                StoreError::StoreError(format!("base url {} cannot take a path", self.base_url))
            })?;
            segments.pop_if_empty();
            match path.segments().split_last() {
                Some((last, parents)) => {
                    segments.extend(parents);
                    segments.push(&format!("{last}.json"));
                }
                None => {
                    segments.push(".json");
                }
            }
        }
        Ok(url)
    }

    fn with_params(&self, builder: RequestBuilder, query: &Query) -> RequestBuilder {
        let mut pairs = query.to_pairs();
        if let Some(auth) = &self.auth {
            pairs.push(("auth", auth.clone()));
        }
        builder.query(&pairs)
    }

    async fn send(
        &self,
        method: &str,
        path: &ResourcePath,
        builder: RequestBuilder,
    ) -> Result<Value, StoreError> {
        let start = Instant::now();
        trace!("{} {}", method, path);
        let response = builder.send().await.map_err(|e| {
            warn!("{} {} failed after {:?}: {}", method, path, start.elapsed(), e);
            StoreError::from(e)
        })?;
        debug!(
            "{} {} -> {} in {:?}",
            method,
            path,
            response.status(),
            start.elapsed()
        );
        Self::read_body(response).await
    }

    async fn read_body(response: Response) -> Result<Value, StoreError> {
        let status = response.status();
        if status.is_success() {
            let text = response.text().await?;
            if text.trim().is_empty() {
                return Ok(Value::Null);
            }
            return serde_json::from_str(&text)
                .map_err(|e| StoreError::MalformedResponse(format!("{e}: {text}")));
        }

        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        // The backend reports failures as `{"error": "..."}`.
        let message = serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|body| body.get("error").and_then(Value::as_str).map(str::to_string))
            .unwrap_or(text);
        Err(StoreError::BackendError {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, path: &ResourcePath, query: &Query) -> Result<Value, StoreError> {
        let builder = self.with_params(self.http_client.get(self.url(path)?), query);
        self.send("GET", path, builder).await
    }

    async fn put(&self, path: &ResourcePath, body: &Value) -> Result<Value, StoreError> {
        let builder = self.with_params(self.http_client.put(self.url(path)?), &Query::new());
        self.send("PUT", path, builder.json(body)).await
    }

    async fn append(&self, path: &ResourcePath, body: &Value) -> Result<String, StoreError> {
        let builder = self.with_params(self.http_client.post(self.url(path)?), &Query::new());
        let response = self.send("POST", path, builder.json(body)).await?;
        assigned_key(&response)
    }

    async fn delete(&self, path: &ResourcePath) -> Result<(), StoreError> {
        let builder = self
            .with_params(self.http_client.post(self.url(path)?), &Query::new())
            .query(&[("x-http-method-override", "DELETE")]);
        self.send("DELETE", path, builder).await?;
        Ok(())
    }
}

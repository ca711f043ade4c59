//! HTTP Cache Tier
//!
//! Implements CacheTier against a remote key/value service over HTTP.
//!
//! Wire protocol (JSON bodies):
//! - `GET    {base}/cache/{key}`                 200 value | 404 miss
//! - `PUT    {base}/cache/{key}?ttl_secs={n}`    2xx stored
//! - `DELETE {base}/cache/{key}`                 2xx removed | 404 absent
//! - `DELETE {base}/cache[?pattern={p}]`         2xx `{"removed": n}`

use crate::domain::errors::CacheError;
use crate::domain::ports::CacheTier;
use crate::domain::value_objects::ClearScope;
use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

#[derive(Deserialize)]
struct ClearResponse {
    #[serde(default)]
    removed: usize,
}

/// Remote cache tier spoken to over HTTP.
///
/// Every round trip is bounded by the configured timeout. Any transport
/// error or unexpected status comes back as [`CacheError::Unavailable`].
#[derive(Clone)]
pub struct HttpCacheTier {
    base: Url,
    client: reqwest::Client,
}

impl HttpCacheTier {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, CacheError> {
        let base = Url::parse(base_url)
            .map_err(|e| CacheError::Unavailable(format!("invalid base url: {}", e)))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CacheError::Unavailable(format!("client error: {}", e)))?;

        Ok(Self { base, client })
    }

    fn collection_url(&self) -> Result<Url, CacheError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| CacheError::Unavailable("base url cannot hold a path".to_string()))?
            .pop_if_empty()
            .push("cache");
        Ok(url)
    }

    fn key_url(&self, key: &str) -> Result<Url, CacheError> {
        let mut url = self.collection_url()?;
        url.path_segments_mut()
            .map_err(|_| CacheError::Unavailable("base url cannot hold a path".to_string()))?
            .push(key);
        Ok(url)
    }
}

fn unavailable(e: reqwest::Error) -> CacheError {
    if e.is_timeout() {
        CacheError::Unavailable("remote cache timeout".to_string())
    } else {
        CacheError::Unavailable(format!("request failed: {}", e))
    }
}

fn unexpected(status: StatusCode) -> CacheError {
    CacheError::Unavailable(format!("unexpected status: {}", status))
}

#[async_trait]
impl CacheTier for HttpCacheTier {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let resp = self
            .client
            .get(self.key_url(key)?)
            .send()
            .await
            .map_err(unavailable)?;

        match resp.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => resp
                .json::<Value>()
                .await
                .map(Some)
                .map_err(|e| CacheError::Encoding(e.to_string())),
            s => Err(unexpected(s)),
        }
    }

    async fn set(&self, key: &str, value: &Value, ttl: Duration) -> Result<(), CacheError> {
        let resp = self
            .client
            .put(self.key_url(key)?)
            .query(&[("ttl_secs", ttl.as_secs().max(1))])
            .json(value)
            .send()
            .await
            .map_err(unavailable)?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(unexpected(resp.status()))
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let resp = self
            .client
            .delete(self.key_url(key)?)
            .send()
            .await
            .map_err(unavailable)?;

        match resp.status() {
            StatusCode::NOT_FOUND => Ok(false),
            s if s.is_success() => Ok(true),
            s => Err(unexpected(s)),
        }
    }

    async fn clear(&self, scope: &ClearScope) -> Result<usize, CacheError> {
        let mut request = self.client.delete(self.collection_url()?);
        if let ClearScope::Pattern(p) = scope {
            request = request.query(&[("pattern", p.as_str())]);
        }

        let resp = request.send().await.map_err(unavailable)?;
        if !resp.status().is_success() {
            return Err(unexpected(resp.status()));
        }

        // Body is advisory
        Ok(resp
            .json::<ClearResponse>()
            .await
            .map(|r| r.removed)
            .unwrap_or(0))
    }
}

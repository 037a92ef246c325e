// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::{
    collections::HashMap,
    future::Future,
    pin::Pin,
    sync::Mutex,
    time::Duration,
};

use anyhow::{anyhow, Result};
use http_body_util::{BodyExt, Full};
use hyper::{
    body::Bytes,
    header::{CONTENT_TYPE, ETAG, IF_NONE_MATCH, USER_AGENT},
    Method, Request, StatusCode,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

use crate::ds_debug;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Answer of the config endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigResponse {
    pub body: Bytes,
    /// The controller answered `304 Not Modified` and `body` is the previously received one
    pub from_cache: bool,
}

/// HTTP access to the controller.
///
/// Implementations must bound every call by `timeout` and report non success statuses as
/// errors.
pub trait ControllerTransport: Send + Sync + 'static {
    fn get<'a>(&'a self, url: &'a str, timeout: Duration) -> BoxFuture<'a, Result<ConfigResponse>>;

    fn post<'a>(&'a self, url: &'a str, body: Bytes, timeout: Duration)
        -> BoxFuture<'a, Result<()>>;
}

#[derive(Debug, Clone)]
struct CachedResponse {
    etag: String,
    body: Bytes,
}

/// [`ControllerTransport`] over a plain HTTP/1 hyper client.
///
/// GET responses carrying an `ETag` are remembered per url and revalidated with
/// `If-None-Match` on the next request.
pub struct HyperTransport {
    client: Client<HttpConnector, Full<Bytes>>,
    cache: Mutex<HashMap<String, CachedResponse>>,
}

impl Default for HyperTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HyperTransport {
    pub fn new() -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(crate::constants::REQUEST_TIMEOUT));
        Self {
            client: Client::builder(TokioExecutor::new()).build(connector),
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn cached(&self, url: &str) -> Option<CachedResponse> {
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(url)
            .cloned()
    }

    fn store(&self, url: &str, entry: CachedResponse) {
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(url.to_string(), entry);
    }

    async fn fetch(&self, url: &str) -> Result<ConfigResponse> {
        let cached = self.cached(url);

        let mut req = Request::builder()
            .method(Method::GET)
            .uri(url)
            .header(USER_AGENT, concat!("dynamic-sampling/", env!("CARGO_PKG_VERSION")));
        if let Some(cached) = &cached {
            req = req.header(IF_NONE_MATCH, cached.etag.as_str());
        }
        let req = req
            .body(Full::new(Bytes::new()))
            .map_err(|e| anyhow!("Failed to build request: {}", e))?;

        let response = self
            .client
            .request(req)
            .await
            .map_err(|e| anyhow!("Failed to send request: {}", e))?;

        if response.status() == StatusCode::NOT_MODIFIED {
            if let Some(cached) = cached {
                return Ok(ConfigResponse {
                    body: cached.body,
                    from_cache: true,
                });
            }
            return Err(anyhow!("Controller answered 304 without a cached response"));
        }
        if !response.status().is_success() {
            return Err(anyhow!(
                "Controller returned error status: {}",
                response.status()
            ));
        }

        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| anyhow!("Failed to read response body: {}", e))?
            .to_bytes();

        if let Some(etag) = etag {
            ds_debug!("HyperTransport: caching {} with etag {}", url, etag);
            self.store(
                url,
                CachedResponse {
                    etag,
                    body: body.clone(),
                },
            );
        }
        Ok(ConfigResponse {
            body,
            from_cache: false,
        })
    }

    async fn send(&self, url: &str, body: Bytes) -> Result<()> {
        let req = Request::builder()
            .method(Method::POST)
            .uri(url)
            .header(CONTENT_TYPE, "application/json")
            .header(USER_AGENT, concat!("dynamic-sampling/", env!("CARGO_PKG_VERSION")))
            .body(Full::new(body))
            .map_err(|e| anyhow!("Failed to build request: {}", e))?;

        let response = self
            .client
            .request(req)
            .await
            .map_err(|e| anyhow!("Failed to send request: {}", e))?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "Controller returned error status: {}",
                response.status()
            ));
        }
        // Drain the body so the connection can go back to the pool
        let _ = response.into_body().collect().await;
        Ok(())
    }
}

impl ControllerTransport for HyperTransport {
    fn get<'a>(&'a self, url: &'a str, timeout: Duration) -> BoxFuture<'a, Result<ConfigResponse>> {
        Box::pin(async move {
            tokio::time::timeout(timeout, self.fetch(url))
                .await
                .map_err(|_| anyhow!("GET {} timed out after {:?}", url, timeout))?
        })
    }

    fn post<'a>(
        &'a self,
        url: &'a str,
        body: Bytes,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            tokio::time::timeout(timeout, self.send(url, body))
                .await
                .map_err(|_| anyhow!("POST {} timed out after {:?}", url, timeout))?
        })
    }
}

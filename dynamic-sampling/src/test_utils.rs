// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::{
    collections::VecDeque,
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use anyhow::{anyhow, Result};
use hyper::body::Bytes;

use crate::transport::{BoxFuture, ConfigResponse, ControllerTransport};

/// Scripted answer of [`MockTransport::get`]
#[derive(Debug, Clone)]
pub enum MockResponse {
    Body(&'static str),
    NotModified(&'static str),
    Fail,
}

#[derive(Debug, Default)]
struct MockState {
    responses: VecDeque<MockResponse>,
    gets: Vec<String>,
    posts: Vec<(String, serde_json::Value)>,
    failing_posts: Vec<String>,
}

/// In-memory [`ControllerTransport`] recording every call.
///
/// GET answers are consumed in order, once exhausted every GET fails.
#[derive(Debug, Default)]
pub struct MockTransport {
    state: Mutex<MockState>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn push_response(&self, response: MockResponse) -> &Self {
        self.lock().responses.push_back(response);
        self
    }

    /// POSTs to urls containing `fragment` fail
    pub fn fail_posts_to(&self, fragment: &str) -> &Self {
        self.lock().failing_posts.push(fragment.to_string());
        self
    }

    pub fn gets(&self) -> Vec<String> {
        self.lock().gets.clone()
    }

    pub fn posts(&self) -> Vec<(String, serde_json::Value)> {
        self.lock().posts.clone()
    }
}

impl ControllerTransport for MockTransport {
    fn get<'a>(&'a self, url: &'a str, _timeout: Duration) -> BoxFuture<'a, Result<ConfigResponse>> {
        Box::pin(async move {
            let mut state = self.lock();
            state.gets.push(url.to_string());
            match state.responses.pop_front() {
                Some(MockResponse::Body(body)) => Ok(ConfigResponse {
                    body: Bytes::from_static(body.as_bytes()),
                    from_cache: false,
                }),
                Some(MockResponse::NotModified(body)) => Ok(ConfigResponse {
                    body: Bytes::from_static(body.as_bytes()),
                    from_cache: true,
                }),
                Some(MockResponse::Fail) | None => Err(anyhow!("connection refused")),
            }
        })
    }

    fn post<'a>(
        &'a self,
        url: &'a str,
        body: Bytes,
        _timeout: Duration,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut state = self.lock();
            let body: serde_json::Value = serde_json::from_slice(&body)?;
            state.posts.push((url.to_string(), body));
            if state.failing_posts.iter().any(|f| url.contains(f.as_str())) {
                return Err(anyhow!("Controller returned error status: 500"));
            }
            Ok(())
        })
    }
}

use async_trait::async_trait;
use reqwest::Client;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use url::Url;

use crate::edgar::error::EdgarError;

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// One GET against the source system. Network-level failures map to
/// [`EdgarError::TransientFetch`]; any HTTP status is returned as a response.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &Url, headers: &[(&str, &str)]) -> Result<HttpResponse, EdgarError>;
}

pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(user_agent: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .gzip(true)
            .build()?;
        Ok(Self { client })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &Url, headers: &[(&str, &str)]) -> Result<HttpResponse, EdgarError> {
        log::debug!("GET {}", url);

        let mut request = self.client.get(url.as_str());
        for (key, value) in headers {
            request = request.header(*key, *value);
        }

        let response = request.send().await.map_err(|e| EdgarError::TransientFetch {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let status = response.status().as_u16();
        log::debug!("Response status for {}: {}", url, status);

        let body = response.bytes().await.map_err(|e| EdgarError::TransientFetch {
            url: url.to_string(),
            reason: format!("reading body: {}", e),
        })?;

        Ok(HttpResponse {
            status,
            body: body.to_vec(),
        })
    }
}

/// A scripted reply for [`MemoryTransport`].
#[derive(Debug, Clone)]
pub enum Scripted {
    Respond(HttpResponse),
    Fail(String),
}

/// In-memory transport serving fixed replies per URL, for offline runs and tests.
///
/// Each URL holds a queue of replies; the last one repeats once the queue is
/// drained. Unknown URLs answer 404.
#[derive(Default)]
pub struct MemoryTransport {
    routes: Mutex<HashMap<String, VecDeque<Scripted>>>,
    requests: Mutex<Vec<String>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url: &str, status: u16, body: impl Into<Vec<u8>>) {
        self.script(url, vec![Scripted::Respond(HttpResponse::new(status, body))]);
    }

    pub fn script(&self, url: &str, replies: Vec<Scripted>) {
        if let Ok(mut routes) = self.routes.lock() {
            routes.insert(url.to_string(), replies.into_iter().collect());
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn requests_for(&self, url: &str) -> usize {
        self.requests
            .lock()
            .map(|r| r.iter().filter(|u| u.as_str() == url).count())
            .unwrap_or(0)
    }

    pub fn requested_urls(&self) -> Vec<String> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn get(&self, url: &Url, _headers: &[(&str, &str)]) -> Result<HttpResponse, EdgarError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(url.to_string());
        }

        let reply = match self.routes.lock() {
            Ok(mut routes) => match routes.get_mut(url.as_str()) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            },
            Err(_) => None,
        };

        match reply {
            Some(Scripted::Respond(response)) => Ok(response),
            Some(Scripted::Fail(reason)) => Err(EdgarError::TransientFetch {
                url: url.to_string(),
                reason,
            }),
            None => Ok(HttpResponse::new(404, Vec::new())),
        }
    }
}

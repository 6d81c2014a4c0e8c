use std::error::Error as _;

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Proxy, RequestBuilder};
use tracing::debug;
use url::Url;

use super::{RequestStream, Transport};
use crate::config::NotifierConfig;
use crate::delivery::{RequestHandle, RequestState};
use crate::error::NotifyError;

/// Upper bound on cached proxied clients. Past this an arbitrary entry is
/// evicted; its pool closes once in-flight requests using it finish.
const MAX_PROXIED_CLIENTS: usize = 16;

/// reqwest-backed transport with one pooled client per proxy.
///
/// Direct requests use a client built with `no_proxy()`, so `HTTP_PROXY` and
/// friends never reroute them; only an explicit proxy address does.
#[derive(Debug)]
pub struct HttpTransport {
    config: NotifierConfig,
    direct: Client,
    proxied: DashMap<String, Client>,
}

impl HttpTransport {
    pub fn new(config: &NotifierConfig) -> Result<Self, NotifyError> {
        Ok(Self {
            direct: Self::build_client(config, None)?,
            config: config.clone(),
            proxied: DashMap::new(),
        })
    }

    pub fn build_client(config: &NotifierConfig, proxy: Option<&Url>) -> Result<Client, NotifyError> {
        let builder = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent.as_str())
            .gzip(true);

        let builder = match proxy {
            Some(url) => {
                let proxy = Proxy::all(url.clone())
                    .map_err(|e| NotifyError::config("proxy address", url.as_str(), e))?;
                builder.proxy(proxy)
            }
            None => builder.no_proxy(),
        };

        builder
            .build()
            .map_err(|e| NotifyError::config("HTTP client", config.endpoint.as_str(), e))
    }

    fn client_for(&self, proxy: Option<&Url>) -> Result<Client, NotifyError> {
        let Some(url) = proxy else {
            return Ok(self.direct.clone());
        };
        if let Some(client) = self.proxied.get(url.as_str()) {
            return Ok(client.clone());
        }
        let client = Self::build_client(&self.config, Some(url))?;
        debug!(proxy = %url, "Built proxied HTTP client");

        if self.proxied.len() >= MAX_PROXIED_CLIENTS {
            // The shard guard from iter() must be gone before remove().
            let victim = self.proxied.iter().next().map(|e| e.key().clone());
            if let Some(key) = victim {
                self.proxied.remove(&key);
                debug!(proxy = %key, "Evicted proxied HTTP client");
            }
        }

        Ok(self
            .proxied
            .entry(url.as_str().to_string())
            .or_insert(client)
            .clone())
    }

    pub fn proxied_client_count(&self) -> usize {
        self.proxied.len()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    /// Prepare the POST. Nothing goes on the wire until `finish`, which
    /// sends the buffered body with a `Content-Length`.
    async fn open_stream(
        &self,
        request: &RequestHandle,
    ) -> Result<Box<dyn RequestStream>, NotifyError> {
        let client = self.client_for(request.proxy())?;
        let builder = client
            .post(request.endpoint().clone())
            .header(CONTENT_TYPE, "application/json");

        Ok(Box::new(HttpRequestStream {
            request: Some(builder),
            body: Vec::with_capacity(request.body().len()),
        }))
    }
}

struct HttpRequestStream {
    request: Option<RequestBuilder>,
    body: Vec<u8>,
}

#[async_trait]
impl RequestStream for HttpRequestStream {
    async fn write_all(&mut self, body: &[u8]) -> Result<(), NotifyError> {
        if self.request.is_none() {
            return Err(NotifyError::transport(
                RequestState::StreamOpen,
                "request body already closed",
            ));
        }
        self.body.extend_from_slice(body);
        Ok(())
    }

    async fn finish(&mut self) -> Result<u16, NotifyError> {
        let request = self.request.take().ok_or_else(|| {
            NotifyError::transport(RequestState::AwaitingResponse, "response already consumed")
        })?;

        match request.body(std::mem::take(&mut self.body)).send().await {
            Ok(resp) => Ok(resp.status().as_u16()),
            Err(e) if e.is_timeout() => Err(NotifyError::Timeout {
                stage: RequestState::AwaitingResponse,
            }),
            Err(e) => Err(NotifyError::transport(
                RequestState::AwaitingResponse,
                error_chain(&e),
            )),
        }
    }
}

fn error_chain(e: &reqwest::Error) -> String {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}

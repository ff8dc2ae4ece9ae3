//! Outbound HTTP executor.
//!
//! # Responsibilities
//! - Own one pooled `reqwest::Client` for the whole server lifetime
//! - Build one extra client per distinct proxy configuration, on demand
//! - Never follow redirects so callers observe 3xx responses
//! - Fail in-flight and later calls promptly once closed

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::redirect::Policy;
use reqwest::{Client, ClientBuilder, Method, Proxy};
use std::time::{Duration, Instant};
use tokio::sync::watch;

use crate::config::ExecutorConfig;
use crate::observability::metrics;
use crate::pipeline::types::{CallError, CallOptions, HttpRequest, HttpResponse, ProxySettings};
use crate::pipeline::Stage;

/// Shared HTTP client wrapper; the bottom stage of the pipeline.
pub struct HttpExecutor {
    /// `None` once closed.
    client: ArcSwapOption<Client>,
    proxied: DashMap<ProxySettings, Client>,
    closed: watch::Sender<bool>,
    config: ExecutorConfig,
}

impl HttpExecutor {
    pub fn new(config: &ExecutorConfig) -> Result<Self, CallError> {
        let client = Self::builder(config)
            .build()
            .map_err(|e| CallError::Internal(format!("failed to build HTTP client: {e}")))?;
        let (closed, _) = watch::channel(false);

        Ok(Self {
            client: ArcSwapOption::from_pointee(client),
            proxied: DashMap::new(),
            closed,
            config: config.clone(),
        })
    }

    fn builder(config: &ExecutorConfig) -> ClientBuilder {
        Client::builder()
            .redirect(Policy::none())
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .pool_idle_timeout(Duration::from_secs(config.pool_idle_timeout_secs))
            .user_agent(config.user_agent.clone())
    }

    /// Stop serving calls. In-flight calls fail with [`CallError::ExecutorClosed`].
    pub fn close(&self) {
        if self.closed.send_replace(true) {
            return;
        }
        self.client.store(None);
        self.proxied.clear();
        tracing::info!("HTTP executor closed");
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    fn client_for(&self, proxies: &ProxySettings) -> Result<Client, CallError> {
        let base = self.client.load_full().ok_or(CallError::ExecutorClosed)?;
        if proxies.is_empty() {
            return Ok(Client::clone(&base));
        }
        if let Some(client) = self.proxied.get(proxies) {
            return Ok(client.clone());
        }

        let mut builder = Self::builder(&self.config);
        for (scheme, proxy_url) in proxies.iter() {
            let proxy = match scheme {
                "http" => Proxy::http(proxy_url),
                "https" => Proxy::https(proxy_url),
                "all" => Proxy::all(proxy_url),
                other => {
                    return Err(CallError::InvalidRequest(format!(
                        "unsupported proxy scheme `{other}`"
                    )))
                }
            }
            .map_err(|e| CallError::InvalidRequest(format!("invalid proxy `{proxy_url}`: {e}")))?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| CallError::Internal(format!("failed to build proxied client: {e}")))?;

        tracing::debug!(proxies = ?proxies, "Built proxied HTTP client");
        self.proxied.insert(proxies.clone(), client.clone());
        Ok(client)
    }

    async fn send(
        &self,
        request: &HttpRequest,
        options: &CallOptions,
    ) -> Result<HttpResponse, CallError> {
        let client = self.client_for(&options.proxies)?;
        let method = Method::from_bytes(request.method.to_ascii_uppercase().as_bytes())
            .map_err(|_| CallError::InvalidRequest(format!("invalid method `{}`", request.method)))?;
        let timeout = options
            .timeout
            .unwrap_or_else(|| Duration::from_secs(self.config.default_timeout_secs));

        let mut builder = client.request(method, &request.url).timeout(timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| CallError::from_transport(&e))?;

        let status = response.status().as_u16();
        let url = response.url().to_string();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| CallError::from_transport(&e))?
            .to_vec();

        Ok(HttpResponse {
            status,
            url,
            headers,
            body,
        })
    }
}

/// Resolves once the executor is closed.
async fn closed_signal(mut closed: watch::Receiver<bool>) {
    loop {
        let is_closed = *closed.borrow_and_update();
        if is_closed || closed.changed().await.is_err() {
            return;
        }
    }
}

#[async_trait]
impl Stage for HttpExecutor {
    async fn execute(
        &self,
        request: &HttpRequest,
        options: &CallOptions,
    ) -> Result<HttpResponse, CallError> {
        if self.is_closed() {
            return Err(CallError::ExecutorClosed);
        }

        tracing::info!(method = %request.method, url = %request.url, "Dispatching upstream request");
        let start = Instant::now();

        let result = tokio::select! {
            result = self.send(request, options) => result,
            () = closed_signal(self.closed.subscribe()) => Err(CallError::ExecutorClosed),
        };

        match &result {
            Ok(response) => metrics::record_upstream(response.status, start),
            Err(e) => {
                tracing::warn!(url = %request.url, error = %e, "Upstream request failed");
                metrics::record_upstream_error(e.kind().as_str());
            }
        }
        result
    }

    fn close(&self) {
        HttpExecutor::close(self);
    }
}

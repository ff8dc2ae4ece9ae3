//! Shared utilities for integration testing.
#![allow(dead_code)]

use async_trait::async_trait;
use std::io::{self, Write};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::time::Instant;

use request_gateway::config::{GatewayConfig, ListenerConfig};
use request_gateway::pipeline::{
    CallError, CallOptions, HitSink, HttpRequest, HttpResponse, Pipeline, Stage,
};
use request_gateway::rpc::ServerContext;
use request_gateway::lifecycle::{spawn_with_context, ServerHandle};

/// Start a mock backend that answers every request with `body` and counts hits.
pub async fn start_mock_backend(body: &'static str) -> (SocketAddr, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let counter = counter.clone();
                    tokio::spawn(async move {
                        let mut buf = [0u8; 4096];
                        let _ = socket.read(&mut buf).await;
                        counter.fetch_add(1, Ordering::SeqCst);
                        let response_str = format!(
                            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    (addr, hits)
}

/// Bottom pipeline stage that never touches the network.
#[derive(Default)]
pub struct CountingExecutor {
    pub starts: Mutex<Vec<(String, Instant)>>,
    calls: AtomicUsize,
}

impl CountingExecutor {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn start_times(&self, host: &str) -> Vec<Instant> {
        self.starts
            .lock()
            .unwrap()
            .iter()
            .filter(|(url, _)| url.contains(host))
            .map(|(_, at)| *at)
            .collect()
    }
}

#[async_trait]
impl Stage for CountingExecutor {
    async fn execute(
        &self,
        request: &HttpRequest,
        _options: &CallOptions,
    ) -> Result<HttpResponse, CallError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.starts
            .lock()
            .unwrap()
            .push((request.url.clone(), Instant::now()));
        Ok(HttpResponse {
            status: 200,
            url: request.url.clone(),
            headers: Vec::new(),
            body: format!("call {n}").into_bytes(),
        })
    }
}

/// Writer collecting hit diagnostics.
#[derive(Clone, Default)]
pub struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    pub fn text(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub fn loopback_config(port: u16) -> GatewayConfig {
    GatewayConfig {
        listener: ListenerConfig {
            address: "127.0.0.1".into(),
            port,
            ..ListenerConfig::default()
        },
        ..GatewayConfig::default()
    }
}

/// Start a gateway around `executor` on `port` (0 for ephemeral).
pub async fn start_gateway(
    port: u16,
    executor: Arc<dyn Stage>,
    min_interval: Duration,
) -> (ServerHandle, Captured) {
    start_gateway_with(&loopback_config(port), executor, min_interval).await
}

/// Start a gateway around `executor` with a custom listener configuration.
pub async fn start_gateway_with(
    config: &GatewayConfig,
    executor: Arc<dyn Stage>,
    min_interval: Duration,
) -> (ServerHandle, Captured) {
    let captured = Captured::default();
    let pipeline = Pipeline::new(executor, min_interval, HitSink::from_writer(captured.clone()));
    let context = Arc::new(ServerContext::new(pipeline));
    let handle = spawn_with_context(config, context).await.unwrap();
    (handle, captured)
}

/// Bottom stage answering every request with a fixed body.
pub struct FixedBodyExecutor {
    body: Vec<u8>,
    calls: AtomicUsize,
}

impl FixedBodyExecutor {
    pub fn new(body: Vec<u8>) -> Self {
        Self {
            body,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Stage for FixedBodyExecutor {
    async fn execute(
        &self,
        request: &HttpRequest,
        _options: &CallOptions,
    ) -> Result<HttpResponse, CallError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(HttpResponse {
            status: 200,
            url: request.url.clone(),
            headers: Vec::new(),
            body: self.body.clone(),
        })
    }
}

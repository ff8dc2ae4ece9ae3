//! Response cache shared by every connection.
//!
//! # Responsibilities
//! - Map a request fingerprint to the most recent response
//! - Short-circuit rate limiting and network IO on a hit
//! - Explicit eviction by URL and full clear (no expiry)

use async_trait::async_trait;
use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::observability::metrics;
use crate::pipeline::types::{CallError, CallOptions, Fingerprint, HttpRequest, HttpResponse};
use crate::pipeline::Stage;

/// Fingerprint → response map behind a single lock.
///
/// The lock is held only for the map operation itself, never across IO.
#[derive(Default)]
pub struct CacheStore {
    entries: Mutex<HashMap<Fingerprint, HttpResponse>>,
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Fingerprint, HttpResponse>> {
        // A panic while holding the lock cannot leave a half-written entry.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, key: &Fingerprint) -> Option<HttpResponse> {
        self.lock().get(key).cloned()
    }

    /// Store `response`, replacing any previous entry.
    pub fn insert(&self, key: Fingerprint, response: HttpResponse) {
        let size = {
            let mut entries = self.lock();
            entries.insert(key, response);
            entries.len()
        };
        metrics::record_cache_size(size);
    }

    /// Remove every entry for the given URLs, across method shapes.
    ///
    /// Returns the number of entries removed.
    pub fn evict<S: AsRef<str>>(&self, urls: &[S]) -> usize {
        let (removed, size) = {
            let mut entries = self.lock();
            let before = entries.len();
            entries.retain(|key, _| !urls.iter().any(|url| key.matches_url(url.as_ref())));
            (before - entries.len(), entries.len())
        };
        metrics::record_cache_size(size);
        removed
    }

    /// Drop every entry at once.
    pub fn clear(&self) {
        let old = std::mem::take(&mut *self.lock());
        drop(old);
        metrics::record_cache_size(0);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Destination for `HIT <METHOD> <URL>` lines.
#[derive(Clone)]
pub struct HitSink {
    out: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl HitSink {
    pub fn stdout() -> Self {
        Self::from_writer(io::stdout())
    }

    pub fn disabled() -> Self {
        Self::from_writer(io::sink())
    }

    pub fn from_writer<W: Write + Send + 'static>(writer: W) -> Self {
        Self {
            out: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    fn emit(&self, key: &Fingerprint) {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        let written = writeln!(out, "HIT {} {}", key.method_label(), key.url).and_then(|()| out.flush());
        if let Err(e) = written {
            tracing::debug!(error = %e, "Failed to write hit diagnostic");
        }
    }
}

/// Pipeline stage that serves repeated requests from [`CacheStore`].
pub struct CacheStage {
    inner: Arc<dyn Stage>,
    store: CacheStore,
    hits: HitSink,
}

impl CacheStage {
    pub fn new(inner: Arc<dyn Stage>, hits: HitSink) -> Self {
        Self {
            inner,
            store: CacheStore::new(),
            hits,
        }
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }
}

#[async_trait]
impl Stage for CacheStage {
    async fn execute(
        &self,
        request: &HttpRequest,
        options: &CallOptions,
    ) -> Result<HttpResponse, CallError> {
        let key = request.fingerprint();

        if let Some(cached) = self.store.get(&key) {
            tracing::debug!(fingerprint = %key, "Cache hit");
            metrics::record_cache_hit();
            self.hits.emit(&key);
            return Ok(cached);
        }

        metrics::record_cache_miss();
        let response = self.inner.execute(request, options).await?;
        self.store.insert(key, response.clone());
        Ok(response)
    }

    fn close(&self) {
        self.inner.close();
    }
}

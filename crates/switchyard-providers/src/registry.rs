//! Handler registry
//!
//! Owns at most one handler per (provider, key, base URL, timeout). Explicitly
//! registered handlers take precedence over factory-built ones, which lets
//! tests and embedders swap in their own implementations.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::handlers::{create_handler, Handler};
use crate::{HandlerConfig, ProviderError, ProviderKind, ProviderResult};

type CacheKey = (ProviderKind, Option<String>, String, u64);

#[derive(Default)]
pub struct HandlerRegistry {
    registered: Mutex<HashMap<ProviderKind, Arc<dyn Handler>>>,
    cache: Mutex<HashMap<CacheKey, Arc<dyn Handler>>>,
    /// Most recently built handler per provider, served by `get`.
    latest: Mutex<HashMap<ProviderKind, Arc<dyn Handler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `handler` for `provider`, replacing any previous registration.
    pub fn register(&self, provider: ProviderKind, handler: Arc<dyn Handler>) {
        tracing::debug!(%provider, "registered handler override");
        self.registered.lock().insert(provider, handler);
    }

    /// Registered handler for `provider`, else the one `get_or_create` built
    /// most recently for it.
    pub fn get(&self, provider: ProviderKind) -> ProviderResult<Arc<dyn Handler>> {
        if let Some(handler) = self.registered.lock().get(&provider) {
            return Ok(Arc::clone(handler));
        }
        self.latest
            .lock()
            .get(&provider)
            .cloned()
            .ok_or_else(|| ProviderError::NotRegistered(provider.to_string()))
    }

    /// Registered handler if any, else the cached factory handler for this
    /// config, creating it on first use. Repeated calls with an equivalent
    /// config return the same `Arc`.
    pub fn get_or_create(&self, config: &HandlerConfig) -> ProviderResult<Arc<dyn Handler>> {
        if let Some(handler) = self.registered.lock().get(&config.provider) {
            return Ok(Arc::clone(handler));
        }

        // Held across creation so concurrent callers cannot build twice.
        let mut cache = self.cache.lock();
        if let Some(handler) = cache.get(&config.cache_key()) {
            return Ok(Arc::clone(handler));
        }

        let handler = create_handler(config)?;
        cache.insert(config.cache_key(), Arc::clone(&handler));
        self.latest.lock().insert(config.provider, Arc::clone(&handler));
        Ok(handler)
    }

    /// Drop every cached and registered handler.
    pub fn invalidate(&self) {
        self.cache.lock().clear();
        self.latest.lock().clear();
        self.registered.lock().clear();
    }

    pub fn cached_len(&self) -> usize {
        self.cache.lock().len()
    }
}

//! Per-key builders
//!
//! At most one build runs per key. The first caller registers a builder and
//! runs the build; callers arriving while it runs join the same builder and
//! receive a clone of its outcome. The registry lock only covers builder
//! registration, never the build itself.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::OnceCell;

/// Shared slot for the outcome of one build
struct Builder<T> {
    outcome: OnceCell<T>,
}

/// Registry of in-flight builders keyed by logical key
pub struct BuilderRegistry<T> {
    builders: Mutex<HashMap<String, Arc<Builder<T>>>>,
}

impl<T: Clone> BuilderRegistry<T> {
    pub fn new() -> Self {
        Self {
            builders: Mutex::new(HashMap::new()),
        }
    }

    /// Create or join the builder for `key`
    pub fn acquire(&self, key: &str) -> BuildGuard<'_, T> {
        let builder = self
            .builders
            .lock()
            .entry(key.to_string())
            .or_insert_with(|| {
                Arc::new(Builder {
                    outcome: OnceCell::new(),
                })
            })
            .clone();

        BuildGuard {
            registry: self,
            key: key.to_string(),
            builder,
        }
    }

    /// Number of keys with a registered builder
    pub fn in_flight(&self) -> usize {
        self.builders.lock().len()
    }
}

impl<T: Clone> Default for BuilderRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle on a registered builder; unregisters it when dropped
pub struct BuildGuard<'a, T> {
    registry: &'a BuilderRegistry<T>,
    key: String,
    builder: Arc<Builder<T>>,
}

impl<T: Clone> BuildGuard<'_, T> {
    /// Run `build` unless another holder already ran (or is running) it
    ///
    /// # Returns
    /// A clone of the single outcome shared by every holder
    pub async fn run<F, Fut>(&self, build: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.builder.outcome.get_or_init(build).await.clone()
    }
}

impl<T> Drop for BuildGuard<'_, T> {
    fn drop(&mut self) {
        let mut builders = self.registry.builders.lock();
        let Some(registered) = builders.get(&self.key) else {
            return;
        };
        if !Arc::ptr_eq(registered, &self.builder) {
            return;
        }
        // A finished builder goes right away. An unfinished one (its runner
        // was cancelled) stays for remaining holders unless this is the last.
        if self.builder.outcome.initialized() || Arc::strong_count(&self.builder) <= 2 {
            builders.remove(&self.key);
        }
    }
}

//! Explicit worker registry
//!
//! Workers are registered by the embedding application before the
//! coordinator runs; there is no classpath-style scanning. Lookup is by
//! the worker's own id.

use std::collections::HashMap;
use std::sync::Arc;

use crate::builtin;
use crate::worker::Worker;

#[derive(Default, Clone)]
pub struct WorkerRegistry {
    workers: HashMap<&'static str, Arc<dyn Worker>>,
}

impl WorkerRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-loaded with the built-in workers
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(builtin::EchoWorker));
        registry.register(Arc::new(builtin::MemoryMapsWorker));
        registry.register(Arc::new(builtin::ThreadsWorker));
        registry
    }

    /// Register a worker under its own id; replaces a previous worker
    /// with the same id
    pub fn register(&mut self, worker: Arc<dyn Worker>) {
        self.workers.insert(worker.id(), worker);
    }

    pub fn deregister(&mut self, id: &str) -> Option<Arc<dyn Worker>> {
        self.workers.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Worker>> {
        self.workers.get(id).cloned()
    }

    pub fn ids(&self) -> Vec<&'static str> {
        let mut ids: Vec<&'static str> = self.workers.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

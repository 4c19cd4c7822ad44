//! Bounded registry of constructed pipelines keyed by model name

use crate::error::{RagError, Result};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

/// Keyed construction cache with least-recently-constructed eviction.
///
/// Lookups never reorder entries; only construction does. Two callers racing
/// on the same missing key may both build, and the first insert wins.
pub struct PipelineRegistry<T> {
    capacity: usize,
    entries: Mutex<VecDeque<(String, Arc<T>)>>,
}

impl<T> PipelineRegistry<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(VecDeque::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys in construction order, oldest first
    pub fn keys(&self) -> Vec<String> {
        self.lock()
            .map(|e| e.iter().map(|(k, _)| k.clone()).collect())
            .unwrap_or_default()
    }

    pub fn get(&self, key: &str) -> Result<Option<Arc<T>>> {
        let entries = self.lock()?;
        Ok(entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| Arc::clone(v)))
    }

    /// Return the entry for `key`, building and inserting it if missing
    pub fn get_or_try_insert_with<F>(&self, key: &str, build: F) -> Result<Arc<T>>
    where
        F: FnOnce() -> Result<T>,
    {
        if let Some(existing) = self.get(key)? {
            return Ok(existing);
        }

        let built = Arc::new(build()?);

        let mut entries = self.lock()?;
        if let Some((_, existing)) = entries.iter().find(|(k, _)| k == key) {
            return Ok(Arc::clone(existing));
        }
        while entries.len() >= self.capacity {
            if let Some((evicted, _)) = entries.pop_front() {
                tracing::debug!("Evicting pipeline for model {}", evicted);
            }
        }
        entries.push_back((key.to_string(), Arc::clone(&built)));
        tracing::debug!("Constructed pipeline for model {}", key);
        Ok(built)
    }

    fn lock(&self) -> Result<MutexGuard<'_, VecDeque<(String, Arc<T>)>>> {
        self.entries
            .lock()
            .map_err(|_| RagError::Other(anyhow::anyhow!("pipeline registry lock poisoned")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_memoizes_by_key() {
        let registry = PipelineRegistry::new(2);
        let builds = Cell::new(0);
        let build = |v: u32| {
            builds.set(builds.get() + 1);
            Ok(v)
        };

        let a = registry.get_or_try_insert_with("a", || build(1)).unwrap();
        let again = registry.get_or_try_insert_with("a", || build(99)).unwrap();
        assert_eq!(*a, 1);
        assert_eq!(*again, 1);
        assert_eq!(builds.get(), 1);
    }

    #[test]
    fn test_evicts_oldest_constructed() {
        let registry = PipelineRegistry::new(2);
        registry.get_or_try_insert_with("a", || Ok(1)).unwrap();
        registry.get_or_try_insert_with("b", || Ok(2)).unwrap();
        // Lookup does not refresh "a"
        registry.get("a").unwrap();
        registry.get_or_try_insert_with("c", || Ok(3)).unwrap();

        assert_eq!(registry.keys(), vec!["b".to_string(), "c".to_string()]);
        assert!(registry.get("a").unwrap().is_none());
    }

    #[test]
    fn test_failed_build_is_not_cached() {
        let registry: PipelineRegistry<u32> = PipelineRegistry::new(1);
        let err = registry
            .get_or_try_insert_with("a", || Err(RagError::Config("nope".to_string())))
            .unwrap_err();
        assert!(matches!(err, RagError::Config(_)));
        assert!(registry.is_empty());
    }
}

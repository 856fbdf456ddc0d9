use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;

/// Result cache keyed by the call's arguments. Lives as long as its owner;
/// failed computations are not stored.
#[derive(Debug)]
pub struct Memo<K, V> {
    entries: HashMap<K, V>,
}

impl<K, V> Default for Memo<K, V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash, V: Clone> Memo<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn get(&self, key: &K) -> Option<V> {
        self.entries.get(key).cloned()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub async fn get_or_try_insert_with<F, Fut, E>(&mut self, key: K, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.entries.get(&key) {
            return Ok(value.clone());
        }
        let value = compute().await?;
        self.entries.insert(key, value.clone());
        Ok(value)
    }
}

//! In-memory fake of [`KeyValueStore`] (testing only).
//!
//! Keys hold one of the value shapes the ingestion pipeline writes. Reads can
//! be made to fail, panic or stall per key, and reads are counted per key, so
//! error propagation and fan-out behaviour can be exercised without a running
//! Redis.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{StoreError, StoreResult};
use crate::store::{KeyValueStore, ScoreOrder, ScoreWindow};

#[derive(Debug, Clone)]
enum Value {
    String(String),
    Set(Vec<String>),
    Hash(HashMap<String, String>),
    SortedSet(Vec<(String, f64)>),
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, Value>>,
    failing: Mutex<HashSet<String>>,
    panicking: Mutex<HashSet<String>>,
    delays: Mutex<HashMap<String, Duration>>,
    reads: Mutex<HashMap<String, usize>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_string(&self, key: &str, value: &str) {
        self.insert(key, Value::String(value.to_string()));
    }

    pub fn set_members(&self, key: &str, members: &[&str]) {
        self.insert(
            key,
            Value::Set(members.iter().map(|m| m.to_string()).collect()),
        );
    }

    pub fn set_hash(&self, key: &str, fields: &[(&str, &str)]) {
        let hash = fields
            .iter()
            .map(|(f, v)| (f.to_string(), v.to_string()))
            .collect();
        self.insert(key, Value::Hash(hash));
    }

    pub fn set_sorted(&self, key: &str, entries: &[(&str, f64)]) {
        self.insert(
            key,
            Value::SortedSet(entries.iter().map(|(m, s)| (m.to_string(), *s)).collect()),
        );
    }

    /// Every read of `key` returns [`StoreError::Unavailable`].
    pub fn fail_on(&self, key: &str) {
        self.failing.lock().unwrap().insert(key.to_string());
    }

    /// Every read of `key` panics.
    pub fn panic_on(&self, key: &str) {
        self.panicking.lock().unwrap().insert(key.to_string());
    }

    /// Number of reads of `key` started so far.
    pub fn reads(&self, key: &str) -> usize {
        self.reads.lock().unwrap().get(key).copied().unwrap_or(0)
    }

    /// Every read of `key` sleeps for `delay` before answering.
    pub fn delay_on(&self, key: &str, delay: Duration) {
        self.delays.lock().unwrap().insert(key.to_string(), delay);
    }

    fn insert(&self, key: &str, value: Value) {
        self.values.lock().unwrap().insert(key.to_string(), value);
    }

    async fn read(&self, key: &str) -> StoreResult<Option<Value>> {
        *self.reads.lock().unwrap().entry(key.to_string()).or_insert(0) += 1;
        let delay = self.delays.lock().unwrap().get(key).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let panics = self.panicking.lock().unwrap().contains(key);
        if panics {
            panic!("read of {key} panicked");
        }
        if self.failing.lock().unwrap().contains(key) {
            return Err(StoreError::Unavailable(format!("read of {key} failed")));
        }
        Ok(self.values.lock().unwrap().get(key).cloned())
    }

    async fn read_hash(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        match self.read(key).await? {
            Some(Value::Hash(hash)) => Ok(hash),
            _ => Ok(HashMap::new()),
        }
    }

    async fn read_sorted(&self, key: &str) -> StoreResult<Vec<(String, f64)>> {
        match self.read(key).await? {
            Some(Value::SortedSet(entries)) => Ok(entries),
            _ => Ok(Vec::new()),
        }
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        match self.read(key).await? {
            Some(Value::String(value)) => Ok(Some(value)),
            _ => Ok(None),
        }
    }

    async fn smembers(&self, key: &str) -> StoreResult<Vec<String>> {
        match self.read(key).await? {
            Some(Value::Set(members)) => Ok(members),
            _ => Ok(Vec::new()),
        }
    }

    async fn sismember(&self, key: &str, member: &str) -> StoreResult<bool> {
        Ok(self.smembers(key).await?.iter().any(|m| m == member))
    }

    async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        Ok(self.read_hash(key).await?.remove(field))
    }

    async fn hgetall(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        self.read_hash(key).await
    }

    async fn hmget(&self, key: &str, fields: &[String]) -> StoreResult<Vec<Option<String>>> {
        let hash = self.read_hash(key).await?;
        Ok(fields.iter().map(|f| hash.get(f).cloned()).collect())
    }

    async fn zcard(&self, key: &str) -> StoreResult<u64> {
        Ok(self.read_sorted(key).await?.len() as u64)
    }

    async fn zscore(&self, key: &str, member: &str) -> StoreResult<Option<f64>> {
        Ok(self
            .read_sorted(key)
            .await?
            .into_iter()
            .find(|(m, _)| m == member)
            .map(|(_, s)| s))
    }

    async fn zcount_above(&self, key: &str, score: f64) -> StoreResult<u64> {
        Ok(self
            .read_sorted(key)
            .await?
            .iter()
            .filter(|(_, s)| *s > score)
            .count() as u64)
    }

    async fn zfirst_in_window(
        &self,
        key: &str,
        window: ScoreWindow,
        order: ScoreOrder,
    ) -> StoreResult<Option<(String, f64)>> {
        let mut entries: Vec<(String, f64)> = self
            .read_sorted(key)
            .await?
            .into_iter()
            .filter(|(_, s)| *s >= window.min && *s <= window.max)
            .collect();
        entries.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        Ok(match order {
            ScoreOrder::Ascending => entries.into_iter().next(),
            ScoreOrder::Descending => entries.into_iter().next_back(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_keys_read_as_empty() {
        let store = MemoryStore::new();
        assert_eq!(store.get("nope").await.unwrap(), None);
        assert!(store.smembers("nope").await.unwrap().is_empty());
        assert_eq!(store.zcard("nope").await.unwrap(), 0);
        assert_eq!(
            store
                .hmget("nope", &["a".to_string(), "b".to_string()])
                .await
                .unwrap(),
            vec![None, None]
        );
    }

    #[tokio::test]
    async fn failing_key_reports_unavailable() {
        let store = MemoryStore::new();
        store.set_string("k", "v");
        store.fail_on("k");
        assert!(matches!(
            store.get("k").await,
            Err(StoreError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn reads_are_counted_per_key() {
        let store = MemoryStore::new();
        store.set_string("k", "v");
        store.get("k").await.unwrap();
        store.get("k").await.unwrap();
        assert_eq!(store.reads("k"), 2);
        assert_eq!(store.reads("other"), 0);
    }

    #[tokio::test]
    async fn score_window_respects_order() {
        let store = MemoryStore::new();
        store.set_sorted("z", &[("a", 0.0), ("b", 10.0), ("c", 20.0), ("d", 150.0)]);
        let window = ScoreWindow { min: 0.1, max: 100.0 };

        let lowest = store
            .zfirst_in_window("z", window, ScoreOrder::Ascending)
            .await
            .unwrap();
        let highest = store
            .zfirst_in_window("z", window, ScoreOrder::Descending)
            .await
            .unwrap();

        assert_eq!(lowest, Some(("b".to_string(), 10.0)));
        assert_eq!(highest, Some(("c".to_string(), 20.0)));
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 capflow contributors

//! Run-scoped result store
//!
//! Holds the most recent value produced for each key. Only the executor
//! writes to it; modules see the values they declared as consumed.

use blake3::Hasher;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Mapping from produced key to its latest value
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ResultStore {
    values: BTreeMap<String, Value>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Store `value` under `key`, returning the value it replaced
    pub fn set(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.values.insert(key.into(), value)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Keys in sorted order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Copy of the current contents
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.values.clone()
    }

    pub fn into_inner(self) -> BTreeMap<String, Value> {
        self.values
    }

    /// BLAKE3 digest of the contents, stable across runs
    ///
    /// Keys are visited in sorted order and values are hashed through
    /// their canonical JSON text.
    pub fn digest(&self) -> String {
        let mut hasher = Hasher::new();

        for (key, value) in &self.values {
            hasher.update(&(key.len() as u64).to_le_bytes());
            hasher.update(key.as_bytes());
            let encoded = value.to_string();
            hasher.update(&(encoded.len() as u64).to_le_bytes());
            hasher.update(encoded.as_bytes());
        }

        hasher.finalize().to_hex().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_last_write_wins() {
        let mut store = ResultStore::new();
        assert_eq!(store.set("raw_text", json!("first")), None);
        assert_eq!(store.set("raw_text", json!("second")), Some(json!("first")));

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("raw_text"), Some(&json!("second")));
    }

    #[test]
    fn test_digest_is_insertion_order_independent() {
        let mut a = ResultStore::new();
        a.set("summary", json!("short"));
        a.set("raw_text", json!("long text"));

        let mut b = ResultStore::new();
        b.set("raw_text", json!("long text"));
        b.set("summary", json!("short"));

        assert_eq!(a.digest(), b.digest());

        b.set("summary", json!("different"));
        assert_ne!(a.digest(), b.digest());
    }

    #[test]
    fn test_digest_separates_keys_from_values() {
        let mut a = ResultStore::new();
        a.set("ab", json!("c"));

        let mut b = ResultStore::new();
        b.set("a", json!("bc"));

        assert_ne!(a.digest(), b.digest());
    }

    #[test]
    fn test_serializes_as_plain_map() {
        let mut store = ResultStore::new();
        store.set("stats", json!({ "words": 3 }));

        assert_eq!(serde_json::to_value(&store).unwrap(), json!({ "stats": { "words": 3 } }));
    }
}

//! Small generic collections and helpers used across connectors.

use std::borrow::Borrow;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::ConnectorResult;

/// A set that remembers insertion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Set<T: Eq + Hash + Clone> {
    order: Vec<T>,
    index: HashSet<T>,
}

impl<T: Eq + Hash + Clone> Default for Set<T> {
    fn default() -> Self {
        Self {
            order: Vec::new(),
            index: HashSet::new(),
        }
    }
}

impl<T: Eq + Hash + Clone> Set<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value; returns false if it was already present.
    pub fn add(&mut self, value: T) -> bool {
        if self.index.insert(value.clone()) {
            self.order.push(value);
            true
        } else {
            false
        }
    }

    pub fn has<Q>(&self, value: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.index.contains(value)
    }

    pub fn remove<Q>(&mut self, value: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        if self.index.remove(value) {
            self.order.retain(|v| <T as Borrow<Q>>::borrow(v) != value);
            true
        } else {
            false
        }
    }

    /// Values in insertion order.
    pub fn list(&self) -> &[T] {
        &self.order
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.order.iter()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Values of `self` that are not in `other`, in insertion order.
    pub fn subtract(&self, other: &Set<T>) -> Vec<T> {
        self.order
            .iter()
            .filter(|v| !other.has(v))
            .cloned()
            .collect()
    }
}

impl<T: Eq + Hash + Clone> FromIterator<T> for Set<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut set = Set::new();
        for value in iter {
            set.add(value);
        }
        set
    }
}

impl<'a, T: Eq + Hash + Clone> IntoIterator for &'a Set<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.order.iter()
    }
}

/// Groups values into ordered lists keyed by `K`.
#[derive(Debug, Clone)]
pub struct IndexedLists<K: Eq + Hash, V> {
    lists: HashMap<K, Vec<V>>,
}

impl<K: Eq + Hash, V> Default for IndexedLists<K, V> {
    fn default() -> Self {
        Self {
            lists: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash, V> IndexedLists<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: K, value: V) {
        self.lists.entry(key).or_default().push(value);
    }

    pub fn get<Q>(&self, key: &Q) -> &[V]
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.lists.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.lists.keys()
    }

    pub fn into_map(self) -> HashMap<K, Vec<V>> {
        self.lists
    }
}

/// A map that answers misses with a fallback function.
pub struct DefaultMap<K: Eq + Hash, V> {
    values: HashMap<K, V>,
    fallback: Option<Arc<dyn Fn(&K) -> Option<V> + Send + Sync>>,
}

impl<K: Eq + Hash + std::fmt::Debug, V: std::fmt::Debug> std::fmt::Debug for DefaultMap<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultMap")
            .field("values", &self.values)
            .field("has_fallback", &self.fallback.is_some())
            .finish()
    }
}

impl<K: Eq + Hash + Clone, V: Clone> Clone for DefaultMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            values: self.values.clone(),
            fallback: self.fallback.clone(),
        }
    }
}

impl<K: Eq + Hash, V: Clone> DefaultMap<K, V> {
    /// Create a map without a fallback; misses return `None`.
    pub fn new(values: HashMap<K, V>) -> Self {
        Self {
            values,
            fallback: None,
        }
    }

    /// Create a map whose misses are answered by `fallback`.
    pub fn with_fallback(
        values: HashMap<K, V>,
        fallback: impl Fn(&K) -> Option<V> + Send + Sync + 'static,
    ) -> Self {
        Self {
            values,
            fallback: Some(Arc::new(fallback)),
        }
    }

    /// Replace the fallback of an existing map.
    pub fn set_fallback(&mut self, fallback: impl Fn(&K) -> Option<V> + Send + Sync + 'static) {
        self.fallback = Some(Arc::new(fallback));
    }

    pub fn get(&self, key: &K) -> Option<V> {
        match self.values.get(key) {
            Some(v) => Some(v.clone()),
            None => self.fallback.as_ref().and_then(|f| f(key)),
        }
    }

    /// Whether the key is stored explicitly (the fallback is not consulted).
    pub fn contains_key(&self, key: &K) -> bool {
        self.values.contains_key(key)
    }

    pub fn insert(&mut self, key: K, value: V) {
        self.values.insert(key, value);
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.values.keys()
    }
}

/// Format a timestamp as RFC 3339 with second precision and a `Z` suffix.
pub fn format_rfc3339(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Deep copy through a JSON round trip.
pub fn deep_copy<T: Serialize + DeserializeOwned>(value: &T) -> ConnectorResult<T> {
    let encoded = serde_json::to_value(value)?;
    Ok(serde_json::from_value(encoded)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_set_keeps_insertion_order() {
        let mut set: Set<String> = ["b", "a", "b", "c"].iter().map(|s| s.to_string()).collect();
        assert_eq!(set.list(), &["b", "a", "c"]);
        assert!(set.has("a"));
        assert!(set.remove("a"));
        assert!(!set.remove("a"));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_set_subtract() {
        let a: Set<i32> = vec![1, 2, 3].into_iter().collect();
        let b: Set<i32> = vec![2].into_iter().collect();
        assert_eq!(a.subtract(&b), vec![1, 3]);
    }

    #[test]
    fn test_indexed_lists() {
        let mut lists = IndexedLists::new();
        lists.add("opp-1".to_string(), "c1");
        lists.add("opp-1".to_string(), "c2");
        assert_eq!(lists.get("opp-1"), &["c1", "c2"]);
        assert!(lists.get("opp-2").is_empty());
    }

    #[test]
    fn test_default_map_fallback() {
        let mut values = HashMap::new();
        values.insert("contacts".to_string(), "/contacts".to_string());
        let map = DefaultMap::with_fallback(values, |k: &String| Some(format!("/v2/{k}")));

        assert_eq!(map.get(&"contacts".to_string()).unwrap(), "/contacts");
        assert_eq!(map.get(&"deals".to_string()).unwrap(), "/v2/deals");
        assert!(!map.contains_key(&"deals".to_string()));
    }

    #[test]
    fn test_format_rfc3339() {
        let t = Utc.with_ymd_and_hms(2023, 1, 3, 4, 5, 6).unwrap();
        assert_eq!(format_rfc3339(&t), "2023-01-03T04:05:06Z");
    }

    #[test]
    fn test_deep_copy_is_independent() {
        let original = json!({"a": {"b": [1, 2]}});
        let mut copy = deep_copy(&original).unwrap();
        copy["a"]["b"][0] = json!(9);
        assert_eq!(original["a"]["b"][0], json!(1));
    }
}

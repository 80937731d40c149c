//! Case-insensitive ordered map used for `vars`, `artifacts`, `metadata` and
//! the execution-id index. Keys are normalized to lower-case on every
//! operation; the original casing of the *last* insert under a given key is
//! not retained, matching the "keyed case-insensitively" rule everywhere it
//! applies.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CiMap<V>(BTreeMap<String, V>);

impl<V> Default for CiMap<V> {
    fn default() -> Self {
        Self(BTreeMap::new())
    }
}

impl<V> CiMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    fn norm(key: &str) -> String {
        key.to_ascii_lowercase()
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.0.get(&Self::norm(key))
    }

    pub fn insert(&mut self, key: impl AsRef<str>, value: V) -> Option<V> {
        self.0.insert(Self::norm(key.as_ref()), value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(&Self::norm(key))
    }

    pub fn remove(&mut self, key: &str) -> Option<V> {
        self.0.remove(&Self::norm(key))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &V)> {
        self.0.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<V> FromIterator<(String, V)> for CiMap<V> {
    fn from_iter<T: IntoIterator<Item = (String, V)>>(iter: T) -> Self {
        let mut map = CiMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

//! Language codes and case-insensitive maps keyed by them.
//!
//! Upstream services disagree on casing (`pt-PT`, `pt-pt`, `PT-PT`), so every
//! lookup folds the key with `str::to_lowercase` while the original spelling
//! is kept for display.

use std::collections::btree_map::{self, BTreeMap};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Fold a key to its canonical lookup form.
pub fn fold(key: &str) -> String {
    key.to_lowercase()
}

/// An opaque language identifier such as `en`, `pt-PT` or `zh-Hans`.
///
/// Equality and hashing ignore case; `Display` keeps the spelling it was
/// created with.
#[derive(Debug, Clone)]
pub struct LanguageCode {
    original: String,
    folded: String,
}

impl LanguageCode {
    pub fn new(code: impl Into<String>) -> Self {
        let original = code.into();
        let folded = fold(&original);
        Self { original, folded }
    }

    /// The code as it was spelled on creation.
    pub fn as_str(&self) -> &str {
        &self.original
    }

    /// The folded form used for comparisons.
    pub fn folded(&self) -> &str {
        &self.folded
    }
}

impl PartialEq for LanguageCode {
    fn eq(&self, other: &Self) -> bool {
        self.folded == other.folded
    }
}

impl Eq for LanguageCode {}

impl PartialEq<str> for LanguageCode {
    fn eq(&self, other: &str) -> bool {
        self.folded == fold(other)
    }
}

impl PartialEq<&str> for LanguageCode {
    fn eq(&self, other: &&str) -> bool {
        self.folded == fold(other)
    }
}

impl Hash for LanguageCode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.folded.hash(state);
    }
}

impl fmt::Display for LanguageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original)
    }
}

impl From<&str> for LanguageCode {
    fn from(code: &str) -> Self {
        LanguageCode::new(code)
    }
}

impl From<String> for LanguageCode {
    fn from(code: String) -> Self {
        LanguageCode::new(code)
    }
}

impl From<&LanguageCode> for LanguageCode {
    fn from(code: &LanguageCode) -> Self {
        code.clone()
    }
}

/// A map whose string keys are matched case-insensitively.
///
/// Keys are folded on insert and on lookup; the most recently inserted
/// spelling of a key is what iteration yields. Iteration order is the
/// folded key order, so output is deterministic.
#[derive(Debug, Clone)]
pub struct CaseInsensitiveMap<V> {
    entries: BTreeMap<String, (String, V)>,
}

impl<V> Default for CaseInsensitiveMap<V> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<V> CaseInsensitiveMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, returning the previous value stored under any casing of `key`.
    pub fn insert(&mut self, key: impl Into<String>, value: V) -> Option<V> {
        let key = key.into();
        self.entries
            .insert(fold(&key), (key, value))
            .map(|(_, old)| old)
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries.get(&fold(key)).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut V> {
        self.entries.get_mut(&fold(key)).map(|(_, v)| v)
    }

    /// The spelling under which `key` was stored.
    pub fn original_key(&self, key: &str) -> Option<&str> {
        self.entries.get(&fold(key)).map(|(k, _)| k.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(&fold(key))
    }

    /// Get the value for `key`, inserting `default()` under this spelling if absent.
    pub fn get_or_insert_with(&mut self, key: &str, default: impl FnOnce() -> V) -> &mut V {
        let (_, value) = self
            .entries
            .entry(fold(key))
            .or_insert_with(|| (key.to_string(), default()));
        value
    }

    pub fn remove(&mut self, key: &str) -> Option<V> {
        self.entries.remove(&fold(key)).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> Iter<'_, V> {
        Iter {
            inner: self.entries.values(),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.iter().map(|(_, v)| v)
    }
}

impl<V: PartialEq> PartialEq for CaseInsensitiveMap<V> {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .entries
                .iter()
                .all(|(k, (_, v))| other.entries.get(k).map(|(_, o)| o) == Some(v))
    }
}

pub struct Iter<'a, V> {
    inner: btree_map::Values<'a, String, (String, V)>,
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = (&'a str, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, v)| (k.as_str(), v))
    }
}

impl<'a, V> IntoIterator for &'a CaseInsensitiveMap<V> {
    type Item = (&'a str, &'a V);
    type IntoIter = Iter<'a, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<K: Into<String>, V> FromIterator<(K, V)> for CaseInsensitiveMap<V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = CaseInsensitiveMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

/// Display names keyed by language code, as reported by a provider.
pub type LanguageNames = CaseInsensitiveMap<String>;

use std::collections::{BTreeMap, btree_map};

use serde_json::Value;

/// Free-form metadata attached to every [`Message`](crate::Message).
///
/// An ordered map from string keys to JSON values. Messages receive the
/// merge of three layers, later layers overriding earlier ones:
///
/// 1. static meta from the emitter [`Config`](crate::Config)
/// 2. meta injected by the [`Scope`](crate::Scope) the message was emitted through
/// 3. per-emit meta set on the [`Emission`](crate::Emission)
///
/// ```rust
/// use trellis::Meta;
///
/// let base = Meta::new().with("source", "sensor").with("unit", "C");
/// let merged = base.merged(&Meta::new().with("unit", "F"));
/// assert_eq!(merged.get("unit"), Some(&"F".into()));
/// assert_eq!(merged.get("source"), Some(&"sensor".into()));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Meta(BTreeMap<String, Value>);

impl Meta {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Value> {
        self.0.iter()
    }

    /// Overlay `other` on top of `self`. Keys present in both take `other`'s value.
    pub fn extend(&mut self, other: &Meta) {
        for (k, v) in other.iter() {
            self.0.insert(k.clone(), v.clone());
        }
    }

    /// Returns a new map with `other` overlaid on a copy of `self`.
    #[must_use]
    pub fn merged(&self, other: &Meta) -> Meta {
        let mut out = self.clone();
        out.extend(other);
        out
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Meta {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Meta(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl<'a> IntoIterator for &'a Meta {
    type Item = (&'a String, &'a Value);
    type IntoIter = btree_map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

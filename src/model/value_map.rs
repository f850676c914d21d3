//! Insertion-ordered map of value groups

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::marker::PhantomData;

/// Ordered `key -> [T]` map.
///
/// Identifier allocation walks value groups in declaration order, so the map
/// keeps the order keys appeared in the source document instead of sorting
/// or hashing them.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueMap<T> {
    entries: Vec<(String, Vec<T>)>,
}

impl<T> Default for ValueMap<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T> ValueMap<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a group, replacing an existing group with the same key in place
    pub fn insert(&mut self, key: impl Into<String>, values: Vec<T>) {
        let key = key.into();
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = values;
        } else {
            self.entries.push((key, values));
        }
    }

    pub fn get(&self, key: &str) -> Option<&[T]> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_slice())
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Vec<T>> {
        self.entries
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[T])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut Vec<T>)> {
        self.entries.iter_mut().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Total number of values across all groups
    pub fn value_count(&self) -> usize {
        self.entries.iter().map(|(_, v)| v.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Build a new map with the same keys and order, transforming each value
    pub fn map<U>(&self, mut f: impl FnMut(&T) -> U) -> ValueMap<U> {
        ValueMap {
            entries: self
                .entries
                .iter()
                .map(|(k, v)| (k.clone(), v.iter().map(&mut f).collect()))
                .collect(),
        }
    }
}

impl<T: Serialize> Serialize for ValueMap<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, values) in &self.entries {
            map.serialize_entry(key, values)?;
        }
        map.end()
    }
}

struct ValueMapVisitor<T>(PhantomData<T>);

impl<'de, T: Deserialize<'de>> Visitor<'de> for ValueMapVisitor<T> {
    type Value = ValueMap<T>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a map of value arrays")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut map = ValueMap::new();
        while let Some((key, values)) = access.next_entry::<String, Vec<T>>()? {
            map.insert(key, values);
        }
        Ok(map)
    }

    fn visit_unit<E: serde::de::Error>(self) -> Result<Self::Value, E> {
        Ok(ValueMap::new())
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for ValueMap<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ValueMapVisitor(PhantomData))
    }
}

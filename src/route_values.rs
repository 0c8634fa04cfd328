//! Case-insensitive route value storage.
//!
//! Route values are small (area/controller/action plus a handful of
//! parameters), so entries live inline in a [`SmallVec`] and lookups are a
//! linear ASCII case-insensitive scan.

use serde::de::{Deserialize, Deserializer, MapAccess, Visitor};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;
use smallvec::SmallVec;
use std::borrow::Cow;
use std::fmt;

/// Maximum number of route values stored before spilling to the heap.
pub const MAX_INLINE_VALUES: usize = 8;

type Entries = SmallVec<[(String, Value); MAX_INLINE_VALUES]>;

/// Ordered map of route values with ASCII case-insensitive keys.
///
/// Replacing an existing key keeps the casing of the key that was inserted
/// first, matching how route values flow from templates into link generation.
#[derive(Clone, Default, PartialEq)]
pub struct RouteValueDictionary {
    entries: Entries,
}

impl RouteValueDictionary {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    }

    /// Value rendered as a string; `Null` and missing keys are `None`.
    #[must_use]
    pub fn get_string(&self, key: &str) -> Option<Cow<'_, str>> {
        self.get(key).and_then(value_to_string)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Insert or replace a value, returning the previous one.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        if let Some((_, slot)) = self
            .entries
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(&key))
        {
            return Some(std::mem::replace(slot, value));
        }
        self.entries.push((key, value));
        None
    }

    /// Insert only when the key is absent. Returns `true` when inserted.
    pub fn try_add(&mut self, key: impl Into<String>, value: impl Into<Value>) -> bool {
        let key = key.into();
        if self.contains_key(&key) {
            return false;
        }
        self.entries.push((key, value.into()));
        true
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let index = self
            .entries
            .iter()
            .position(|(k, _)| k.eq_ignore_ascii_case(key))?;
        Some(self.entries.remove(index).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Copy every entry of `other` into `self`, overwriting existing keys.
    pub fn extend_from(&mut self, other: &RouteValueDictionary) {
        for (k, v) in other.iter() {
            self.insert(k, v.clone());
        }
    }

    /// Case-insensitive comparison of the string forms of two values.
    ///
    /// `Null`, empty strings and missing values are all equivalent.
    #[must_use]
    pub fn values_equal(left: Option<&Value>, right: Option<&Value>) -> bool {
        let left = left.and_then(value_to_string).filter(|s| !s.is_empty());
        let right = right.and_then(value_to_string).filter(|s| !s.is_empty());
        match (left, right) {
            (None, None) => true,
            (Some(l), Some(r)) => l.eq_ignore_ascii_case(&r),
            _ => false,
        }
    }
}

/// Render a route value the way it appears in a URL.
#[must_use]
pub fn value_to_string(value: &Value) -> Option<Cow<'_, str>> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(Cow::Borrowed(s.as_str())),
        Value::Bool(b) => Some(Cow::Borrowed(if *b { "true" } else { "false" })),
        Value::Number(n) => Some(Cow::Owned(n.to_string())),
        other => Some(Cow::Owned(other.to_string())),
    }
}

impl fmt::Debug for RouteValueDictionary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for RouteValueDictionary {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut dict = RouteValueDictionary::new();
        for (k, v) in iter {
            dict.insert(k, v);
        }
        dict
    }
}

impl<K: Into<String>, V: Into<Value>, const N: usize> From<[(K, V); N]> for RouteValueDictionary {
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

impl Serialize for RouteValueDictionary {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (k, v) in self.iter() {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for RouteValueDictionary {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct DictVisitor;

        impl<'de> Visitor<'de> for DictVisitor {
            type Value = RouteValueDictionary;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of route values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut dict = RouteValueDictionary::new();
                while let Some((k, v)) = access.next_entry::<String, Value>()? {
                    dict.insert(k, v);
                }
                Ok(dict)
            }
        }

        deserializer.deserialize_map(DictVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lookups_ignore_case_and_keep_first_key() {
        let mut values = RouteValueDictionary::from([("Controller", "Home")]);
        assert_eq!(values.get_string("controller").as_deref(), Some("Home"));

        let previous = values.insert("CONTROLLER", "Blog");
        assert_eq!(previous, Some(json!("Home")));
        assert_eq!(values.keys().collect::<Vec<_>>(), vec!["Controller"]);
        assert_eq!(values.len(), 1);
    }

    #[test]
    fn try_add_does_not_overwrite() {
        let mut values = RouteValueDictionary::from([("id", "1")]);
        assert!(!values.try_add("ID", "2"));
        assert!(values.try_add("page", 3));
        assert_eq!(values.get_string("id").as_deref(), Some("1"));
        assert_eq!(values.get_string("page").as_deref(), Some("3"));
    }

    #[test]
    fn null_and_empty_compare_equal() {
        assert!(RouteValueDictionary::values_equal(None, Some(&Value::Null)));
        assert!(RouteValueDictionary::values_equal(Some(&json!("")), None));
        assert!(RouteValueDictionary::values_equal(Some(&json!("HOME")), Some(&json!("home"))));
        assert!(!RouteValueDictionary::values_equal(Some(&json!("a")), None));
    }

    #[test]
    fn spills_past_inline_capacity() {
        let values: RouteValueDictionary = (0..12).map(|i| (format!("k{i}"), i)).collect();
        assert_eq!(values.len(), 12);
        assert_eq!(values.get_string("K11").as_deref(), Some("11"));
    }

    #[test]
    fn deserializes_from_yaml_map() {
        let values: RouteValueDictionary =
            serde_yaml::from_str("controller: Home\nid: 5\nflag: true\n").expect("yaml");
        assert_eq!(values.get_string("controller").as_deref(), Some("Home"));
        assert_eq!(values.get_string("id").as_deref(), Some("5"));
        assert_eq!(values.get_string("flag").as_deref(), Some("true"));
    }
}

//! Representations of the entity producing telemetry.
//!
//! A [`Resource`] describes the process or service emitting spans as a set of
//! attributes, for example the service name and version. One `Resource` is
//! shared by reference across every span created by a [`Tracer`] instance:
//! spans hold a handle to the same underlying data, and merges performed
//! through [`Resource::merge`] are visible through every live handle.
//!
//! [`Tracer`]: crate::trace::Tracer

use crate::{Key, KeyValue, Value};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// A set of attributes describing the entity producing telemetry, shared by
/// all spans from one tracer.
///
/// Unlike span attributes, resource attributes can be merged into after
/// construction; merges are last-write-wins per key and are observed by every
/// handle to the same resource, including spans that were created before the
/// merge and have not yet ended.
#[derive(Clone, Debug, Default)]
pub struct Resource {
    inner: Arc<RwLock<HashMap<Key, Value>>>,
}

impl Resource {
    /// Creates an empty resource.
    pub fn empty() -> Self {
        Resource::default()
    }

    /// Create a new `Resource` from key value pairs.
    ///
    /// Values are de-duplicated by key, and the last key-value pair will be
    /// retained.
    pub fn new<T: IntoIterator<Item = KeyValue>>(kvs: T) -> Self {
        let resource = Resource::empty();
        resource.merge(kvs);
        resource
    }

    /// Merge the given attributes into this resource.
    ///
    /// Existing keys are overwritten (last write wins); new keys are added.
    /// The change is visible through every handle to this resource.
    pub fn merge<T: IntoIterator<Item = KeyValue>>(&self, kvs: T) {
        if let Ok(mut attrs) = self.inner.write() {
            for kv in kvs {
                attrs.insert(kv.key, kv.value);
            }
        }
    }

    /// Returns the value for the given key, if present.
    pub fn get(&self, key: &Key) -> Option<Value> {
        self.inner
            .read()
            .ok()
            .and_then(|attrs| attrs.get(key).cloned())
    }

    /// Returns the number of attributes in this resource.
    pub fn len(&self) -> usize {
        self.inner.read().map(|attrs| attrs.len()).unwrap_or(0)
    }

    /// Returns `true` if this resource has no attributes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a point-in-time copy of this resource's attributes, ordered by
    /// key.
    pub fn attributes(&self) -> Vec<KeyValue> {
        let mut attrs: Vec<KeyValue> = self
            .inner
            .read()
            .map(|attrs| {
                attrs
                    .iter()
                    .map(|(k, v)| KeyValue {
                        key: k.clone(),
                        value: v.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        attrs.sort_by(|a, b| a.key.cmp(&b.key));
        attrs
    }
}

impl PartialEq for Resource {
    fn eq(&self, other: &Self) -> bool {
        self.attributes() == other.attributes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_resource_deduplicates_by_key() {
        let resource = Resource::new(vec![
            KeyValue::new("service", "a"),
            KeyValue::new("service", "b"),
        ]);
        assert_eq!(resource.len(), 1);
        assert_eq!(resource.get(&Key::new("service")), Some(Value::from("b")));
    }

    #[test]
    fn merge_is_last_write_wins_per_key() {
        let resource = Resource::new(vec![KeyValue::new("service", "a")]);

        resource.merge(vec![KeyValue::new("version", "1.0")]);
        assert_eq!(resource.get(&Key::new("service")), Some(Value::from("a")));
        assert_eq!(resource.get(&Key::new("version")), Some(Value::from("1.0")));

        resource.merge(vec![KeyValue::new("service", "b")]);
        assert_eq!(resource.get(&Key::new("service")), Some(Value::from("b")));
        assert_eq!(resource.get(&Key::new("version")), Some(Value::from("1.0")));
    }

    #[test]
    fn merge_is_visible_through_every_handle() {
        let resource = Resource::empty();
        let handle = resource.clone();

        resource.merge(vec![KeyValue::new("host", "worker-1")]);
        assert_eq!(handle.get(&Key::new("host")), Some(Value::from("worker-1")));
        assert_eq!(resource, handle);
    }
}

use std::collections::HashMap;
use std::sync::Mutex;

use proxy_types::{Registry, RegistryError};

/// Order-preserving hash-map-of-hash-maps, standing in for the real
/// key-value registry. Field insertion order is preserved within each
/// key, since join/reconcile rely on that order to break ties.
#[derive(Default)]
pub struct InMemoryRegistry {
    maps: Mutex<HashMap<String, Vec<(String, String)>>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Registry for InMemoryRegistry {
    fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), RegistryError> {
        let mut maps = self.maps.lock().unwrap();
        let entries = maps.entry(key.to_owned()).or_default();
        if let Some(existing) = entries.iter_mut().find(|(f, _)| f == field) {
            existing.1 = value.to_owned();
        } else {
            entries.push((field.to_owned(), value.to_owned()));
        }
        Ok(())
    }

    fn hdel(&self, key: &str, field: &str) -> Result<(), RegistryError> {
        let mut maps = self.maps.lock().unwrap();
        if let Some(entries) = maps.get_mut(key) {
            entries.retain(|(f, _)| f != field);
        }
        Ok(())
    }

    fn hmget(&self, key: &str, fields: &[String]) -> Result<Vec<Option<String>>, RegistryError> {
        let maps = self.maps.lock().unwrap();
        let entries = maps.get(key);
        Ok(fields
            .iter()
            .map(|field| {
                entries.and_then(|entries| {
                    entries
                        .iter()
                        .find(|(f, _)| f == field)
                        .map(|(_, v)| v.clone())
                })
            })
            .collect())
    }

    fn hlen(&self, key: &str) -> Result<usize, RegistryError> {
        let maps = self.maps.lock().unwrap();
        Ok(maps.get(key).map_or(0, Vec::len))
    }

    fn hkeys(&self, key: &str) -> Result<Vec<String>, RegistryError> {
        let maps = self.maps.lock().unwrap();
        Ok(maps
            .get(key)
            .map(|entries| entries.iter().map(|(f, _)| f.clone()).collect())
            .unwrap_or_default())
    }

    fn hgetall(&self, key: &str) -> Result<Vec<(String, String)>, RegistryError> {
        let maps = self.maps.lock().unwrap();
        Ok(maps.get(key).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hset_preserves_insertion_order() {
        let registry = InMemoryRegistry::new();
        registry.hset("g:actor", "a2", "\"addr2\"").unwrap();
        registry.hset("g:actor", "a1", "\"addr1\"").unwrap();
        assert_eq!(registry.hkeys("g:actor").unwrap(), vec!["a2", "a1"]);
    }

    #[test]
    fn hset_updates_in_place_without_reordering() {
        let registry = InMemoryRegistry::new();
        registry.hset("g:actor", "a1", "\"first\"").unwrap();
        registry.hset("g:actor", "a2", "\"second\"").unwrap();
        registry.hset("g:actor", "a1", "\"updated\"").unwrap();
        assert_eq!(registry.hkeys("g:actor").unwrap(), vec!["a1", "a2"]);
        assert_eq!(
            registry.hmget("g:actor", &["a1".into()]).unwrap(),
            vec![Some("\"updated\"".to_owned())]
        );
    }

    #[test]
    fn hdel_removes_field_only() {
        let registry = InMemoryRegistry::new();
        registry.hset("g:actor", "a1", "\"x\"").unwrap();
        registry.hset("g:actor", "a2", "\"y\"").unwrap();
        registry.hdel("g:actor", "a1").unwrap();
        assert_eq!(registry.hkeys("g:actor").unwrap(), vec!["a2"]);
    }
}

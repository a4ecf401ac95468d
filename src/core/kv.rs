use std::collections::HashMap;
use std::sync::RwLock;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::core::errors::{StoreError, StoreResult};

/// Byte-oriented key-value backend the entity store is built on.
pub trait KeyValue: Send + Sync {
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    fn set(&self, key: &str, value: &[u8]) -> StoreResult<()>;

    fn delete(&self, key: &str) -> StoreResult<()>;

    fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    fn get_keys(&self) -> StoreResult<Vec<String>>;

    /// Writes `value` only when `key` is vacant. Returns `false` if the key
    /// was already taken.
    ///
    /// The default is check-then-set; backends that can do better override it.
    fn insert_new(&self, key: &str, value: &[u8]) -> StoreResult<bool> {
        if self.exists(key)? {
            return Ok(false);
        }
        self.set(key, value)?;
        Ok(true)
    }
}

/// JSON helpers over any backend.
pub trait KeyValueJson {
    fn get_json<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>>;
    fn set_json<T: Serialize>(&self, key: &str, value: &T) -> StoreResult<()>;
}

impl<K: KeyValue + ?Sized> KeyValueJson for K {
    fn get_json<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
        match self.get(key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn set_json<T: Serialize>(&self, key: &str, value: &T) -> StoreResult<()> {
        self.set(key, &serde_json::to_vec(value)?)
    }
}

/// In-process store used by the native server and tests.
#[derive(Default)]
pub struct MemoryKv {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Backend("lock poisoned".to_string())
}

impl KeyValue for MemoryKv {
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let map = self.entries.read().map_err(poisoned)?;
        Ok(map.get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        let mut map = self.entries.write().map_err(poisoned)?;
        map.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        let mut map = self.entries.write().map_err(poisoned)?;
        map.remove(key);
        Ok(())
    }

    fn exists(&self, key: &str) -> StoreResult<bool> {
        let map = self.entries.read().map_err(poisoned)?;
        Ok(map.contains_key(key))
    }

    fn get_keys(&self) -> StoreResult<Vec<String>> {
        let map = self.entries.read().map_err(poisoned)?;
        Ok(map.keys().cloned().collect())
    }

    fn insert_new(&self, key: &str, value: &[u8]) -> StoreResult<bool> {
        let mut map = self.entries.write().map_err(poisoned)?;
        if map.contains_key(key) {
            return Ok(false);
        }
        map.insert(key.to_string(), value.to_vec());
        Ok(true)
    }
}

#[cfg(target_arch = "wasm32")]
mod spin {
    use spin_sdk::key_value::Store;

    use super::KeyValue;
    use crate::core::errors::{StoreError, StoreResult};

    fn backend(err: spin_sdk::key_value::Error) -> StoreError {
        StoreError::Backend(format!("{:?}", err))
    }

    impl KeyValue for Store {
        fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
            Store::get(self, key).map_err(backend)
        }

        fn set(&self, key: &str, value: &[u8]) -> StoreResult<()> {
            Store::set(self, key, value).map_err(backend)
        }

        fn delete(&self, key: &str) -> StoreResult<()> {
            Store::delete(self, key).map_err(backend)
        }

        fn exists(&self, key: &str) -> StoreResult<bool> {
            Store::exists(self, key).map_err(backend)
        }

        fn get_keys(&self) -> StoreResult<Vec<String>> {
            Store::get_keys(self).map_err(backend)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_roundtrip_through_memory() {
        let kv = MemoryKv::new();
        kv.set_json("feed", &vec![3u64, 2, 1]).unwrap();
        let feed: Vec<u64> = kv.get_json("feed").unwrap().unwrap();
        assert_eq!(feed, vec![3, 2, 1]);
        assert!(kv.get_json::<Vec<u64>>("missing").unwrap().is_none());
    }

    #[test]
    fn insert_new_refuses_taken_keys() {
        let kv = MemoryKv::new();
        assert!(kv.insert_new("follow:1:2", b"a").unwrap());
        assert!(!kv.insert_new("follow:1:2", b"b").unwrap());
        assert_eq!(kv.get("follow:1:2").unwrap().unwrap(), b"a".to_vec());
    }

    #[test]
    fn delete_is_idempotent() {
        let kv = MemoryKv::new();
        kv.set("k", b"v").unwrap();
        kv.delete("k").unwrap();
        kv.delete("k").unwrap();
        assert!(kv.is_empty());
    }
}

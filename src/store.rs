use bytes::Bytes;
use std::collections::HashMap;
use std::ops::Deref;
use std::sync::{Arc, PoisonError, RwLock};

type Key = Bytes;
type Field = Bytes;

/// The Store holds the two keyspaces served by the command handlers: plain string values and
/// hashes (a key mapping to a set of field/value pairs). Keys and fields are arbitrary bytes.
///
/// Each keyspace sits behind its own read/write lock, so a `SET` never waits on an `HSET`. Locks
/// are held for a single map access only. The store is cheap to clone; clones share state.
#[derive(Clone, Default)]
pub struct Store {
    inner: Arc<InnerStore>,
}

impl Store {
    pub fn new() -> Store {
        Self::default()
    }
}

impl Deref for Store {
    type Target = InnerStore;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

#[derive(Default)]
pub struct InnerStore {
    strings: RwLock<HashMap<Key, Bytes>>,
    hashes: RwLock<HashMap<Key, HashMap<Field, Bytes>>>,
}

// Every critical section is a single `HashMap` call, so a poisoned lock still guards a
// consistent map.
impl InnerStore {
    pub fn get(&self, key: &[u8]) -> Option<Bytes> {
        let strings = self.strings.read().unwrap_or_else(PoisonError::into_inner);
        strings.get(key).cloned()
    }

    pub fn set(&self, key: Key, value: Bytes) {
        let mut strings = self.strings.write().unwrap_or_else(PoisonError::into_inner);
        strings.insert(key, value);
    }

    pub fn hget(&self, key: &[u8], field: &[u8]) -> Option<Bytes> {
        let hashes = self.hashes.read().unwrap_or_else(PoisonError::into_inner);
        hashes.get(key).and_then(|hash| hash.get(field)).cloned()
    }

    /// Upserts `field` in the hash stored at `key`, creating the hash if needed.
    pub fn hset(&self, key: Key, field: Field, value: Bytes) {
        let mut hashes = self.hashes.write().unwrap_or_else(PoisonError::into_inner);
        hashes.entry(key).or_default().insert(field, value);
    }

    /// A snapshot of every field/value pair of the hash at `key`, in no particular order. Empty
    /// when the key doesn't exist.
    pub fn hgetall(&self, key: &[u8]) -> Vec<(Field, Bytes)> {
        let hashes = self.hashes.read().unwrap_or_else(PoisonError::into_inner);
        hashes
            .get(key)
            .map(|hash| {
                hash.iter()
                    .map(|(field, value)| (field.clone(), value.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
impl InnerStore {
    /// Number of keys holding a plain string value.
    pub(crate) fn size(&self) -> usize {
        self.strings.read().unwrap().len()
    }

    pub(crate) fn strings_snapshot(&self) -> HashMap<Key, Bytes> {
        self.strings.read().unwrap().clone()
    }

    pub(crate) fn hashes_snapshot(&self) -> HashMap<Key, HashMap<Field, Bytes>> {
        self.hashes.read().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn set_and_get() {
        let store = Store::new();

        assert_eq!(store.get(b"foo"), None);

        store.set(Bytes::from("foo"), Bytes::from("bar"));
        assert_eq!(store.get(b"foo"), Some(Bytes::from("bar")));

        store.set(Bytes::from("foo"), Bytes::from("baz"));
        assert_eq!(store.get(b"foo"), Some(Bytes::from("baz")));
        assert_eq!(store.size(), 1);
    }

    #[test]
    fn hash_created_on_first_write() {
        let store = Store::new();

        assert_eq!(store.hget(b"h", b"f1"), None);
        assert!(store.hgetall(b"h").is_empty());

        store.hset(Bytes::from("h"), Bytes::from("f1"), Bytes::from("v1"));
        store.hset(Bytes::from("h"), Bytes::from("f2"), Bytes::from("v2"));
        store.hset(Bytes::from("h"), Bytes::from("f1"), Bytes::from("v3"));

        assert_eq!(store.hget(b"h", b"f1"), Some(Bytes::from("v3")));
        assert_eq!(store.hget(b"h", b"f3"), None);

        let mut all = store.hgetall(b"h");
        all.sort();
        assert_eq!(
            all,
            vec![
                (Bytes::from("f1"), Bytes::from("v3")),
                (Bytes::from("f2"), Bytes::from("v2")),
            ]
        );
    }

    #[test]
    fn keyspaces_are_independent() {
        let store = Store::new();

        store.set(Bytes::from("k"), Bytes::from("string"));
        store.hset(Bytes::from("k"), Bytes::from("f"), Bytes::from("hash"));

        assert_eq!(store.get(b"k"), Some(Bytes::from("string")));
        assert_eq!(store.hget(b"k", b"f"), Some(Bytes::from("hash")));
        assert_eq!(store.size(), 1);
    }

    #[test]
    fn clones_share_state() {
        let store = Store::new();
        let clone = store.clone();

        clone.set(Bytes::from("foo"), Bytes::from("bar"));

        assert_eq!(store.get(b"foo"), Some(Bytes::from("bar")));
    }

    #[test]
    fn binary_keys_and_fields() {
        let store = Store::new();
        let key = Bytes::from_static(&[0xff, 0x00, 0xfe]);
        let field = Bytes::from_static(b"\r\n\x80");

        store.set(key.clone(), Bytes::from("v1"));
        store.hset(key.clone(), field.clone(), Bytes::from("v2"));

        assert_eq!(store.get(&key), Some(Bytes::from("v1")));
        assert_eq!(store.hget(&key, &field), Some(Bytes::from("v2")));
        assert_eq!(store.hget(&key, b"\r\n"), None);
    }

    #[test]
    fn concurrent_writers_to_the_same_key() {
        let store = Store::new();
        let writers = 16;

        let handles: Vec<_> = (0..writers)
            .map(|i| {
                let store = store.clone();
                thread::spawn(move || {
                    for _ in 0..100 {
                        store.set(Bytes::from("key"), Bytes::from(i.to_string()));
                        let field = Bytes::from(i.to_string());
                        store.hset(Bytes::from("hash"), field, Bytes::from("v"));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let value = store.get(b"key").unwrap();
        let value: usize = std::str::from_utf8(&value).unwrap().parse().unwrap();
        assert!(value < writers);
        assert_eq!(store.size(), 1);
        assert_eq!(store.hgetall(b"hash").len(), writers);
    }
}

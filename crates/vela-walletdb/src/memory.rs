//! In-memory store implementation
//!
//! Keeps every bucket in a `BTreeMap` so iteration order matches the
//! on-disk backends. Write transactions stage their changes on a copy of
//! the maps and swap it in on commit, giving the same all-or-nothing
//! semantics as the sqlite backend.

use parking_lot::Mutex;
use std::cell::RefCell;
use std::collections::BTreeMap;

use crate::{ReadTx, Result, WriteTx};

type Buckets = BTreeMap<Vec<u8>, BTreeMap<Vec<u8>, Vec<u8>>>;

/// In-memory bucketed store
#[derive(Default)]
pub struct MemoryDb {
    buckets: Mutex<Buckets>,
}

impl MemoryDb {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` with a read-only snapshot of the store.
    pub fn view<T, E>(&self, f: impl FnOnce(&MemoryTx) -> std::result::Result<T, E>) -> std::result::Result<T, E> {
        let tx = MemoryTx {
            buckets: RefCell::new(self.buckets.lock().clone()),
        };
        f(&tx)
    }

    /// Run `f` inside a write transaction.
    ///
    /// Changes are committed only when `f` returns `Ok`; on error the
    /// staged state is discarded.
    pub fn update<T, E>(&self, f: impl FnOnce(&MemoryTx) -> std::result::Result<T, E>) -> std::result::Result<T, E> {
        let mut guard = self.buckets.lock();
        let tx = MemoryTx {
            buckets: RefCell::new(guard.clone()),
        };
        let out = f(&tx)?;
        *guard = tx.buckets.into_inner();
        Ok(out)
    }
}

/// Transaction over the in-memory store
pub struct MemoryTx {
    buckets: RefCell<Buckets>,
}

impl ReadTx for MemoryTx {
    fn get(&self, bucket: &[u8], key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self
            .buckets
            .borrow()
            .get(bucket)
            .and_then(|b| b.get(key))
            .cloned())
    }

    fn for_each(&self, bucket: &[u8], f: &mut dyn FnMut(&[u8], &[u8]) -> bool) -> Result<()> {
        // Callbacks may re-enter the transaction, so iterate over a copy
        // rather than holding the borrow.
        let pairs: Vec<(Vec<u8>, Vec<u8>)> = self
            .buckets
            .borrow()
            .get(bucket)
            .map(|b| b.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();
        for (k, v) in pairs {
            if !f(&k, &v) {
                break;
            }
        }
        Ok(())
    }
}

impl WriteTx for MemoryTx {
    fn put(&self, bucket: &[u8], key: &[u8], value: &[u8]) -> Result<()> {
        self.buckets
            .borrow_mut()
            .entry(bucket.to_vec())
            .or_default()
            .insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, bucket: &[u8], key: &[u8]) -> Result<()> {
        if let Some(b) = self.buckets.borrow_mut().get_mut(bucket) {
            b.remove(key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn put_get_roundtrip() {
        let db = MemoryDb::new();
        db.update::<_, Error>(|tx| {
            tx.put(b"bucket", b"key", b"value")?;
            assert_eq!(tx.get(b"bucket", b"key")?, Some(b"value".to_vec()));
            Ok(())
        })
        .unwrap();

        db.view::<_, Error>(|tx| {
            assert_eq!(tx.get(b"bucket", b"key")?, Some(b"value".to_vec()));
            assert_eq!(tx.get(b"bucket", b"missing")?, None);
            assert_eq!(tx.get(b"other", b"key")?, None);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn update_rolls_back_on_error() {
        let db = MemoryDb::new();
        let res = db.update::<(), Error>(|tx| {
            tx.put(b"bucket", b"key", b"value")?;
            Err(Error::Store("boom".into()))
        });
        assert!(res.is_err());

        db.view::<_, Error>(|tx| {
            assert_eq!(tx.get(b"bucket", b"key")?, None);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn delete_removes_key() {
        let db = MemoryDb::new();
        db.update::<_, Error>(|tx| {
            tx.put(b"bucket", b"key", b"value")?;
            tx.delete(b"bucket", b"key")?;
            assert_eq!(tx.get(b"bucket", b"key")?, None);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn for_each_visits_in_key_order() {
        let db = MemoryDb::new();
        db.update::<_, Error>(|tx| {
            tx.put(b"bucket", b"b", &[2])?;
            tx.put(b"bucket", b"a", &[1])?;
            tx.put(b"bucket", b"c", &[3])?;
            Ok(())
        })
        .unwrap();

        db.view::<_, Error>(|tx| {
            let mut keys = Vec::new();
            tx.for_each(b"bucket", &mut |k, _| {
                keys.push(k.to_vec());
                true
            })?;
            assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn for_each_stops_early() {
        let db = MemoryDb::new();
        db.update::<_, Error>(|tx| {
            for i in 0u8..5 {
                tx.put(b"bucket", &[i], &[i])?;
            }
            Ok(())
        })
        .unwrap();

        db.view::<_, Error>(|tx| {
            let mut seen = 0;
            tx.for_each(b"bucket", &mut |_, _| {
                seen += 1;
                seen < 2
            })?;
            assert_eq!(seen, 2);
            Ok(())
        })
        .unwrap();
    }
}

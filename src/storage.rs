//! Optimized storage layer using RocksDB

use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use std::path::Path;
use std::sync::Arc;

/// Key/value store shared by the service and the inspector binary
#[derive(Clone)]
pub struct OptimizedStorage {
    db: Arc<DB>,
}

/// One atomic group of writes
#[derive(Default)]
pub struct StorageBatch {
    batch: WriteBatch,
    len: usize,
}

impl StorageBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put<K: AsRef<[u8]>, V: AsRef<[u8]>>(&mut self, key: K, value: V) {
        self.batch.put(key, value);
        self.len += 1;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl OptimizedStorage {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, rocksdb::Error> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_write_buffer_size(32 * 1024 * 1024);
        opts.set_max_write_buffer_number(4);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        let db = DB::open(&opts, path)?;
        Ok(Self { db: Arc::new(db) })
    }

    /// Open an existing database without taking the writer lock. Writes fail.
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> Result<Self, rocksdb::Error> {
        let db = DB::open_for_read_only(&Options::default(), path, false)?;
        Ok(Self { db: Arc::new(db) })
    }

    /// Open `path`, wiping any existing database first when `clear` is set
    pub fn open_with_reset<P: AsRef<Path>>(path: P, clear: bool) -> Result<Self, rocksdb::Error> {
        if clear && path.as_ref().exists() {
            tracing::warn!("Clearing database at {}", path.as_ref().display());
            DB::destroy(&Options::default(), path.as_ref())?;
        }
        Self::new(path)
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, rocksdb::Error> {
        self.db.get(key)
    }

    pub fn write(&self, batch: StorageBatch) -> Result<(), rocksdb::Error> {
        self.db.write(batch.batch)
    }

    /// Up to `limit` entries whose key starts with `prefix`, in key order,
    /// beginning strictly after `start_after` when given
    pub fn scan_prefix(
        &self,
        prefix: &[u8],
        start_after: Option<&[u8]>,
        limit: usize,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, rocksdb::Error> {
        let start = start_after.unwrap_or(prefix);
        let mut rows = Vec::new();

        for item in self.db.iterator(IteratorMode::From(start, Direction::Forward)) {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            if start_after.is_some_and(|after| key.as_ref() == after) {
                continue;
            }
            rows.push((key.to_vec(), value.to_vec()));
            if rows.len() >= limit {
                break;
            }
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn put(storage: &OptimizedStorage, key: &[u8], value: &[u8]) {
        let mut batch = StorageBatch::new();
        batch.put(key, value);
        storage.write(batch).unwrap();
    }

    #[test]
    fn test_put_get() {
        let dir = TempDir::new().unwrap();
        let storage = OptimizedStorage::new(dir.path()).unwrap();

        put(&storage, b"a", b"1");
        assert_eq!(storage.get(b"a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(storage.get(b"b").unwrap(), None);
    }

    #[test]
    fn test_scan_prefix_with_cursor() {
        let dir = TempDir::new().unwrap();
        let storage = OptimizedStorage::new(dir.path()).unwrap();
        let mut batch = StorageBatch::new();
        for (key, value) in [("p:1", "x"), ("p:2", "y"), ("p:3", "z"), ("q:1", "w")] {
            batch.put(key, value);
        }
        assert_eq!(batch.len(), 4);
        storage.write(batch).unwrap();

        let all = storage.scan_prefix(b"p:", None, 10).unwrap();
        assert_eq!(all.len(), 3);

        let page = storage.scan_prefix(b"p:", Some(b"p:1"), 1).unwrap();
        assert_eq!(page, vec![(b"p:2".to_vec(), b"y".to_vec())]);
    }

    #[test]
    fn test_read_only_rejects_writes() {
        let dir = TempDir::new().unwrap();
        {
            let storage = OptimizedStorage::new(dir.path()).unwrap();
            put(&storage, b"k", b"v");
        }
        let storage = OptimizedStorage::open_read_only(dir.path()).unwrap();
        assert_eq!(storage.get(b"k").unwrap(), Some(b"v".to_vec()));

        let mut batch = StorageBatch::new();
        batch.put(b"k2", b"v2");
        assert!(storage.write(batch).is_err());
        assert!(storage.get(b"k2").unwrap().is_none());
    }

    #[test]
    fn test_open_with_reset_clears() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db");
        {
            let storage = OptimizedStorage::new(&path).unwrap();
            put(&storage, b"k", b"v");
        }
        let storage = OptimizedStorage::open_with_reset(&path, true).unwrap();
        assert!(storage.get(b"k").unwrap().is_none());
    }
}

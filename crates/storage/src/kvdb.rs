//! RocksDB wrapper, one database per logical namespace.
//!
//! The block store keeps several small independent databases rather than
//! column families in one: tx-body databases are created and destroyed per
//! DS epoch, and destroying a whole database is how an epoch's bodies are
//! retired. Readers and writers of one database share a read-write lock;
//! iteration snapshots the ascending key order.

use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use rocksdb::{IteratorMode, Options, DB};
use tracing::{debug, info};

use crate::{Result, StorageError};

/// A named key-value database under a common base directory.
pub struct KvDb {
    inner: DB,
    name: String,
    path: PathBuf,
    // Coordinates writers; rocksdb is internally synchronized but truncation
    // must exclude concurrent readers of the same logical store.
    lock: RwLock<()>,
}

impl KvDb {
    /// Open (or create) the database `name` under `base_dir`.
    pub fn open(base_dir: &Path, name: &str) -> Result<Self> {
        let path = base_dir.join(name);
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        let inner = DB::open(&opts, &path)?;
        info!(db = name, path = %path.display(), "opened database");
        Ok(Self {
            inner,
            name: name.to_string(),
            path,
            lock: RwLock::new(()),
        })
    }

    /// The database name (its directory name under the base dir).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Insert or overwrite `key`.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let _guard = self.lock.write();
        self.inner.put(key, value)?;
        Ok(())
    }

    /// Look up `key`.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let _guard = self.lock.read();
        Ok(self.inner.get(key)?)
    }

    /// Whether `key` is present.
    pub fn exists(&self, key: &[u8]) -> Result<bool> {
        self.get(key).map(|v| v.is_some())
    }

    /// Delete `key`; deleting an absent key succeeds.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        let _guard = self.lock.write();
        self.inner.delete(key)?;
        Ok(())
    }

    /// All entries in ascending key order.
    pub fn entries(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let _guard = self.lock.read();
        let mut out = Vec::new();
        for item in self.inner.iterator(IteratorMode::Start) {
            let (k, v) = item.map_err(StorageError::from)?;
            out.push((k.into_vec(), v.into_vec()));
        }
        Ok(out)
    }

    /// All keys in ascending order.
    pub fn keys(&self) -> Result<Vec<Vec<u8>>> {
        Ok(self.entries()?.into_iter().map(|(k, _)| k).collect())
    }

    /// Number of entries (full scan; the store's databases stay small).
    pub fn len(&self) -> Result<usize> {
        Ok(self.entries()?.len())
    }

    /// Whether the database holds no entries.
    pub fn is_empty(&self) -> Result<bool> {
        self.len().map(|n| n == 0)
    }

    /// Remove every entry, keeping the database open.
    pub fn truncate(&self) -> Result<()> {
        let _guard = self.lock.write();
        let keys: Vec<Vec<u8>> = self
            .inner
            .iterator(IteratorMode::Start)
            .map(|item| item.map(|(k, _)| k.into_vec()).map_err(StorageError::from))
            .collect::<Result<_>>()?;
        for key in keys {
            self.inner.delete(&key)?;
        }
        debug!(db = %self.name, "truncated database");
        Ok(())
    }

    /// Close the database and delete its files from disk.
    pub fn destroy(self) -> Result<()> {
        let path = self.path.clone();
        let name = self.name.clone();
        drop(self);
        DB::destroy(&Options::default(), &path)?;
        info!(db = name, path = %path.display(), "destroyed database");
        Ok(())
    }
}

impl std::fmt::Debug for KvDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvDb").field("name", &self.name).finish()
    }
}

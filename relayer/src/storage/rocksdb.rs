//! RocksDB-backed store.
//!
//! Records are kept in a RocksDB instance with dedicated column families:
//!
//! - `"records"`: every per-shard record (calls, outcomes, blocks, ...),
//! - `"meta"`:    the `METADATA` and `EXECUTION_SUMMARY` singletons.
//!
//! A batch spanning both families is committed through a single
//! `WriteBatch`, so it is applied atomically.

use std::{path::Path, sync::Arc};

use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, ErrorKind, MultiThreaded,
    Options, WriteBatch, WriteOptions,
};

use super::{StorageError, Store, StoreOp, keys};

type Db = DBWithThreadMode<MultiThreaded>;

const CF_RECORDS: &str = "records";
const CF_META: &str = "meta";

/// Configuration for [`RocksDbStore`].
#[derive(Clone, Debug)]
pub struct RocksDbConfig {
    /// Filesystem path to the RocksDB database directory.
    pub path: String,
    /// Whether to create the database and missing column families if they
    /// do not yet exist.
    pub create_if_missing: bool,
    /// Whether every batch is fsync'ed before the write returns.
    pub sync_writes: bool,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            path: "data/relayer-db".to_string(),
            create_if_missing: true,
            sync_writes: true,
        }
    }
}

/// RocksDB-backed implementation of [`Store`].
pub struct RocksDbStore {
    db: Db,
    sync_writes: bool,
}

impl RocksDbStore {
    /// Opens (or creates) a store at the configured path.
    ///
    /// The `"default"` column family is also opened to keep RocksDB happy,
    /// but it is not used. RocksDB locks the directory for the lifetime of
    /// the store, so a second opener gets [`StorageError::Locked`].
    pub fn open(cfg: &RocksDbConfig) -> Result<Self, StorageError> {
        let path = Path::new(&cfg.path);

        let mut opts = Options::default();
        opts.create_if_missing(cfg.create_if_missing);
        opts.create_missing_column_families(cfg.create_if_missing);

        let cfs = vec![
            ColumnFamilyDescriptor::new("default", Options::default()),
            ColumnFamilyDescriptor::new(CF_RECORDS, Options::default()),
            ColumnFamilyDescriptor::new(CF_META, Options::default()),
        ];

        let db = Db::open_cf_descriptors(&opts, path, cfs).map_err(|e| {
            if e.kind() == ErrorKind::IOError && e.as_ref().contains("lock") {
                StorageError::Locked {
                    path: cfg.path.clone(),
                }
            } else {
                StorageError::RocksDb(e)
            }
        })?;

        Ok(Self {
            db,
            sync_writes: cfg.sync_writes,
        })
    }

    fn cf_for(&self, key: &[u8]) -> Result<Arc<BoundColumnFamily<'_>>, StorageError> {
        let name = if keys::is_singleton(key) { CF_META } else { CF_RECORDS };
        self.db
            .cf_handle(name)
            .ok_or(StorageError::MissingColumnFamily(name))
    }
}

impl Store for RocksDbStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        let cf = self.cf_for(key)?;
        Ok(self.db.get_cf(&cf, key)?)
    }

    fn write_batch(&self, ops: Vec<StoreOp>) -> Result<(), StorageError> {
        let mut batch = WriteBatch::default();
        for op in &ops {
            let cf = self.cf_for(&op.key)?;
            batch.put_cf(&cf, &op.key, &op.value);
        }

        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.sync_writes);
        self.db.write_opt(batch, &write_opts)?;
        Ok(())
    }
}

//! The block store.
//!
//! Owns the durable namespaces written by the directory service:
//!
//! - `metadata`: small typed blobs keyed by a [`MetaType`] tag
//! - `dsBlocks`: DS blocks keyed by big-endian block number
//! - `txBlocks`: Tx blocks keyed by big-endian block number
//! - `txBodies`, `txBodies_<n>`: a FIFO of per-DS-epoch transaction-body
//!   databases; a new one is pushed at each DS epoch and the oldest is
//!   retired through the `txBodiesTmp` staging database
//!
//! Only lookup nodes instantiate the body store; directory and shard nodes
//! keep block headers only.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use shardnet_types::{DsBlock, Hash, TxBlock, TxBody};
use tracing::{debug, warn};

use crate::kvdb::KvDb;
use crate::{Result, StorageError};

/// Name of the head transaction-body database.
const TX_BODY_DB_NAME: &str = "txBodies";

/// Name of the staging database that retired bodies pass through.
const TX_BODY_TMP_DB_NAME: &str = "txBodiesTmp";

/// Tags for the typed blobs in the `metadata` namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MetaType {
    /// Latest state-trie root checkpoint.
    StateRoot = 0x00,
    /// Set while a DS epoch is mid-flight; cleared on completion.
    DsIncompleted = 0x01,
    /// Number of the most recent DS block with an active body database.
    LatestActiveDsBlockNum = 0x02,
}

impl MetaType {
    fn key(self) -> [u8; 1] {
        [self as u8]
    }
}

/// Selects a namespace for [`BlockStorage::reset_db`] and
/// [`BlockStorage::db_names`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbKind {
    /// The `metadata` namespace.
    Metadata,
    /// The `dsBlocks` namespace.
    DsBlock,
    /// The `txBlocks` namespace.
    TxBlock,
    /// Every database in the body FIFO.
    TxBodies,
    /// The `txBodiesTmp` staging database.
    TxBodyTmp,
}

/// Durable store for DS blocks, Tx blocks, and transaction bodies.
pub struct BlockStorage {
    base_dir: PathBuf,
    metadata: KvDb,
    ds_blocks: KvDb,
    tx_blocks: KvDb,
    /// FIFO of per-epoch body databases, oldest at the front. Empty unless
    /// the node runs in lookup mode.
    tx_bodies: Mutex<VecDeque<KvDb>>,
    tx_body_tmp: Option<KvDb>,
    lookup_mode: bool,
}

impl BlockStorage {
    /// Open the store under `base_dir`. The transaction-body databases are
    /// only created when `lookup_mode` is set.
    pub fn open(base_dir: &Path, lookup_mode: bool) -> Result<Self> {
        let metadata = KvDb::open(base_dir, "metadata")?;
        let ds_blocks = KvDb::open(base_dir, "dsBlocks")?;
        let tx_blocks = KvDb::open(base_dir, "txBlocks")?;

        let mut bodies = VecDeque::new();
        let mut tx_body_tmp = None;
        if lookup_mode {
            bodies.push_back(KvDb::open(base_dir, TX_BODY_DB_NAME)?);
            tx_body_tmp = Some(KvDb::open(base_dir, TX_BODY_TMP_DB_NAME)?);
        }

        Ok(Self {
            base_dir: base_dir.to_path_buf(),
            metadata,
            ds_blocks,
            tx_blocks,
            tx_bodies: Mutex::new(bodies),
            tx_body_tmp,
            lookup_mode,
        })
    }

    /// Whether the body store is instantiated.
    pub fn has_body_store(&self) -> bool {
        self.lookup_mode
    }

    // ----- DS blocks ---------------------------------------------------

    /// Insert or overwrite the DS block at `block_num`.
    pub fn put_ds_block(&self, block_num: u64, block: &DsBlock) -> Result<()> {
        self.ds_blocks
            .put(&block_num.to_be_bytes(), &block.to_bytes())
    }

    /// Fetch the DS block at `block_num`; `Ok(None)` when absent.
    pub fn get_ds_block(&self, block_num: u64) -> Result<Option<DsBlock>> {
        match self.ds_blocks.get(&block_num.to_be_bytes())? {
            Some(bytes) => Ok(Some(DsBlock::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Delete the DS block at `block_num`; absent blocks are a no-op.
    pub fn delete_ds_block(&self, block_num: u64) -> Result<()> {
        self.ds_blocks.delete(&block_num.to_be_bytes())
    }

    /// All DS blocks in ascending block-number order.
    pub fn get_all_ds_blocks(&self) -> Result<Vec<DsBlock>> {
        self.ds_blocks
            .entries()?
            .into_iter()
            .map(|(_, v)| DsBlock::from_bytes(&v).map_err(StorageError::from))
            .collect()
    }

    // ----- Tx blocks ---------------------------------------------------

    /// Insert or overwrite the Tx block at `block_num`.
    pub fn put_tx_block(&self, block_num: u64, block: &TxBlock) -> Result<()> {
        self.tx_blocks
            .put(&block_num.to_be_bytes(), &block.to_bytes())
    }

    /// Fetch the Tx block at `block_num`; `Ok(None)` when absent.
    pub fn get_tx_block(&self, block_num: u64) -> Result<Option<TxBlock>> {
        match self.tx_blocks.get(&block_num.to_be_bytes())? {
            Some(bytes) => Ok(Some(TxBlock::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Delete the Tx block at `block_num`; absent blocks are a no-op.
    pub fn delete_tx_block(&self, block_num: u64) -> Result<()> {
        self.tx_blocks.delete(&block_num.to_be_bytes())
    }

    /// All Tx blocks in ascending block-number order.
    pub fn get_all_tx_blocks(&self) -> Result<Vec<TxBlock>> {
        self.tx_blocks
            .entries()?
            .into_iter()
            .map(|(_, v)| TxBlock::from_bytes(&v).map_err(StorageError::from))
            .collect()
    }

    // ----- Tx bodies ---------------------------------------------------

    /// Insert or overwrite a transaction body in the newest body database.
    pub fn put_tx_body(&self, hash: &Hash, body: &TxBody) -> Result<()> {
        let bodies = self.tx_bodies.lock();
        let db = bodies.back().ok_or_else(Self::body_store_disabled)?;
        db.put(hash, &body.to_bytes())
    }

    /// Fetch a transaction body, searching body databases newest first.
    pub fn get_tx_body(&self, hash: &Hash) -> Result<Option<TxBody>> {
        let bodies = self.tx_bodies.lock();
        for db in bodies.iter().rev() {
            if let Some(bytes) = db.get(hash)? {
                return Ok(Some(TxBody::from_bytes(&bytes)?));
            }
        }
        Ok(None)
    }

    /// Delete a transaction body from every body database.
    pub fn delete_tx_body(&self, hash: &Hash) -> Result<()> {
        let bodies = self.tx_bodies.lock();
        for db in bodies.iter() {
            db.delete(hash)?;
        }
        Ok(())
    }

    /// Open the body database for the DS epoch starting at `block_num` and
    /// append it to the FIFO.
    pub fn push_back_tx_body_db(&self, block_num: u64) -> Result<()> {
        if !self.lookup_mode {
            return Err(Self::body_store_disabled());
        }
        let name = format!("{}_{}", TX_BODY_DB_NAME, block_num);
        let db = KvDb::open(&self.base_dir, &name)?;
        let mut bodies = self.tx_bodies.lock();
        bodies.push_back(db);
        self.metadata
            .put(&MetaType::LatestActiveDsBlockNum.key(), &block_num.to_be_bytes())?;
        debug!(block_num, bodies = bodies.len(), "pushed tx body database");
        Ok(())
    }

    /// Retire the oldest body database: its entries move into the
    /// `txBodiesTmp` staging database and its files are destroyed.
    ///
    /// With `mandatory` unset, an empty FIFO is a no-op returning `Ok(false)`;
    /// set, it is an error.
    pub fn pop_front_tx_body_db(&self, mandatory: bool) -> Result<bool> {
        let popped = {
            let mut bodies = self.tx_bodies.lock();
            match bodies.pop_front() {
                Some(db) => db,
                None => {
                    if mandatory {
                        return Err(StorageError::Database(
                            "no tx body database to retire".to_string(),
                        ));
                    }
                    warn!("pop of tx body database skipped: FIFO empty");
                    return Ok(false);
                }
            }
        };

        if let Some(tmp) = &self.tx_body_tmp {
            for (k, v) in popped.entries()? {
                tmp.put(&k, &v)?;
            }
        }
        debug!(db = popped.name(), "retiring tx body database");
        popped.destroy()?;
        Ok(true)
    }

    /// Number of body databases currently in the FIFO.
    pub fn tx_body_db_count(&self) -> usize {
        self.tx_bodies.lock().len()
    }

    /// Keys of every body staged in `txBodiesTmp`.
    pub fn get_all_tx_bodies_tmp(&self) -> Result<Vec<Hash>> {
        let tmp = self.tx_body_tmp.as_ref().ok_or_else(Self::body_store_disabled)?;
        tmp.keys()?
            .into_iter()
            .map(|k| {
                k.as_slice().try_into().map_err(|_| {
                    StorageError::Database(format!("tx body key of {} bytes", k.len()))
                })
            })
            .collect()
    }

    // ----- Metadata ----------------------------------------------------

    /// Store a metadata blob under `tag`.
    pub fn put_metadata(&self, tag: MetaType, data: &[u8]) -> Result<()> {
        self.metadata.put(&tag.key(), data)
    }

    /// Fetch the metadata blob under `tag`; `Ok(None)` when absent.
    pub fn get_metadata(&self, tag: MetaType) -> Result<Option<Vec<u8>>> {
        self.metadata.get(&tag.key())
    }

    // ----- Maintenance -------------------------------------------------

    /// Names of the databases backing `kind`, in FIFO order for the bodies.
    pub fn db_names(&self, kind: DbKind) -> Vec<String> {
        match kind {
            DbKind::Metadata => vec!["metadata".to_string()],
            DbKind::DsBlock => vec!["dsBlocks".to_string()],
            DbKind::TxBlock => vec!["txBlocks".to_string()],
            DbKind::TxBodies => self
                .tx_bodies
                .lock()
                .iter()
                .map(|db| db.name().to_string())
                .collect(),
            DbKind::TxBodyTmp => vec![TX_BODY_TMP_DB_NAME.to_string()],
        }
    }

    /// Truncate every database backing `kind`.
    pub fn reset_db(&self, kind: DbKind) -> Result<()> {
        match kind {
            DbKind::Metadata => self.metadata.truncate(),
            DbKind::DsBlock => self.ds_blocks.truncate(),
            DbKind::TxBlock => self.tx_blocks.truncate(),
            DbKind::TxBodies => {
                let bodies = self.tx_bodies.lock();
                for db in bodies.iter() {
                    db.truncate()?;
                }
                Ok(())
            }
            DbKind::TxBodyTmp => match &self.tx_body_tmp {
                Some(tmp) => tmp.truncate(),
                None => Ok(()),
            },
        }
    }

    /// Truncate every namespace.
    pub fn reset_all(&self) -> Result<()> {
        self.reset_db(DbKind::Metadata)?;
        self.reset_db(DbKind::DsBlock)?;
        self.reset_db(DbKind::TxBlock)?;
        if self.lookup_mode {
            self.reset_db(DbKind::TxBodies)?;
            self.reset_db(DbKind::TxBodyTmp)?;
        }
        Ok(())
    }

    fn body_store_disabled() -> StorageError {
        StorageError::Database("tx body store is only available on lookup nodes".to_string())
    }
}

impl std::fmt::Debug for BlockStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockStorage")
            .field("base_dir", &self.base_dir)
            .field("lookup_mode", &self.lookup_mode)
            .field("tx_body_dbs", &self.tx_body_db_count())
            .finish()
    }
}

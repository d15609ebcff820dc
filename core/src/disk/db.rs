//!
//! One LSM partition: a RocksDB instance with `meta` and `data` column
//! families (plus the engine default, unused).
//!

use super::filter::{DataFilterFactory, DbSlot, MetaFilterFactory};
use super::{WriteOp, CF_DATA, CF_META};
use crate::common::MB;
use ruc::*;
use rocksdb::{
    BlockBasedOptions, Cache, ColumnFamily, ColumnFamilyDescriptor, Options, WriteBatch, DB,
};
use std::{
    path::Path,
    sync::{Arc, OnceLock},
};
use tracing::{error, info};

pub struct DiskDb {
    id: usize,
    name: String,
    db: Arc<DB>,
}

fn cf_options(cache: &Cache, filter_factory: impl FnOnce(&mut Options)) -> Options {
    let mut opts = Options::default();

    let mut table = BlockBasedOptions::default();
    table.set_block_size(4096);
    table.set_cache_index_and_filter_blocks(true);
    table.set_block_cache(cache);
    table.set_bloom_filter(10.0, true);
    opts.set_block_based_table_factory(&table);

    filter_factory(&mut opts);
    opts
}

impl DiskDb {
    pub fn open(root: &Path, id: usize, meta_cache: &Cache, data_cache: &Cache) -> Result<DiskDb> {
        let name = format!("partition_{id:05}");
        let dir = root.join(&name);

        let slot: DbSlot = Arc::new(OnceLock::new());

        let meta_opts = cf_options(meta_cache, |o| {
            o.set_compaction_filter_factory(MetaFilterFactory::new(&name));
        });
        let data_opts = cf_options(data_cache, |o| {
            o.set_compaction_filter_factory(DataFilterFactory::new(&name, Arc::clone(&slot)));
        });

        let cfs = vec![
            ColumnFamilyDescriptor::new(CF_META, meta_opts),
            ColumnFamilyDescriptor::new(CF_DATA, data_opts),
        ];

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_write_buffer_size(256 * MB);
        opts.set_target_file_size_base(20 * MB as u64);
        opts.set_max_background_jobs(3);
        opts.set_max_bytes_for_level_multiplier(10.0);
        opts.set_optimize_filters_for_hits(false);
        opts.set_level_compaction_dynamic_level_bytes(false);
        opts.set_max_open_files(5000);

        let db = Arc::new(DB::open_cf_descriptors(&opts, &dir, cfs).c(d!())?);
        let _ = slot.set(Arc::downgrade(&db));

        info!("opened rocksdb {}", name);
        Ok(DiskDb { id, name, db })
    }

    #[inline(always)]
    pub fn id(&self) -> usize {
        self.id
    }

    #[inline(always)]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn cf(&self, name: &str) -> &ColumnFamily {
        // both families are created at open time
        self.db
            .cf_handle(name)
            .expect("column family missing")
    }

    pub fn get_meta(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.db.get_cf(self.cf(CF_META), key).c(d!())
    }

    pub fn get_data(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.db.get_cf(self.cf(CF_DATA), key).c(d!())
    }

    /// Batched multi-read from the data family; errors are logged and read
    /// as absent.
    pub fn multi_get_data(&self, keys: &[Vec<u8>]) -> Vec<Option<Vec<u8>>> {
        let cf = self.cf(CF_DATA);
        self.db
            .multi_get_cf(keys.iter().map(|k| (cf, k.as_slice())))
            .into_iter()
            .map(|r| match r {
                Ok(v) => v,
                Err(e) => {
                    error!("{} multi_get: {}", self.name, e);
                    None
                }
            })
            .collect()
    }

    pub fn apply(&self, batch: &mut WriteBatch, op: &WriteOp) {
        match op {
            WriteOp::PutMeta(k, v) => batch.put_cf(self.cf(CF_META), k, v),
            WriteOp::PutData(k, v) => batch.put_cf(self.cf(CF_DATA), k, v),
            WriteOp::DelMeta(k) => batch.delete_cf(self.cf(CF_META), k),
            WriteOp::DelData(k) => batch.delete_cf(self.cf(CF_DATA), k),
        }
    }

    pub fn write(&self, batch: WriteBatch) -> Result<()> {
        self.db.write(batch).c(d!())
    }

    /// Full manual compaction of both families, which is also what forces
    /// the expiry and generation filters to run.
    pub fn compact(&self) {
        info!("start to compact rocksdb {}", self.name);
        self.db
            .compact_range_cf(self.cf(CF_META), None::<&[u8]>, None::<&[u8]>);
        self.db
            .compact_range_cf(self.cf(CF_DATA), None::<&[u8]>, None::<&[u8]>);
    }
}

//!
//! Compaction filters: expiry and generation cleanup happen lazily, inside
//! RocksDB's own compactions, never on the command path.
//!

use super::codec::{parse_data_key, MetaRec, META_HEADER_SIZE};
use super::CF_META;
use crate::common::now_ms;
use crate::object::TYPE_NONE;
use rocksdb::{
    compaction_filter::{CompactionFilter, Decision},
    compaction_filter_factory::{CompactionFilterContext, CompactionFilterFactory},
    DB,
};
use std::{
    ffi::{CStr, CString},
    sync::{Arc, OnceLock, Weak},
};
use tracing::warn;

/// Late-bound handle to the owning DB: the factory is built before the DB
/// opens, the data filter needs to read the meta column family afterwards.
pub type DbSlot = Arc<OnceLock<Weak<DB>>>;

fn filter_name(partition: &str, kind: &str) -> CString {
    CString::new(format!("{partition}.{kind}")).unwrap_or_default()
}

/////////////////////////////////////////////////////////////////////////////
// meta
/////////////////////////////////////////////////////////////////////////////

pub struct MetaFilter {
    name: CString,
}

impl CompactionFilter for MetaFilter {
    fn filter(&mut self, _level: u32, _key: &[u8], value: &[u8]) -> Decision {
        if value.len() < META_HEADER_SIZE {
            return Decision::Remove;
        }
        let Some(rec) = MetaRec::decode(value) else {
            return Decision::Remove;
        };

        if rec.expire_ms > 0 && now_ms() >= rec.expire_ms {
            // Rewrite as a zeroed record one generation up, which condemns
            // every data row of the old generation. The filter API only
            // accepts 'static slices, hence the leak per rewritten row.
            let row = MetaRec::tombstone(rec.version.wrapping_add(1)).encode();
            return Decision::Change(Box::leak(row.into_boxed_slice()));
        }

        Decision::Keep
    }

    fn name(&self) -> &CStr {
        &self.name
    }
}

pub struct MetaFilterFactory {
    partition: String,
}

impl MetaFilterFactory {
    pub fn new(partition: &str) -> Self {
        MetaFilterFactory {
            partition: partition.to_owned(),
        }
    }
}

impl CompactionFilterFactory for MetaFilterFactory {
    type Filter = MetaFilter;

    fn create(&mut self, _context: CompactionFilterContext) -> MetaFilter {
        MetaFilter {
            name: filter_name(&self.partition, "meta"),
        }
    }

    fn name(&self) -> &CStr {
        static NAME: &[u8] = b"shoal.meta-filter-factory\0";
        CStr::from_bytes_with_nul(NAME).unwrap_or_default()
    }
}

/////////////////////////////////////////////////////////////////////////////
// data
/////////////////////////////////////////////////////////////////////////////

pub struct DataFilter {
    name: CString,
    db: DbSlot,
}

impl DataFilter {
    /// Keep is the conservative answer whenever the meta row cannot be
    /// consulted reliably.
    fn judge(&self, key: &[u8]) -> Decision {
        let Some((mkey, version)) = parse_data_key(key) else {
            return Decision::Remove;
        };

        let Some(db) = self.db.get().and_then(Weak::upgrade) else {
            return Decision::Keep;
        };
        let Some(cf) = db.cf_handle(CF_META) else {
            return Decision::Keep;
        };

        let meta = match db.get_cf(cf, mkey) {
            Ok(m) => m,
            Err(e) => {
                warn!("data filter meta read failed, keeping row: {}", e);
                return Decision::Keep;
            }
        };

        let Some(meta) = meta else {
            return Decision::Remove;
        };
        let Some(rec) = MetaRec::decode(&meta) else {
            return Decision::Remove;
        };
        if rec.typ == TYPE_NONE || u32::from(rec.version) != version {
            return Decision::Remove;
        }

        Decision::Keep
    }
}

impl CompactionFilter for DataFilter {
    fn filter(&mut self, _level: u32, key: &[u8], _value: &[u8]) -> Decision {
        self.judge(key)
    }

    fn name(&self) -> &CStr {
        &self.name
    }
}

pub struct DataFilterFactory {
    partition: String,
    db: DbSlot,
}

impl DataFilterFactory {
    pub fn new(partition: &str, db: DbSlot) -> Self {
        DataFilterFactory {
            partition: partition.to_owned(),
            db,
        }
    }
}

impl CompactionFilterFactory for DataFilterFactory {
    type Filter = DataFilter;

    fn create(&mut self, _context: CompactionFilterContext) -> DataFilter {
        DataFilter {
            name: filter_name(&self.partition, "data"),
            db: Arc::clone(&self.db),
        }
    }

    fn name(&self) -> &CStr {
        static NAME: &[u8] = b"shoal.data-filter-factory\0";
        CStr::from_bytes_with_nul(NAME).unwrap_or_default()
    }
}

//!
//! Partitioned disk saver.
//!
//! State lands in `P` RocksDB partitions under one root directory. Writers
//! drain one partition's whole queue at a time into a single WriteBatch,
//! which amortizes sync cost under load; a shared reader pool serves point
//! reads for any partition. Meta-key ordering holds because a meta key maps
//! to exactly one partition and each partition queue drains in FIFO order.
//!

pub mod codec;
pub mod db;
pub mod filter;

use crate::common::{RawKey, RawValue, GB, MB};
use crate::hash::SipKey;
use db::DiskDb;
use parking_lot::{Condvar, Mutex};
use ruc::*;
use rocksdb::{Cache, WriteBatch};
use std::{
    collections::VecDeque,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
};
use threadpool::ThreadPool;
use tracing::{error, warn};

pub const CF_META: &str = "meta";
pub const CF_DATA: &str = "data";

#[derive(Debug)]
pub enum WriteOp {
    PutMeta(RawKey, RawValue),
    PutData(RawKey, RawValue),
    DelMeta(RawKey),
    DelData(RawKey),
}

pub struct WriteReq {
    pub ops: Vec<WriteOp>,
    /// Invoked after the owning batch commits (or fails).
    pub done: Option<Box<dyn FnOnce(bool) + Send>>,
}

#[derive(Clone, Debug)]
pub struct DiskOpts {
    pub path: PathBuf,
    pub partitions: usize,
    pub read_threads: usize,
    pub write_threads: usize,
}

impl Default for DiskOpts {
    fn default() -> Self {
        DiskOpts {
            path: PathBuf::from("./shoal-data"),
            partitions: 8,
            read_threads: 4,
            write_threads: 2,
        }
    }
}

struct WriteShared {
    queues: Vec<Mutex<VecDeque<WriteReq>>>,
    /// Count of queued requests across all partitions, guarded for the
    /// writers' condvar.
    pending: Mutex<usize>,
    wake: Condvar,
    /// Monotone round-robin cursor over partitions.
    cursor: AtomicU64,
    shutdown: AtomicBool,
}

pub struct DiskSaver {
    parts: Vec<Arc<DiskDb>>,
    readers: ThreadPool,
    shared: Arc<WriteShared>,
    writers: Mutex<Vec<JoinHandle<()>>>,
    hash: SipKey,
}

impl DiskSaver {
    pub fn open(opts: DiskOpts) -> Result<Arc<DiskSaver>> {
        let pcnt = opts.partitions.max(1);

        std::fs::create_dir_all(&opts.path).c(d!())?;

        let meta_cache = Cache::new_lru_cache(GB);
        let data_cache = Cache::new_lru_cache(128 * MB);

        let mut parts = Vec::with_capacity(pcnt);
        for i in 0..pcnt {
            parts.push(Arc::new(DiskDb::open(
                &opts.path,
                i,
                &meta_cache,
                &data_cache,
            )?));
        }

        let shared = Arc::new(WriteShared {
            queues: (0..pcnt).map(|_| Mutex::new(VecDeque::new())).collect(),
            pending: Mutex::new(0),
            wake: Condvar::new(),
            cursor: AtomicU64::new(0),
            shutdown: AtomicBool::new(false),
        });

        let mut writers = Vec::new();
        for i in 0..opts.write_threads.max(1) {
            let sh = Arc::clone(&shared);
            let ps = parts.clone();
            writers.push(
                thread::Builder::new()
                    .name(format!("disk-write-{i}"))
                    .spawn(move || writer_loop(&sh, &ps))
                    .c(d!())?,
            );
        }

        Ok(Arc::new(DiskSaver {
            parts,
            readers: ThreadPool::with_name("disk-read".to_owned(), opts.read_threads.max(1)),
            shared,
            writers: Mutex::new(writers),
            hash: SipKey::FIXED,
        }))
    }

    #[inline(always)]
    pub fn partitions(&self) -> usize {
        self.parts.len()
    }

    #[inline(always)]
    fn partition_of(&self, mkey: &[u8]) -> usize {
        if self.parts.len() == 1 {
            return 0;
        }
        (self.hash.hash(mkey) % self.parts.len() as u64) as usize
    }

    /// Queue a write against the partition owning `mkey`.
    pub fn submit(&self, mkey: &[u8], req: WriteReq) {
        self.enqueue(self.partition_of(mkey), req);
    }

    fn enqueue(&self, idx: usize, req: WriteReq) {
        if self.shared.shutdown.load(Ordering::Acquire) {
            warn!("disk saver is shut down, dropping write");
            if let Some(done) = req.done {
                done(false);
            }
            return;
        }
        self.shared.queues[idx].lock().push_back(req);
        *self.shared.pending.lock() += 1;
        self.shared.wake.notify_one();
    }

    pub fn put_meta(&self, mkey: RawKey, row: RawValue) {
        let idx = self.partition_of(&mkey);
        self.enqueue(
            idx,
            WriteReq {
                ops: vec![WriteOp::PutMeta(mkey, row)],
                done: None,
            },
        );
    }

    pub fn del_meta(&self, mkey: RawKey) {
        let idx = self.partition_of(&mkey);
        self.enqueue(
            idx,
            WriteReq {
                ops: vec![WriteOp::DelMeta(mkey)],
                done: None,
            },
        );
    }

    /// Point read of a meta row on the reader pool. Read errors are logged
    /// and surfaced as absent.
    pub fn get_meta<F>(self: &Arc<Self>, mkey: RawKey, cb: F)
    where
        F: FnOnce(Option<Vec<u8>>) + Send + 'static,
    {
        let me = Arc::clone(self);
        self.readers.execute(move || {
            let part = &me.parts[me.partition_of(&mkey)];
            let row = match part.get_meta(&mkey) {
                Ok(v) => v,
                Err(e) => {
                    error!("{} get_meta: {}", part.name(), e);
                    None
                }
            };
            cb(row);
        });
    }

    /// Manual full compaction of every partition, off the caller's thread.
    pub fn compact<F>(self: &Arc<Self>, cb: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let me = Arc::clone(self);
        self.readers.execute(move || {
            for p in &me.parts {
                p.compact();
            }
            cb();
        });
    }

    /// Drain queues, stop writers, wait for in-flight reads.
    pub fn shutdown(&self) {
        if self.shared.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        // notify under the pending lock so no writer parks between its
        // shutdown check and the wakeup
        {
            let _p = self.shared.pending.lock();
            self.shared.wake.notify_all();
        }
        for h in self.writers.lock().drain(..) {
            let _ = h.join();
        }
        self.readers.join();
    }

    #[cfg(test)]
    pub(crate) fn part(&self, idx: usize) -> &Arc<DiskDb> {
        &self.parts[idx]
    }

    #[cfg(test)]
    pub(crate) fn partition_index(&self, mkey: &[u8]) -> usize {
        self.partition_of(mkey)
    }
}


fn writer_loop(shared: &WriteShared, parts: &[Arc<DiskDb>]) {
    loop {
        {
            let mut pending = shared.pending.lock();
            while *pending == 0 && !shared.shutdown.load(Ordering::Acquire) {
                shared.wake.wait(&mut pending);
            }
            if *pending == 0 {
                return;
            }
        }

        // Round-robin scan for a non-empty partition queue; drain it whole.
        let pcnt = parts.len();
        let mut drained: Option<(usize, Vec<WriteReq>)> = None;
        for _ in 0..pcnt {
            let idx = (shared.cursor.fetch_add(1, Ordering::Relaxed) % pcnt as u64) as usize;
            let mut q = shared.queues[idx].lock();
            if !q.is_empty() {
                let reqs: Vec<WriteReq> = q.drain(..).collect();
                drop(q);
                *shared.pending.lock() -= reqs.len();
                drained = Some((idx, reqs));
                break;
            }
        }
        let Some((idx, reqs)) = drained else {
            // another writer got there first
            continue;
        };

        let part = &parts[idx];
        let mut batch = WriteBatch::default();
        for req in &reqs {
            for op in &req.ops {
                part.apply(&mut batch, op);
            }
        }

        let ok = match part.write(batch) {
            Ok(()) => true,
            Err(e) => {
                error!("{} write batch: {}", part.name(), e);
                false
            }
        };

        for req in reqs {
            if let Some(done) = req.done {
                done(ok);
            }
        }
    }
}

//!
//! Process context: the shard fleet plus the optional disk saver.
//!

use crate::disk::{DiskOpts, DiskSaver};
use crate::event_loop::DEFAULT_QUEUE_CAPACITY;
use crate::router::Shards;
use ruc::*;
use std::{sync::Arc, thread::available_parallelism};

pub struct CoreOpts {
    /// Number of shard loops; 0 means one per core.
    pub shards: usize,
    pub queue_capacity: usize,
    /// None runs memory-only.
    pub disk: Option<DiskOpts>,
}

impl Default for CoreOpts {
    fn default() -> Self {
        CoreOpts {
            shards: 0,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            disk: None,
        }
    }
}

pub struct Ctx {
    pub shards: Shards,
    pub saver: Option<Arc<DiskSaver>>,
}

impl Ctx {
    pub fn start(opts: CoreOpts) -> Result<Arc<Ctx>> {
        let n = if opts.shards > 0 {
            opts.shards
        } else {
            available_parallelism().c(d!())?.get()
        };

        let saver = match opts.disk {
            Some(d) => Some(DiskSaver::open(d).c(d!())?),
            None => None,
        };

        Ok(Arc::new(Ctx {
            shards: Shards::start(n, opts.queue_capacity).c(d!())?,
            saver,
        }))
    }

    /// Drain the shard loops, then the disk queues.
    pub fn shutdown(&self) {
        self.shards.stop();
        if let Some(s) = &self.saver {
            s.shutdown();
        }
    }
}

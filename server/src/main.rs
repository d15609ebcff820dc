//!
//! shoal-server: RESP front-end over the sharded core.
//!

mod net;

use clap::Parser;
use ruc::*;
use shoal_core::{CoreOpts, Ctx, DiskOpts, DEFAULT_QUEUE_CAPACITY};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "shoal-server", version, about = "Sharded RESP key/value server")]
struct Opts {
    /// Listen port.
    #[arg(long, default_value_t = 6379)]
    port: u16,

    /// Listen address.
    #[arg(long, default_value = "0.0.0.0")]
    bind: String,

    /// Shard loop count, 0 means one per core.
    #[arg(long, default_value_t = 0)]
    shards: usize,

    /// Storage root; omit to run memory-only.
    #[arg(long)]
    data_path: Option<PathBuf>,

    /// LSM partitions under the storage root.
    #[arg(long, default_value_t = 8)]
    partitions: usize,

    /// Disk reader pool size.
    #[arg(long, default_value_t = 4)]
    read_threads: usize,

    /// Disk writer pool size.
    #[arg(long, default_value_t = 2)]
    write_threads: usize,

    /// Per-shard submission queue bound.
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY)]
    queue_capacity: usize,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let opts = Opts::parse();

    let disk = opts.data_path.as_ref().map(|p| DiskOpts {
        path: p.clone(),
        partitions: opts.partitions,
        read_threads: opts.read_threads,
        write_threads: opts.write_threads,
    });

    let ctx = pnk!(Ctx::start(CoreOpts {
        shards: opts.shards,
        queue_capacity: opts.queue_capacity,
        disk,
    }));

    let addr = format!("{}:{}", opts.bind, opts.port);
    info!(
        "shoal-server listening on {} ({} shards, disk: {})",
        addr,
        ctx.shards.len(),
        opts.data_path.is_some()
    );

    pnk!(net::serve(ctx.clone(), &addr).await);

    info!("shutting down");
    ctx.shutdown();
}

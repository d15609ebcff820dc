//!
//! TCP front-end: one reader task and one writer task per connection.
//!
//! The reader drains the socket into the connection's byte buffer and lets
//! the core parse and dispatch. Replies arrive on an unbounded channel and
//! the writer flushes them in frame order. An empty frame vector is the
//! close signal from the core's `Sink::close`.
//!

use bytes::Bytes;
use ruc::*;
use shoal_core::{Conn, ConnDriver, Ctx, Sink};
use std::sync::Arc;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    sync::mpsc,
};
use tracing::{debug, warn};

struct TokioSink {
    tx: mpsc::UnboundedSender<Vec<Bytes>>,
}

impl Sink for TokioSink {
    fn send(&self, frames: Vec<Bytes>) {
        if frames.is_empty() {
            return;
        }
        // a dead receiver just means the client went away first
        let _ = self.tx.send(frames);
    }

    fn close(&self) {
        let _ = self.tx.send(Vec::new());
    }
}

pub async fn serve(ctx: Arc<Ctx>, addr: &str) -> Result<()> {
    let listener = TcpListener::bind(addr).await.c(d!())?;
    let mut next_id: u64 = 0;

    loop {
        tokio::select! {
            r = listener.accept() => {
                match r {
                    Ok((sock, peer)) => {
                        next_id += 1;
                        let id = next_id;
                        debug!("accepted {} as conn {}", peer, id);
                        let ctx = Arc::clone(&ctx);
                        tokio::spawn(async move {
                            handle_conn(ctx, sock, id).await;
                            debug!("conn {} closed", id);
                        });
                    }
                    Err(e) => warn!("accept: {}", e),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                return Ok(());
            }
        }
    }
}

async fn handle_conn(ctx: Arc<Ctx>, sock: TcpStream, id: u64) {
    let _ = sock.set_nodelay(true);
    let (mut rd, mut wr) = sock.into_split();

    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<Bytes>>();
    let conn = Conn::new(id, Box::new(TokioSink { tx }));

    let wconn = Arc::clone(&conn);
    let writer = tokio::spawn(async move {
        while let Some(frames) = rx.recv().await {
            if frames.is_empty() {
                break;
            }
            for f in frames {
                if wr.write_all(&f).await.is_err() {
                    wconn.close();
                    return;
                }
            }
        }
        let _ = wr.shutdown().await;
    });

    let mut driver = ConnDriver::new(Arc::clone(&conn));
    loop {
        driver.buf_mut().ensure_writable();
        let n = match rd.read(driver.buf_mut().writable_slice()).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        driver.buf_mut().advance_write(n);
        if !driver.on_read(&ctx) {
            break;
        }
    }

    conn.close();
    let _ = writer.await;
}

//! A worker drives one connection and downloads pieces from the shared
//! queue until the queue is closed or the peer fails.
use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::mpsc,
    task::yield_now,
    time::sleep,
};
use tracing::{debug, info, warn};

use super::{attempt_download_piece, Connection};
use crate::{
    error::Error,
    piece::PieceResult,
    torrent::TorrentCtx,
};

/// Pause after going through the whole queue without finding a piece that
/// the peer has.
pub const MISS_BACKOFF: Duration = Duration::from_millis(100);

pub struct PeerWorker {
    pub remote: SocketAddr,
    ctx: Arc<TorrentCtx>,
    results: mpsc::Sender<PieceResult>,
}

impl PeerWorker {
    pub fn new(
        remote: SocketAddr,
        ctx: Arc<TorrentCtx>,
        results: mpsc::Sender<PieceResult>,
    ) -> Self {
        Self { remote, ctx, results }
    }

    /// Connect to the peer and serve it until the end of the download.
    #[tracing::instrument(skip_all, fields(remote = %self.remote))]
    pub async fn run(self) -> Result<(), Error> {
        let conn = match Connection::connect(
            self.remote,
            self.ctx.peer_id.clone(),
            self.ctx.info_hash.clone(),
            &self.ctx.opts,
        )
        .await
        {
            Ok(conn) => conn,
            Err(e) => {
                debug!("{} could not connect: {e}", self.remote);
                return Err(e);
            }
        };

        info!("{} completed handshake", self.remote);

        self.serve(conn).await
    }

    /// Download pieces from an established connection.
    ///
    /// A piece is taken back to the queue unchanged when the peer doesn't
    /// have it, when the attempt fails, or when its content is corrupted.
    /// A failed attempt also ends the worker, and the connection with it.
    pub async fn serve<S>(&self, mut conn: Connection<S>) -> Result<(), Error>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let _active = ActivePeer::new(&self.ctx.active_peers);
        let remote = conn.remote;
        let queue = &self.ctx.queue;

        conn.send_unchoke().await?;
        conn.send_interested().await?;

        let mut misses = 0;

        while let Some(work) = queue.pop().await {
            if !conn.bitfield.has_piece(work.index) {
                // give other workers a chance to take it.
                yield_now().await;
                queue.push(work).await;

                misses += 1;
                if misses >= queue.len().await {
                    misses = 0;
                    sleep(MISS_BACKOFF).await;
                }
                continue;
            }
            misses = 0;

            let buf = match attempt_download_piece(
                &mut conn,
                &work,
                self.ctx.opts.attempt_timeout,
            )
            .await
            {
                Ok(buf) => buf,
                Err(e) => {
                    warn!("{remote} failed piece {}: {e}", work.index);
                    queue.push(work).await;
                    return Err(e);
                }
            };

            if let Err(e) = work.verify(&buf) {
                warn!("{remote} {e}");
                queue.push(work).await;
                yield_now().await;
                continue;
            }

            debug!("{remote} downloaded piece {}", work.index);

            // the piece is valid even if the peer can't hear about it.
            let have = conn.send_have(work.index).await;
            self.results
                .send(PieceResult { index: work.index, buf })
                .await?;
            have?;
        }

        debug!("{remote} queue closed");

        Ok(())
    }
}

/// Counts a worker as active for as long as it lives.
struct ActivePeer<'a>(&'a AtomicUsize);

impl<'a> ActivePeer<'a> {
    fn new(count: &'a AtomicUsize) -> Self {
        count.fetch_add(1, Ordering::Relaxed);
        Self(count)
    }
}

impl Drop for ActivePeer<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

//! Orchestration of a download: one worker per peer, all pulling pieces
//! from a shared queue, and the assembly of the verified pieces into the
//! final buffer.
mod queue;
mod types;

// re-exports
pub use queue::*;
pub use types::*;

use std::{
    net::SocketAddr,
    sync::{atomic::AtomicUsize, atomic::Ordering, Arc},
};

use hashbrown::HashSet;
use tokio::{sync::mpsc, task::JoinSet, time::timeout};
use tracing::{debug, info, warn};

use crate::{
    error::Error,
    peer::{PeerId, PeerWorker},
    piece::{PieceResult, PieceWork},
};

/// Capacity of the channel of downloaded pieces. Workers wait for the
/// orchestrator to take a piece before they go for the next one.
const RESULTS_CAPACITY: usize = 1;

/// Everything needed to download the content of a torrent.
#[derive(Debug, Clone)]
pub struct Torrent {
    pub peers: Vec<SocketAddr>,
    pub peer_id: PeerId,
    pub info_hash: InfoHash,
    pub piece_hashes: Vec<[u8; 20]>,
    pub piece_length: usize,
    pub length: usize,
    pub name: String,
}

impl Torrent {
    /// Byte range `[begin, end)` of a piece in the content.
    pub fn bounds_for_piece(&self, index: usize) -> (usize, usize) {
        let begin = (index * self.piece_length).min(self.length);
        let end = (begin + self.piece_length).min(self.length);
        (begin, end)
    }

    pub fn piece_size(&self, index: usize) -> usize {
        let (begin, end) = self.bounds_for_piece(index);
        end - begin
    }

    /// One [`PieceWork`] per piece hash, in order.
    pub fn piece_works(&self) -> Vec<PieceWork> {
        self.piece_hashes
            .iter()
            .enumerate()
            .map(|(index, hash)| PieceWork {
                index,
                hash: *hash,
                length: self.piece_size(index),
            })
            .collect()
    }

    fn validate(&self) -> Result<(), Error> {
        if self.piece_length == 0 {
            return Err(Error::PieceLengthZero);
        }

        let expected = self.length.div_ceil(self.piece_length);
        if self.piece_hashes.len() != expected {
            return Err(Error::PieceCount {
                hashes: self.piece_hashes.len(),
                expected,
            });
        }

        Ok(())
    }

    /// Download the whole content, logging every completed piece.
    pub async fn download(&self, opts: DownloadOpts) -> Result<Vec<u8>, Error> {
        self.download_with(opts, &mut LogProgress).await
    }

    /// Download the whole content, reporting every completed piece to the
    /// observer.
    ///
    /// Returns when every piece was downloaded and verified. Fails with
    /// [`Error::NoPeers`] when all workers are gone before that.
    #[tracing::instrument(skip_all, fields(name = %self.name, info_hash = %self.info_hash))]
    pub async fn download_with<O>(
        &self,
        opts: DownloadOpts,
        observer: &mut O,
    ) -> Result<Vec<u8>, Error>
    where
        O: ProgressObserver + ?Sized,
    {
        self.validate()?;

        let total = self.piece_hashes.len();
        let mut buf = vec![0u8; self.length];

        if total == 0 {
            return Ok(buf);
        }

        info!("starting download of {total} pieces from {} peers", self.peers.len());

        let ctx = Arc::new(TorrentCtx {
            peer_id: self.peer_id.clone(),
            info_hash: self.info_hash.clone(),
            queue: WorkQueue::new(self.piece_works()),
            opts,
            active_peers: AtomicUsize::new(0),
        });

        let (results_tx, mut results_rx) =
            mpsc::channel::<PieceResult>(RESULTS_CAPACITY);

        let mut workers = JoinSet::new();

        for remote in &self.peers {
            let worker = PeerWorker::new(*remote, ctx.clone(), results_tx.clone());
            workers.spawn(async move {
                let remote = worker.remote;
                if let Err(e) = worker.run().await {
                    debug!("{remote} worker stopped: {e}");
                }
            });
        }

        // the channel closes when the last worker is gone.
        drop(results_tx);

        let r = self
            .collect(&ctx, &mut results_rx, &mut buf, observer)
            .await;

        ctx.queue.close();
        workers.shutdown().await;

        r.map(|_| buf)
    }

    /// Copy every result into place until all the pieces are in.
    async fn collect<O>(
        &self,
        ctx: &TorrentCtx,
        results: &mut mpsc::Receiver<PieceResult>,
        buf: &mut [u8],
        observer: &mut O,
    ) -> Result<(), Error>
    where
        O: ProgressObserver + ?Sized,
    {
        let total = self.piece_hashes.len();
        let mut done = HashSet::with_capacity(total);

        while done.len() < total {
            let result = match ctx.opts.stall_timeout {
                Some(stall) => timeout(stall, results.recv())
                    .await
                    .map_err(|_| Error::Stalled(stall.as_secs()))?,
                None => results.recv().await,
            };

            let Some(PieceResult { index, buf: piece }) = result else {
                warn!("all peers are gone with {} pieces left", total - done.len());
                return Err(Error::NoPeers);
            };

            let (begin, end) = self.bounds_for_piece(index.min(total));

            if index >= total || piece.len() != end - begin {
                warn!("discarding piece {index} with {} bytes", piece.len());
                continue;
            }

            if !done.insert(index) {
                debug!("piece {index} was already downloaded");
                continue;
            }

            buf[begin..end].copy_from_slice(&piece);

            observer.on_piece(&Progress {
                index,
                done: done.len(),
                total,
                active_peers: ctx.active_peers.load(Ordering::Relaxed),
            });
        }

        Ok(())
    }
}

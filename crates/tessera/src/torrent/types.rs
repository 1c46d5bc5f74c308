use std::{
    fmt::Display,
    ops::Deref,
    sync::atomic::AtomicUsize,
    time::Duration,
};

use speedy::{Readable, Writable};
use tracing::info;

use super::WorkQueue;
use crate::peer::PeerId;

/// SHA-1 of the bencoded `info` dictionary, identifies the torrent.
#[derive(Clone, PartialEq, Eq, Hash, Default, Readable, Writable)]
pub struct InfoHash(pub [u8; 20]);

impl Display for InfoHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl Deref for InfoHash {
    type Target = [u8; 20];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::fmt::Debug for InfoHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = self.to_string();
        f.write_str(&s[..10])
    }
}

impl From<InfoHash> for [u8; 20] {
    fn from(value: InfoHash) -> Self {
        value.0
    }
}

/// Timeouts of a download run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadOpts {
    /// Time to establish the TCP connection with a peer.
    pub connect_timeout: Duration,
    /// Time for the handshake and the bitfield after connecting.
    pub handshake_timeout: Duration,
    /// Deadline of one attempt to download one piece from one peer.
    pub attempt_timeout: Duration,
    /// Give up when no piece completes for this long. Disabled by default,
    /// a run then waits for as long as any peer is connected.
    pub stall_timeout: Option<Duration>,
}

impl Default for DownloadOpts {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(3),
            handshake_timeout: Duration::from_secs(5),
            attempt_timeout: Duration::from_secs(30),
            stall_timeout: None,
        }
    }
}

/// Context of a download run shared by all of its workers.
#[derive(Debug)]
pub struct TorrentCtx {
    pub peer_id: PeerId,
    pub info_hash: InfoHash,
    pub queue: WorkQueue,
    pub opts: DownloadOpts,
    /// Workers that completed the handshake and are still running.
    pub active_peers: AtomicUsize,
}

/// Reported to a [`ProgressObserver`] every time a piece is completed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    /// The piece that was just completed.
    pub index: usize,
    pub done: usize,
    pub total: usize,
    pub active_peers: usize,
}

impl Progress {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        self.done as f64 / self.total as f64 * 100.0
    }
}

pub trait ProgressObserver {
    fn on_piece(&mut self, progress: &Progress);
}

impl<F> ProgressObserver for F
where
    F: FnMut(&Progress),
{
    fn on_piece(&mut self, progress: &Progress) {
        self(progress)
    }
}

/// Log every completed piece.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressObserver for LogProgress {
    fn on_piece(&mut self, progress: &Progress) {
        info!(
            "({:.2}%) downloaded piece #{} from {} peers",
            progress.percent(),
            progress.index,
            progress.active_peers,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent() {
        let p = Progress { index: 0, done: 1, total: 4, active_peers: 2 };
        assert_eq!(p.percent(), 25.0);
    }

    #[test]
    fn closures_are_observers() {
        let mut seen = Vec::new();
        {
            let mut observer = |p: &Progress| seen.push(p.index);
            observer.on_piece(&Progress {
                index: 3,
                done: 1,
                total: 4,
                active_peers: 1,
            });
        }
        assert_eq!(seen, vec![3]);
    }

    #[test]
    fn info_hash_display() {
        let hash = InfoHash([0xab; 20]);
        assert_eq!(hash.to_string(), "ab".repeat(20));
        assert_eq!(format!("{hash:?}"), "ababababab");
    }
}

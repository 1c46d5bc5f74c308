//! Download of one piece from one peer with a pipeline of block requests.
//!
//! Instead of requesting a block and waiting for it, up to [`MAX_BACKLOG`]
//! requests are kept in flight so that the round trip latency of the
//! network overlaps across requests.
use std::time::Duration;

use tokio::{
    io::{AsyncRead, AsyncWrite},
    time::{timeout_at, Instant},
};
use tracing::debug;

use super::Connection;
use crate::{
    error::Error,
    piece::PieceWork,
    tcp_wire::{Block, BlockInfo, Message, BLOCK_LEN},
};

/// The largest number of bytes a single request can ask for.
pub const MAX_BLOCK_SIZE: u32 = BLOCK_LEN;

/// Number of unfulfilled requests a client can have in its pipeline.
pub const MAX_BACKLOG: usize = 5;

/// State of one attempt to download one piece from one peer.
///
/// Created fresh for every attempt and dropped when the attempt ends.
#[derive(Debug)]
pub struct PieceProgress {
    index: usize,
    buf: Vec<u8>,
    downloaded: usize,
    requested: usize,
    backlog: usize,
}

impl PieceProgress {
    pub fn new(work: &PieceWork) -> Self {
        Self {
            index: work.index,
            buf: vec![0; work.length],
            downloaded: 0,
            requested: 0,
            backlog: 0,
        }
    }

    pub fn downloaded(&self) -> usize {
        self.downloaded
    }

    pub fn requested(&self) -> usize {
        self.requested
    }

    pub fn backlog(&self) -> usize {
        self.backlog
    }

    pub fn is_complete(&self) -> bool {
        self.downloaded == self.buf.len()
    }

    /// If there is room in the pipeline and bytes left to ask for.
    /// The choke state is checked by the caller.
    pub fn can_request(&self) -> bool {
        self.backlog < MAX_BACKLOG && self.requested < self.buf.len()
    }

    /// Claim the next unrequested range of the piece.
    pub fn next_request(&mut self) -> BlockInfo {
        let len = (self.buf.len() - self.requested).min(MAX_BLOCK_SIZE as usize);

        let block_info = BlockInfo {
            index: self.index as u32,
            begin: self.requested as u32,
            len: len as u32,
        };

        self.requested += len;
        self.backlog += 1;

        block_info
    }

    /// Apply a message of the peer to this attempt and to the connection.
    pub fn read_message<S>(
        &mut self,
        conn: &mut Connection<S>,
        msg: Message,
    ) -> Result<(), Error> {
        let remote = conn.remote;

        match msg {
            Message::KeepAlive => {
                debug!("{remote} < keepalive");
            }
            Message::Unchoke => {
                debug!("{remote} < unchoke");
                conn.choked = false;
            }
            Message::Choke => {
                debug!("{remote} < choke");
                conn.choked = true;
            }
            Message::Have(piece) => {
                debug!("{remote} < have {piece}");
                conn.bitfield.set_piece(piece);
            }
            Message::Bitfield(bitfield) => {
                debug!("{remote} < bitfield ones: {}", bitfield.count_ones());
                conn.bitfield = bitfield;
            }
            Message::Piece(block) => {
                self.write_block(block)?;
            }
            // we don't upload, ignore what the peer wants from us.
            msg @ (Message::Interested
            | Message::NotInterested
            | Message::Request(_)
            | Message::Cancel(_)) => {
                debug!("{remote} < ignoring {msg:?}");
            }
        }

        Ok(())
    }

    /// Copy a received block into the piece buffer.
    fn write_block(&mut self, block: Block) -> Result<(), Error> {
        let Block { index, begin, block } = block;

        if index != self.index {
            return Err(Error::BlockIndex { expected: self.index, got: index });
        }

        let start = begin as usize;
        let end = start + block.len();

        if end > self.buf.len() {
            return Err(Error::BlockOutOfBounds { begin, len: block.len() });
        }

        if self.downloaded + block.len() > self.requested {
            return Err(Error::UnrequestedBlock);
        }

        self.buf[start..end].copy_from_slice(&block);
        self.downloaded += block.len();
        self.backlog = self.backlog.saturating_sub(1);

        Ok(())
    }

    pub fn into_buf(self) -> Vec<u8> {
        self.buf
    }
}

/// Download the full content of a piece from the connection.
///
/// Every send and read of the attempt share one deadline, `attempt_timeout`
/// after the start of the attempt. The deadline lives only as long as this
/// future, so it never leaks into the next attempt on the same connection.
pub async fn attempt_download_piece<S>(
    conn: &mut Connection<S>,
    work: &PieceWork,
    attempt_timeout: Duration,
) -> Result<Vec<u8>, Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let deadline = Instant::now() + attempt_timeout;
    let mut progress = PieceProgress::new(work);

    while !progress.is_complete() {
        if !conn.choked {
            while progress.can_request() {
                let block_info = progress.next_request();
                timeout_at(deadline, conn.send_request(block_info))
                    .await
                    .map_err(|_| Error::Timeout)??;
            }
        }

        let msg = timeout_at(deadline, conn.read())
            .await
            .map_err(|_| Error::Timeout)??;

        progress.read_message(conn, msg)?;
    }

    Ok(progress.into_buf())
}

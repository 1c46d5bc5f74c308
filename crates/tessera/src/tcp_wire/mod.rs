//! Documentation of the "TCP Wire" protocol between Peers in the network.
//! Peers will follow this protocol to exchange pieces of the torrent.
mod codec;
mod handshake;

pub use codec::*;
pub use handshake::*;

use bytes::{BufMut, BytesMut};
use tokio::io;

/// Size of the blocks we request, 16 KiB. Peers may close the connection
/// when asked for more than this in one request.
///
/// Only the last block of a piece can be shorter.
pub const BLOCK_LEN: u32 = 16384;

/// Protocol String
/// String identifier of the string "BitTorrent protocol", in bytes.
pub const PSTR: [u8; 19] = *b"BitTorrent protocol";

/// A Block is a subset of a Piece,
/// pieces are subsets of the entire Torrent data.
///
/// When peers send data (seed) to us, they send us Blocks.
/// This happens on the "Piece" message of the peer wire protocol.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Block {
    /// The index of the piece this block belongs to.
    pub index: usize,
    /// The zero-based byte offset into the piece.
    pub begin: u32,
    /// The block's data. 16 KiB most of the times,
    /// but the last block of a piece *might* be smaller.
    pub block: Vec<u8>,
}

impl Block {
    /// Encodes the block in the network binary protocol's format into the
    /// given buffer.
    pub fn encode(&self, buf: &mut BytesMut) -> io::Result<()> {
        let piece_index = self
            .index
            .try_into()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        buf.put_u32(piece_index);
        buf.put_u32(self.begin);
        buf.extend_from_slice(&self.block);
        Ok(())
    }
}

/// The representation of a [`Block`].
///
/// When we ask a peer to give us a [`Block`], we send this struct,
/// using the "Request" message of the tcp wire protocol.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockInfo {
    /// The index of the piece of which this is a block.
    pub index: u32,
    /// The zero-based byte offset into the piece.
    pub begin: u32,
    /// The block's length in bytes. <= 16 KiB
    pub len: u32,
}

impl BlockInfo {
    /// Encodes the block info in the network binary protocol's format into the
    /// given buffer.
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32(self.index);
        buf.put_u32(self.begin);
        buf.put_u32(self.len);
    }

    /// Like most clients, we never ask for more than [`BLOCK_LEN`].
    pub fn is_valid(&self) -> bool {
        self.len > 0 && self.len <= BLOCK_LEN
    }
}

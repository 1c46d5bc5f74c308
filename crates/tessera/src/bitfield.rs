//! Wrapper type around Bitvec.
use bitvec::prelude::*;

/// Pieces that a remote peer can serve, where bit `i` represents piece `i`.
///
/// Bits are ordered most-significant-first inside each byte, exactly like
/// they travel on the wire inside a bitfield message. The capacity is the
/// number of bytes sent by the peer times 8, which may be larger than the
/// number of pieces of the torrent.
///
/// Each [`crate::peer::Connection`] owns its bitfield, so there is no
/// locking here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bitfield(BitVec<u8, Msb0>);

impl Bitfield {
    /// A bitfield with `pieces` bits, all of them unset.
    pub fn from_piece(pieces: usize) -> Self {
        Self(bitvec![u8, Msb0; 0; pieces])
    }

    /// If the peer has the piece. Indices beyond the capacity are never set.
    pub fn has_piece(&self, index: usize) -> bool {
        self.0.get(index).map(|bit| *bit).unwrap_or(false)
    }

    /// Mark the piece as available, out of range indices are ignored.
    pub fn set_piece(&mut self, index: usize) {
        if index < self.0.len() {
            self.0.set(index, true);
        }
    }

    /// Capacity in bits.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn count_ones(&self) -> usize {
        self.0.count_ones()
    }

    /// The bytes in wire order.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_raw_slice()
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.0.into_vec()
    }
}

impl From<Vec<u8>> for Bitfield {
    fn from(value: Vec<u8>) -> Self {
        Self(BitVec::from_vec(value))
    }
}

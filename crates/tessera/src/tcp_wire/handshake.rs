//! Codec for encoding and decoding handshakes.
//!
//! This has to be a separate codec as the handshake has a different
//! structure than the rest of the messages. Moreover, handshakes may only
//! be sent once at the beginning of a connection, preceding all other
//! messages. Thus, after receiving and sending a handshake the codec
//! should be switched to [`super::CoreCodec`], but care should be taken not
//! to discard the underlying receive and send buffers.

use bytes::{Buf, BytesMut};
use speedy::{BigEndian, Readable, Writable};
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

use super::PSTR;
use crate::{error::Error, peer::PeerId, torrent::InfoHash};

#[derive(Debug)]
pub struct HandshakeCodec;

impl Encoder<Handshake> for HandshakeCodec {
    type Error = Error;

    fn encode(
        &mut self,
        handshake: Handshake,
        buf: &mut BytesMut,
    ) -> Result<(), Self::Error> {
        // we should only be sending the bittorrent protocol string
        debug_assert_eq!(handshake.pstr, PSTR);

        buf.extend_from_slice(&handshake.serialize()?);
        Ok(())
    }
}

impl Decoder for HandshakeCodec {
    type Item = Handshake;
    type Error = Error;

    fn decode(
        &mut self,
        buf: &mut BytesMut,
    ) -> Result<Option<Handshake>, Self::Error> {
        if buf.is_empty() {
            return Ok(None);
        }

        // peek the protocol length without consuming it, we may not have the
        // full message in the buffer yet.
        if buf[0] as usize != PSTR.len() {
            return Err(Error::HandshakeInvalid);
        }

        if buf.len() < Handshake::LEN {
            return Ok(None);
        }

        let handshake = Handshake::deserialize(&buf[..Handshake::LEN])?;
        buf.advance(Handshake::LEN);

        Ok(Some(handshake))
    }
}

/// pstrlen = 19
/// pstr = "BitTorrent protocol"
/// This is the very first message exchanged. If the peer's protocol string
/// (`BitTorrent protocol`) or the info hash differs from ours, the connection
/// is severed. We don't support any extension, so the reserved field is
/// always 8 zero bytes. The peer id is usually the client name and version.
#[derive(Clone, Debug, PartialEq, Writable, Readable)]
pub struct Handshake {
    pub pstr_len: u8,
    pub pstr: [u8; 19],
    pub reserved: [u8; 8],
    pub info_hash: InfoHash,
    pub peer_id: PeerId,
}

impl Handshake {
    pub const LEN: usize = 1 + 19 + 8 + 20 + 20;

    pub fn new(info_hash: InfoHash, peer_id: PeerId) -> Self {
        Self {
            pstr_len: PSTR.len() as u8,
            pstr: PSTR,
            reserved: [0u8; 8],
            info_hash,
            peer_id,
        }
    }

    pub fn serialize(&self) -> Result<Vec<u8>, Error> {
        self.write_to_vec_with_ctx(BigEndian {}).map_err(Error::SpeedyError)
    }

    pub fn deserialize(buf: &[u8]) -> Result<Self, Error> {
        Self::read_from_buffer_with_ctx(BigEndian {}, buf)
            .map_err(Error::SpeedyError)
    }

    /// Validate the handshake of the remote peer against ours.
    pub fn validate(&self, target: &Self) -> bool {
        if self.info_hash != target.info_hash {
            warn!("! info_hash from receiving handshake does not match ours");
            return false;
        }
        if target.pstr_len != 19 {
            warn!("! handshake with wrong pstr_len, dropping connection");
            return false;
        }
        if target.pstr != PSTR {
            warn!("! handshake with wrong pstr, dropping connection");
            return false;
        }
        true
    }
}

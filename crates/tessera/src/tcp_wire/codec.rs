use bytes::{Buf, BufMut, BytesMut};
use tokio::io;
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

use super::{Block, BlockInfo};
use crate::{bitfield::Bitfield, error::Error};

/// 2MiB maximum message size.
pub const MAX_MESSAGE_SIZE: usize = 2 * 1024 * 1024;

/// Core messages exchanged after a successful handshake.
/// These are from the vanilla protocol, with no extensions.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    KeepAlive,
    Choke,
    Unchoke,
    Interested,
    NotInterested,
    Have(usize),
    Bitfield(Bitfield),
    Request(BlockInfo),
    Piece(Block),
    Cancel(BlockInfo),
}

/// The IDs of the [`Message`]s.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum MessageId {
    Choke = 0,
    Unchoke = 1,
    Interested = 2,
    NotInterested = 3,
    Have = 4,
    Bitfield = 5,
    Request = 6,
    Piece = 7,
    Cancel = 8,
}

impl TryFrom<u8> for MessageId {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use MessageId::*;
        Ok(match value {
            0 => Choke,
            1 => Unchoke,
            2 => Interested,
            3 => NotInterested,
            4 => Have,
            5 => Bitfield,
            6 => Request,
            7 => Piece,
            8 => Cancel,
            v => return Err(v),
        })
    }
}

#[derive(Debug, Clone)]
pub struct CoreCodec;

impl Encoder<Message> for CoreCodec {
    type Error = Error;

    fn encode(
        &mut self,
        item: Message,
        buf: &mut BytesMut,
    ) -> Result<(), Self::Error> {
        match item {
            Message::KeepAlive => {
                buf.put_u32(0);
            }
            Message::Bitfield(bitfield) => {
                let v = bitfield.into_vec();
                buf.put_u32(1 + v.len() as u32);
                buf.put_u8(MessageId::Bitfield as u8);
                buf.extend_from_slice(&v);
            }
            Message::Choke => {
                buf.put_u32(1);
                buf.put_u8(MessageId::Choke as u8);
            }
            Message::Unchoke => {
                buf.put_u32(1);
                buf.put_u8(MessageId::Unchoke as u8);
            }
            Message::Interested => {
                buf.put_u32(1);
                buf.put_u8(MessageId::Interested as u8);
            }
            Message::NotInterested => {
                buf.put_u32(1);
                buf.put_u8(MessageId::NotInterested as u8);
            }
            Message::Have(piece_index) => {
                buf.put_u32(1 + 4);
                buf.put_u8(MessageId::Have as u8);
                let piece_index = piece_index.try_into().map_err(|e| {
                    io::Error::new(io::ErrorKind::InvalidInput, e)
                })?;
                buf.put_u32(piece_index);
            }
            // <len=0013><id=6><index><begin><length>
            Message::Request(block_info) => {
                buf.put_u32(1 + 4 + 4 + 4);
                buf.put_u8(MessageId::Request as u8);
                block_info.encode(buf);
            }
            // <len=0009+X><id=7><index><begin><block>
            Message::Piece(block) => {
                buf.put_u32(1 + 4 + 4 + block.block.len() as u32);
                buf.put_u8(MessageId::Piece as u8);
                block.encode(buf)?;
            }
            Message::Cancel(block_info) => {
                buf.put_u32(1 + 4 + 4 + 4);
                buf.put_u8(MessageId::Cancel as u8);
                block_info.encode(buf);
            }
        }
        Ok(())
    }
}

impl Decoder for CoreCodec {
    type Item = Message;
    type Error = Error;

    fn decode(
        &mut self,
        buf: &mut BytesMut,
    ) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            // the message length header must be present at the minimum,
            // otherwise we can't determine the message type
            if buf.len() < 4 {
                return Ok(None);
            }

            // peek at length prefix without consuming
            let size =
                u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;

            if size == 0 {
                buf.advance(4);
                return Ok(Some(Message::KeepAlive));
            }

            if size > MAX_MESSAGE_SIZE {
                return Err(Error::MessageTooLarge(size));
            }

            // incomplete message, wait for the rest of the frame.
            if buf.len() < 4 + size {
                buf.reserve(4 + size - buf.len());
                return Ok(None);
            }

            buf.advance(4);
            let msg_id = buf.get_u8();
            let payload_len = size - 1;

            let Ok(msg_id) = MessageId::try_from(msg_id) else {
                // unknown message id, skip the frame and try the next one.
                warn!("unknown message_id {msg_id:?}");
                buf.advance(payload_len);
                continue;
            };

            let msg = match msg_id {
                MessageId::Choke
                | MessageId::Unchoke
                | MessageId::Interested
                | MessageId::NotInterested
                    if payload_len != 0 =>
                {
                    return Err(Error::MessageResponse);
                }
                // <len=0001><id=0>
                MessageId::Choke => Message::Choke,
                // <len=0001><id=1>
                MessageId::Unchoke => Message::Unchoke,
                // <len=0001><id=2>
                MessageId::Interested => Message::Interested,
                // <len=0001><id=3>
                MessageId::NotInterested => Message::NotInterested,
                // <len=0005><id=4><piece index>
                MessageId::Have => {
                    if payload_len != 4 {
                        return Err(Error::MessageResponse);
                    }
                    Message::Have(buf.get_u32() as usize)
                }
                // <len=0001+X><id=5><bitfield>
                MessageId::Bitfield => {
                    let bitfield = buf.split_to(payload_len).to_vec();
                    Message::Bitfield(Bitfield::from(bitfield))
                }
                // <len=0013><id=6><index><begin><length>
                MessageId::Request | MessageId::Cancel => {
                    if payload_len != 12 {
                        return Err(Error::MessageResponse);
                    }
                    let block_info = BlockInfo {
                        index: buf.get_u32(),
                        begin: buf.get_u32(),
                        len: buf.get_u32(),
                    };
                    if msg_id == MessageId::Request {
                        Message::Request(block_info)
                    } else {
                        Message::Cancel(block_info)
                    }
                }
                // <len=0009+X><id=7><index><begin><block>
                MessageId::Piece => {
                    if payload_len < 8 {
                        return Err(Error::MessageResponse);
                    }
                    let index = buf.get_u32() as usize;
                    let begin = buf.get_u32();
                    let block = buf.split_to(payload_len - 8).to_vec();
                    Message::Piece(Block { index, begin, block })
                }
            };

            return Ok(Some(msg));
        }
    }
}

use std::io;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::piece::PieceResult;

impl From<bendy::decoding::Error> for Error {
    fn from(_value: bendy::decoding::Error) -> Self {
        Self::BencodeError
    }
}

impl From<bendy::encoding::Error> for Error {
    fn from(_value: bendy::encoding::Error) -> Self {
        Self::BencodeError
    }
}

impl From<mpsc::error::SendError<PieceResult>> for Error {
    fn from(value: mpsc::error::SendError<PieceResult>) -> Self {
        Self::SendResultError(value.0.index)
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to decode or encode the bencode buffer")]
    BencodeError,

    #[error("IO error")]
    IO(#[from] io::Error),

    #[error("Error when serializing/deserializing")]
    SpeedyError(#[from] speedy::Error),

    #[error("HTTP request to the tracker failed: {0}")]
    TrackerRequest(#[from] reqwest::Error),

    #[error("The tracker refused the announce: {0}")]
    TrackerFailure(String),

    #[error("The announce URL `{0}` is not an HTTP tracker")]
    TrackerUrl(String),

    #[error("The peer list returned by the announce request is not valid")]
    TrackerCompactPeerList,

    #[error("The `pieces` field must be a multiple of 20 bytes, got {0}")]
    PiecesLength(usize),

    #[error(
        "Multi-file torrents are not supported, only single-file torrents \
         can be downloaded"
    )]
    MultiFileTorrent,

    #[error(
        "The torrent has {hashes} piece hashes but its length requires \
         {expected}"
    )]
    PieceCount { hashes: usize, expected: usize },

    #[error("The piece length must be larger than zero")]
    PieceLengthZero,

    #[error("The handshake received is not valid")]
    HandshakeInvalid,

    #[error("The peer took to long to send the handshake")]
    HandshakeTimeout,

    #[error("Could not connect to the peer in time")]
    ConnectTimeout,

    #[error("The peer didn't send a bitfield after the handshake")]
    NoBitfield,

    #[error("The message of {0} bytes is larger than the maximum allowed")]
    MessageTooLarge(usize),

    #[error("The message received from the peer is malformed")]
    MessageResponse,

    #[error("Expected a block of piece {expected}, got one of piece {got}")]
    BlockIndex { expected: usize, got: usize },

    #[error("Block at offset {begin} with {len} bytes is out of bounds")]
    BlockOutOfBounds { begin: u32, len: usize },

    #[error("The peer sent more bytes than were requested")]
    UnrequestedBlock,

    #[error("The peer took to long to respond")]
    Timeout,

    #[error("The piece {0} downloaded does not have a valid hash")]
    PieceInvalid(usize),

    #[error("The peer closed the socket")]
    PeerClosedSocket,

    #[error("Could not publish piece {0}, the orchestrator is gone")]
    SendResultError(usize),

    #[error("No peers left to download the remaining pieces")]
    NoPeers,

    #[error("No piece was completed in the last {0} seconds")]
    Stalled(u64),

    #[error(
        "Tried to load $HOME but could not find it. Please make sure you have \
         a $HOME env and that this program has the permission to create dirs."
    )]
    HomeInvalid,

    #[error(
        "The `{0}` folder was not found, please edit the config file manually \
         at `{1}"
    )]
    FolderNotFound(String, String),

    #[error(
        "Error while trying to read the configuration file, please make sure \
         it has the correct format"
    )]
    ConfigDeserializeError,

    #[error("Could not serialize the configuration file")]
    ConfigSerializeError(#[from] toml::ser::Error),
}

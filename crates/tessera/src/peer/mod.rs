//! A remote peer in the network that we download pieces from.
mod progress;
mod types;
mod worker;

// re-exports
pub use progress::*;
pub use types::*;
pub use worker::*;

use std::net::SocketAddr;

use futures::{SinkExt, StreamExt};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
    time::timeout,
};
use tokio_util::codec::{Framed, FramedParts};
use tracing::debug;

use crate::{
    bitfield::Bitfield,
    error::Error,
    tcp_wire::{BlockInfo, CoreCodec, Handshake, HandshakeCodec, Message},
    torrent::{DownloadOpts, InfoHash},
};

/// An established session with a remote peer, after the handshake and
/// the bitfield exchange.
///
/// The connection owns the [`Bitfield`] of the peer and the choke state that
/// the peer imposes on us. It is never shared: exactly one worker drives it,
/// and the socket is closed when the connection is dropped.
pub struct Connection<S = TcpStream> {
    framed: Framed<S, CoreCodec>,
    pub remote: SocketAddr,
    /// Pieces that the remote peer has.
    pub bitfield: Bitfield,
    /// If the peer is choking us, we can't request blocks.
    pub choked: bool,
}

impl Connection<TcpStream> {
    /// Connect to the peer, handshake and read its bitfield.
    #[tracing::instrument(skip(peer_id, info_hash, opts), name = "peer::connect")]
    pub async fn connect(
        remote: SocketAddr,
        peer_id: PeerId,
        info_hash: InfoHash,
        opts: &DownloadOpts,
    ) -> Result<Self, Error> {
        let socket = timeout(opts.connect_timeout, TcpStream::connect(remote))
            .await
            .map_err(|_| Error::ConnectTimeout)??;

        timeout(
            opts.handshake_timeout,
            Self::handshake(socket, remote, peer_id, info_hash),
        )
        .await
        .map_err(|_| Error::HandshakeTimeout)?
    }
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap a socket that already went through the handshake.
    pub fn new(socket: S, remote: SocketAddr, bitfield: Bitfield) -> Self {
        Self {
            framed: Framed::new(socket, CoreCodec),
            remote,
            bitfield,
            choked: true,
        }
    }

    /// Send our handshake, validate theirs, and wait for the bitfield which
    /// must be the first message after the handshake.
    pub async fn handshake(
        socket: S,
        remote: SocketAddr,
        peer_id: PeerId,
        info_hash: InfoHash,
    ) -> Result<Self, Error> {
        let mut socket = Framed::new(socket, HandshakeCodec);
        let our_handshake = Handshake::new(info_hash, peer_id);

        debug!("{remote} sending the handshake");
        socket.send(our_handshake.clone()).await?;

        let their_handshake =
            socket.next().await.ok_or(Error::PeerClosedSocket)??;

        if !our_handshake.validate(&their_handshake) {
            return Err(Error::HandshakeInvalid);
        }

        debug!("{remote} received their handshake {:?}", their_handshake.peer_id);

        // switch codecs without losing what is already buffered.
        let old_parts = socket.into_parts();
        let mut new_parts =
            FramedParts::new::<Message>(old_parts.io, CoreCodec);
        new_parts.read_buf = old_parts.read_buf;
        new_parts.write_buf = old_parts.write_buf;
        let mut framed = Framed::from_parts(new_parts);

        let bitfield = match framed.next().await {
            Some(Ok(Message::Bitfield(bitfield))) => bitfield,
            Some(Err(e)) => return Err(e),
            Some(Ok(msg)) => {
                debug!("{remote} expected bitfield, got {msg:?}");
                return Err(Error::NoBitfield);
            }
            None => return Err(Error::PeerClosedSocket),
        };

        debug!(
            "{remote} < bitfield len: {} ones: {}",
            bitfield.len(),
            bitfield.count_ones()
        );

        Ok(Self { framed, remote, bitfield, choked: true })
    }

    pub async fn send(&mut self, msg: Message) -> Result<(), Error> {
        self.framed.send(msg).await
    }

    pub async fn send_unchoke(&mut self) -> Result<(), Error> {
        self.send(Message::Unchoke).await
    }

    pub async fn send_interested(&mut self) -> Result<(), Error> {
        self.send(Message::Interested).await
    }

    pub async fn send_have(&mut self, index: usize) -> Result<(), Error> {
        self.send(Message::Have(index)).await
    }

    pub async fn send_request(
        &mut self,
        block_info: BlockInfo,
    ) -> Result<(), Error> {
        self.send(Message::Request(block_info)).await
    }

    /// Wait for the next message of the peer.
    pub async fn read(&mut self) -> Result<Message, Error> {
        self.framed.next().await.ok_or(Error::PeerClosedSocket)?
    }
}

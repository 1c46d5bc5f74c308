//! Module to share types for integration tests.
//!
//! The client side is the real thing: a [`Torrent`] downloading over TCP on
//! localhost. The other side are scripted seeders speaking the peer wire
//! protocol through the codecs of the crate.
#![allow(dead_code)]

use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use futures::{SinkExt, StreamExt};
use hashbrown::HashSet;
use sha1_smol::Sha1;
use tessera::{
    bitfield::Bitfield,
    peer::PeerId,
    tcp_wire::{Block, BlockInfo, CoreCodec, Handshake, HandshakeCodec, Message},
    torrent::{InfoHash, Torrent},
};
use tokio::{
    net::{TcpListener, TcpStream},
    select, spawn,
    sync::watch,
};
use tokio_util::codec::{Framed, FramedParts};

pub const INFO_HASH: InfoHash = InfoHash([7; 20]);

pub fn setup_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_target(false)
        .with_test_writer()
        .without_time()
        .try_init();
}

/// Deterministic content that is different in every piece.
pub fn content(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

pub fn torrent(
    content: &[u8],
    piece_length: usize,
    peers: Vec<SocketAddr>,
) -> Torrent {
    Torrent {
        peers,
        peer_id: PeerId::generate(),
        info_hash: INFO_HASH,
        piece_hashes: content
            .chunks(piece_length)
            .map(|piece| Sha1::from(piece).digest().bytes())
            .collect(),
        piece_length,
        length: content.len(),
        name: "test.bin".to_owned(),
    }
}

/// Address where nobody is listening.
pub async fn unreachable_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// A scripted remote peer that serves the content of a torrent.
#[derive(Clone)]
pub struct MockSeeder {
    content: Arc<Vec<u8>>,
    piece_length: usize,
    have: Vec<usize>,
    corrupt: HashSet<usize>,
    /// Stay choked until the value is true, then announce `late_haves`.
    gate: Option<watch::Receiver<bool>>,
    late_haves: Vec<usize>,
    /// Set to true after a corrupted piece was fully sent.
    on_corrupt: Option<Arc<watch::Sender<bool>>>,
    /// Number of corrupted pieces sent.
    pub corrupted: Arc<AtomicUsize>,
    /// Number of blocks sent.
    pub blocks: Arc<AtomicUsize>,
}

impl MockSeeder {
    /// A seeder that has every piece and unchokes right away.
    pub fn new(content: Vec<u8>, piece_length: usize) -> Self {
        let pieces = content.len().div_ceil(piece_length);
        Self {
            content: Arc::new(content),
            piece_length,
            have: (0..pieces).collect(),
            corrupt: HashSet::new(),
            gate: None,
            late_haves: Vec::new(),
            on_corrupt: None,
            corrupted: Arc::new(AtomicUsize::new(0)),
            blocks: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn have(mut self, pieces: &[usize]) -> Self {
        self.have = pieces.to_vec();
        self
    }

    pub fn corrupt(mut self, piece: usize, signal: Arc<watch::Sender<bool>>) -> Self {
        self.corrupt.insert(piece);
        self.on_corrupt = Some(signal);
        self
    }

    pub fn gated(mut self, gate: watch::Receiver<bool>, late_haves: &[usize]) -> Self {
        self.gate = Some(gate);
        self.late_haves = late_haves.to_vec();
        self
    }

    fn pieces(&self) -> usize {
        self.content.len().div_ceil(self.piece_length)
    }

    /// Listen on a random port of localhost and serve every connection.
    pub async fn listen(self) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let seeder = self.clone();
                spawn(async move { seeder.serve(socket).await });
            }
        });

        addr
    }

    async fn serve(self, socket: TcpStream) {
        let mut socket = Framed::new(socket, HandshakeCodec);
        let Some(Ok(theirs)) = socket.next().await else { return };

        let ours = Handshake::new(theirs.info_hash, PeerId::from([b's'; 20]));
        if socket.send(ours).await.is_err() {
            return;
        }

        let old_parts = socket.into_parts();
        let mut new_parts = FramedParts::new::<Message>(old_parts.io, CoreCodec);
        new_parts.read_buf = old_parts.read_buf;
        new_parts.write_buf = old_parts.write_buf;
        let mut socket = Framed::from_parts(new_parts);

        let mut bitfield = Bitfield::from_piece(self.pieces().div_ceil(8) * 8);
        for piece in &self.have {
            bitfield.set_piece(*piece);
        }
        if socket.send(Message::Bitfield(bitfield)).await.is_err() {
            return;
        }

        let mut gate = self.gate.clone();
        if gate.is_none() && socket.send(Message::Unchoke).await.is_err() {
            return;
        }

        loop {
            let msg = match gate.as_mut() {
                Some(rx) => select! {
                    _ = async { let _ = rx.wait_for(|open| *open).await; } => {
                        gate = None;
                        if socket.send(Message::Unchoke).await.is_err() {
                            return;
                        }
                        for piece in &self.late_haves {
                            if socket.send(Message::Have(*piece)).await.is_err() {
                                return;
                            }
                        }
                        continue;
                    }
                    msg = socket.next() => msg,
                },
                None => socket.next().await,
            };

            match msg {
                Some(Ok(Message::Request(block_info))) => {
                    if self.send_block(&mut socket, block_info).await.is_err() {
                        return;
                    }
                }
                Some(Ok(_)) => {}
                _ => return,
            }
        }
    }

    async fn send_block(
        &self,
        socket: &mut Framed<TcpStream, CoreCodec>,
        block_info: BlockInfo,
    ) -> Result<(), tessera::error::Error> {
        let BlockInfo { index, begin, len } = block_info;
        let index = index as usize;
        let piece_start = index * self.piece_length;
        let piece_end = (piece_start + self.piece_length).min(self.content.len());
        let start = piece_start + begin as usize;
        let end = start + len as usize;

        let mut block = self.content[start..end].to_vec();
        let corrupt = self.corrupt.contains(&index);
        if corrupt && begin == 0 {
            block[0] ^= 0xff;
        }

        self.blocks.fetch_add(1, Ordering::Relaxed);
        socket.send(Message::Piece(Block { index, begin, block })).await?;

        if corrupt && end == piece_end {
            self.corrupted.fetch_add(1, Ordering::Relaxed);
            if let Some(signal) = &self.on_corrupt {
                signal.send_replace(true);
            }
        }

        Ok(())
    }
}

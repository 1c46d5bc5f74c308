//! A library for downloading a single file over the BitTorrent protocol V1.
//!
//! The heart of the crate is the piece-exchange engine: one worker task per
//! remote peer pulls piece descriptors from a shared [`torrent::WorkQueue`],
//! downloads each piece with a pipelined window of block requests, verifies
//! its SHA-1 hash and publishes it to the orchestrator, which assembles the
//! final buffer.
//!
//! The rest of the crate are the building blocks around it: decoding the
//! `.torrent` file, asking an HTTP tracker for peers, the peer wire codecs
//! and writing the result to disk.
//!
//! # Example
//!
//! ```ignore
//!    let meta = MetaInfo::from_bytes(&std::fs::read("debian.iso.torrent")?)?;
//!    let peer_id = PeerId::generate();
//!    let peers = tracker::announce(&meta, &peer_id, 6881, timeout).await?;
//!
//!    let torrent = meta.to_torrent(peers, peer_id)?;
//!    let buf = torrent.download(DownloadOpts::default()).await?;
//!
//!    disk::write_output(Path::new("debian.iso"), &buf).await?;
//! ```

pub mod bitfield;
pub mod config;
pub mod disk;
pub mod error;
pub mod metainfo;
pub mod peer;
pub mod piece;
pub mod tcp_wire;
pub mod torrent;
pub mod tracker;
pub mod utils;

//! Announce to an HTTP tracker to get the peers of a torrent.
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};

use bendy::{
    decoding::{self, FromBencode, Object, ResultExt},
    encoding::AsString,
};
use tracing::{debug, info};

use crate::{error::Error, metainfo::MetaInfo, peer::PeerId};

/// Decoded body of an announce response.
#[derive(Debug, PartialEq, Clone, Default)]
pub struct AnnounceResponse {
    /// Seconds the tracker wants us to wait between announces.
    pub interval: Option<u32>,
    pub failure_reason: Option<String>,
    /// Compact peer list, 6 bytes per peer.
    pub peers: Vec<u8>,
}

/// Build the announce URL of a torrent.
pub fn announce_url(
    meta: &MetaInfo,
    peer_id: &PeerId,
    port: u16,
) -> Result<String, Error> {
    let base = &meta.announce;

    if !base.starts_with("http://") && !base.starts_with("https://") {
        return Err(Error::TrackerUrl(base.clone()));
    }

    let separator = if base.contains('?') { '&' } else { '?' };

    Ok(format!(
        "{base}{separator}info_hash={}&peer_id={}&port={port}&uploaded=0\
         &downloaded=0&compact=1&left={}",
        urlencoding::encode_binary(&meta.info.info_hash.0),
        urlencoding::encode_binary(peer_id.as_bytes()),
        meta.info.length()?,
    ))
}

/// Announce ourselves to the tracker of the torrent and return its peers.
#[tracing::instrument(skip_all, fields(tracker = %meta.announce))]
pub async fn announce(
    meta: &MetaInfo,
    peer_id: &PeerId,
    port: u16,
    timeout: Duration,
) -> Result<Vec<SocketAddr>, Error> {
    let url = announce_url(meta, peer_id, port)?;

    let client = reqwest::Client::builder().timeout(timeout).build()?;

    debug!("announcing to {url}");
    let body = client.get(&url).send().await?.error_for_status()?.bytes().await?;

    let res = AnnounceResponse::from_bencode(&body)?;

    if let Some(reason) = res.failure_reason {
        return Err(Error::TrackerFailure(reason));
    }

    let peers = parse_compact_peer_list(&res.peers)?;

    info!(
        "tracker returned {} peers, interval: {:?}",
        peers.len(),
        res.interval
    );

    Ok(peers)
}

/// Peers come in packets of 6 bytes, 4 for the IPv4 and 2 for the port.
pub fn parse_compact_peer_list(buf: &[u8]) -> Result<Vec<SocketAddr>, Error> {
    let chunks = buf.chunks_exact(6);
    if !chunks.remainder().is_empty() {
        return Err(Error::TrackerCompactPeerList);
    }

    Ok(chunks
        .map(|hostport| {
            let ip = Ipv4Addr::new(hostport[0], hostport[1], hostport[2], hostport[3]);
            let port = u16::from_be_bytes([hostport[4], hostport[5]]);
            SocketAddr::new(IpAddr::V4(ip), port)
        })
        .collect())
}

impl FromBencode for AnnounceResponse {
    fn decode_bencode_object(object: Object) -> Result<Self, decoding::Error>
    where
        Self: Sized,
    {
        let mut res = AnnounceResponse::default();

        let mut dict_dec = object.try_into_dictionary()?;
        while let Some(pair) = dict_dec.next_pair()? {
            match pair {
                (b"failure reason", value) => {
                    res.failure_reason = String::decode_bencode_object(value)
                        .context("failure reason")
                        .map(Some)?;
                }
                (b"interval", value) => {
                    res.interval = u32::decode_bencode_object(value)
                        .context("interval")
                        .map(Some)?;
                }
                (b"peers", value) => {
                    res.peers = AsString::decode_bencode_object(value)
                        .context("peers")
                        .map(|bytes| bytes.0)?;
                }
                _ => {}
            }
        }

        Ok(res)
    }
}

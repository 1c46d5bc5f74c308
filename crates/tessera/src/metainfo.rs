//! Metainfo is a .torrent file with information about the Torrent.
use std::net::SocketAddr;

use bendy::decoding::{self, Decoder, FromBencode, Object, ResultExt};
use bendy::encoding::AsString;
use sha1_smol::Sha1;

use crate::{
    error::Error,
    peer::PeerId,
    torrent::{InfoHash, Torrent},
};

#[derive(Debug, PartialEq, Clone, Default)]
pub struct MetaInfo {
    /// URL of the HTTP tracker.
    pub announce: String,
    pub info: Info,
}

/// File related information, only the single-file format is supported.
#[derive(Debug, PartialEq, Clone, Default)]
pub struct Info {
    /// Suggested name of the file.
    pub name: String,
    /// Number of bytes in a piece.
    pub piece_length: usize,
    /// Concatenation of all 20-byte SHA1 hash values, one per piece.
    pub pieces: Vec<u8>,
    /// Bytes of the entire file, only present in single-file torrents.
    pub file_length: Option<usize>,
    /// If the torrent uses the multi-file format.
    pub has_files: bool,
    /// SHA-1 of the raw bencoded `info` dictionary.
    pub info_hash: InfoHash,
}

impl Info {
    /// Split `pieces` into the hash of every piece.
    pub fn piece_hashes(&self) -> Result<Vec<[u8; 20]>, Error> {
        if self.pieces.len() % 20 != 0 {
            return Err(Error::PiecesLength(self.pieces.len()));
        }

        Ok(self
            .pieces
            .chunks_exact(20)
            .map(|chunk| {
                let mut hash = [0u8; 20];
                hash.copy_from_slice(chunk);
                hash
            })
            .collect())
    }

    /// Size in bytes of the file.
    pub fn length(&self) -> Result<usize, Error> {
        match self.file_length {
            Some(length) if !self.has_files => Ok(length),
            _ => Err(Error::MultiFileTorrent),
        }
    }

    fn info_hash(buf: &[u8]) -> InfoHash {
        InfoHash(Sha1::from(buf).digest().bytes())
    }
}

impl MetaInfo {
    /// Decode the content of a .torrent file.
    pub fn from_bytes(buf: &[u8]) -> Result<Self, Error> {
        Ok(Self::from_bencode(buf)?)
    }

    pub fn info_hash(&self) -> &InfoHash {
        &self.info.info_hash
    }

    /// Everything needed to start downloading from the given peers.
    pub fn to_torrent(
        &self,
        peers: Vec<SocketAddr>,
        peer_id: PeerId,
    ) -> Result<Torrent, Error> {
        Ok(Torrent {
            peers,
            peer_id,
            info_hash: self.info.info_hash.clone(),
            piece_hashes: self.info.piece_hashes()?,
            piece_length: self.info.piece_length,
            length: self.info.length()?,
            name: self.info.name.clone(),
        })
    }
}

impl FromBencode for MetaInfo {
    fn decode_bencode_object(object: Object) -> Result<Self, decoding::Error>
    where
        Self: Sized,
    {
        let mut announce = None;
        let mut info = None;

        let mut dict_dec = object.try_into_dictionary()?;
        while let Some(pair) = dict_dec.next_pair()? {
            match pair {
                (b"announce", value) => {
                    announce = String::decode_bencode_object(value)
                        .context("announce")
                        .map(Some)?;
                }
                (b"info", value) => {
                    info = Info::decode_bencode_object(value)
                        .context("info")
                        .map(Some)?;
                }
                _ => {}
            }
        }

        let announce =
            announce.ok_or_else(|| decoding::Error::missing_field("announce"))?;
        let info = info.ok_or_else(|| decoding::Error::missing_field("info"))?;

        Ok(Self { announce, info })
    }
}

impl FromBencode for Info {
    fn decode_bencode_object(object: Object) -> Result<Self, decoding::Error>
    where
        Self: Sized,
    {
        let mut has_files = false;
        let mut file_length = None;
        let mut name = None;
        let mut piece_length = None;
        let mut pieces = None;

        // the hash covers the dictionary exactly as it was encoded.
        let bytes = object.try_into_dictionary()?.into_raw()?;
        let info_hash = Info::info_hash(bytes);

        let mut decoder = Decoder::new(bytes);
        let mut dict = decoder
            .next_object()?
            .ok_or_else(|| decoding::Error::missing_field("info"))?
            .try_into_dictionary()?;

        while let Some(pair) = dict.next_pair()? {
            match pair {
                (b"files", _) => {
                    has_files = true;
                }
                (b"length", value) => {
                    file_length = usize::decode_bencode_object(value)
                        .context("length")
                        .map(Some)?;
                }
                (b"name", value) => {
                    name = String::decode_bencode_object(value)
                        .context("name")
                        .map(Some)?;
                }
                (b"piece length", value) => {
                    piece_length = usize::decode_bencode_object(value)
                        .context("piece length")
                        .map(Some)?;
                }
                (b"pieces", value) => {
                    pieces = AsString::decode_bencode_object(value)
                        .context("pieces")
                        .map(|bytes| Some(bytes.0))?;
                }
                _ => {}
            }
        }

        let name =
            name.ok_or_else(|| decoding::Error::missing_field("name"))?;
        let piece_length = piece_length
            .ok_or_else(|| decoding::Error::missing_field("piece_length"))?;
        let pieces =
            pieces.ok_or_else(|| decoding::Error::missing_field("pieces"))?;

        Ok(Info { name, piece_length, pieces, file_length, has_files, info_hash })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn string(s: &[u8]) -> Vec<u8> {
        let mut buf = format!("{}:", s.len()).into_bytes();
        buf.extend_from_slice(s);
        buf
    }

    fn info_dict(pieces: &[u8]) -> Vec<u8> {
        let mut buf = b"d".to_vec();
        buf.extend(string(b"length"));
        buf.extend(b"i25e");
        buf.extend(string(b"name"));
        buf.extend(string(b"file.txt"));
        buf.extend(string(b"piece length"));
        buf.extend(b"i10e");
        buf.extend(string(b"pieces"));
        buf.extend(string(pieces));
        buf.push(b'e');
        buf
    }

    fn torrent_file(info: &[u8]) -> Vec<u8> {
        let mut buf = b"d".to_vec();
        buf.extend(string(b"announce"));
        buf.extend(string(b"http://tracker.test/announce"));
        buf.extend(string(b"info"));
        buf.extend_from_slice(info);
        buf.push(b'e');
        buf
    }

    #[test]
    fn decode_single_file_torrent() {
        let pieces: Vec<u8> = (0..60).collect();
        let info = info_dict(&pieces);
        let meta = MetaInfo::from_bencode(&torrent_file(&info)).unwrap();

        assert_eq!(meta.announce, "http://tracker.test/announce");
        assert_eq!(meta.info.name, "file.txt");
        assert_eq!(meta.info.piece_length, 10);
        assert_eq!(meta.info.length().unwrap(), 25);
        assert_eq!(
            meta.info_hash().0,
            Sha1::from(&info[..]).digest().bytes()
        );

        let hashes = meta.info.piece_hashes().unwrap();
        assert_eq!(hashes.len(), 3);
        assert_eq!(hashes[1][0], 20);
    }

    #[test]
    fn to_torrent() {
        let pieces = [7u8; 60];
        let meta =
            MetaInfo::from_bencode(&torrent_file(&info_dict(&pieces))).unwrap();
        let peers = vec!["10.0.0.1:6881".parse().unwrap()];

        let torrent = meta.to_torrent(peers.clone(), PeerId::generate()).unwrap();

        assert_eq!(torrent.peers, peers);
        assert_eq!(torrent.length, 25);
        assert_eq!(torrent.piece_hashes, vec![[7u8; 20]; 3]);
        assert_eq!(&torrent.info_hash, meta.info_hash());
    }

    #[test]
    fn pieces_must_be_multiple_of_20() {
        let meta =
            MetaInfo::from_bencode(&torrent_file(&info_dict(&[0; 30]))).unwrap();

        assert!(matches!(
            meta.info.piece_hashes(),
            Err(Error::PiecesLength(30))
        ));
    }

    #[test]
    fn multi_file_is_rejected() {
        let mut info = b"d".to_vec();
        info.extend(string(b"files"));
        info.extend(b"le");
        info.extend(string(b"name"));
        info.extend(string(b"dir"));
        info.extend(string(b"piece length"));
        info.extend(b"i10e");
        info.extend(string(b"pieces"));
        info.extend(string(&[0; 20]));
        info.push(b'e');

        let meta = MetaInfo::from_bencode(&torrent_file(&info)).unwrap();

        assert!(meta.info.has_files);
        assert!(matches!(
            meta.to_torrent(Vec::new(), PeerId::generate()),
            Err(Error::MultiFileTorrent)
        ));
    }

    #[test]
    fn missing_info_fails() {
        let mut buf = b"d".to_vec();
        buf.extend(string(b"announce"));
        buf.extend(string(b"http://tracker.test/announce"));
        buf.push(b'e');

        assert!(matches!(MetaInfo::from_bytes(&buf), Err(Error::BencodeError)));
    }
}

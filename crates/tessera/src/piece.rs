//! Units of work exchanged between the orchestrator and the workers.
use sha1_smol::Sha1;

use crate::error::Error;

/// A piece that still needs to be downloaded.
///
/// It travels through the work queue and is put back unmodified every time
/// an attempt fails, so it never carries state of an attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PieceWork {
    pub index: usize,
    /// SHA-1 of the piece content.
    pub hash: [u8; 20],
    /// Length in bytes, the last piece may be shorter than the others.
    pub length: usize,
}

impl PieceWork {
    /// Check the downloaded content against the expected hash.
    pub fn verify(&self, buf: &[u8]) -> Result<(), Error> {
        let hash = Sha1::from(buf).digest().bytes();

        if hash != self.hash {
            return Err(Error::PieceInvalid(self.index));
        }

        Ok(())
    }
}

/// A downloaded piece that passed [`PieceWork::verify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PieceResult {
    pub index: usize,
    pub buf: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn work_for(buf: &[u8]) -> PieceWork {
        PieceWork {
            index: 7,
            hash: Sha1::from(buf).digest().bytes(),
            length: buf.len(),
        }
    }

    #[test]
    fn verify_is_stable() {
        let buf = b"the quick brown fox".to_vec();
        let work = work_for(&buf);

        for _ in 0..3 {
            assert!(work.verify(&buf).is_ok());
        }
    }

    #[test]
    fn a_single_corrupted_byte_fails() {
        let buf: Vec<u8> = (0..=255).collect();
        let work = work_for(&buf);

        for i in [0, 100, 255] {
            let mut corrupted = buf.clone();
            corrupted[i] ^= 1;
            assert!(matches!(
                work.verify(&corrupted),
                Err(Error::PieceInvalid(7))
            ));
        }
    }
}

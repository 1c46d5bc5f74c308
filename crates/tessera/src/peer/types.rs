use std::fmt::Display;

use rand::{distributions::Alphanumeric, Rng};
use speedy::{Readable, Writable};

/// Identity of a peer on the network, sent on the handshake and to trackers.
#[derive(Clone, PartialEq, Eq, Hash, Default, Readable, Writable)]
pub struct PeerId([u8; 20]);

impl PeerId {
    /// Azureus-style id of the local client: `-TS0001-` followed by 12
    /// random alphanumeric characters.
    pub fn generate() -> Self {
        let mut id = [0u8; 20];
        id[..8].copy_from_slice(b"-TS0001-");

        let mut rng = rand::thread_rng();
        for b in id[8..].iter_mut() {
            *b = rng.sample(Alphanumeric);
        }

        Self(id)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl std::fmt::Debug for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = self.to_string();
        f.write_str(&s)
    }
}

impl From<PeerId> for [u8; 20] {
    fn from(value: PeerId) -> Self {
        value.0
    }
}

impl From<[u8; 20]> for PeerId {
    fn from(value: [u8; 20]) -> Self {
        Self(value)
    }
}

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Shuffle {
    DontShuffle,
    Seeded([u8; 32]),
}

impl Shuffle {
    pub fn from_u64(seed: u64) -> Self {
        let mut bytes = [0u8; 32];
        bytes[..8].copy_from_slice(&seed.to_le_bytes());
        Shuffle::Seeded(bytes)
    }

    pub fn rng(&self) -> Option<ChaCha8Rng> {
        match self {
            Shuffle::DontShuffle => None,
            Shuffle::Seeded(seed) => Some(ChaCha8Rng::from_seed(*seed)),
        }
    }
}

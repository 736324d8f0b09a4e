use crate::genes::{Dna, MarketId};
use crate::stress::StressResult;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// The computed fitness terms of one DNA over one evaluation window.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FitnessTerms {
    pub roi: f64,
    pub sharpe: f64,
    pub max_drawdown: f64,
    pub bet_count: usize,
    /// Sum of decay weights of the placed bets.
    pub weighted_bets: f64,
    pub friction_roi: f64,
    pub expected_roi: f64,
    pub ece: f64,
    pub complexity_penalty: f64,
    pub fitness: f64,
}

/// Where a candidate came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lineage {
    pub seed: u64,
    pub generation: usize,
    pub parents: Vec<Uuid>,
}

/// A DNA proposed by the search together with its provenance and scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: Uuid,
    pub market: MarketId,
    pub dna: Dna,
    pub lineage: Lineage,
    pub training: FitnessTerms,
    pub validation: Option<FitnessTerms>,
    /// The value the search ranked this candidate by.
    pub objective: f64,
    pub stress: Option<StressResult>,
}

impl Candidate {
    /// Stable identity from (market, seed, generation, slot). Re-running a
    /// search with the same seed yields the same ids.
    pub fn derive_id(market: &MarketId, seed: u64, generation: usize, slot: usize) -> Uuid {
        let mut hasher = Sha256::new();
        hasher.update(market.as_str().as_bytes());
        hasher.update(seed.to_le_bytes());
        hasher.update((generation as u64).to_le_bytes());
        hasher.update((slot as u64).to_le_bytes());
        let digest = hasher.finalize();
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&digest[..16]);
        Uuid::from_bytes(bytes)
    }

    pub fn validation_or_training(&self) -> &FitnessTerms {
        self.validation.as_ref().unwrap_or(&self.training)
    }
}

/// Derives a 64-bit RNG seed from an identity and a base seed.
pub fn derive_seed(id: &Uuid, base_seed: u64, salt: &str) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(id.as_bytes());
    hasher.update(base_seed.to_le_bytes());
    hasher.update(salt.as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

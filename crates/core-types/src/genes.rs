use crate::enums::VolatilityRegime;
use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identifier of a betting market (league, competition or market family).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarketId(pub String);

impl MarketId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MarketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Inclusive bounds of a single gene.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeneRange {
    pub min: f64,
    pub max: f64,
}

impl GeneRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn span(&self) -> f64 {
        self.max - self.min
    }

    pub fn midpoint(&self) -> f64 {
        self.min + self.span() / 2.0
    }

    pub fn contains(&self, value: f64) -> bool {
        value.is_finite() && value >= self.min && value <= self.max
    }

    pub fn clamp(&self, value: f64) -> f64 {
        if !value.is_finite() {
            return self.midpoint();
        }
        value.clamp(self.min, self.max)
    }

    /// Position of `value` inside the range, in `[0, 1]`.
    pub fn normalize(&self, value: f64) -> f64 {
        if self.span() <= 0.0 {
            return 0.0;
        }
        ((value - self.min) / self.span()).clamp(0.0, 1.0)
    }
}

/// Per-market declared bounds for every gene the search may touch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GeneRanges(pub BTreeMap<String, GeneRange>);

impl GeneRanges {
    /// The canonical betting genes with their default search bounds.
    pub fn betting_defaults() -> Self {
        let mut ranges = BTreeMap::new();
        ranges.insert("min_edge".to_string(), GeneRange::new(0.0, 0.20));
        ranges.insert("min_odds".to_string(), GeneRange::new(1.20, 2.50));
        ranges.insert("max_odds".to_string(), GeneRange::new(2.50, 12.0));
        ranges.insert("kelly_fraction".to_string(), GeneRange::new(0.05, 0.50));
        ranges.insert("max_stake".to_string(), GeneRange::new(0.005, 0.05));
        ranges.insert("min_confidence".to_string(), GeneRange::new(0.30, 0.90));
        ranges.insert("draw_penalty".to_string(), GeneRange::new(0.0, 0.50));
        ranges.insert("xg_weight".to_string(), GeneRange::new(0.0, 1.0));
        Self(ranges)
    }

    pub fn get(&self, gene: &str) -> Option<&GeneRange> {
        self.0.get(gene)
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &GeneRange)> {
        self.0.iter()
    }

    /// A vector sitting at the middle of every range.
    pub fn midpoint_vector(&self) -> GeneVector {
        GeneVector(
            self.0
                .iter()
                .map(|(name, range)| (name.clone(), range.midpoint()))
                .collect(),
        )
    }

    /// Checks that the vector declares exactly the ranged genes and that
    /// every value sits inside its bounds.
    pub fn validate(&self, vector: &GeneVector) -> Result<(), CoreError> {
        for name in self.0.keys() {
            if !vector.0.contains_key(name) {
                return Err(CoreError::MissingGene(name.clone()));
            }
        }
        for (name, value) in &vector.0 {
            let range = self
                .0
                .get(name)
                .ok_or_else(|| CoreError::UndeclaredGene(name.clone()))?;
            if !range.contains(*value) {
                return Err(CoreError::GeneOutOfBounds {
                    gene: name.clone(),
                    value: *value,
                    min: range.min,
                    max: range.max,
                });
            }
        }
        Ok(())
    }

    /// Clamps every gene of `vector` back inside its range.
    pub fn clamp(&self, vector: &mut GeneVector) {
        for (name, value) in vector.0.iter_mut() {
            if let Some(range) = self.0.get(name) {
                *value = range.clamp(*value);
            }
        }
    }
}

impl Default for GeneRanges {
    fn default() -> Self {
        Self::betting_defaults()
    }
}

/// An ordered mapping from gene name to value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GeneVector(pub BTreeMap<String, f64>);

impl GeneVector {
    pub fn get(&self, gene: &str) -> Option<f64> {
        self.0.get(gene).copied()
    }

    pub fn require(&self, gene: &str) -> Result<f64, CoreError> {
        self.get(gene)
            .ok_or_else(|| CoreError::MissingGene(gene.to_string()))
    }

    pub fn set(&mut self, gene: impl Into<String>, value: f64) {
        self.0.insert(gene.into(), value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &f64)> {
        self.0.iter()
    }
}

impl FromIterator<(String, f64)> for GeneVector {
    fn from_iter<T: IntoIterator<Item = (String, f64)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

const LOW_PREFIX: &str = "lv.";
const HIGH_PREFIX: &str = "hv.";

/// A complete strategy DNA: one gene vector per volatility regime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dna {
    pub low_vol: GeneVector,
    pub high_vol: GeneVector,
}

impl Dna {
    pub fn new(low_vol: GeneVector, high_vol: GeneVector) -> Self {
        Self { low_vol, high_vol }
    }

    /// A DNA using the same vector for both regimes.
    pub fn uniform(vector: GeneVector) -> Self {
        Self {
            low_vol: vector.clone(),
            high_vol: vector,
        }
    }

    pub fn variant(&self, regime: VolatilityRegime) -> &GeneVector {
        match regime {
            VolatilityRegime::Low => &self.low_vol,
            VolatilityRegime::High => &self.high_vol,
        }
    }

    pub fn variant_mut(&mut self, regime: VolatilityRegime) -> &mut GeneVector {
        match regime {
            VolatilityRegime::Low => &mut self.low_vol,
            VolatilityRegime::High => &mut self.high_vol,
        }
    }

    pub fn validate(&self, ranges: &GeneRanges) -> Result<(), CoreError> {
        ranges.validate(&self.low_vol)?;
        ranges.validate(&self.high_vol)
    }

    /// Both variants as a single map keyed `lv.<gene>` / `hv.<gene>`.
    pub fn flatten(&self) -> BTreeMap<String, f64> {
        let low = self
            .low_vol
            .iter()
            .map(|(k, v)| (format!("{LOW_PREFIX}{k}"), *v));
        let high = self
            .high_vol
            .iter()
            .map(|(k, v)| (format!("{HIGH_PREFIX}{k}"), *v));
        low.chain(high).collect()
    }

    /// Inverse of [`Dna::flatten`]. Keys without a regime prefix are rejected.
    pub fn from_flat(flat: &BTreeMap<String, f64>) -> Result<Self, CoreError> {
        let mut low_vol = GeneVector::default();
        let mut high_vol = GeneVector::default();
        for (key, value) in flat {
            if let Some(gene) = key.strip_prefix(LOW_PREFIX) {
                low_vol.set(gene, *value);
            } else if let Some(gene) = key.strip_prefix(HIGH_PREFIX) {
                high_vol.set(gene, *value);
            } else {
                return Err(CoreError::InvalidInput(
                    "flattened dna".to_string(),
                    format!("key '{key}' has no regime prefix"),
                ));
            }
        }
        Ok(Self { low_vol, high_vol })
    }

    /// The declared range of a flattened key.
    pub fn range_for_flat_key<'a>(ranges: &'a GeneRanges, key: &str) -> Option<&'a GeneRange> {
        key.strip_prefix(LOW_PREFIX)
            .or_else(|| key.strip_prefix(HIGH_PREFIX))
            .and_then(|gene| ranges.get(gene))
    }
}

use crate::stats::{clip, mean};
use core_types::{Dna, GeneRanges};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Two flattened genes whose contributions move together across a
/// population.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkedPair {
    pub a: String,
    pub b: String,
    pub correlation: f64,
}

/// What the complexity penalty compares a DNA against: the population's
/// mean position per gene (normalized to `[0, 1]`) and its linked pairs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PopulationContext {
    pub gene_means: BTreeMap<String, f64>,
    pub linked_pairs: Vec<LinkedPair>,
}

impl PopulationContext {
    pub fn from_population<'a>(
        population: impl IntoIterator<Item = &'a Dna>,
        ranges: &GeneRanges,
        linked_pairs: Vec<LinkedPair>,
    ) -> Self {
        let mut columns: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        for dna in population {
            for (key, value) in normalized_flat(dna, ranges) {
                columns.entry(key).or_default().push(value);
            }
        }
        Self {
            gene_means: columns.iter().map(|(k, v)| (k.clone(), mean(v))).collect(),
            linked_pairs,
        }
    }
}

/// The flattened DNA with every gene mapped into `[0, 1]` of its range.
pub fn normalized_flat(dna: &Dna, ranges: &GeneRanges) -> BTreeMap<String, f64> {
    dna.flatten()
        .into_iter()
        .map(|(key, value)| {
            let norm = Dna::range_for_flat_key(ranges, &key)
                .map(|range| range.normalize(value))
                .unwrap_or(0.5);
            (key, norm)
        })
        .collect()
}

/// Breakdown of the DNA-complexity penalty. Every part lies in `[0, 1]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ComplexityPenalty {
    pub deviation: f64,
    pub regime_spread: f64,
    pub correlation_loss: f64,
}

impl ComplexityPenalty {
    pub fn total(&self) -> f64 {
        (self.deviation + self.regime_spread + self.correlation_loss) / 3.0
    }
}

pub fn complexity_penalty(
    dna: &Dna,
    ranges: &GeneRanges,
    context: Option<&PopulationContext>,
) -> ComplexityPenalty {
    let flat = normalized_flat(dna, ranges);

    let regime_spread = {
        let spreads: Vec<f64> = dna
            .low_vol
            .iter()
            .filter_map(|(gene, low)| {
                let high = dna.high_vol.get(gene)?;
                let range = ranges.get(gene)?;
                Some((range.normalize(*low) - range.normalize(high)).abs())
            })
            .collect();
        clip(mean(&spreads), 0.0, 1.0)
    };

    let Some(context) = context else {
        return ComplexityPenalty {
            regime_spread,
            ..Default::default()
        };
    };

    let deviation = {
        let deviations: Vec<f64> = flat
            .iter()
            .filter_map(|(key, value)| context.gene_means.get(key).map(|m| (value - m).abs()))
            .collect();
        clip(mean(&deviations), 0.0, 1.0)
    };

    // A pair that historically moved together is "broken" when this DNA
    // pushes its two genes in opposite directions from the population mean.
    let correlation_loss = {
        let losses: Vec<f64> = context
            .linked_pairs
            .iter()
            .filter_map(|pair| {
                let da = flat.get(&pair.a)? - context.gene_means.get(&pair.a)?;
                let db = flat.get(&pair.b)? - context.gene_means.get(&pair.b)?;
                let co_move = da * db * pair.correlation.signum();
                Some(clip(-4.0 * co_move, 0.0, 1.0) * pair.correlation.abs())
            })
            .collect();
        clip(mean(&losses), 0.0, 1.0)
    };

    ComplexityPenalty {
        deviation,
        regime_spread,
        correlation_loss,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn population_mean_dna_with_matching_regimes_is_free() {
        let ranges = GeneRanges::betting_defaults();
        let dna = Dna::uniform(ranges.midpoint_vector());
        let context = PopulationContext::from_population([&dna], &ranges, Vec::new());
        let penalty = complexity_penalty(&dna, &ranges, Some(&context));
        assert_eq!(penalty.total(), 0.0);
    }

    #[test]
    fn regime_spread_and_broken_links_are_penalized() {
        let ranges = GeneRanges::betting_defaults();
        let base = Dna::uniform(ranges.midpoint_vector());

        let mut split = base.clone();
        split.high_vol.set("min_edge", 0.20);
        let penalty = complexity_penalty(&split, &ranges, None);
        assert!(penalty.regime_spread > 0.0);
        assert_eq!(penalty.deviation, 0.0);

        let context = PopulationContext::from_population(
            [&base],
            &ranges,
            vec![LinkedPair {
                a: "lv.min_edge".to_string(),
                b: "lv.kelly_fraction".to_string(),
                correlation: 0.9,
            }],
        );
        let mut broken = base.clone();
        broken.low_vol.set("min_edge", 0.20);
        broken.low_vol.set("kelly_fraction", 0.05);
        let penalty = complexity_penalty(&broken, &ranges, Some(&context));
        assert!(penalty.correlation_loss > 0.0);
        assert!(penalty.deviation > 0.0);
        assert!(penalty.total() <= 1.0);
    }
}

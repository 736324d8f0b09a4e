use analytics::stats::{normalized_ranks, pearson};
use analytics::{LinkedPair, normalized_flat};
use core_types::{Dna, GeneRanges};
use itertools::Itertools;
use std::collections::BTreeMap;

/// Finds gene pairs whose rank-contribution to fitness is correlated across
/// the population.
///
/// A gene's contribution for one individual is
/// `(gene rank - 0.5) * (fitness rank - 0.5)`: positive when a high value
/// goes with high fitness. Pairs whose contribution columns correlate at
/// least `threshold` in absolute value are linked.
pub fn detect_linked_pairs(
    population: &[(&Dna, f64)],
    ranges: &GeneRanges,
    threshold: f64,
) -> Vec<LinkedPair> {
    if population.len() < 4 {
        return Vec::new();
    }

    let fitness: Vec<f64> = population.iter().map(|(_, f)| *f).collect();
    let fitness_ranks = normalized_ranks(&fitness);

    let mut columns: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for (dna, _) in population {
        for (key, value) in normalized_flat(dna, ranges) {
            columns.entry(key).or_default().push(value);
        }
    }

    let contributions: BTreeMap<&String, Vec<f64>> = columns
        .iter()
        .map(|(key, values)| {
            let ranks = normalized_ranks(values);
            let contribution = ranks
                .iter()
                .zip(&fitness_ranks)
                .map(|(g, f)| (g - 0.5) * (f - 0.5))
                .collect();
            (key, contribution)
        })
        .collect();

    contributions
        .iter()
        .tuple_combinations()
        .filter_map(|((a, ca), (b, cb))| {
            let correlation = pearson(ca, cb);
            (correlation.abs() >= threshold).then(|| LinkedPair {
                a: (*a).clone(),
                b: (*b).clone(),
                correlation,
            })
        })
        .collect()
}

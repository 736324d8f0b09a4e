//! Genetic operators. Every operator keeps genes inside their declared
//! ranges.

use analytics::LinkedPair;
use core_types::{CoreError, Dna, GeneRanges, GeneVector};
use rand::Rng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use std::collections::BTreeMap;

fn random_vector(rng: &mut StdRng, ranges: &GeneRanges) -> GeneVector {
    ranges
        .iter()
        .map(|(name, range)| {
            let value = if range.span() > 0.0 {
                rng.gen_range(range.min..=range.max)
            } else {
                range.min
            };
            (name.clone(), value)
        })
        .collect()
}

/// A DNA with both regime variants drawn uniformly from the ranges.
pub fn random_dna(rng: &mut StdRng, ranges: &GeneRanges) -> Dna {
    let low = random_vector(rng, ranges);
    let high = random_vector(rng, ranges);
    Dna::new(low, high)
}

/// Mutation rate scaled up for markets whose history is less reliable.
pub fn adaptive_mutation_rate(base: f64, reliability: f64, min: f64, max: f64) -> f64 {
    let unreliability = 1.0 - reliability.clamp(0.0, 1.0);
    (base * (1.0 + unreliability)).clamp(min, max)
}

/// Gaussian mutation: each gene mutates with probability `rate` by a draw
/// of width `sigma_fraction` of its span, then is clamped back into range.
pub fn mutate(dna: &mut Dna, rng: &mut StdRng, rate: f64, sigma_fraction: f64, ranges: &GeneRanges) {
    let rate = rate.clamp(0.0, 1.0);
    for vector in [&mut dna.low_vol, &mut dna.high_vol] {
        for (name, value) in vector.0.iter_mut() {
            let Some(range) = ranges.get(name) else {
                continue;
            };
            if !rng.gen_bool(rate) {
                continue;
            }
            if let Ok(normal) = Normal::new(0.0, sigma_fraction * range.span()) {
                *value = range.clamp(*value + normal.sample(rng));
            }
        }
    }
    ranges.clamp(&mut dna.low_vol);
    ranges.clamp(&mut dna.high_vol);
}

/// Uniform crossover over the flattened genes. Each linked pair is, with
/// probability `link_probability`, inherited together from one parent.
pub fn crossover(
    a: &Dna,
    b: &Dna,
    rng: &mut StdRng,
    linked_pairs: &[LinkedPair],
    link_probability: f64,
) -> Result<Dna, CoreError> {
    let flat_a = a.flatten();
    let flat_b = b.flatten();
    let mut child: BTreeMap<String, f64> = BTreeMap::new();

    for pair in linked_pairs {
        if !rng.gen_bool(link_probability.clamp(0.0, 1.0)) {
            continue;
        }
        let parent = if rng.gen_bool(0.5) { &flat_a } else { &flat_b };
        for key in [&pair.a, &pair.b] {
            if child.contains_key(key) {
                continue;
            }
            if let Some(value) = parent.get(key) {
                child.insert(key.clone(), *value);
            }
        }
    }

    for (key, value_a) in &flat_a {
        if child.contains_key(key) {
            continue;
        }
        let value = match flat_b.get(key) {
            Some(value_b) if rng.gen_bool(0.5) => *value_b,
            _ => *value_a,
        };
        child.insert(key.clone(), value);
    }

    Dna::from_flat(&child)
}

/// Index of the best of `k` uniformly drawn contestants.
pub fn tournament(objectives: &[f64], rng: &mut StdRng, k: usize) -> usize {
    let mut best = rng.gen_range(0..objectives.len());
    for _ in 1..k.max(1) {
        let idx = rng.gen_range(0..objectives.len());
        if objectives[idx] > objectives[best] {
            best = idx;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn operators_never_leave_the_ranges() {
        let ranges = GeneRanges::betting_defaults();
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..200 {
            let a = random_dna(&mut rng, &ranges);
            let b = random_dna(&mut rng, &ranges);
            let mut child = crossover(&a, &b, &mut rng, &[], 0.0).unwrap();
            mutate(&mut child, &mut rng, 1.0, 5.0, &ranges);
            assert!(child.validate(&ranges).is_ok());
        }
    }

    #[test]
    fn linked_pairs_travel_together() {
        let ranges = GeneRanges::betting_defaults();
        let mut rng = StdRng::seed_from_u64(9);
        let a = Dna::uniform(ranges.midpoint_vector());
        let mut b = a.clone();
        b.low_vol.set("min_edge", 0.19);
        b.low_vol.set("kelly_fraction", 0.49);
        let pair = LinkedPair {
            a: "lv.min_edge".to_string(),
            b: "lv.kelly_fraction".to_string(),
            correlation: 0.9,
        };

        for _ in 0..100 {
            let child = crossover(&a, &b, &mut rng, &[pair.clone()], 1.0).unwrap();
            let from_b_edge = child.low_vol.get("min_edge") == Some(0.19);
            let from_b_kelly = child.low_vol.get("kelly_fraction") == Some(0.49);
            assert_eq!(from_b_edge, from_b_kelly);
        }
    }

    #[test]
    fn mutation_rate_rises_for_unreliable_markets() {
        assert_eq!(adaptive_mutation_rate(0.15, 1.0, 0.05, 0.45), 0.15);
        assert!((adaptive_mutation_rate(0.15, 0.0, 0.05, 0.45) - 0.30).abs() < 1e-12);
        assert_eq!(adaptive_mutation_rate(0.4, 0.0, 0.05, 0.45), 0.45);
    }

    #[test]
    fn tournament_prefers_better_objectives() {
        let mut rng = StdRng::seed_from_u64(1);
        let objectives = [0.0, 10.0];
        let wins = (0..200)
            .filter(|_| tournament(&objectives, &mut rng, 3) == 1)
            .count();
        assert!(wins > 150);
    }
}

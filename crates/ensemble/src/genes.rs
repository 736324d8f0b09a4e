use analytics::stats::{coefficient_of_variation, mean, median, std_dev};
use core_types::{CoreError, Dna};
use serde::Serialize;
use std::collections::BTreeMap;

/// Spread of one flattened gene across the champions of independent runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneStats {
    pub gene: String,
    pub mean: f64,
    pub std_dev: f64,
    pub cv: f64,
    pub median: f64,
    pub robust: bool,
}

/// Per-gene mean, standard deviation and coefficient of variation across
/// `champions`. A gene is robust when its CV is at most `cv_threshold`.
pub fn gene_statistics(champions: &[&Dna], cv_threshold: f64) -> Vec<GeneStats> {
    let mut columns: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for dna in champions {
        for (gene, value) in dna.flatten() {
            columns.entry(gene).or_default().push(value);
        }
    }
    columns
        .into_iter()
        .map(|(gene, values)| {
            let cv = coefficient_of_variation(&values);
            GeneStats {
                gene,
                mean: mean(&values),
                std_dev: std_dev(&values),
                cv,
                median: median(&values),
                robust: cv <= cv_threshold,
            }
        })
        .collect()
}

/// Robust genes take the champions' median; unstable genes keep the value
/// of the best champion.
pub fn consensus_dna(stats: &[GeneStats], best: &Dna) -> Result<Dna, CoreError> {
    let mut flat = best.flatten();
    for stat in stats.iter().filter(|s| s.robust) {
        flat.insert(stat.gene.clone(), stat.median);
    }
    Dna::from_flat(&flat)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::GeneRanges;

    #[test]
    fn consensus_mixes_medians_and_the_best_champion() {
        let ranges = GeneRanges::betting_defaults();
        let champions: Vec<Dna> = [0.10, 0.11, 0.12]
            .iter()
            .zip([0.0, 0.5, 1.0])
            .map(|(&edge, xg)| {
                let mut dna = Dna::uniform(ranges.midpoint_vector());
                dna.low_vol.set("min_edge", edge);
                dna.low_vol.set("xg_weight", xg);
                dna
            })
            .collect();
        let refs: Vec<&Dna> = champions.iter().collect();

        let stats = gene_statistics(&refs, 0.15);
        let edge = stats.iter().find(|s| s.gene == "lv.min_edge").unwrap();
        let xg = stats.iter().find(|s| s.gene == "lv.xg_weight").unwrap();
        assert!(edge.robust);
        assert!(!xg.robust);

        let consensus = consensus_dna(&stats, &champions[2]).unwrap();
        assert_eq!(consensus.low_vol.get("min_edge"), Some(0.11));
        assert_eq!(consensus.low_vol.get("xg_weight"), Some(1.0));
    }
}

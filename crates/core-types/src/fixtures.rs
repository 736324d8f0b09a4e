//! Deterministic synthetic match histories for tests across the workspace.

use crate::enums::Outcome;
use crate::genes::MarketId;
use crate::records::{MatchRecord, OutcomeTriple};
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Builds `count` settled matches, one every `spacing_hours`, starting at
/// `start`. The model is mildly sharper than the bookmaker so some genes find
/// an edge.
pub fn synthetic_history(
    market: &MarketId,
    start: DateTime<Utc>,
    count: usize,
    spacing_hours: i64,
    seed: u64,
) -> Vec<MatchRecord> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|i| {
            let strength: f64 = rng.gen_range(-1.0..1.0);
            let draw = rng.gen_range(0.22..0.30);
            let home = (1.0 - draw) * (0.5 + 0.35 * strength);
            let away = 1.0 - draw - home;
            let truth = OutcomeTriple::new(home, draw, away);

            let noise = |rng: &mut StdRng, p: f64| (p * rng.gen_range(0.85..1.15)).max(0.02);
            let book = OutcomeTriple::new(
                noise(&mut rng, truth.home),
                noise(&mut rng, truth.draw),
                noise(&mut rng, truth.away),
            );
            let book = book.normalized().unwrap_or(truth);
            let odds = book.map(|p| (1.0 / (p * 1.05)).max(1.01));

            let model = OutcomeTriple::new(
                truth.home * rng.gen_range(0.95..1.05),
                truth.draw * rng.gen_range(0.95..1.05),
                truth.away * rng.gen_range(0.95..1.05),
            );
            let model = model.normalized().unwrap_or(truth);

            let roll: f64 = rng.gen_range(0.0..1.0);
            let result = if roll < truth.home {
                Outcome::Home
            } else if roll < truth.home + truth.draw {
                Outcome::Draw
            } else {
                Outcome::Away
            };

            MatchRecord {
                match_id: format!("{}-{i:05}", market.as_str()),
                market: market.clone(),
                kickoff: start + Duration::hours(spacing_hours * i as i64),
                odds,
                model_probs: model,
                xg_home: (1.4 + strength * 0.8 + rng.gen_range(-0.3..0.3)).max(0.1),
                xg_away: (1.1 - strength * 0.8 + rng.gen_range(-0.3..0.3)).max(0.1),
                confidence: rng.gen_range(0.35..0.95),
                data_quality: rng.gen_range(0.7..1.0),
                liquidity: Some(0.03),
                market_drift: Some(rng.gen_range(0.0..0.05)),
                sentiment_available: true,
                result: Some(result),
            }
        })
        .collect()
}

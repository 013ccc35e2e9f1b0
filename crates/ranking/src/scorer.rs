//! Composite trending score
//!
//! A pure weighted sum over the entity's numeric signals. Determinism is
//! part of the contract: identical input must produce identical ordering.

use screener_core::{Entity, ScoreWeights, ScoredEntity};

/// Computes the composite ranking score over aggregated entities.
#[derive(Debug, Clone, Default)]
pub struct TrendingScorer {
    weights: ScoreWeights,
}

impl TrendingScorer {
    pub fn new(weights: ScoreWeights) -> Self {
        Self { weights }
    }

    /// Score of a single entity. Missing numerics were defaulted to zero
    /// at the aggregation boundary.
    pub fn score_one(&self, entity: &Entity) -> f64 {
        entity.market_cap_delta_24h * self.weights.cap_delta
            + entity.volume_24h * self.weights.volume
            + entity.unique_holders as f64 * self.weights.holders
    }

    /// Score and rank all entities, descending. Ties are broken by
    /// ascending lower-cased address so ordering is reproducible.
    pub fn score(&self, entities: &[Entity]) -> Vec<ScoredEntity> {
        let mut scored: Vec<ScoredEntity> = entities
            .iter()
            .map(|entity| ScoredEntity {
                entity: entity.clone(),
                score: self.score_one(entity),
                match_score: None,
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.entity.address_key().cmp(&b.entity.address_key()))
        });

        scored
    }

    /// Rank the full set, then truncate. Filtering before scoring would
    /// make score comparisons meaningless, so truncation always happens
    /// after the sort.
    pub fn top(&self, entities: &[Entity], limit: usize) -> Vec<ScoredEntity> {
        let mut scored = self.score(entities);
        scored.truncate(limit);
        scored
    }
}

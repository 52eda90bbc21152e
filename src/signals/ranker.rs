// =============================================================================
// Ranker — threshold filter + stable top-N selection
// =============================================================================

use serde::{Deserialize, Serialize};

use super::scorer::SignalResult;
use crate::types::RankingKey;

/// Selection policy applied to a batch of scored symbols.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankerConfig {
    /// Minimum directional strength (`max(confidence, 1 - confidence)`).
    pub confidence_threshold: f64,
    /// Admit Neutral results as well as Long / Short.
    pub include_neutral: bool,
    /// Drop results whose latest volume is not above the series mean.
    pub require_volume_confirmation: bool,
    pub ranking_key: RankingKey,
    pub top_n: usize,
}

impl Default for RankerConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.6,
            include_neutral: false,
            require_volume_confirmation: false,
            ranking_key: RankingKey::Confidence,
            top_n: 3,
        }
    }
}

/// Value the ranker sorts on, descending.
pub fn ranking_value(result: &SignalResult, key: RankingKey) -> f64 {
    match key {
        RankingKey::Confidence => result.directional_strength(),
        RankingKey::ConfidenceVolume => result.directional_strength() * result.volume,
    }
}

/// Whether `result` passes the filter stage of `config`.
pub fn qualifies(result: &SignalResult, config: &RankerConfig) -> bool {
    if !config.include_neutral && !result.bias.is_directional() {
        return false;
    }
    if config.require_volume_confirmation && !result.volume_confirmed {
        return false;
    }
    result.directional_strength() >= config.confidence_threshold
}

/// Filter `results` (in scan order) and return at most `top_n`, sorted
/// descending by the configured key. Equal keys keep their scan order.
pub fn rank<'a, I>(results: I, config: &RankerConfig) -> Vec<SignalResult>
where
    I: IntoIterator<Item = &'a SignalResult>,
{
    let mut keyed: Vec<(f64, &SignalResult)> = results
        .into_iter()
        .filter(|r| qualifies(r, config))
        .map(|r| (ranking_value(r, config.ranking_key), r))
        .collect();

    // `sort_by` is stable; NaN keys (never produced by the scorer) sort last.
    keyed.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

    keyed
        .into_iter()
        .take(config.top_n)
        .map(|(_, r)| r.clone())
        .collect()
}

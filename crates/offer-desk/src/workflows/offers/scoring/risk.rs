pub const MAX_RISK_SCORE: u8 = 10;
pub const MIN_RISK_SCORE: u8 = 1;
const POINTS_PER_CONTINGENCY: u8 = 2;

/// Linear decay from 10 with a floor of 1. Higher means safer.
pub fn risk_score(contingency_count: usize) -> u8 {
    let floor_at = usize::from(MAX_RISK_SCORE / POINTS_PER_CONTINGENCY);
    let counted = contingency_count.min(floor_at) as u8;
    MAX_RISK_SCORE
        .saturating_sub(counted * POINTS_PER_CONTINGENCY)
        .max(MIN_RISK_SCORE)
}

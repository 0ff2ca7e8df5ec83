//! Hybrid scoring
//!
//! `hybrid = vector_distance + alpha_km * |candidate_km - target_km|` when
//! the question names a distance, else `hybrid = vector_distance`. A
//! candidate without a stored distance gets no penalty.

use runclub_core::CandidateRecord;

#[derive(Debug, Clone, Copy)]
pub struct HybridScorer {
    alpha_km: f64,
}

impl HybridScorer {
    pub fn new(alpha_km: f64) -> Self {
        Self { alpha_km }
    }

    pub fn alpha_km(&self) -> f64 {
        self.alpha_km
    }

    /// Pure function of the candidate and the target distance
    pub fn score(&self, candidate: &CandidateRecord, target_km: Option<f64>) -> f32 {
        let penalty = match (target_km, candidate.record.distance_km) {
            (Some(target), Some(km)) => self.alpha_km * (km - target).abs(),
            _ => 0.0,
        };
        candidate.vector_distance + penalty as f32
    }

    /// Fill `hybrid_score` on every candidate
    pub fn apply(&self, candidates: &mut [CandidateRecord], target_km: Option<f64>) {
        for c in candidates.iter_mut() {
            c.hybrid_score = Some(self.score(c, target_km));
        }
    }

    /// Ascending hybrid score, vector distance as tie-break
    pub fn sort(candidates: &mut [CandidateRecord]) {
        candidates.sort_by(|a, b| {
            a.hybrid_or_vector()
                .total_cmp(&b.hybrid_or_vector())
                .then(a.vector_distance.total_cmp(&b.vector_distance))
        });
    }
}

impl Default for HybridScorer {
    fn default() -> Self {
        Self::new(runclub_config::constants::rag::ALPHA_KM)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runclub_core::StoredRecord;

    fn candidate(id: &str, km: Option<f64>, distance: f32) -> CandidateRecord {
        let mut record = StoredRecord::new(id, id);
        record.distance_km = km;
        CandidateRecord::new(record, distance)
    }

    #[test]
    fn test_no_target_equals_vector_distance() {
        let scorer = HybridScorer::default();
        for (km, d) in [(Some(3.0), 0.2), (Some(42.2), 0.9), (None, 0.5)] {
            let c = candidate("a", km, d);
            assert_eq!(scorer.score(&c, None), d);
        }
    }

    #[test]
    fn test_exact_distance_has_zero_penalty() {
        let scorer = HybridScorer::new(0.6);
        let c = candidate("a", Some(10.0), 0.25);
        assert_eq!(scorer.score(&c, Some(10.0)), 0.25);
    }

    #[test]
    fn test_penalty_scales_with_mismatch() {
        let scorer = HybridScorer::new(0.6);
        let c = candidate("a", Some(12.0), 0.1);
        assert!((scorer.score(&c, Some(10.0)) - 1.3).abs() < 1e-6);
        // missing stored distance is not penalized
        let c = candidate("b", None, 0.1);
        assert_eq!(scorer.score(&c, Some(10.0)), 0.1);
    }

    #[test]
    fn test_sort_prefers_on_target_distance() {
        let scorer = HybridScorer::new(0.6);
        let mut cs = vec![
            candidate("off", Some(5.0), 0.10),
            candidate("on", Some(10.0), 0.30),
        ];
        scorer.apply(&mut cs, Some(10.0));
        HybridScorer::sort(&mut cs);
        assert_eq!(cs[0].id(), "on");
    }
}

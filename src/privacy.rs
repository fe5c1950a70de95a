//! Privacy score: how much of a job's requirements an applicant proved in
//! zero knowledge rather than disclosed.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::model::Job;

/// Lowest score any application can get.
pub const PRIVACY_SCORE_FLOOR: u8 = 10;

/// One requirement a job checks.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum DataPoint {
    Skill(String),
    Salary,
    Region,
}

impl fmt::Display for DataPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataPoint::Skill(name) => write!(f, "skill:{name}"),
            DataPoint::Salary => f.write_str("salary"),
            DataPoint::Region => f.write_str("region"),
        }
    }
}

/// Every data point `job` requires.
pub fn required_data_points(job: &Job) -> BTreeSet<DataPoint> {
    job.skill_thresholds()
        .keys()
        .map(|s| DataPoint::Skill(s.clone()))
        .chain([DataPoint::Salary, DataPoint::Region])
        .collect()
}

/// `floor + (100 - floor) * proven / required`, rounded down.
///
/// Disclosures of points the job does not require are ignored, so disclosing
/// less never lowers the score.
pub fn privacy_score(required: &BTreeSet<DataPoint>, disclosed: &BTreeSet<DataPoint>) -> u8 {
    if required.is_empty() {
        return 100;
    }
    let proven = required.difference(disclosed).count() as u64;
    let span = u64::from(100 - PRIVACY_SCORE_FLOOR);
    let score = u64::from(PRIVACY_SCORE_FLOOR) + span * proven / required.len() as u64;
    score as u8
}

/// Aggregate privacy figures for a ledger.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PrivacyStats {
    pub applications: u64,
    pub proven_points: u64,
    pub disclosed_points: u64,
    score_total: u64,
}

impl PrivacyStats {
    pub fn record(&mut self, score: u8, proven: u64, disclosed: u64) {
        self.applications += 1;
        self.score_total += u64::from(score);
        self.proven_points += proven;
        self.disclosed_points += disclosed;
    }

    pub fn average_score(&self) -> f64 {
        if self.applications == 0 {
            return 0.0;
        }
        self.score_total as f64 / self.applications as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::sample_job;
    use proptest::prelude::*;

    fn skills(names: &[&str]) -> BTreeSet<DataPoint> {
        names.iter().map(|n| DataPoint::Skill(n.to_string())).collect()
    }

    #[test]
    fn test_required_points() {
        let required = required_data_points(&sample_job());
        assert_eq!(required.len(), 4);
        assert!(required.contains(&DataPoint::Skill("rust".into())));
        assert!(required.contains(&DataPoint::Region));
    }

    #[test]
    fn test_score_bounds() {
        let required = required_data_points(&sample_job());
        assert_eq!(privacy_score(&required, &BTreeSet::new()), 100);
        assert_eq!(privacy_score(&required, &required), PRIVACY_SCORE_FLOOR);
        assert_eq!(privacy_score(&BTreeSet::new(), &BTreeSet::new()), 100);
    }

    #[test]
    fn test_unrequired_disclosure_ignored() {
        let required = skills(&["rust", "zk"]);
        let disclosed = skills(&["go"]);
        assert_eq!(privacy_score(&required, &disclosed), 100);
    }

    #[test]
    fn test_stats_average() {
        let mut stats = PrivacyStats::default();
        assert_eq!(stats.average_score(), 0.0);
        stats.record(100, 4, 0);
        stats.record(55, 2, 2);
        assert_eq!(stats.applications, 2);
        assert_eq!(stats.average_score(), 77.5);
        assert_eq!(stats.disclosed_points, 2);
    }

    proptest! {
        #[test]
        fn test_proving_more_never_lowers_score(
            required in prop::collection::btree_set("[a-z]{1,4}", 1..8),
            disclosed_mask in prop::collection::vec(any::<bool>(), 8),
            extra in 0usize..8,
        ) {
            let required: BTreeSet<DataPoint> =
                required.into_iter().map(DataPoint::Skill).collect();
            let disclosed: BTreeSet<DataPoint> = required
                .iter()
                .zip(disclosed_mask.iter())
                .filter(|(_, d)| **d)
                .map(|(p, _)| p.clone())
                .collect();
            // Prove one more point by withdrawing a disclosure.
            let fewer: BTreeSet<DataPoint> = disclosed
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != extra)
                .map(|(_, p)| p.clone())
                .collect();

            let before = privacy_score(&required, &disclosed);
            let after = privacy_score(&required, &fewer);
            prop_assert!(after >= before);
            prop_assert!(before >= PRIVACY_SCORE_FLOOR);
            prop_assert!(after <= 100);
        }
    }
}

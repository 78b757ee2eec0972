use serde::Serialize;

use super::{mean_score, Rating, RatingLedger, UserId, AVERAGE_TOLERANCE};

/// Raw stored state of one business ledger, as read back from storage
/// without normalisation.
#[derive(Debug, Clone)]
pub struct StoredLedger {
    pub business_id: UserId,
    pub business_name: String,
    pub entries: Vec<Rating>,
    pub average_rating: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct IntegrityReport {
    pub business_count: usize,
    pub rating_count: usize,
    pub issues: Vec<String>,
}

impl IntegrityReport {
    pub fn is_consistent(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Check every stored ledger for duplicate reviewers and a stale aggregate.
pub fn build_integrity_report(ledgers: &[StoredLedger]) -> IntegrityReport {
    let mut issues = Vec::new();
    let mut rating_count = 0;

    for ledger in ledgers {
        rating_count += ledger.entries.len();

        for reviewer in RatingLedger::duplicate_reviewers(&ledger.entries) {
            issues.push(format!(
                "{} ({}): reviewer {} has more than one rating",
                ledger.business_name, ledger.business_id, reviewer
            ));
        }

        let expected = mean_score(&ledger.entries);
        if (ledger.average_rating - expected).abs() > AVERAGE_TOLERANCE {
            issues.push(format!(
                "{} ({}): cached average {:.4} does not match mean {:.4} of {} rating(s)",
                ledger.business_name,
                ledger.business_id,
                ledger.average_rating,
                expected,
                ledger.entries.len()
            ));
        }
    }

    IntegrityReport {
        business_count: ledgers.len(),
        rating_count,
        issues,
    }
}

use serde::{Deserialize, Serialize};

use super::{Rating, User, UserId};

/// Tolerance used when comparing a cached average against a recomputed one.
pub const AVERAGE_TOLERANCE: f64 = 1e-9;

/// Compute the arithmetic mean of the scores in a ledger.
/// An empty ledger averages to 0.0.
pub fn mean_score(ratings: &[Rating]) -> f64 {
    if ratings.is_empty() {
        return 0.0;
    }
    let total: u64 = ratings.iter().map(|r| r.score.value() as u64).sum();
    total as f64 / ratings.len() as f64
}

/// What an upsert did to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    /// The reviewer already had an entry at this position; it was overwritten in place.
    Replaced { position: usize },
}

/// The ordered collection of ratings owned by one business.
/// Holds at most one entry per reviewer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RatingLedger {
    ratings: Vec<Rating>,
}

impl RatingLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a ledger from stored entries, keeping the latest entry for any
    /// reviewer that appears more than once.
    pub fn from_entries(entries: Vec<Rating>) -> Self {
        let mut ledger = Self::new();
        for entry in entries {
            ledger.upsert(entry);
        }
        ledger
    }

    /// Replace the reviewer's existing entry in place, or append a new one.
    pub fn upsert(&mut self, rating: Rating) -> UpsertOutcome {
        match self
            .ratings
            .iter()
            .position(|r| r.reviewer_id == rating.reviewer_id)
        {
            Some(position) => {
                self.ratings[position] = rating;
                UpsertOutcome::Replaced { position }
            }
            None => {
                self.ratings.push(rating);
                UpsertOutcome::Inserted
            }
        }
    }

    pub fn get(&self, reviewer_id: UserId) -> Option<&Rating> {
        self.ratings.iter().find(|r| r.reviewer_id == reviewer_id)
    }

    pub fn average(&self) -> f64 {
        mean_score(&self.ratings)
    }

    pub fn len(&self) -> usize {
        self.ratings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ratings.is_empty()
    }

    pub fn ratings(&self) -> &[Rating] {
        &self.ratings
    }

    /// Reviewers that appear more than once. Always empty for a ledger built
    /// through `upsert`; used to audit raw stored data.
    pub fn duplicate_reviewers(entries: &[Rating]) -> Vec<UserId> {
        let mut seen = std::collections::HashSet::new();
        let mut duplicates = Vec::new();
        for entry in entries {
            if !seen.insert(entry.reviewer_id) && !duplicates.contains(&entry.reviewer_id) {
                duplicates.push(entry.reviewer_id);
            }
        }
        duplicates
    }
}

/// A business account together with its ledger and the cached aggregate.
#[derive(Debug, Clone)]
pub struct Business {
    pub user: User,
    pub ledger: RatingLedger,
    /// Materialized mean of the ledger, written together with it
    pub average_rating: f64,
    /// Bumped on every ledger write; guards conditional updates
    pub revision: i64,
}

impl Business {
    /// Whether the cached average matches the stored entries.
    pub fn is_consistent(&self) -> bool {
        (self.average_rating - self.ledger.average()).abs() <= AVERAGE_TOLERANCE
    }
}

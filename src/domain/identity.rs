use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Rating, User, UserId};

pub const ANONYMOUS_NAME: &str = "Anonymous User";

/// Display identity of a reviewer, as shown next to their review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewerIdentity {
    pub display_name: String,
    pub avatar: Option<String>,
}

impl ReviewerIdentity {
    /// Placeholder for reviewers the directory could not resolve.
    pub fn anonymous() -> Self {
        Self {
            display_name: ANONYMOUS_NAME.to_string(),
            avatar: None,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.avatar.is_none() && self.display_name == ANONYMOUS_NAME
    }
}

impl From<&User> for ReviewerIdentity {
    fn from(user: &User) -> Self {
        Self {
            display_name: user.name.clone(),
            avatar: user.profile_picture.clone(),
        }
    }
}

/// Result of resolving one reviewer against the user directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityLookup {
    Resolved(ReviewerIdentity),
    Missing,
}

impl IdentityLookup {
    pub fn into_identity(self) -> ReviewerIdentity {
        match self {
            IdentityLookup::Resolved(identity) => identity,
            IdentityLookup::Missing => ReviewerIdentity::anonymous(),
        }
    }
}

/// A stored rating joined with its reviewer's display identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedRating {
    pub reviewer_id: UserId,
    pub reviewer: ReviewerIdentity,
    pub rating: u8,
    pub review: String,
    pub date: DateTime<Utc>,
}

impl EnrichedRating {
    pub fn new(rating: &Rating, lookup: IdentityLookup) -> Self {
        Self {
            reviewer_id: rating.reviewer_id,
            reviewer: lookup.into_identity(),
            rating: rating.score.value(),
            review: rating.review.clone(),
            date: rating.submitted_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::domain::{Score, UserType};

    #[test]
    fn test_missing_lookup_becomes_anonymous() {
        let rating = Rating::new(Uuid::new_v4(), Score::new(2).unwrap(), "Meh".into());
        let enriched = EnrichedRating::new(&rating, IdentityLookup::Missing);

        assert!(enriched.reviewer.is_anonymous());
        assert_eq!(enriched.reviewer.display_name, "Anonymous User");
        assert_eq!(enriched.rating, 2);
        assert_eq!(enriched.reviewer_id, rating.reviewer_id);
    }

    #[test]
    fn test_resolved_lookup_uses_profile() {
        let user = User::new("Sam".into(), "sam@example.com".into(), UserType::Regular)
            .with_profile_picture("profile-sam.jpg");
        let rating = Rating::new(user.id, Score::new(5).unwrap(), "Great".into());

        let enriched =
            EnrichedRating::new(&rating, IdentityLookup::Resolved(ReviewerIdentity::from(&user)));

        assert_eq!(enriched.reviewer.display_name, "Sam");
        assert_eq!(enriched.reviewer.avatar.as_deref(), Some("profile-sam.jpg"));
        assert!(!enriched.reviewer.is_anonymous());
    }
}

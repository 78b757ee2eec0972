use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::UserId;

pub const MIN_SCORE: u8 = 1;
pub const MAX_SCORE: u8 = 5;

/// A star score in `MIN_SCORE..=MAX_SCORE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Score(u8);

impl Score {
    pub fn new(value: u8) -> Result<Self, ValidationError> {
        if (MIN_SCORE..=MAX_SCORE).contains(&value) {
            Ok(Self(value))
        } else {
            Err(ValidationError::ScoreOutOfRange)
        }
    }

    /// Validate a score as it arrives on the wire, where it may be fractional.
    pub fn from_raw(raw: f64) -> Result<Self, ValidationError> {
        if !raw.is_finite() || raw.fract() != 0.0 {
            return Err(ValidationError::ScoreOutOfRange);
        }
        if raw < MIN_SCORE as f64 || raw > MAX_SCORE as f64 {
            return Err(ValidationError::ScoreOutOfRange);
        }
        Self::new(raw as u8)
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Score {
    type Error = ValidationError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Score::new(value)
    }
}

impl From<Score> for u8 {
    fn from(score: Score) -> Self {
        score.0
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Trim a review and reject it if nothing is left.
pub fn validate_review(review: &str) -> Result<String, ValidationError> {
    let trimmed = review.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::ReviewRequired);
    }
    Ok(trimmed.to_string())
}

/// One reviewer's assessment of one business.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rating {
    pub reviewer_id: UserId,
    #[serde(rename = "rating")]
    pub score: Score,
    pub review: String,
    #[serde(rename = "date")]
    pub submitted_at: DateTime<Utc>,
}

impl Rating {
    pub fn new(reviewer_id: UserId, score: Score, review: String) -> Self {
        Self {
            reviewer_id,
            score,
            review,
            submitted_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    ScoreOutOfRange,
    ReviewRequired,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::ScoreOutOfRange => write!(f, "rating out of range"),
            ValidationError::ReviewRequired => write!(f, "review required"),
        }
    }
}

impl std::error::Error for ValidationError {}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[test]
    fn test_score_bounds() {
        assert!(Score::new(1).is_ok());
        assert!(Score::new(5).is_ok());
        assert_eq!(Score::new(0), Err(ValidationError::ScoreOutOfRange));
        assert_eq!(Score::new(6), Err(ValidationError::ScoreOutOfRange));
    }

    #[test]
    fn test_score_from_raw_rejects_fractions() {
        assert_eq!(Score::from_raw(3.0).map(|s| s.value()), Ok(3));
        assert_eq!(Score::from_raw(3.5), Err(ValidationError::ScoreOutOfRange));
        assert_eq!(Score::from_raw(0.0), Err(ValidationError::ScoreOutOfRange));
        assert_eq!(Score::from_raw(6.0), Err(ValidationError::ScoreOutOfRange));
        assert_eq!(Score::from_raw(-1.0), Err(ValidationError::ScoreOutOfRange));
        assert_eq!(Score::from_raw(f64::NAN), Err(ValidationError::ScoreOutOfRange));
    }

    #[test]
    fn test_validate_review_trims() {
        assert_eq!(validate_review("  Lovely staff \n"), Ok("Lovely staff".to_string()));
        assert_eq!(validate_review(""), Err(ValidationError::ReviewRequired));
        assert_eq!(validate_review(" \t\n "), Err(ValidationError::ReviewRequired));
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(ValidationError::ScoreOutOfRange.to_string(), "rating out of range");
        assert_eq!(ValidationError::ReviewRequired.to_string(), "review required");
    }

    #[test]
    fn test_rating_json_shape() {
        let rating = Rating::new(Uuid::new_v4(), Score::new(4).unwrap(), "Good".into());
        let json = serde_json::to_value(&rating).unwrap();
        assert_eq!(json["rating"], 4);
        assert_eq!(json["review"], "Good");
        assert!(json.get("reviewerId").is_some());
        assert!(json.get("date").is_some());

        let mut bad = json.clone();
        bad["rating"] = serde_json::json!(9);
        assert!(serde_json::from_value::<Rating>(bad).is_err());
    }
}

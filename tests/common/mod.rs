// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use anyhow::Result;
use pawrate::application::{LedgerConfig, LedgerService, RatingRequest};
use pawrate::domain::{User, UserId, UserType};
use tempfile::TempDir;

/// Helper to create a test service with a temporary database
pub async fn test_service() -> Result<(LedgerService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let service = LedgerService::init(&db_path(&temp_dir)).await?;
    Ok((service, temp_dir))
}

/// Helper to create a test service with custom write-path settings
pub async fn test_service_with(config: LedgerConfig) -> Result<(LedgerService, TempDir)> {
    let (service, temp_dir) = test_service().await?;
    Ok((service.with_config(config), temp_dir))
}

pub fn db_path(temp_dir: &TempDir) -> String {
    temp_dir.path().join("test.db").to_str().unwrap().to_string()
}

pub fn request(business: UserId, reviewer: UserId, rating: f64, review: &str) -> RatingRequest {
    RatingRequest {
        business_id: business,
        reviewer_id: reviewer,
        rating,
        review: review.to_string(),
    }
}

/// Test fixture: a shop and a handful of reviewers
pub struct Marketplace;

impl Marketplace {
    pub async fn create_business(service: &LedgerService, name: &str) -> Result<User> {
        let email = format!("{}@shops.example.com", name.to_lowercase().replace(' ', "-"));
        Ok(service
            .create_user(name.into(), email, UserType::Business, Some(format!("{}.png", name)))
            .await?)
    }

    pub async fn create_reviewer(service: &LedgerService, name: &str) -> Result<User> {
        let email = format!("{}@people.example.com", name.to_lowercase().replace(' ', "-"));
        Ok(service
            .create_user(name.into(), email, UserType::Regular, None)
            .await?)
    }

    pub async fn create_reviewers(service: &LedgerService, count: usize) -> Result<Vec<User>> {
        let mut reviewers = Vec::with_capacity(count);
        for i in 0..count {
            reviewers.push(Self::create_reviewer(service, &format!("Reviewer {}", i)).await?);
        }
        Ok(reviewers)
    }
}

pub fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected average {}, got {}",
        expected,
        actual
    );
}

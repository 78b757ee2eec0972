use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::domain::{
    build_integrity_report, validate_review, Business, EnrichedRating, IdentityLookup,
    IntegrityReport, Rating, ReviewerIdentity, Score, UpsertOutcome, User, UserId, UserType,
};
use crate::storage::Repository;

use super::{tag_lookups, AppError, BusinessLocks, LedgerConfig, UserDirectory};

/// Largest page `list_ratings` will return.
pub const MAX_PAGE_SIZE: usize = 100;

/// Application service owning the rating ledgers of business accounts.
/// This is the primary interface for any client (CLI, API, etc.).
pub struct LedgerService {
    repo: Arc<Repository>,
    directory: Arc<dyn UserDirectory>,
    locks: BusinessLocks,
    config: LedgerConfig,
}

/// A review submission as it arrives from a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingRequest {
    pub business_id: UserId,
    pub reviewer_id: UserId,
    /// Kept as a float so fractional scores can be rejected rather than truncated
    pub rating: f64,
    pub review: String,
}

/// Enriched ledger of a business with its persisted average.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingAggregate {
    pub ratings: Vec<EnrichedRating>,
    pub average_rating: f64,
    pub count: usize,
}

/// Result of submitting a rating
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingSubmission {
    #[serde(flatten)]
    pub aggregate: RatingAggregate,
    /// The entry that was just written
    pub submitted: EnrichedRating,
    /// True when the reviewer's earlier rating was overwritten
    pub replaced: bool,
    /// Read-modify-write cycles it took to land the write
    pub attempts: u32,
}

/// Window into a business's ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: usize,
    pub limit: usize,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 20,
        }
    }
}

/// One page of enriched ratings
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingPage {
    pub business_id: UserId,
    pub business_name: String,
    pub ratings: Vec<EnrichedRating>,
    pub average_rating: f64,
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
}

impl RatingPage {
    pub fn has_more(&self) -> bool {
        self.offset + self.ratings.len() < self.total
    }
}

/// A business account with its cached aggregate
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessSummary {
    pub business: User,
    pub average_rating: f64,
    pub rating_count: usize,
}

impl From<Business> for BusinessSummary {
    fn from(business: Business) -> Self {
        Self {
            rating_count: business.ledger.len(),
            average_rating: business.average_rating,
            business: business.user,
        }
    }
}

impl LedgerService {
    /// Create a new ledger service with the given repository.
    /// The repository also serves as the user directory.
    pub fn new(repo: Repository) -> Self {
        let repo = Arc::new(repo);
        Self {
            directory: repo.clone(),
            repo,
            locks: BusinessLocks::new(),
            config: LedgerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: LedgerConfig) -> Self {
        self.config = config;
        self
    }

    /// Resolve reviewer identities through another directory.
    pub fn with_directory(mut self, directory: Arc<dyn UserDirectory>) -> Self {
        self.directory = directory;
        self
    }

    /// Initialize a new database at the given path.
    pub async fn init(database_path: &str) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}?mode=rwc", database_path);
        let repo = Repository::init(&db_url).await?;
        Ok(Self::new(repo))
    }

    /// Connect to an existing database.
    pub async fn connect(database_path: &str) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}", database_path);
        let repo = Repository::connect(&db_url).await?;
        Ok(Self::new(repo))
    }

    /// Close the database. Later calls fail with `Unavailable`.
    pub async fn close(&self) {
        self.repo.close().await;
    }

    // ========================
    // Rating operations
    // ========================

    /// Record a reviewer's rating of a business, replacing any earlier rating
    /// by the same reviewer, and recompute the business's average.
    pub async fn submit_rating(&self, request: RatingRequest) -> Result<RatingSubmission, AppError> {
        let score = Score::from_raw(request.rating)?;
        let review = validate_review(&request.review)?;
        let business_id = request.business_id;
        let reviewer_id = request.reviewer_id;

        let guard = self.locks.acquire(business_id).await;

        let mut attempts = 0;
        let (business, outcome) = loop {
            attempts += 1;

            let mut business = self.load_business(business_id).await?;
            let outcome = business
                .ledger
                .upsert(Rating::new(reviewer_id, score, review.clone()));

            let saved = self
                .storage(
                    "save ledger",
                    self.repo
                        .save_ledger(business_id, &business.ledger, business.revision),
                )
                .await?;

            if saved {
                business.average_rating = business.ledger.average();
                business.revision += 1;
                break (business, outcome);
            }

            if attempts >= self.config.max_attempts {
                warn!(%business_id, attempts, "giving up on contended ledger write");
                return Err(AppError::Conflict {
                    business_id,
                    attempts,
                });
            }
            debug!(%business_id, attempts, "ledger revision changed underneath us, retrying");
        };
        drop(guard);

        let replaced = matches!(outcome, UpsertOutcome::Replaced { .. });
        info!(
            %business_id,
            %reviewer_id,
            score = score.value(),
            replaced,
            average = business.average_rating,
            count = business.ledger.len(),
            "rating recorded"
        );

        let aggregate = self.aggregate_of(&business).await;
        let submitted = aggregate
            .ratings
            .iter()
            .find(|r| r.reviewer_id == reviewer_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("Submitted rating missing from saved ledger"))?;

        Ok(RatingSubmission {
            aggregate,
            submitted,
            replaced,
            attempts,
        })
    }

    /// Get every rating of a business with the persisted average.
    pub async fn get_aggregate(&self, business_id: UserId) -> Result<RatingAggregate, AppError> {
        let business = self.load_business(business_id).await?;
        Ok(self.aggregate_of(&business).await)
    }

    /// Get one page of a business's ratings, in ledger order.
    pub async fn list_ratings(&self, business_id: UserId, page: Page) -> Result<RatingPage, AppError> {
        if page.limit == 0 {
            return Err(AppError::InvalidInput("limit must be positive".to_string()));
        }
        let limit = page.limit.min(MAX_PAGE_SIZE);

        let business = self.load_business(business_id).await?;
        let entries = business.ledger.ratings();
        let start = page.offset.min(entries.len());
        let end = start.saturating_add(limit).min(entries.len());
        let ratings = self.enrich(&entries[start..end]).await;

        Ok(RatingPage {
            business_id,
            business_name: business.user.name.clone(),
            ratings,
            average_rating: business.average_rating,
            total: entries.len(),
            offset: page.offset,
            limit,
        })
    }

    async fn load_business(&self, business_id: UserId) -> Result<Business, AppError> {
        self.storage("load business", self.repo.get_business(business_id))
            .await?
            .ok_or_else(|| AppError::NotFound("business".to_string()))
    }

    async fn aggregate_of(&self, business: &Business) -> RatingAggregate {
        RatingAggregate {
            ratings: self.enrich(business.ledger.ratings()).await,
            average_rating: business.average_rating,
            count: business.ledger.len(),
        }
    }

    /// Attach reviewer identities. Reviewers that cannot be resolved, for any
    /// reason, are shown as anonymous; this never fails.
    async fn enrich(&self, ratings: &[Rating]) -> Vec<EnrichedRating> {
        if ratings.is_empty() {
            return Vec::new();
        }

        let ids: Vec<UserId> = ratings.iter().map(|r| r.reviewer_id).collect();
        let found = self.lookup_identities(&ids).await;

        let lookups = tag_lookups(&ids, &found);
        ratings
            .iter()
            .map(|rating| {
                let lookup = lookups
                    .get(&rating.reviewer_id)
                    .cloned()
                    .unwrap_or(IdentityLookup::Missing);
                if lookup == IdentityLookup::Missing {
                    debug!(reviewer_id = %rating.reviewer_id, "reviewer not resolved");
                }
                EnrichedRating::new(rating, lookup)
            })
            .collect()
    }

    /// One batch lookup. If the batch fails as a whole, each reviewer is
    /// retried on its own, concurrently, so one bad entry only costs itself.
    async fn lookup_identities(&self, ids: &[UserId]) -> HashMap<UserId, ReviewerIdentity> {
        let timeout = self.config.storage_timeout;
        match tokio::time::timeout(timeout, self.directory.lookup_many(ids)).await {
            Ok(Ok(found)) => return found,
            Ok(Err(err)) => {
                warn!(error = %err, reviewers = ids.len(), "batch reviewer lookup failed, resolving one by one")
            }
            Err(_) => {
                warn!(reviewers = ids.len(), "batch reviewer lookup timed out, resolving one by one")
            }
        }

        let mut unique = ids.to_vec();
        unique.sort();
        unique.dedup();

        let mut pending = JoinSet::new();
        for id in unique {
            let directory = Arc::clone(&self.directory);
            pending.spawn(async move {
                let result =
                    tokio::time::timeout(timeout, directory.lookup_many(std::slice::from_ref(&id)))
                        .await;
                (id, result)
            });
        }

        let mut found = HashMap::new();
        while let Some(joined) = pending.join_next().await {
            match joined {
                Ok((id, Ok(Ok(mut one)))) => {
                    if let Some(identity) = one.remove(&id) {
                        found.insert(id, identity);
                    }
                }
                Ok((id, Ok(Err(err)))) => {
                    debug!(reviewer_id = %id, error = %err, "reviewer lookup failed")
                }
                Ok((id, Err(_))) => debug!(reviewer_id = %id, "reviewer lookup timed out"),
                Err(err) => warn!(error = %err, "reviewer lookup task failed"),
            }
        }
        found
    }

    /// Run one storage round-trip under the configured timeout.
    async fn storage<T, F>(&self, operation: &'static str, fut: F) -> Result<T, AppError>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        match tokio::time::timeout(self.config.storage_timeout, fut).await {
            Ok(result) => result.map_err(AppError::from_storage),
            Err(_) => {
                warn!(
                    operation,
                    timeout_ms = self.config.storage_timeout.as_millis() as u64,
                    "storage round-trip timed out"
                );
                Err(AppError::Unavailable(format!(
                    "{} timed out after {:?}",
                    operation, self.config.storage_timeout
                )))
            }
        }
    }

    // ========================
    // User directory
    // ========================

    /// Register a new user.
    pub async fn create_user(
        &self,
        name: String,
        email: String,
        user_type: UserType,
        profile_picture: Option<String>,
    ) -> Result<User, AppError> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::InvalidInput("name required".to_string()));
        }
        let email = email.trim().to_lowercase();
        if email.is_empty() {
            return Err(AppError::InvalidInput("email required".to_string()));
        }

        if self
            .storage("find user by email", self.repo.get_user_by_email(&email))
            .await?
            .is_some()
        {
            return Err(AppError::InvalidInput(
                "email already registered".to_string(),
            ));
        }

        let mut user = User::new(name, email, user_type);
        if let Some(picture) = profile_picture {
            user = user.with_profile_picture(picture);
        }

        self.storage("save user", self.repo.save_user(&user)).await?;
        info!(user_id = %user.id, user_type = %user.user_type, "user registered");
        Ok(user)
    }

    /// Get a user by ID.
    pub async fn get_user(&self, id: UserId) -> Result<User, AppError> {
        self.storage("load user", self.repo.get_user(id))
            .await?
            .ok_or_else(|| AppError::NotFound("user".to_string()))
    }

    /// List all users.
    pub async fn list_users(&self) -> Result<Vec<User>, AppError> {
        self.storage("list users", self.repo.list_users()).await
    }

    /// Get a business account with its cached average.
    pub async fn get_business(&self, business_id: UserId) -> Result<BusinessSummary, AppError> {
        Ok(self.load_business(business_id).await?.into())
    }

    /// Summary and enriched ledger of a business taken from a single read,
    /// so both report the same average and count.
    pub(crate) async fn business_snapshot(
        &self,
        business_id: UserId,
    ) -> Result<(BusinessSummary, RatingAggregate), AppError> {
        let business = self.load_business(business_id).await?;
        let aggregate = self.aggregate_of(&business).await;
        Ok((business.into(), aggregate))
    }

    /// List all businesses with their cached averages.
    pub async fn list_businesses(&self) -> Result<Vec<BusinessSummary>, AppError> {
        let businesses = self
            .storage("list businesses", self.repo.list_businesses())
            .await?;
        Ok(businesses.into_iter().map(BusinessSummary::from).collect())
    }

    // ========================
    // Integrity operations
    // ========================

    /// Verify every stored ledger: one rating per reviewer, and a cached
    /// average equal to the mean of the stored scores.
    pub async fn check_integrity(&self) -> Result<IntegrityReport, AppError> {
        let ledgers = self
            .storage("list ledgers", self.repo.list_stored_ledgers())
            .await?;
        let report = build_integrity_report(&ledgers);
        if !report.is_consistent() {
            warn!(issues = report.issues.len(), "rating ledger integrity issues found");
        }
        Ok(report)
    }
}

use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteRow};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::domain::{Business, Rating, RatingLedger, StoredLedger, User, UserId, UserType};

use super::MIGRATION_001_INITIAL;

const USER_COLUMNS: &str = "id, name, email, user_type, profile_picture, created_at";

const BUSINESS_COLUMNS: &str =
    "id, name, email, user_type, profile_picture, created_at, ratings, average_rating, revision";

/// SQLite caps the number of bound parameters per statement.
const LOOKUP_CHUNK_SIZE: usize = 500;

/// How long a connection waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Repository for persisting users and the rating ledgers of business accounts.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database at the given URL.
    /// Pass `?mode=rwc` in the URL to create the file if it doesn't exist.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .context("Invalid database URL")?
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePool::connect_with(options)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;

        Ok(())
    }

    /// Wait for open connections to finish and close the pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Initialize a new database (connect + migrate).
    pub async fn init(database_url: &str) -> Result<Self> {
        let repo = Self::connect(database_url).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    // ========================
    // User directory
    // ========================

    /// Save a new user. Business accounts start with an empty ledger.
    pub async fn save_user(&self, user: &User) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, name, email, user_type, profile_picture, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user.id.to_string())
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.user_type.as_str())
        .bind(&user.profile_picture)
        .bind(user.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to save user")?;
        Ok(())
    }

    /// Get a user by ID.
    pub async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?");
        let row = sqlx::query(&query)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch user")?;

        row.as_ref().map(Self::row_to_user).transpose()
    }

    /// Get a user by email.
    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?");
        let row = sqlx::query(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch user by email")?;

        row.as_ref().map(Self::row_to_user).transpose()
    }

    /// Fetch every user whose ID is in `ids`. Unknown IDs are simply absent
    /// from the result.
    pub async fn get_users(&self, ids: &[UserId]) -> Result<Vec<User>> {
        let mut users = Vec::with_capacity(ids.len());

        for chunk in ids.chunks(LOOKUP_CHUNK_SIZE) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id IN ({placeholders})");

            let mut sql_query = sqlx::query(&query);
            for id in chunk {
                sql_query = sql_query.bind(id.to_string());
            }

            let rows = sql_query
                .fetch_all(&self.pool)
                .await
                .context("Failed to fetch users")?;

            for row in &rows {
                users.push(Self::row_to_user(row)?);
            }
        }

        Ok(users)
    }

    /// List all users, ordered by name.
    pub async fn list_users(&self) -> Result<Vec<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users ORDER BY name, created_at");
        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list users")?;

        rows.iter().map(Self::row_to_user).collect()
    }

    fn row_to_user(row: &SqliteRow) -> Result<User> {
        let id_str: String = row.get("id");
        let user_type_str: String = row.get("user_type");
        let created_at_str: String = row.get("created_at");

        Ok(User {
            id: Uuid::parse_str(&id_str).context("Invalid user ID")?,
            name: row.get("name"),
            email: row.get("email"),
            user_type: UserType::from_str(&user_type_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid user type: {}", user_type_str))?,
            profile_picture: row.get("profile_picture"),
            created_at: DateTime::parse_from_rfc3339(&created_at_str)
                .context("Invalid created_at timestamp")?
                .with_timezone(&Utc),
        })
    }

    // ========================
    // Business ledgers
    // ========================

    /// Get a business account with its ledger. Regular users are not businesses.
    pub async fn get_business(&self, id: UserId) -> Result<Option<Business>> {
        let query =
            format!("SELECT {BUSINESS_COLUMNS} FROM users WHERE id = ? AND user_type = 'business'");
        let row = sqlx::query(&query)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch business")?;

        row.as_ref().map(Self::row_to_business).transpose()
    }

    /// List all business accounts, ordered by name.
    pub async fn list_businesses(&self) -> Result<Vec<Business>> {
        let query = format!(
            "SELECT {BUSINESS_COLUMNS} FROM users WHERE user_type = 'business' ORDER BY name, created_at"
        );
        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list businesses")?;

        rows.iter().map(Self::row_to_business).collect()
    }

    /// Persist a ledger together with its recomputed average, provided the
    /// stored revision still equals `expected_revision`.
    ///
    /// Returns `false` when another writer got there first; nothing is
    /// written in that case.
    pub async fn save_ledger(
        &self,
        business_id: UserId,
        ledger: &RatingLedger,
        expected_revision: i64,
    ) -> Result<bool> {
        let ratings_json = serde_json::to_string(ledger).context("Failed to encode ratings")?;

        let result = sqlx::query(
            r#"
            UPDATE users
            SET ratings = ?, average_rating = ?, revision = revision + 1
            WHERE id = ? AND user_type = 'business' AND revision = ?
            "#,
        )
        .bind(&ratings_json)
        .bind(ledger.average())
        .bind(business_id.to_string())
        .bind(expected_revision)
        .execute(&self.pool)
        .await
        .context("Failed to save ledger")?;

        Ok(result.rows_affected() == 1)
    }

    /// Read every business ledger exactly as stored, for integrity checks.
    pub async fn list_stored_ledgers(&self) -> Result<Vec<StoredLedger>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, ratings, average_rating
            FROM users
            WHERE user_type = 'business'
            ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list stored ledgers")?;

        rows.iter()
            .map(|row| -> Result<StoredLedger> {
                let id_str: String = row.get("id");
                let ratings_json: String = row.get("ratings");
                Ok(StoredLedger {
                    business_id: Uuid::parse_str(&id_str).context("Invalid business ID")?,
                    business_name: row.get("name"),
                    entries: Self::decode_ratings(&ratings_json)?,
                    average_rating: row.get("average_rating"),
                })
            })
            .collect()
    }

    fn row_to_business(row: &SqliteRow) -> Result<Business> {
        let ratings_json: String = row.get("ratings");

        Ok(Business {
            user: Self::row_to_user(row)?,
            ledger: RatingLedger::from_entries(Self::decode_ratings(&ratings_json)?),
            average_rating: row.get("average_rating"),
            revision: row.get("revision"),
        })
    }

    fn decode_ratings(json: &str) -> Result<Vec<Rating>> {
        serde_json::from_str(json).context("Invalid ratings JSON")
    }
}

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::Write;

use crate::application::{BusinessSummary, LedgerService, RatingAggregate};
use crate::domain::UserId;

/// Snapshot of one business's ledger for JSON export
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerSnapshot {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub business: BusinessSummary,
    #[serde(flatten)]
    pub aggregate: RatingAggregate,
}

/// Exporter for writing ledgers out in various formats
pub struct Exporter<'a> {
    service: &'a LedgerService,
}

impl<'a> Exporter<'a> {
    pub fn new(service: &'a LedgerService) -> Self {
        Self { service }
    }

    /// Export one business's ratings to CSV. The columns are accepted back by
    /// `Importer::import_ratings_csv`.
    pub async fn export_ratings_csv<W: Write>(&self, business_id: UserId, writer: W) -> Result<usize> {
        let aggregate = self.service.get_aggregate(business_id).await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record([
            "business_id",
            "reviewer_id",
            "reviewer_name",
            "rating",
            "review",
            "date",
        ])?;

        let business_id = business_id.to_string();
        let mut count = 0;
        for rating in &aggregate.ratings {
            csv_writer.write_record([
                business_id.clone(),
                rating.reviewer_id.to_string(),
                rating.reviewer.display_name.clone(),
                rating.rating.to_string(),
                rating.review.clone(),
                rating.date.to_rfc3339(),
            ])?;
            count += 1;
        }

        csv_writer.flush()?;
        Ok(count)
    }

    /// Export every business with its average to CSV
    pub async fn export_businesses_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let businesses = self.service.list_businesses().await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record(["business_id", "name", "average_rating", "rating_count"])?;

        for summary in &businesses {
            csv_writer.write_record([
                summary.business.id.to_string(),
                summary.business.name.clone(),
                format!("{:.4}", summary.average_rating),
                summary.rating_count.to_string(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(businesses.len())
    }

    /// Export one business's enriched ledger as JSON
    pub async fn export_ratings_json<W: Write>(
        &self,
        business_id: UserId,
        mut writer: W,
    ) -> Result<LedgerSnapshot> {
        let (business, aggregate) = self.service.business_snapshot(business_id).await?;

        let snapshot = LedgerSnapshot {
            version: env!("CARGO_PKG_VERSION").to_string(),
            exported_at: Utc::now(),
            business,
            aggregate,
        };

        let json = serde_json::to_string_pretty(&snapshot)?;
        writer.write_all(json.as_bytes())?;
        writer.flush()?;

        Ok(snapshot)
    }
}

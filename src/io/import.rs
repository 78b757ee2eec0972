use anyhow::Result;
use serde::Deserialize;
use std::io::Read;
use uuid::Uuid;

use crate::application::{AppError, LedgerService, RatingRequest};
use crate::domain::{validate_review, Score};

/// Result of an import operation
#[derive(Debug, Clone, Default)]
pub struct ImportResult {
    pub imported: usize,
    pub replaced: usize,
    pub errors: Vec<ImportError>,
}

/// Error that occurred during import
#[derive(Debug, Clone)]
pub struct ImportError {
    pub line: usize,
    pub field: Option<String>,
    pub error: String,
}

/// Options for import operations
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    /// Validate every row without writing anything
    pub dry_run: bool,
}

/// One CSV row. Extra columns (such as `reviewer_name` in exports) are ignored.
#[derive(Debug, Deserialize)]
struct RatingRow {
    business_id: String,
    reviewer_id: String,
    rating: String,
    review: String,
}

/// Importer for loading ratings into the ledger
pub struct Importer<'a> {
    service: &'a LedgerService,
}

impl<'a> Importer<'a> {
    pub fn new(service: &'a LedgerService) -> Self {
        Self { service }
    }

    /// Import ratings from CSV with a `business_id,reviewer_id,rating,review`
    /// header. Each row goes through the normal submission path, so a later
    /// row from the same reviewer replaces an earlier one.
    pub async fn import_ratings_csv<R: Read>(
        &self,
        reader: R,
        options: ImportOptions,
    ) -> Result<ImportResult> {
        let mut csv_reader = csv::Reader::from_reader(reader);
        let mut result = ImportResult::default();

        for (line_num, row) in csv_reader.deserialize::<RatingRow>().enumerate() {
            let line = line_num + 2; // +2 for header and 0-indexing

            let row = match row {
                Ok(row) => row,
                Err(e) => {
                    result.errors.push(ImportError {
                        line,
                        field: None,
                        error: format!("CSV parse error: {}", e),
                    });
                    continue;
                }
            };

            let request = match parse_row(&row) {
                Ok(request) => request,
                Err((field, error)) => {
                    result.errors.push(ImportError {
                        line,
                        field: Some(field.to_string()),
                        error,
                    });
                    continue;
                }
            };

            if options.dry_run {
                // Same lookup a real submission makes, without the write
                match self.service.get_business(request.business_id).await {
                    Ok(_) => result.imported += 1,
                    Err(e @ AppError::NotFound(_)) => result.errors.push(ImportError {
                        line,
                        field: None,
                        error: e.to_string(),
                    }),
                    Err(e) => return Err(e.into()),
                }
                continue;
            }

            match self.service.submit_rating(request).await {
                Ok(submission) => {
                    result.imported += 1;
                    if submission.replaced {
                        result.replaced += 1;
                    }
                }
                Err(e @ (AppError::InvalidInput(_) | AppError::NotFound(_))) => {
                    result.errors.push(ImportError {
                        line,
                        field: None,
                        error: e.to_string(),
                    });
                }
                // Storage trouble affects every remaining row; stop here.
                Err(e) => return Err(e.into()),
            }
        }

        Ok(result)
    }
}

fn parse_row(row: &RatingRow) -> std::result::Result<RatingRequest, (&'static str, String)> {
    let business_id = Uuid::parse_str(row.business_id.trim())
        .map_err(|e| ("business_id", format!("Invalid business ID: {}", e)))?;
    let reviewer_id = Uuid::parse_str(row.reviewer_id.trim())
        .map_err(|e| ("reviewer_id", format!("Invalid reviewer ID: {}", e)))?;
    let rating: f64 = row
        .rating
        .trim()
        .parse()
        .map_err(|_| ("rating", "rating out of range".to_string()))?;

    Score::from_raw(rating).map_err(|e| ("rating", e.to_string()))?;
    validate_review(&row.review).map_err(|e| ("review", e.to_string()))?;

    Ok(RatingRequest {
        business_id,
        reviewer_id,
        rating,
        review: row.review.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(rating: &str, review: &str) -> RatingRow {
        RatingRow {
            business_id: Uuid::new_v4().to_string(),
            reviewer_id: Uuid::new_v4().to_string(),
            rating: rating.to_string(),
            review: review.to_string(),
        }
    }

    #[test]
    fn test_parse_valid_row() {
        let request = parse_row(&row("4", "Friendly")).unwrap();
        assert_eq!(request.rating, 4.0);
        assert_eq!(request.review, "Friendly");
    }

    #[test]
    fn test_parse_rejects_bad_fields() {
        assert_eq!(parse_row(&row("4.5", "Fine")).unwrap_err().0, "rating");
        assert_eq!(parse_row(&row("five", "Fine")).unwrap_err().0, "rating");
        assert_eq!(parse_row(&row("3", "   ")).unwrap_err().0, "review");

        let mut bad_id = row("3", "Fine");
        bad_id.reviewer_id = "nobody".into();
        assert_eq!(parse_row(&bad_id).unwrap_err().0, "reviewer_id");
    }
}

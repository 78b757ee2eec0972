mod common;

use std::sync::Arc;

use anyhow::Result;
use common::{assert_close, request, test_service, Marketplace};
use pawrate::io::{Exporter, ImportOptions, Importer};
use uuid::Uuid;

#[tokio::test]
async fn test_export_ratings_csv() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let shop = Marketplace::create_business(&service, "Export Exotics").await?;
    let reviewer = Marketplace::create_reviewer(&service, "Reese").await?;
    service
        .submit_rating(request(shop.id, reviewer.id, 5.0, "Great, really"))
        .await?;

    let mut buffer = Vec::new();
    let count = Exporter::new(&service)
        .export_ratings_csv(shop.id, &mut buffer)
        .await?;
    assert_eq!(count, 1);

    let csv = String::from_utf8(buffer)?;
    let mut lines = csv.lines();
    assert_eq!(
        lines.next(),
        Some("business_id,reviewer_id,reviewer_name,rating,review,date")
    );
    let row = lines.next().unwrap();
    assert!(row.contains(&reviewer.id.to_string()));
    assert!(row.contains("Reese"));
    assert!(row.contains("\"Great, really\""));

    Ok(())
}

#[tokio::test]
async fn test_export_ratings_json() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let shop = Marketplace::create_business(&service, "Json Jungle").await?;
    let reviewer = Marketplace::create_reviewer(&service, "Rowan").await?;
    service
        .submit_rating(request(shop.id, reviewer.id, 3.0, "Fine"))
        .await?;

    let mut buffer = Vec::new();
    let snapshot = Exporter::new(&service)
        .export_ratings_json(shop.id, &mut buffer)
        .await?;
    assert_eq!(snapshot.aggregate.count, 1);

    let json: serde_json::Value = serde_json::from_slice(&buffer)?;
    assert_eq!(json["averageRating"], 3.0);
    assert_eq!(json["count"], 1);
    assert_eq!(json["business"]["business"]["name"], "Json Jungle");
    assert_eq!(json["ratings"][0]["reviewer"]["displayName"], "Rowan");

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_json_export_is_one_consistent_snapshot() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let shop = Marketplace::create_business(&service, "Snapshot Sanctuary").await?;
    let reviewers = Marketplace::create_reviewers(&service, 15).await?;
    let service = Arc::new(service);
    let shop_id = shop.id;

    let mut writers = Vec::new();
    for (i, reviewer) in reviewers.iter().enumerate() {
        let service = Arc::clone(&service);
        let reviewer_id = reviewer.id;
        let score = (i % 5 + 1) as f64;
        writers.push(tokio::spawn(async move {
            service
                .submit_rating(request(shop_id, reviewer_id, score, "Checked in"))
                .await
        }));
    }

    // Export while the writers land; every document must agree with itself
    for _ in 0..10 {
        let mut buffer = Vec::new();
        let snapshot = Exporter::new(&service)
            .export_ratings_json(shop_id, &mut buffer)
            .await?;
        assert_eq!(snapshot.business.average_rating, snapshot.aggregate.average_rating);
        assert_eq!(snapshot.business.rating_count, snapshot.aggregate.count);

        let json: serde_json::Value = serde_json::from_slice(&buffer)?;
        assert_eq!(json["business"]["averageRating"], json["averageRating"]);
        assert_eq!(json["business"]["ratingCount"], json["count"]);
    }

    for writer in writers {
        writer.await??;
    }
    Ok(())
}

#[tokio::test]
async fn test_export_businesses_csv() -> Result<()> {
    let (service, _temp) = test_service().await?;
    Marketplace::create_business(&service, "Alpha Pets").await?;
    Marketplace::create_business(&service, "Beta Pets").await?;
    Marketplace::create_reviewer(&service, "Not A Business").await?;

    let mut buffer = Vec::new();
    let count = Exporter::new(&service)
        .export_businesses_csv(&mut buffer)
        .await?;
    assert_eq!(count, 2);
    assert_eq!(String::from_utf8(buffer)?.lines().count(), 3);

    Ok(())
}

#[tokio::test]
async fn test_import_goes_through_submission_rules() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let shop = Marketplace::create_business(&service, "Import Imports").await?;
    let reviewers = Marketplace::create_reviewers(&service, 2).await?;

    let csv = format!(
        "business_id,reviewer_id,rating,review\n\
         {shop},{a},5,Lovely\n\
         {shop},{b},3,Average\n\
         {shop},{a},1,Changed\n\
         {shop},{b},7,Too many stars\n\
         {shop},{b},4,\n",
        shop = shop.id,
        a = reviewers[0].id,
        b = reviewers[1].id,
    );

    let result = Importer::new(&service)
        .import_ratings_csv(csv.as_bytes(), ImportOptions::default())
        .await?;

    assert_eq!(result.imported, 3);
    assert_eq!(result.replaced, 1);
    assert_eq!(result.errors.len(), 2);
    assert_eq!(result.errors[0].line, 5);
    assert_eq!(result.errors[0].field.as_deref(), Some("rating"));
    assert_eq!(result.errors[1].field.as_deref(), Some("review"));

    let aggregate = service.get_aggregate(shop.id).await?;
    assert_eq!(aggregate.count, 2);
    assert_close(aggregate.average_rating, 2.0);

    Ok(())
}

#[tokio::test]
async fn test_import_dry_run_writes_nothing() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let shop = Marketplace::create_business(&service, "Dry Dock").await?;
    let reviewer = Marketplace::create_reviewer(&service, "Sage").await?;

    let csv = format!(
        "business_id,reviewer_id,rating,review\n{},{},4,Good\n{},{},4,Good\n",
        shop.id,
        reviewer.id,
        Uuid::new_v4(),
        reviewer.id
    );
    let dry = Importer::new(&service)
        .import_ratings_csv(csv.as_bytes(), ImportOptions { dry_run: true })
        .await?;

    assert_eq!(dry.imported, 1);
    assert_eq!(dry.errors.len(), 1);
    assert_eq!(dry.errors[0].line, 3);
    assert!(dry.errors[0].error.contains("business"));
    assert_eq!(service.get_aggregate(shop.id).await?.count, 0);

    // A real run over the same file reports the same outcome
    let real = Importer::new(&service)
        .import_ratings_csv(csv.as_bytes(), ImportOptions::default())
        .await?;
    assert_eq!(real.imported, dry.imported);
    assert_eq!(real.errors.len(), dry.errors.len());
    assert_eq!(service.get_aggregate(shop.id).await?.count, 1);

    Ok(())
}

#[tokio::test]
async fn test_export_then_import_into_fresh_database() -> Result<()> {
    let (source, _source_temp) = test_service().await?;
    let shop = Marketplace::create_business(&source, "Round Trip Rescue").await?;
    let reviewers = Marketplace::create_reviewers(&source, 3).await?;
    for (reviewer, score) in reviewers.iter().zip([5.0, 2.0, 2.0]) {
        source
            .submit_rating(request(shop.id, reviewer.id, score, "Adopted here"))
            .await?;
    }

    let mut buffer = Vec::new();
    Exporter::new(&source)
        .export_ratings_csv(shop.id, &mut buffer)
        .await?;

    // Unknown business in the target database: every row is rejected, none written
    let (target, _target_temp) = test_service().await?;
    let result = Importer::new(&target)
        .import_ratings_csv(buffer.as_slice(), ImportOptions::default())
        .await?;
    assert_eq!(result.imported, 0);
    assert_eq!(result.errors.len(), 3);
    assert!(result.errors[0].error.contains("business"));

    // Re-importing into the source replaces every entry in place
    let result = Importer::new(&source)
        .import_ratings_csv(buffer.as_slice(), ImportOptions::default())
        .await?;
    assert_eq!(result.imported, 3);
    assert_eq!(result.replaced, 3);
    assert_close(source.get_aggregate(shop.id).await?.average_rating, 3.0);

    Ok(())
}

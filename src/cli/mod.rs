use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::application::{
    AppError, LedgerConfig, LedgerService, Page, RatingRequest, DEFAULT_MAX_ATTEMPTS,
};
use crate::domain::{EnrichedRating, UserType};

/// Pawrate - Business rating ledger
#[derive(Parser)]
#[command(name = "pawrate")]
#[command(about = "Ratings and reviews for the businesses of a pet-adoption marketplace")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(short, long, env = "PAWRATE_DATABASE", default_value = "pawrate.db")]
    pub database: String,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Read-modify-write attempts before a contended rating write gives up
    #[arg(long, global = true, env = "PAWRATE_MAX_ATTEMPTS", default_value_t = DEFAULT_MAX_ATTEMPTS)]
    pub max_attempts: u32,

    /// Timeout for a single storage round-trip, in milliseconds
    #[arg(long, global = true, env = "PAWRATE_STORAGE_TIMEOUT_MS", default_value_t = 5000)]
    pub storage_timeout_ms: u64,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// User directory commands
    #[command(subcommand)]
    User(UserCommands),

    /// List businesses with their average rating
    Businesses,

    /// Rate a business (replaces your earlier rating of it)
    Rate {
        /// Business ID
        business: String,

        /// Reviewer user ID
        #[arg(long)]
        reviewer: String,

        /// Score from 1 to 5
        #[arg(short, long)]
        rating: String,

        /// Review text
        #[arg(long)]
        review: String,

        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show a business's ratings
    Ratings {
        /// Business ID
        business: String,

        /// Number of ratings to skip
        #[arg(long, default_value = "0")]
        offset: usize,

        /// Maximum number of ratings to show
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Output format: table, json
        #[arg(long, default_value = "table")]
        format: String,
    },

    /// Verify that every ledger has unique reviewers and a correct average
    Check,

    /// Export data to CSV or JSON
    Export {
        /// What to export: ratings, businesses
        export_type: String,

        /// Business ID (required for ratings)
        #[arg(short, long)]
        business: Option<String>,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,

        /// Format: csv, json (json only for ratings)
        #[arg(short, long, default_value = "csv")]
        format: String,
    },

    /// Import ratings from CSV
    Import {
        /// Input file (stdin if omitted)
        #[arg(short, long)]
        input: Option<String>,

        /// Validate without importing
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Subcommand)]
pub enum UserCommands {
    /// Register a new user
    Create {
        /// Display name
        name: String,

        /// Email address (must be unique)
        #[arg(short, long)]
        email: String,

        /// User type: regular, business
        #[arg(short = 't', long = "type", default_value = "regular")]
        user_type: String,

        /// Avatar reference (file name or URL)
        #[arg(short, long)]
        avatar: Option<String>,
    },

    /// List all users
    List,

    /// Show a user
    Show {
        /// User ID
        id: String,
    },
}

/// Install the tracing subscriber. `RUST_LOG` takes precedence over `--verbose`.
pub fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

impl Cli {
    /// Write-path settings from the command line.
    pub fn config(&self) -> LedgerConfig {
        LedgerConfig::default()
            .with_max_attempts(self.max_attempts)
            .with_storage_timeout(Duration::from_millis(self.storage_timeout_ms))
    }

    async fn open_service(&self) -> Result<LedgerService> {
        let service = LedgerService::connect(&self.database)
            .await
            .with_context(|| format!("Failed to open database: {}", self.database))?;
        Ok(service.with_config(self.config()))
    }

    pub async fn run(self) -> Result<()> {
        if matches!(self.command, Commands::Init) {
            LedgerService::init(&self.database).await?;
            println!("Database initialized: {}", self.database);
            return Ok(());
        }

        let service = self.open_service().await?;

        match self.command {
            Commands::Init => {}

            Commands::User(user_cmd) => run_user_command(&service, user_cmd).await?,

            Commands::Businesses => run_businesses_command(&service).await?,

            Commands::Rate {
                business,
                reviewer,
                rating,
                review,
                json,
            } => {
                let request = RatingRequest {
                    business_id: parse_id(&business, "business")?,
                    reviewer_id: parse_id(&reviewer, "reviewer")?,
                    rating: parse_score(&rating)?,
                    review,
                };
                let submission = service.submit_rating(request).await.map_err(explain)?;

                if json {
                    println!("{}", serde_json::to_string_pretty(&submission)?);
                } else {
                    let verb = if submission.replaced { "Updated" } else { "Added" };
                    println!(
                        "{} rating by {}: {} stars",
                        verb, submission.submitted.reviewer.display_name, submission.submitted.rating
                    );
                    println!(
                        "Average rating: {:.1} ({} reviews)",
                        submission.aggregate.average_rating, submission.aggregate.count
                    );
                }
            }

            Commands::Ratings {
                business,
                offset,
                limit,
                format,
            } => {
                let business_id = parse_id(&business, "business")?;
                let page = service
                    .list_ratings(business_id, Page { offset, limit })
                    .await?;

                match format.as_str() {
                    "json" => println!("{}", serde_json::to_string_pretty(&page)?),
                    _ => {
                        println!("{}", page.business_name);
                        println!(
                            "Average rating: {:.1} ({} reviews)",
                            page.average_rating, page.total
                        );
                        println!();
                        print_ratings(&page.ratings);
                        if page.has_more() {
                            println!();
                            println!(
                                "Showing {}-{} of {}. Use --offset {} for more.",
                                page.offset + 1,
                                page.offset + page.ratings.len(),
                                page.total,
                                page.offset + page.ratings.len()
                            );
                        }
                    }
                }
            }

            Commands::Check => run_check_command(&service).await?,

            Commands::Export {
                export_type,
                business,
                output,
                format,
            } => {
                run_export_command(
                    &service,
                    &export_type,
                    business.as_deref(),
                    output.as_deref(),
                    &format,
                )
                .await?
            }

            Commands::Import { input, dry_run } => {
                run_import_command(&service, input.as_deref(), dry_run).await?
            }
        }

        service.close().await;
        Ok(())
    }
}

fn parse_id(input: &str, what: &str) -> Result<Uuid> {
    Uuid::parse_str(input.trim())
        .map_err(|_| AppError::InvalidInput(format!("{} ID must be a UUID", what)).into())
}

fn parse_score(input: &str) -> Result<f64> {
    input
        .trim()
        .parse()
        .map_err(|_| AppError::InvalidInput("rating out of range".to_string()).into())
}

/// Tell the user whether trying again could help.
fn explain(err: AppError) -> anyhow::Error {
    if err.is_retryable() {
        anyhow::Error::new(err).context("Rating not saved; it is safe to submit it again")
    } else {
        err.into()
    }
}

fn print_ratings(ratings: &[EnrichedRating]) {
    if ratings.is_empty() {
        println!("No ratings yet.");
        return;
    }

    println!("{:<20} {:<6} {:<12} {}", "REVIEWER", "STARS", "DATE", "REVIEW");
    println!("{}", "-".repeat(70));
    for rating in ratings {
        println!(
            "{:<20} {:<6} {:<12} {}",
            truncate(&rating.reviewer.display_name, 20),
            stars(rating.rating),
            rating.date.format("%Y-%m-%d"),
            rating.review
        );
    }
}

fn stars(score: u8) -> String {
    "*".repeat(score as usize)
}

async fn run_user_command(service: &LedgerService, cmd: UserCommands) -> Result<()> {
    match cmd {
        UserCommands::Create {
            name,
            email,
            user_type,
            avatar,
        } => {
            let user_type = UserType::from_str(&user_type).ok_or_else(|| {
                anyhow::anyhow!(
                    "Invalid user type: {}. Valid types: regular, business",
                    user_type
                )
            })?;

            let user = service.create_user(name, email, user_type, avatar).await?;
            println!("Created {} user: {} ({})", user.user_type, user.name, user.id);
        }

        UserCommands::List => {
            let users = service.list_users().await?;
            if users.is_empty() {
                println!("No users found.");
            } else {
                println!("{:<38} {:<20} {:<10} {}", "ID", "NAME", "TYPE", "EMAIL");
                println!("{}", "-".repeat(90));
                for user in users {
                    println!(
                        "{:<38} {:<20} {:<10} {}",
                        user.id,
                        truncate(&user.name, 20),
                        user.user_type,
                        user.email
                    );
                }
            }
        }

        UserCommands::Show { id } => {
            let user = service.get_user(parse_id(&id, "user")?).await?;
            println!("User: {}", user.name);
            println!("  ID:       {}", user.id);
            println!("  Email:    {}", user.email);
            println!("  Type:     {}", user.user_type);
            if let Some(avatar) = &user.profile_picture {
                println!("  Avatar:   {}", avatar);
            }
            println!("  Joined:   {}", user.created_at.format("%Y-%m-%d %H:%M:%S"));

            if user.is_business() {
                let summary = service.get_business(user.id).await?;
                println!(
                    "  Rating:   {:.1} ({} reviews)",
                    summary.average_rating, summary.rating_count
                );
            }
        }
    }

    Ok(())
}

async fn run_businesses_command(service: &LedgerService) -> Result<()> {
    let businesses = service.list_businesses().await?;
    if businesses.is_empty() {
        println!("No businesses found.");
        return Ok(());
    }

    println!("{:<38} {:<24} {:>7} {:>8}", "ID", "NAME", "RATING", "REVIEWS");
    println!("{}", "-".repeat(80));
    for summary in businesses {
        println!(
            "{:<38} {:<24} {:>7.1} {:>8}",
            summary.business.id,
            truncate(&summary.business.name, 24),
            summary.average_rating,
            summary.rating_count
        );
    }

    Ok(())
}

async fn run_check_command(service: &LedgerService) -> Result<()> {
    println!("Checking rating ledgers...\n");

    let report = service.check_integrity().await?;

    println!("Businesses: {}", report.business_count);
    println!("Ratings:    {}", report.rating_count);
    println!();

    if report.is_consistent() {
        println!("All ledgers are consistent.");
    } else {
        println!("Issues found:");
        for issue in &report.issues {
            println!("  - {}", issue);
        }
        anyhow::bail!("{} integrity issue(s) found", report.issues.len());
    }

    Ok(())
}

async fn run_export_command(
    service: &LedgerService,
    export_type: &str,
    business: Option<&str>,
    output: Option<&str>,
    format: &str,
) -> Result<()> {
    use crate::io::Exporter;
    use std::fs::File;
    use std::io::{stdout, Write};

    let exporter = Exporter::new(service);

    let writer: Box<dyn Write> = match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path))?;
            Box::new(file)
        }
        None => Box::new(stdout()),
    };

    match (export_type, format) {
        ("ratings", "csv") => {
            let business_id = required_business(business)?;
            let count = exporter.export_ratings_csv(business_id, writer).await?;
            if output.is_some() {
                eprintln!("Exported {} ratings", count);
            }
        }
        ("ratings", "json") => {
            let business_id = required_business(business)?;
            let snapshot = exporter.export_ratings_json(business_id, writer).await?;
            if output.is_some() {
                eprintln!(
                    "Exported {} ratings of {}",
                    snapshot.aggregate.count, snapshot.business.business.name
                );
            }
        }
        ("businesses", "csv") => {
            let count = exporter.export_businesses_csv(writer).await?;
            if output.is_some() {
                eprintln!("Exported {} businesses", count);
            }
        }
        _ => anyhow::bail!(
            "Unsupported export: {} as {}. Valid: ratings (csv, json), businesses (csv)",
            export_type,
            format
        ),
    }

    Ok(())
}

fn required_business(business: Option<&str>) -> Result<Uuid> {
    let business = business.ok_or_else(|| anyhow::anyhow!("--business is required"))?;
    parse_id(business, "business")
}

async fn run_import_command(
    service: &LedgerService,
    input: Option<&str>,
    dry_run: bool,
) -> Result<()> {
    use crate::io::{ImportOptions, Importer};
    use std::fs::File;
    use std::io::{stdin, Read};

    let reader: Box<dyn Read> = match input {
        Some(path) => {
            let file =
                File::open(path).with_context(|| format!("Failed to open input file: {}", path))?;
            Box::new(file)
        }
        None => Box::new(stdin()),
    };

    let importer = Importer::new(service);
    let result = importer
        .import_ratings_csv(reader, ImportOptions { dry_run })
        .await?;

    if dry_run {
        println!("Validation complete");
    } else {
        println!("Import complete");
    }
    println!("  Imported: {}", result.imported);
    println!("  Replaced: {}", result.replaced);
    println!("  Errors:   {}", result.errors.len());

    if !result.errors.is_empty() {
        println!("\nErrors:");
        for error in result.errors.iter().take(10) {
            println!(
                "  Line {}{}: {}",
                error.line,
                error
                    .field
                    .as_ref()
                    .map(|f| format!(" ({})", f))
                    .unwrap_or_default(),
                error.error
            );
        }
        if result.errors.len() > 10 {
            println!("  ... and {} more errors", result.errors.len() - 10);
        }
    }

    Ok(())
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{}...", head)
    }
}

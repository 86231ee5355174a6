use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use newsreel::util::truncate_to_width;
use newsreel::{AggregateError, AggregationRequest, Aggregator, Categorized, Config, TracingSink};

/// Title column width in text output.
const TITLE_WIDTH: usize = 72;

/// Get the default config path (~/.config/newsreel/config.toml)
fn default_config_path() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home)
        .join(".config")
        .join("newsreel")
        .join("config.toml"))
}

#[derive(Parser, Debug)]
#[command(name = "newsreel", about = "Categorized news headlines with resolved preview images")]
struct Args {
    /// Config file (defaults to ~/.config/newsreel/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Category to fetch; repeat for several. Defaults to all configured categories
    #[arg(short, long = "category", value_name = "NAME")]
    categories: Vec<String>,

    /// Items kept per category
    #[arg(long, value_name = "N")]
    limit: Option<usize>,

    /// Images to resolve per category
    #[arg(long, value_name = "N")]
    images: Option<usize>,

    /// Skip image resolution entirely
    #[arg(long)]
    no_enrich: bool,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,

    /// List configured categories and exit
    #[arg(long)]
    list_categories: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing for debug logging
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => default_config_path()?,
    };
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    if args.list_categories {
        for category in config.categories() {
            println!("{category}");
        }
        return Ok(());
    }

    let aggregator = Aggregator::with_http(&config, Arc::new(TracingSink), Arc::new(TracingSink))
        .context("Failed to create HTTP client")?;

    let images = if args.no_enrich {
        0
    } else {
        args.images.unwrap_or(config.images_to_resolve)
    };
    let request = AggregationRequest::new(
        args.categories.iter().cloned(),
        args.limit.unwrap_or(config.per_category_limit),
        images,
    )
    .prefetch_featured(config.prefetch_featured && !args.no_enrich);

    let aggregation = match aggregator.aggregate(&request).await {
        Ok(aggregation) => aggregation,
        Err(e @ AggregateError::NoItems { .. }) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let items = if args.no_enrich {
        aggregation.into_items()
    } else {
        let enriched = aggregation.enriched().await;
        tracing::info!(
            selected = enriched.report.selected,
            page_images = enriched.report.page_images,
            fallback_images = enriched.report.fallback_images,
            "Enrichment report"
        );
        enriched.items
    };

    if args.json {
        let json = serde_json::to_string_pretty(&items).context("Failed to serialize items")?;
        println!("{json}");
    } else {
        print_headlines(&items);
    }
    Ok(())
}

fn print_headlines(items: &Categorized) {
    for (category, bucket) in items.iter() {
        if bucket.is_empty() {
            continue;
        }
        println!("== {category} ({}) ==", bucket.len());
        for item in bucket {
            let source = item.source_name.as_deref().unwrap_or("-");
            println!("  {}  [{source}]", truncate_to_width(&item.title, TITLE_WIDTH));
            println!("    {}", item.link);
            if let Some(image) = &item.image_url {
                println!("    image: {image}");
            }
        }
        println!();
    }
}

use clap::{Args, Parser, Subcommand};

use crate::query::FilterParams;

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    Crawl(CrawlArgs),
    Query(QueryArgs),
}

#[derive(Debug, Args)]
pub struct CrawlArgs {
    /// Start URL of the catalog listing (must be http/https).
    #[arg(long)]
    pub url: String,

    /// Output path for the dataset (JSON array of book records).
    #[arg(long, default_value = "data/books.json")]
    pub out: String,

    /// Optional JSONL log of every fetched page.
    #[arg(long)]
    pub crawl_log: Option<String>,

    /// Maximum concurrent detail page requests.
    #[arg(long, default_value_t = 4)]
    pub concurrency: usize,

    /// Delay before each request (politeness).
    #[arg(long, default_value_t = 200)]
    pub delay_ms: u64,

    /// Maximum listing pages to follow (default: until there is no next page).
    #[arg(long, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    pub max_pages: Option<usize>,

    /// Overwrite existing outputs.
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Args)]
pub struct QueryArgs {
    /// Dataset written by `crawl`.
    #[arg(long, default_value = "data/books.json")]
    pub dataset: String,

    /// Case-insensitive title substring.
    #[arg(long)]
    pub title: Option<String>,

    /// Exact category ("All" disables the filter).
    #[arg(long)]
    pub category: Option<String>,

    /// Minimum rating (1-5).
    #[arg(long)]
    pub min_rating: Option<String>,

    /// Minimum price in pounds.
    #[arg(long)]
    pub min_price: Option<String>,

    /// Maximum price in pounds (default: highest observed price).
    #[arg(long)]
    pub max_price: Option<String>,

    /// Print matching records and statistics as JSON.
    #[arg(long)]
    pub json: bool,
}

impl QueryArgs {
    pub fn filter_params(&self) -> FilterParams {
        FilterParams {
            title: self.title.clone(),
            category: self.category.clone(),
            min_rating: self.min_rating.clone(),
            min_price: self.min_price.clone(),
            max_price: self.max_price.clone(),
        }
    }
}

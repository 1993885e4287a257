use std::collections::HashSet;
use std::io::Write as _;
use std::path::PathBuf;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use crate::cli::QueryArgs;
use crate::dataset::{Book, Catalog, DatasetStatus};
use crate::formats::{BookRecord, MAX_RATING};

pub const ALL_CATEGORIES: &str = "All";
pub const MIN_RATING_FLOOR: u8 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategoryFilter {
    All,
    Exact(String),
}

impl CategoryFilter {
    pub fn as_str(&self) -> &str {
        match self {
            Self::All => ALL_CATEGORIES,
            Self::Exact(category) => category,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceRange {
    pub min: f64,
    pub max: f64,
}

impl PriceRange {
    pub fn contains(&self, value: f64) -> bool {
        self.min <= value && value <= self.max
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterConfig {
    pub title_query: String,
    pub category: CategoryFilter,
    pub min_rating: u8,
    /// `None` when the catalog has no parseable prices.
    pub price_range: Option<PriceRange>,
}

/// Raw filter input as it arrives from a form or the command line.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilterParams {
    pub title: Option<String>,
    pub category: Option<String>,
    pub min_rating: Option<String>,
    pub min_price: Option<String>,
    pub max_price: Option<String>,
}

impl FilterConfig {
    pub fn defaults_for(catalog: &Catalog) -> Self {
        Self {
            title_query: String::new(),
            category: CategoryFilter::All,
            min_rating: MIN_RATING_FLOOR,
            price_range: catalog
                .max_price()
                .map(|max| PriceRange { min: 0.0, max }),
        }
    }

    /// Blank or unparseable values fall back to the catalog defaults.
    pub fn from_params(params: &FilterParams, catalog: &Catalog) -> Self {
        let mut config = Self::defaults_for(catalog);

        if let Some(title) = params.title.as_deref() {
            config.title_query = title.to_owned();
        }

        config.category = match params.category.as_deref().map(str::trim) {
            None | Some("") | Some(ALL_CATEGORIES) => CategoryFilter::All,
            Some(category) => CategoryFilter::Exact(category.to_owned()),
        };

        if let Some(rating) = params
            .min_rating
            .as_deref()
            .and_then(|v| v.trim().parse::<i64>().ok())
        {
            config.min_rating =
                rating.clamp(i64::from(MIN_RATING_FLOOR), i64::from(MAX_RATING)) as u8;
        }

        if let Some(range) = config.price_range.as_mut() {
            if let Some(min) = parse_amount(params.min_price.as_deref()) {
                range.min = min;
            }
            if let Some(max) = parse_amount(params.max_price.as_deref()) {
                range.max = max;
            }
        }

        config
    }
}

/// Applies title, category, rating and price filters in that order.
pub fn apply<'a>(catalog: &'a Catalog, config: &FilterConfig) -> Vec<&'a Book> {
    let price_range = config.price_range.filter(|_| catalog.has_prices());
    let needle = config.title_query.to_lowercase();

    catalog
        .books()
        .iter()
        .filter(|book| matches_title(book, &needle))
        .filter(|book| matches_category(book, &config.category))
        .filter(|book| book.record.rating >= config.min_rating)
        .filter(|book| price_range.is_none_or(|range| matches_price(book, &range)))
        .collect()
}

fn matches_title(book: &Book, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    book.record
        .title
        .as_deref()
        .is_some_and(|title| title.to_lowercase().contains(needle))
}

fn matches_category(book: &Book, category: &CategoryFilter) -> bool {
    match category {
        CategoryFilter::All => true,
        CategoryFilter::Exact(wanted) => book.record.category.as_deref() == Some(wanted.as_str()),
    }
}

fn matches_price(book: &Book, range: &PriceRange) -> bool {
    book.price_value.is_some_and(|price| range.contains(price))
}

fn parse_amount(raw: Option<&str>) -> Option<f64> {
    let value: f64 = raw?.trim().parse().ok()?;
    value.is_finite().then_some(value.max(0.0))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stats {
    pub total: usize,
    pub average_rating: Option<f64>,
    pub average_price: Option<f64>,
    pub categories: usize,
}

impl Stats {
    pub fn compute(books: &[&Book]) -> Self {
        let average_rating = mean(books.iter().map(|book| f64::from(book.record.rating)));
        let average_price = mean(books.iter().filter_map(|book| book.price_value));
        let categories = books
            .iter()
            .filter_map(|book| book.record.category.as_deref())
            .collect::<HashSet<_>>()
            .len();

        Self {
            total: books.len(),
            average_rating,
            average_price,
            categories,
        }
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0_usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

#[derive(Debug, Serialize)]
pub struct QueryResponse<'a> {
    pub status: DatasetStatus,
    pub total: usize,
    pub stats: Stats,
    pub books: Vec<&'a BookRecord>,
}

impl<'a> QueryResponse<'a> {
    pub fn new(catalog: &Catalog, books: &[&'a Book]) -> Self {
        Self {
            status: catalog.status(),
            total: catalog.books().len(),
            stats: Stats::compute(books),
            books: books.iter().copied().map(|book| &book.record).collect(),
        }
    }
}

pub fn run(args: QueryArgs) -> anyhow::Result<()> {
    let dataset_path = PathBuf::from(&args.dataset);
    let catalog = crate::dataset::load_catalog(&dataset_path).context("load dataset")?;
    let config = FilterConfig::from_params(&args.filter_params(), &catalog);
    tracing::debug!(?config, "filter config");

    let books = apply(&catalog, &config);

    let mut stdout = std::io::stdout().lock();
    if args.json {
        let response = QueryResponse::new(&catalog, &books);
        serde_json::to_writer_pretty(&mut stdout, &response).context("write query json")?;
        stdout.write_all(b"\n").context("write newline")?;
    } else {
        let text = crate::render::render_text(&catalog, &books);
        stdout
            .write_all(text.as_bytes())
            .context("write query output")?;
    }
    stdout.flush().context("flush stdout")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book(title: &str, price: &str, rating: u8, category: &str) -> BookRecord {
        BookRecord {
            title: Some(title.to_owned()),
            price: Some(price.to_owned()),
            availability: Some(20),
            rating,
            description: None,
            category: Some(category.to_owned()),
            url: format!("http://books.example/{}", title.replace(' ', "-")),
        }
    }

    fn sample() -> Catalog {
        Catalog::from_records(vec![
            book("A Light in the Attic", "£51.77", 3, "Poetry"),
            book("Tipping the Velvet", "£53.74", 1, "Fiction"),
        ])
    }

    fn titles(books: &[&Book]) -> Vec<String> {
        books
            .iter()
            .filter_map(|b| b.record.title.clone())
            .collect()
    }

    #[test]
    fn defaults_keep_every_rated_book() {
        let catalog = sample();
        let config = FilterConfig::defaults_for(&catalog);
        assert_eq!(config.min_rating, 1);
        assert_eq!(config.category, CategoryFilter::All);
        assert_eq!(
            config.price_range,
            Some(PriceRange {
                min: 0.0,
                max: 53.74
            })
        );
        assert_eq!(apply(&catalog, &config).len(), 2);
    }

    #[test]
    fn empty_title_and_all_category_are_identity() {
        let catalog = sample();
        let mut config = FilterConfig::defaults_for(&catalog);
        config.title_query = String::new();
        config.category = CategoryFilter::All;
        let all: Vec<&Book> = catalog.books().iter().collect();
        assert_eq!(apply(&catalog, &config), all);
    }

    #[test]
    fn min_rating_two_keeps_only_first() {
        let catalog = sample();
        let mut config = FilterConfig::defaults_for(&catalog);
        config.min_rating = 2;
        assert_eq!(titles(&apply(&catalog, &config)), vec!["A Light in the Attic"]);
    }

    #[test]
    fn title_search_is_case_insensitive() {
        let catalog = sample();
        for query in ["tipping", "TIPPING", "TiPpInG", "velvet"] {
            let mut config = FilterConfig::defaults_for(&catalog);
            config.title_query = query.to_owned();
            assert_eq!(
                titles(&apply(&catalog, &config)),
                vec!["Tipping the Velvet"],
                "{query}"
            );
        }
    }

    #[test]
    fn title_search_excludes_untitled_records() {
        let mut untitled = book("ignored", "£10.00", 5, "Poetry");
        untitled.title = None;
        let catalog = Catalog::from_records(vec![untitled, book("Attic", "£10.00", 5, "Poetry")]);

        let mut config = FilterConfig::defaults_for(&catalog);
        config.title_query = "a".to_owned();
        assert_eq!(titles(&apply(&catalog, &config)), vec!["Attic"]);

        config.title_query = String::new();
        assert_eq!(apply(&catalog, &config).len(), 2);
    }

    #[test]
    fn price_range_selects_second() {
        let catalog = sample();
        let mut config = FilterConfig::defaults_for(&catalog);
        config.price_range = Some(PriceRange {
            min: 52.0,
            max: 54.0,
        });
        assert_eq!(titles(&apply(&catalog, &config)), vec!["Tipping the Velvet"]);
    }

    #[test]
    fn price_range_is_inclusive_at_both_bounds() {
        let catalog = sample();
        let mut config = FilterConfig::defaults_for(&catalog);

        config.price_range = Some(PriceRange {
            min: 51.77,
            max: 51.77,
        });
        assert_eq!(titles(&apply(&catalog, &config)), vec!["A Light in the Attic"]);

        config.price_range = Some(PriceRange {
            min: 51.77,
            max: 53.74,
        });
        assert_eq!(apply(&catalog, &config).len(), 2);
    }

    #[test]
    fn category_match_is_exact_and_case_sensitive() {
        let catalog = sample();
        let mut config = FilterConfig::defaults_for(&catalog);

        config.category = CategoryFilter::Exact("Poetry".to_owned());
        assert_eq!(titles(&apply(&catalog, &config)), vec!["A Light in the Attic"]);

        config.category = CategoryFilter::Exact("poetry".to_owned());
        assert!(apply(&catalog, &config).is_empty());
    }

    #[test]
    fn unparseable_prices_drop_out_only_while_price_filter_is_active() {
        let catalog = Catalog::from_records(vec![
            book("Priced", "£10.00", 4, "Poetry"),
            book("Unpriced", "10.00", 4, "Poetry"),
        ]);
        let config = FilterConfig::defaults_for(&catalog);
        assert_eq!(titles(&apply(&catalog, &config)), vec!["Priced"]);

        let no_prices = Catalog::from_records(vec![book("Unpriced", "free", 4, "Poetry")]);
        let mut config = FilterConfig::defaults_for(&no_prices);
        assert_eq!(config.price_range, None);
        config.price_range = Some(PriceRange { min: 0.0, max: 1.0 });
        assert_eq!(titles(&apply(&no_prices, &config)), vec!["Unpriced"]);
    }

    #[test]
    fn params_are_parsed_leniently() {
        let catalog = sample();
        let params = FilterParams {
            title: Some("attic".to_owned()),
            category: Some("All".to_owned()),
            min_rating: Some("9".to_owned()),
            min_price: Some("-4".to_owned()),
            max_price: Some("".to_owned()),
        };
        let config = FilterConfig::from_params(&params, &catalog);
        assert_eq!(config.title_query, "attic");
        assert_eq!(config.category, CategoryFilter::All);
        assert_eq!(config.min_rating, 5);
        assert_eq!(
            config.price_range,
            Some(PriceRange {
                min: 0.0,
                max: 53.74
            })
        );

        let params = FilterParams {
            category: Some("Fiction".to_owned()),
            min_rating: Some("zero".to_owned()),
            ..FilterParams::default()
        };
        let config = FilterConfig::from_params(&params, &catalog);
        assert_eq!(config.category, CategoryFilter::Exact("Fiction".to_owned()));
        assert_eq!(config.min_rating, 1);
    }

    #[test]
    fn stats_over_filtered_books() {
        let catalog = sample();
        let books: Vec<&Book> = catalog.books().iter().collect();
        let stats = Stats::compute(&books);
        assert_eq!(stats.total, 2);
        assert_eq!(stats.average_rating, Some(2.0));
        let avg_price = stats.average_price.unwrap();
        assert!((avg_price - 52.755).abs() < 1e-9);
        assert_eq!(stats.categories, 2);
    }

    #[test]
    fn stats_on_empty_input_are_zero() {
        let stats = Stats::compute(&[]);
        assert_eq!(
            stats,
            Stats {
                total: 0,
                average_rating: None,
                average_price: None,
                categories: 0,
            }
        );

        let catalog = Catalog::missing();
        let config = FilterConfig::defaults_for(&catalog);
        assert!(apply(&catalog, &config).is_empty());
    }

    #[test]
    fn every_rating_stays_in_range() {
        let catalog = sample();
        assert!(catalog.books().iter().all(|b| b.record.rating <= MAX_RATING));
    }
}

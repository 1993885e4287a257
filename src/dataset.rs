use std::collections::BTreeSet;
use std::path::Path;

use anyhow::Context as _;
use serde::Serialize;

use crate::formats::BookRecord;

pub const CURRENCY_SYMBOL: char = '£';

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DatasetStatus {
    Loaded,
    Missing,
}

/// A record with its price parsed once at load time.
#[derive(Debug, Clone, PartialEq)]
pub struct Book {
    pub record: BookRecord,
    pub price_value: Option<f64>,
}

impl Book {
    pub fn new(record: BookRecord) -> Self {
        let price_value = record.price.as_deref().and_then(parse_price);
        Self {
            record,
            price_value,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Catalog {
    books: Vec<Book>,
    status: DatasetStatus,
}

impl Catalog {
    pub fn from_records(records: Vec<BookRecord>) -> Self {
        Self {
            books: records.into_iter().map(Book::new).collect(),
            status: DatasetStatus::Loaded,
        }
    }

    pub fn missing() -> Self {
        Self {
            books: Vec::new(),
            status: DatasetStatus::Missing,
        }
    }

    pub fn books(&self) -> &[Book] {
        &self.books
    }

    pub fn status(&self) -> DatasetStatus {
        self.status
    }

    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }

    pub fn categories(&self) -> Vec<String> {
        self.books
            .iter()
            .filter_map(|book| book.record.category.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn max_price(&self) -> Option<f64> {
        self.books
            .iter()
            .filter_map(|book| book.price_value)
            .reduce(f64::max)
    }

    pub fn has_prices(&self) -> bool {
        self.books.iter().any(|book| book.price_value.is_some())
    }
}

/// Loads the dataset; a missing file yields an empty catalog marked `Missing`.
pub fn load_catalog(path: &Path) -> anyhow::Result<Catalog> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(path = %path.display(), "dataset not found; serving empty catalog");
            return Ok(Catalog::missing());
        }
        Err(err) => {
            return Err(err).with_context(|| format!("read dataset: {}", path.display()));
        }
    };

    let records: Vec<BookRecord> = serde_json::from_slice(&bytes)
        .with_context(|| format!("parse dataset: {}", path.display()))?;
    let catalog = Catalog::from_records(records);
    tracing::info!(
        path = %path.display(),
        books = catalog.books().len(),
        "loaded dataset"
    );
    Ok(catalog)
}

pub fn write_dataset(path: &Path, records: &[BookRecord], force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("dataset output already exists: {}", path.display());
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create dataset parent dir: {}", parent.display()))?;
    }

    let tmp_path = path.with_extension(format!("tmp.{}", uuid::Uuid::new_v4().simple()));
    let data = serde_json::to_vec_pretty(records).context("serialize dataset")?;
    std::fs::write(&tmp_path, &data)
        .with_context(|| format!("write tmp: {}", tmp_path.display()))?;
    std::fs::rename(&tmp_path, path)
        .with_context(|| format!("rename tmp to final: {}", path.display()))?;
    Ok(())
}

/// Parses `£12.34`. Anything without the currency prefix, negative, or
/// non-finite is unparseable.
pub fn parse_price(text: &str) -> Option<f64> {
    let amount = text.trim().strip_prefix(CURRENCY_SYMBOL)?.trim();
    let value: f64 = amount.parse().ok()?;
    (value.is_finite() && value >= 0.0).then_some(value)
}

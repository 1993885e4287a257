use anyhow::Context as _;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::formats::BookRecord;

const RATING_WORDS: [(&str, u8); 5] = [
    ("One", 1),
    ("Two", 2),
    ("Three", 3),
    ("Four", 4),
    ("Five", 5),
];

/// Links discovered on one catalog listing page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingPage {
    pub detail_links: Vec<Url>,
    pub next_link: Option<Url>,
}

/// Compiled selectors for the catalog markup. Build once and share.
#[derive(Debug, Clone)]
pub struct BookExtractor {
    detail_link: Selector,
    next_link: Selector,
    title: Selector,
    price: Selector,
    availability: Selector,
    star_rating: Selector,
    description: Selector,
    category: Selector,
    rating_class: Regex,
}

impl BookExtractor {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            detail_link: selector("article.product_pod h3 a")?,
            next_link: selector("li.next a")?,
            title: selector("h1")?,
            price: selector("p.price_color")?,
            availability: selector("p.availability")?,
            star_rating: selector("p.star-rating")?,
            description: selector("#product_description ~ p")?,
            category: selector("ul.breadcrumb li:nth-child(3) a")?,
            rating_class: Regex::new(r"star-rating (\w+)").context("compile rating pattern")?,
        })
    }

    pub fn parse_listing(&self, html: &str, page_url: &Url) -> ListingPage {
        let document = Html::parse_document(html);

        let detail_links = document
            .select(&self.detail_link)
            .filter_map(|a| resolve_href(a, page_url))
            .collect();
        let next_link = document
            .select(&self.next_link)
            .next()
            .and_then(|a| resolve_href(a, page_url));

        ListingPage {
            detail_links,
            next_link,
        }
    }

    pub fn extract_book(&self, html: &str, page_url: &Url) -> BookRecord {
        let document = Html::parse_document(html);

        let rating = document
            .select(&self.star_rating)
            .next()
            .and_then(|p| p.value().attr("class"))
            .and_then(|class| self.rating_class.captures(class))
            .and_then(|caps| caps.get(1))
            .map_or(0, |word| rating_from_word(word.as_str()));

        BookRecord {
            title: first_text(&document, &self.title),
            price: first_text(&document, &self.price),
            availability: first_text(&document, &self.availability)
                .as_deref()
                .and_then(parse_availability),
            rating,
            description: first_non_empty_text(&document, &self.description),
            category: first_text(&document, &self.category),
            url: page_url.to_string(),
        }
    }
}

/// Maps the closed `One..Five` vocabulary to 1..5; anything else is 0.
pub fn rating_from_word(word: &str) -> u8 {
    RATING_WORDS
        .iter()
        .find(|(w, _)| *w == word)
        .map_or(0, |(_, n)| *n)
}

/// First run of ASCII digits in `text`.
pub fn parse_availability(text: &str) -> Option<u32> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let rest = &text[start..];
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    rest[..end].parse().ok()
}

fn selector(css: &str) -> anyhow::Result<Selector> {
    Selector::parse(css).map_err(|err| anyhow::anyhow!("invalid selector {css:?}: {err}"))
}

fn first_text(document: &Html, selector: &Selector) -> Option<String> {
    let element = document.select(selector).next()?;
    let text = element.text().collect::<String>();
    let text = text.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_owned())
    }
}

/// Like `first_text`, but skips matches that have no text.
fn first_non_empty_text(document: &Html, selector: &Selector) -> Option<String> {
    document.select(selector).find_map(|element| {
        let text = element.text().collect::<String>();
        let text = text.trim();
        (!text.is_empty()).then(|| text.to_owned())
    })
}

fn resolve_href(anchor: ElementRef<'_>, page_url: &Url) -> Option<Url> {
    let href = anchor.value().attr("href")?.trim();
    if href.is_empty() {
        return None;
    }
    match page_url.join(href) {
        Ok(url) => Some(url),
        Err(err) => {
            tracing::debug!(%href, page = %page_url, ?err, "skipping unresolvable link");
            None
        }
    }
}

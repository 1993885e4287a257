use std::fmt::Write as _;

use crate::dataset::{Book, Catalog, DatasetStatus};
use crate::formats::MAX_RATING;
use crate::query::{ALL_CATEGORIES, FilterConfig, Stats};

const STAR: &str = "★";

pub fn stars(rating: u8) -> String {
    STAR.repeat(usize::from(rating.min(MAX_RATING)))
}

pub fn format_average_rating(stats: &Stats) -> String {
    stats
        .average_rating
        .map_or_else(|| "-".to_owned(), |v| format!("{v:.1}"))
}

pub fn format_average_price(stats: &Stats) -> String {
    stats
        .average_price
        .map_or_else(|| "-".to_owned(), |v| format!("£{v:.2}"))
}

pub fn render_page(catalog: &Catalog, config: &FilterConfig, books: &[&Book]) -> String {
    let mut body = String::new();
    body.push_str("<h1>Books Search</h1>\n");

    if catalog.status() == DatasetStatus::Missing || catalog.is_empty() {
        body.push_str(
            "<p class=\"warning\">No data to display. Run <code>bookcrawl crawl</code> first.</p>\n",
        );
        return wrap_html_document("Books Search", &body);
    }

    body.push_str("<div class=\"layout\">\n");
    body.push_str(&render_filter_form(catalog, config));
    body.push_str("<main>\n");

    let stats = Stats::compute(books);
    let _ = writeln!(body, "<h2>Results ({} books)</h2>", stats.total);

    if books.is_empty() {
        body.push_str("<p class=\"info\">No books match the selected filters.</p>\n");
    } else {
        body.push_str(&render_stats(&stats));
        body.push_str("<div class=\"books\">\n");
        for book in books {
            body.push_str(&render_book(book));
        }
        body.push_str("</div>\n");
    }

    body.push_str("</main>\n</div>\n");
    wrap_html_document("Books Search", &body)
}

fn render_filter_form(catalog: &Catalog, config: &FilterConfig) -> String {
    let mut out = String::new();
    out.push_str("<aside>\n<form method=\"get\" action=\"/\">\n");
    out.push_str("<h2>Filters</h2>\n");

    let _ = writeln!(
        out,
        "<label>Title <input type=\"text\" name=\"title\" value=\"{}\"></label>",
        html_escape(&config.title_query)
    );

    out.push_str("<label>Category <select name=\"category\">\n");
    let selected = config.category.as_str();
    let options = std::iter::once(ALL_CATEGORIES.to_owned()).chain(catalog.categories());
    for option in options {
        let marker = if option == selected { " selected" } else { "" };
        let escaped = html_escape(&option);
        let _ = writeln!(out, "<option value=\"{escaped}\"{marker}>{escaped}</option>");
    }
    out.push_str("</select></label>\n");

    out.push_str("<label>Minimum rating <select name=\"min_rating\">\n");
    for rating in 1..=MAX_RATING {
        let marker = if rating == config.min_rating {
            " selected"
        } else {
            ""
        };
        let _ = writeln!(out, "<option value=\"{rating}\"{marker}>{rating}</option>");
    }
    out.push_str("</select></label>\n");

    if let Some(range) = config.price_range {
        let _ = writeln!(
            out,
            "<label>Minimum price (£) <input type=\"number\" name=\"min_price\" min=\"0\" step=\"0.01\" value=\"{:.2}\"></label>",
            range.min
        );
        let _ = writeln!(
            out,
            "<label>Maximum price (£) <input type=\"number\" name=\"max_price\" min=\"0\" step=\"0.01\" value=\"{:.2}\"></label>",
            range.max
        );
    }

    out.push_str("<button type=\"submit\">Apply</button>\n</form>\n</aside>\n");
    out
}

fn render_stats(stats: &Stats) -> String {
    let mut out = String::new();
    out.push_str("<dl class=\"stats\">\n");
    let _ = writeln!(out, "<dt>Total books</dt><dd>{}</dd>", stats.total);
    let _ = writeln!(
        out,
        "<dt>Average rating</dt><dd>{}</dd>",
        format_average_rating(stats)
    );
    if stats.average_price.is_some() {
        let _ = writeln!(
            out,
            "<dt>Average price</dt><dd>{}</dd>",
            html_escape(&format_average_price(stats))
        );
    }
    let _ = writeln!(out, "<dt>Categories</dt><dd>{}</dd>", stats.categories);
    out.push_str("</dl>\n");
    out
}

fn render_book(book: &Book) -> String {
    let record = &book.record;
    let mut out = String::new();
    let _ = writeln!(
        out,
        "<details class=\"book\">\n<summary>{}</summary>",
        html_escape(record.title.as_deref().unwrap_or("(untitled)"))
    );
    let _ = writeln!(
        out,
        "<p><strong>Category:</strong> {}</p>",
        html_escape(record.category.as_deref().unwrap_or("-"))
    );
    let _ = writeln!(
        out,
        "<p><strong>Rating:</strong> {} ({}/{MAX_RATING})</p>",
        stars(record.rating),
        record.rating
    );
    let _ = writeln!(
        out,
        "<p><strong>Price:</strong> {}</p>",
        html_escape(record.price.as_deref().unwrap_or("-"))
    );
    let availability = record
        .availability
        .map_or_else(|| "-".to_owned(), |n| n.to_string());
    let _ = writeln!(
        out,
        "<p><strong>Availability:</strong> {availability} available</p>"
    );
    if let Some(description) = record.description.as_deref() {
        let _ = writeln!(
            out,
            "<p><strong>Description:</strong> {}</p>",
            html_escape(description)
        );
    }
    let _ = writeln!(
        out,
        "<p><a href=\"{}\">View book</a></p>\n</details>",
        html_escape(&record.url)
    );
    out
}

/// Plain text listing used by `bookcrawl query`.
pub fn render_text(catalog: &Catalog, books: &[&Book]) -> String {
    if catalog.status() == DatasetStatus::Missing || catalog.is_empty() {
        return "No data to display.\n".to_owned();
    }

    let stats = Stats::compute(books);
    let mut out = String::new();
    let _ = writeln!(out, "Results ({} books)", stats.total);
    if books.is_empty() {
        out.push_str("No books match the selected filters.\n");
        return out;
    }

    let _ = writeln!(
        out,
        "average rating: {} | average price: {} | categories: {}",
        format_average_rating(&stats),
        format_average_price(&stats),
        stats.categories
    );
    for book in books {
        let record = &book.record;
        let _ = writeln!(
            out,
            "{} | {} | {} ({}/{MAX_RATING}) | {} | {}",
            record.title.as_deref().unwrap_or("(untitled)"),
            record.category.as_deref().unwrap_or("-"),
            stars(record.rating),
            record.rating,
            record.price.as_deref().unwrap_or("-"),
            record.url
        );
    }
    out
}

fn wrap_html_document(title: &str, body_html: &str) -> String {
    let mut out = String::new();
    out.push_str("<!doctype html>\n<html>\n<head>\n");
    out.push_str("  <meta charset=\"utf-8\">\n");
    let _ = writeln!(out, "  <title>{}</title>", html_escape(title));
    out.push_str("  <style>");
    out.push_str(STYLE_CSS);
    out.push_str("</style>\n</head>\n<body>\n");
    out.push_str(body_html);
    if !body_html.ends_with('\n') {
        out.push('\n');
    }
    out.push_str("</body>\n</html>\n");
    out
}

const STYLE_CSS: &str = "body{font-family:sans-serif;margin:1.5rem}\
.layout{display:flex;gap:2rem}\
aside label{display:block;margin-bottom:.75rem}\
.stats{display:grid;grid-template-columns:repeat(4,auto);gap:.25rem 1rem}\
.warning{color:#8a6d3b}.info{color:#31708f}";

fn html_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

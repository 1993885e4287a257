#![forbid(unsafe_code)]

pub mod app;
pub mod cli;
pub mod crawl;
pub mod dataset;
pub mod extract;
pub mod formats;
pub mod logging;
pub mod query;
pub mod render;

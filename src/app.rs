use std::sync::Arc;

use axum::Router;
use axum::extract::{Query, State};
use axum::response::{Html, IntoResponse, Json, Response};
use axum::routing::get;
use tower_http::trace::TraceLayer;

use crate::dataset::Catalog;
use crate::query::{FilterConfig, FilterParams, QueryResponse, apply};

#[derive(Clone)]
struct AppState {
    catalog: Arc<Catalog>,
}

/// Every request filters the full catalog from scratch.
pub fn router(catalog: Arc<Catalog>) -> Router {
    Router::new()
        .route("/", get(search_page))
        .route("/api/books", get(search_books))
        .route("/api/categories", get(list_categories))
        .route("/healthz", get(|| async { "ok\n" }))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { catalog })
}

async fn search_page(
    State(state): State<AppState>,
    Query(params): Query<FilterParams>,
) -> Html<String> {
    let catalog = state.catalog.as_ref();
    let config = FilterConfig::from_params(&params, catalog);
    let books = apply(catalog, &config);
    tracing::debug!(?config, matches = books.len(), "search page");
    Html(crate::render::render_page(catalog, &config, &books))
}

async fn search_books(
    State(state): State<AppState>,
    Query(params): Query<FilterParams>,
) -> Response {
    let catalog = state.catalog.as_ref();
    let config = FilterConfig::from_params(&params, catalog);
    let books = apply(catalog, &config);
    Json(QueryResponse::new(catalog, &books)).into_response()
}

async fn list_categories(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.catalog.categories())
}

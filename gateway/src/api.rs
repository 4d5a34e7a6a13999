//! Read-only HTTP API over the review store.

use axum::{
    extract::{Query, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chrono::{Duration, SecondsFormat, Utc};
use common::review::Review;
use common::store::ReviewStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub const DEFAULT_HOURS: i64 = 48;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<ReviewStore>,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/api/reviews", get(recent_reviews))
        .route("/api/average-rating", get(average_rating))
        .route("/api/health", get(health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Raw query; validated by hand so errors keep their plain-text messages.
#[derive(Debug, Deserialize)]
struct WindowQuery {
    app_id: Option<String>,
    hours: Option<String>,
}

struct Window {
    app_id: String,
    hours: i64,
}

impl WindowQuery {
    fn validate(self) -> Result<Window, Response> {
        let app_id = match self.app_id {
            Some(id) if !id.is_empty() => id,
            _ => return Err(bad_request("app_id query parameter is required")),
        };

        let hours = match self.hours.as_deref() {
            None | Some("") => DEFAULT_HOURS,
            Some(raw) => match raw.parse::<i64>() {
                Ok(h) if h > 0 && Duration::try_hours(h).is_some() => h,
                _ => return Err(bad_request("hours must be a positive integer")),
            },
        };

        Ok(Window { app_id, hours })
    }
}

fn bad_request(message: &'static str) -> Response {
    (StatusCode::BAD_REQUEST, message).into_response()
}

impl Window {
    fn reviews(&self, store: &ReviewStore) -> Vec<Review> {
        store.reviews_since(&self.app_id, Duration::hours(self.hours))
    }
}

async fn recent_reviews(
    State(state): State<AppState>,
    Query(query): Query<WindowQuery>,
) -> Response {
    let window = match query.validate() {
        Ok(w) => w,
        Err(resp) => return resp,
    };

    let mut reviews = window.reviews(&state.store);
    reviews.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
    Json(reviews).into_response()
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct AverageRating {
    pub app_id: String,
    pub average_rating: f64,
    pub review_count: usize,
    pub hours: i64,
}

async fn average_rating(
    State(state): State<AppState>,
    Query(query): Query<WindowQuery>,
) -> Response {
    let window = match query.validate() {
        Ok(w) => w,
        Err(resp) => return resp,
    };

    let reviews = window.reviews(&state.store);
    Json(AverageRating {
        average_rating: average(&reviews),
        review_count: reviews.len(),
        app_id: window.app_id,
        hours: window.hours,
    })
    .into_response()
}

/// Mean rating rounded to one decimal, halves away from zero; 0.0 when empty.
pub fn average(reviews: &[Review]) -> f64 {
    if reviews.is_empty() {
        return 0.0;
    }
    let sum: u64 = reviews.iter().map(|r| u64::from(r.rating)).sum();
    let mean = sum as f64 / reviews.len() as f64;
    (mean * 10.0).round() / 10.0
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Health {
    pub status: String,
    pub timestamp: String,
    pub total_reviews: usize,
}

async fn health(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "healthy".into(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        total_reviews: state.store.len(),
    })
}

//! Google Business Profile review-fetch client.
//!
//! Defines the provider-facing [`ReviewsClient`] trait, the wire shapes of
//! the reviews API, and the structured [`FetchError`] taxonomy the
//! orchestrator folds over.

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{error, warn};
use url::Url;

/// Structured fetch error surfaced from provider calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchError {
    #[serde(flatten)]
    pub kind: FetchErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FetchErrorKind {
    /// Authentication/authorization failure; requires reconnect
    AuthRequired,
    /// Rate limited with optional retry after hint
    RateLimited {
        #[serde(skip_serializing_if = "Option::is_none")]
        retry_after_secs: Option<u64>,
    },
    /// Transient/retryable error (network, 5xx)
    Transient,
    /// Malformed provider data, non-retryable
    Validation,
    /// Permanent/non-retryable error
    Permanent,
}

impl FetchError {
    pub fn auth_required<S: Into<String>>(message: S) -> Self {
        Self {
            kind: FetchErrorKind::AuthRequired,
            message: Some(message.into()),
            details: None,
        }
    }

    pub fn rate_limited(retry_after_secs: Option<u64>) -> Self {
        Self {
            kind: FetchErrorKind::RateLimited { retry_after_secs },
            message: None,
            details: None,
        }
    }

    pub fn transient<S: Into<String>>(message: S) -> Self {
        Self {
            kind: FetchErrorKind::Transient,
            message: Some(message.into()),
            details: None,
        }
    }

    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self {
            kind: FetchErrorKind::Validation,
            message: Some(message.into()),
            details: None,
        }
    }

    pub fn permanent<S: Into<String>>(message: S) -> Self {
        Self {
            kind: FetchErrorKind::Permanent,
            message: Some(message.into()),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Whether a later attempt might succeed without user intervention.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            FetchErrorKind::Transient | FetchErrorKind::RateLimited { .. }
        )
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            FetchErrorKind::AuthRequired => "auth_required",
            FetchErrorKind::RateLimited { .. } => "rate_limited",
            FetchErrorKind::Transient => "transient",
            FetchErrorKind::Validation => "validation",
            FetchErrorKind::Permanent => "permanent",
        };
        match &self.message {
            Some(message) => write!(f, "{}: {}", kind, message),
            None => write!(f, "{}", kind),
        }
    }
}

impl std::error::Error for FetchError {}

/// One review as fetched from the provider, already normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalReview {
    pub external_id: String,
    pub rating: i16,
    pub comment: Option<String>,
    pub reviewer_name: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// One page of fetched reviews plus the continuation token, if any.
#[derive(Debug, Clone, Default)]
pub struct ReviewPage {
    pub reviews: Vec<ExternalReview>,
    pub next_page_token: Option<String>,
}

/// Provider review-fetch client.
#[async_trait]
pub trait ReviewsClient: Send + Sync {
    /// Fetch one page of reviews for a location resource name.
    async fn fetch_reviews(
        &self,
        access_token: &str,
        location_resource: &str,
        page_token: Option<&str>,
    ) -> Result<ReviewPage, FetchError>;
}

// Wire shapes for the Google Business Profile reviews API.

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireReviewList {
    #[serde(default)]
    reviews: Vec<WireReview>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireReview {
    review_id: String,
    star_rating: WireStarRating,
    #[serde(default)]
    comment: Option<String>,
    #[serde(default)]
    reviewer: Option<WireReviewer>,
    #[serde(default)]
    create_time: Option<DateTime<Utc>>,
    #[serde(default)]
    update_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireReviewer {
    #[serde(default)]
    display_name: Option<String>,
}

/// Star ratings arrive as enum strings, not numbers.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum WireStarRating {
    One,
    Two,
    Three,
    Four,
    Five,
}

impl WireStarRating {
    fn as_i16(self) -> i16 {
        match self {
            WireStarRating::One => 1,
            WireStarRating::Two => 2,
            WireStarRating::Three => 3,
            WireStarRating::Four => 4,
            WireStarRating::Five => 5,
        }
    }
}

impl From<WireReview> for ExternalReview {
    fn from(wire: WireReview) -> Self {
        // Provider timestamps carry nanoseconds but timestamptz columns
        // store microseconds; truncate at ingest so a stored row compares
        // equal to the same review on the next fetch.
        Self {
            external_id: wire.review_id,
            rating: wire.star_rating.as_i16(),
            comment: wire.comment,
            reviewer_name: wire.reviewer.and_then(|r| r.display_name),
            created_at: wire.create_time.map(|t| t.trunc_subsecs(6)),
            updated_at: wire.update_time.map(|t| t.trunc_subsecs(6)),
        }
    }
}

/// Reviews client backed by the Google Business Profile HTTP API.
#[derive(Clone)]
pub struct GoogleBusinessClient {
    http: reqwest::Client,
    api_base: String,
    page_size: u32,
}

impl GoogleBusinessClient {
    pub fn new(api_base: String, page_size: u32, http_timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(http_timeout)
            .build()
            .unwrap_or_default();
        Self {
            http,
            api_base,
            page_size,
        }
    }

    fn reviews_url(
        &self,
        location_resource: &str,
        page_token: Option<&str>,
    ) -> Result<Url, FetchError> {
        let mut url = Url::parse(&format!(
            "{}/v4/{}/reviews",
            self.api_base.trim_end_matches('/'),
            location_resource
        ))
        .map_err(|e| FetchError::permanent(format!("invalid reviews URL: {}", e)))?;

        url.query_pairs_mut()
            .append_pair("pageSize", &self.page_size.to_string());
        if let Some(token) = page_token {
            url.query_pairs_mut().append_pair("pageToken", token);
        }

        Ok(url)
    }
}

#[async_trait]
impl ReviewsClient for GoogleBusinessClient {
    async fn fetch_reviews(
        &self,
        access_token: &str,
        location_resource: &str,
        page_token: Option<&str>,
    ) -> Result<ReviewPage, FetchError> {
        let url = self.reviews_url(location_resource, page_token)?;

        let response = self
            .http
            .get(url)
            .header("Authorization", format!("Bearer {}", access_token))
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| FetchError::transient(format!("review fetch failed: {}", e)))?;

        let status = response.status();

        if status.is_success() {
            let list: WireReviewList = response.json().await.map_err(|e| {
                FetchError::validation(format!("malformed review list payload: {}", e))
            })?;
            return Ok(ReviewPage {
                reviews: list.reviews.into_iter().map(ExternalReview::from).collect(),
                next_page_token: list.next_page_token,
            });
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok());
            warn!(%location_resource, ?retry_after, "Rate limited fetching reviews");
            return Err(FetchError::rate_limited(retry_after));
        }

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            error!(%location_resource, %status, "Review fetch rejected, reconnect required");
            return Err(FetchError::auth_required(format!(
                "review fetch rejected with status {}",
                status
            )));
        }

        let body = response.text().await.unwrap_or_default();
        if status.is_server_error() {
            Err(FetchError::transient(format!(
                "provider returned {}: {}",
                status, body
            )))
        } else {
            Err(FetchError::permanent(format!(
                "provider returned {}: {}",
                status, body
            )))
        }
    }
}

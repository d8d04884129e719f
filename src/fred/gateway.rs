//! Outbound HTTP gateway to the FRED API.
//!
//! Every operation goes through [`FredGateway::get_json`], which owns retry,
//! backoff and error classification. Retry policy: exponential backoff from
//! 500 ms, doubling to a cap of 8 s, at most `retry_attempts` attempts, with
//! hash-based jitter of ±20%. Only `rate_limited` and `upstream_unavailable`
//! are retried; `not_found`, `invalid_argument` and `auth_missing` fail
//! immediately. Each attempt carries the soft deadline; the whole call is
//! bounded by the hard deadline.

use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;
use tracing::{debug, warn};

use super::{Category, Frequency, Observation, Release, Series, SeriesId, SeriesMeta, Source};
use crate::config::Config;
use crate::error::{Error, Result};

const DEFAULT_BASE_URL: &str = "https://api.stlouisfed.org/fred";
const BACKOFF_BASE: Duration = Duration::from_millis(500);
const BACKOFF_CAP: Duration = Duration::from_secs(8);
const JITTER_FACTOR: f64 = 0.2;

/// Date format used on the wire and in query parameters.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// HTTP gateway to the series provider.
#[derive(Debug, Clone)]
pub struct FredGateway {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    retry_attempts: u32,
    hard_deadline: Duration,
}

impl FredGateway {
    /// Create a gateway from the server configuration.
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.soft_deadline)
            .build()
            .map_err(|e| Error::internal(format!("http client: {e}")))?;
        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            base_url: DEFAULT_BASE_URL.to_string(),
            retry_attempts: config.retry_attempts,
            hard_deadline: config.hard_deadline,
        })
    }

    /// Point the gateway at a different base URL. Used by tests to target a
    /// local stub server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Search series by free text, ordered by popularity descending.
    pub async fn search(&self, text: &str, limit: usize) -> Result<Vec<SeriesMeta>> {
        let body = self
            .get_json(
                "series/search",
                &[
                    ("search_text", text.to_string()),
                    ("limit", limit.to_string()),
                    ("order_by", "popularity".to_string()),
                    ("sort_order", "desc".to_string()),
                ],
            )
            .await?;
        let decoded: SeriesListBody = serde_json::from_value(body)?;
        decoded.seriess.into_iter().map(WireSeriesMeta::into_meta).collect()
    }

    /// Fetch metadata for one series.
    pub async fn series_meta(&self, id: &SeriesId) -> Result<SeriesMeta> {
        let body = self
            .get_json("series", &[("series_id", id.to_string())])
            .await?;
        let decoded: SeriesListBody = serde_json::from_value(body)?;
        decoded
            .seriess
            .into_iter()
            .next()
            .ok_or_else(|| Error::not_found(format!("series {id} not found")))?
            .into_meta()
    }

    /// Fetch observations for a series within an optional window.
    ///
    /// Omitted bounds mean the full available history. Empty windows return
    /// an empty vector, not an error.
    pub async fn observations(
        &self,
        id: &SeriesId,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<Observation>> {
        let mut params = vec![("series_id", id.to_string())];
        if let Some(start) = start {
            params.push(("observation_start", start.format(DATE_FORMAT).to_string()));
        }
        if let Some(end) = end {
            params.push(("observation_end", end.format(DATE_FORMAT).to_string()));
        }
        let body = self.get_json("series/observations", &params).await?;
        let decoded: ObservationsBody = serde_json::from_value(body)?;

        let mut observations = Vec::with_capacity(decoded.observations.len());
        let mut previous: Option<NaiveDate> = None;
        for wire in decoded.observations {
            let date = parse_date(&wire.date)?;
            if let Some(previous) = previous {
                if date <= previous {
                    return Err(Error::internal(format!(
                        "provider returned non-ascending dates for {id}: {previous} then {date}"
                    )));
                }
            }
            previous = Some(date);
            observations.push(Observation {
                date,
                value: parse_value(&wire.value),
            });
        }
        Ok(observations)
    }

    /// Fetch metadata and observations together.
    pub async fn series(
        &self,
        id: &SeriesId,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Series> {
        let meta = self.series_meta(id).await?;
        let observations = self.observations(id, start, end).await?;
        Ok(Series { meta, observations })
    }

    /// List all releases.
    pub async fn releases(&self) -> Result<Vec<Release>> {
        let body = self.get_json("releases", &[]).await?;
        let decoded: ReleasesBody = serde_json::from_value(body)?;
        Ok(decoded.releases)
    }

    /// Fetch one release by id.
    pub async fn release_details(&self, release_id: i64) -> Result<Release> {
        let body = self
            .get_json("release", &[("release_id", release_id.to_string())])
            .await?;
        let decoded: ReleasesBody = serde_json::from_value(body)?;
        decoded
            .releases
            .into_iter()
            .next()
            .ok_or_else(|| Error::not_found(format!("release {release_id} not found")))
    }

    /// Fetch one category by id.
    pub async fn category_details(&self, category_id: i64) -> Result<Category> {
        let body = self
            .get_json("category", &[("category_id", category_id.to_string())])
            .await?;
        let decoded: CategoriesBody = serde_json::from_value(body)?;
        decoded
            .categories
            .into_iter()
            .next()
            .ok_or_else(|| Error::not_found(format!("category {category_id} not found")))
    }

    /// List all data sources.
    pub async fn sources(&self) -> Result<Vec<Source>> {
        let body = self.get_json("sources", &[]).await?;
        let decoded: SourcesBody = serde_json::from_value(body)?;
        Ok(decoded.sources)
    }

    /// Perform a GET with retry/backoff and classify failures.
    async fn get_json(&self, path: &str, params: &[(&str, String)]) -> Result<serde_json::Value> {
        let call = self.get_json_with_retries(path, params);
        match tokio::time::timeout(self.hard_deadline, call).await {
            Ok(result) => result,
            Err(_) => Err(Error::UpstreamUnavailable(format!(
                "fred/{path}: hard deadline of {:?} exceeded",
                self.hard_deadline
            ))),
        }
    }

    async fn get_json_with_retries(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<serde_json::Value> {
        let url = format!("{}/{}", self.base_url, path);
        let mut delay = BACKOFF_BASE;
        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            match self.attempt(&url, params).await {
                Ok(body) => return Ok(body),
                Err(err) if is_retryable(&err) => {
                    warn!(path, attempt, %err, "gateway attempt failed, backing off");
                    last_error = Some(err);
                    if attempt < self.retry_attempts {
                        tokio::time::sleep(jittered(delay, attempt)).await;
                        delay = (delay * 2).min(BACKOFF_CAP);
                    }
                },
                Err(err) => return Err(err),
            }
        }

        Err(last_error
            .unwrap_or_else(|| Error::UpstreamUnavailable(format!("fred/{path}: no attempts made"))))
    }

    async fn attempt(&self, url: &str, params: &[(&str, String)]) -> Result<serde_json::Value> {
        let mut query: Vec<(&str, &str)> = vec![
            ("api_key", self.api_key.as_str()),
            ("file_type", "json"),
        ];
        for (key, value) in params {
            query.push((key, value.as_str()));
        }

        debug!(url, "gateway request");
        let response = self
            .client
            .get(url)
            .query(&query)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<serde_json::Value>()
                .await
                .map_err(|e| Error::UpstreamUnavailable(format!("invalid provider JSON: {e}")));
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status, &body))
    }
}

/// Whether an error is worth another attempt.
fn is_retryable(err: &Error) -> bool {
    matches!(err, Error::RateLimited(_) | Error::UpstreamUnavailable(_))
}

/// Classify a non-success HTTP status into the error taxonomy.
fn classify_status(status: reqwest::StatusCode, body: &str) -> Error {
    let message = provider_message(body);
    match status.as_u16() {
        401 | 403 => Error::config(format!(
            "FRED API key rejected ({status}): {message}; check FRED_API_KEY"
        )),
        404 => Error::not_found(message),
        429 => Error::RateLimited(message),
        400 => {
            // The provider reports unknown series/release/category ids as 400
            // with an explanatory message.
            let lower = message.to_ascii_lowercase();
            if lower.contains("does not exist") || lower.contains("not found") {
                Error::not_found(message)
            } else {
                Error::invalid_params(message)
            }
        },
        _ if status.is_server_error() => {
            Error::UpstreamUnavailable(format!("provider returned {status}: {message}"))
        },
        _ => Error::UpstreamUnavailable(format!("unexpected status {status}: {message}")),
    }
}

fn classify_reqwest_error(err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::UpstreamUnavailable("request timed out".to_string())
    } else if err.is_connect() {
        Error::UpstreamUnavailable(format!("connection failed: {err}"))
    } else {
        Error::UpstreamUnavailable(err.to_string())
    }
}

/// Pull the `error_message` out of a provider error body, falling back to the
/// raw text.
fn provider_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct ProviderError {
        error_message: String,
    }
    serde_json::from_str::<ProviderError>(body)
        .map(|e| e.error_message)
        .unwrap_or_else(|_| {
            if body.is_empty() {
                "no response body".to_string()
            } else {
                body.chars().take(200).collect()
            }
        })
}

/// Apply ±20% jitter to a delay without an external randomness dependency.
fn jittered(delay: Duration, attempt: u32) -> Duration {
    let mut hasher = DefaultHasher::new();
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos()
        .hash(&mut hasher);
    attempt.hash(&mut hasher);
    let unit = (hasher.finish() % 1_000) as f64 / 1_000.0;
    let factor = 1.0 + (unit * 2.0 - 1.0) * JITTER_FACTOR;
    delay.mul_f64(factor)
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .map_err(|e| Error::internal(format!("provider date {s:?}: {e}")))
}

/// The provider marks missing observations with `"."`.
fn parse_value(s: &str) -> Option<f64> {
    if s == "." {
        None
    } else {
        s.parse::<f64>().ok()
    }
}

// Wire formats. The provider stringifies most scalar fields.

#[derive(Debug, Deserialize)]
struct SeriesListBody {
    #[serde(default)]
    seriess: Vec<WireSeriesMeta>,
}

#[derive(Debug, Deserialize)]
struct WireSeriesMeta {
    id: String,
    title: String,
    units: String,
    #[serde(default)]
    frequency_short: String,
    #[serde(default)]
    seasonal_adjustment: String,
    #[serde(default)]
    observation_start: String,
    #[serde(default)]
    observation_end: String,
    #[serde(default)]
    popularity: i64,
    #[serde(default)]
    notes: Option<String>,
}

impl WireSeriesMeta {
    fn into_meta(self) -> Result<SeriesMeta> {
        Ok(SeriesMeta {
            id: SeriesId::new(self.id)?,
            title: self.title,
            units: self.units,
            frequency: Frequency::from_short(&self.frequency_short),
            seasonal_adjustment: self.seasonal_adjustment,
            observation_start: NaiveDate::parse_from_str(&self.observation_start, DATE_FORMAT)
                .ok(),
            observation_end: NaiveDate::parse_from_str(&self.observation_end, DATE_FORMAT).ok(),
            popularity: self.popularity,
            notes: self.notes,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ObservationsBody {
    #[serde(default)]
    observations: Vec<WireObservation>,
}

#[derive(Debug, Deserialize)]
struct WireObservation {
    date: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct ReleasesBody {
    #[serde(default)]
    releases: Vec<Release>,
}

#[derive(Debug, Deserialize)]
struct CategoriesBody {
    #[serde(default)]
    categories: Vec<Category>,
}

#[derive(Debug, Deserialize)]
struct SourcesBody {
    #[serde(default)]
    sources: Vec<Source>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_values_decode_to_none() {
        assert_eq!(parse_value("."), None);
        assert_eq!(parse_value("3.5"), Some(3.5));
        assert_eq!(parse_value("-0.2"), Some(-0.2));
    }

    #[test]
    fn status_classification() {
        let status = |code: u16| reqwest::StatusCode::from_u16(code).unwrap();
        assert!(matches!(
            classify_status(status(429), ""),
            Error::RateLimited(_)
        ));
        assert!(matches!(
            classify_status(status(503), ""),
            Error::UpstreamUnavailable(_)
        ));
        assert!(matches!(classify_status(status(401), ""), Error::Config(_)));
        assert!(matches!(
            classify_status(
                status(400),
                r#"{"error_code":400,"error_message":"The series does not exist."}"#
            ),
            Error::NotFound(_)
        ));
        assert!(matches!(
            classify_status(
                status(400),
                r#"{"error_code":400,"error_message":"Bad value for limit."}"#
            ),
            Error::InvalidParams(_)
        ));
    }

    #[test]
    fn retryable_errors() {
        assert!(is_retryable(&Error::RateLimited("429".into())));
        assert!(is_retryable(&Error::UpstreamUnavailable("503".into())));
        assert!(!is_retryable(&Error::not_found("GDP")));
        assert!(!is_retryable(&Error::config("no key")));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let base = Duration::from_millis(500);
        for attempt in 0..32 {
            let jittered = jittered(base, attempt);
            assert!(jittered >= base.mul_f64(1.0 - JITTER_FACTOR));
            assert!(jittered <= base.mul_f64(1.0 + JITTER_FACTOR));
        }
    }

    #[test]
    fn observation_body_decodes() {
        let body: ObservationsBody = serde_json::from_str(
            r#"{"observations":[
                {"realtime_start":"2024-01-01","realtime_end":"2024-01-01","date":"2020-01-01","value":"3.5"},
                {"realtime_start":"2024-01-01","realtime_end":"2024-01-01","date":"2020-02-01","value":"."}
            ]}"#,
        )
        .unwrap();
        assert_eq!(body.observations.len(), 2);
        assert_eq!(body.observations[1].value, ".");
    }

    #[test]
    fn provider_message_extraction() {
        assert_eq!(
            provider_message(r#"{"error_code":400,"error_message":"Bad Request."}"#),
            "Bad Request."
        );
        assert_eq!(provider_message(""), "no response body");
    }
}

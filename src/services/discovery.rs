/// TMDB discovery provider
///
/// Maps a FilterObject onto the query parameters of TMDB's `/discover/movie`
/// endpoint and executes exactly one request, first page only. Each filter
/// field maps independently; an absent field emits no parameter at all.
use reqwest::Client as HttpClient;
use serde_json::Value;

use crate::{
    error::{AppError, AppResult},
    models::{genres::map_genres, FilterObject, ResultMovie},
};

const DEFAULT_SORT: &str = "popularity.desc";

/// Trait for movie discovery backends
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait DiscoveryProvider: Send + Sync {
    /// Run one discovery query for the given filters.
    ///
    /// An empty result list is a valid success, distinct from failure.
    async fn discover(&self, filters: &FilterObject) -> AppResult<Vec<ResultMovie>>;
}

#[derive(Clone)]
pub struct TmdbDiscovery {
    http_client: HttpClient,
    read_token: String,
    api_url: String,
}

impl TmdbDiscovery {
    pub fn new(read_token: String, api_url: String) -> Self {
        Self {
            http_client: HttpClient::new(),
            read_token,
            api_url,
        }
    }
}

#[async_trait::async_trait]
impl DiscoveryProvider for TmdbDiscovery {
    async fn discover(&self, filters: &FilterObject) -> AppResult<Vec<ResultMovie>> {
        let url = format!("{}/discover/movie", self.api_url);
        let params = to_query_params(filters);

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(&self.read_token)
            .query(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!(
                "TMDB API returned status {}: {}",
                status, body
            )));
        }

        let payload: Value = response.json().await?;
        let movies = parse_results(&payload);

        tracing::info!(
            results = movies.len(),
            provider = "tmdb",
            "Discovery query completed"
        );

        Ok(movies)
    }
}

/// Builds the discovery query parameters for a FilterObject.
///
/// Absent fields are omitted entirely; an empty-string constraint is never
/// sent. The sort directive defaults to popularity descending.
pub fn to_query_params(filters: &FilterObject) -> Vec<(String, String)> {
    let mut params = vec![
        ("language".to_string(), "en-US".to_string()),
        ("page".to_string(), "1".to_string()),
    ];

    if let Some(genres) = filters.genres.as_ref() {
        let ids = map_genres(genres);
        if !ids.is_empty() {
            params.push(("with_genres".to_string(), ids));
        }
    }

    if let Some(rating) = filters.min_rating {
        params.push(("vote_average.gte".to_string(), rating.to_string()));
    }

    if let Some(year) = filters.year_from {
        params.push((
            "primary_release_date.gte".to_string(),
            format!("{}-01-01", year),
        ));
    }

    if let Some(year) = filters.year_to {
        params.push((
            "primary_release_date.lte".to_string(),
            format!("{}-12-31", year),
        ));
    }

    if let Some(runtime) = filters.max_runtime {
        params.push(("with_runtime.lte".to_string(), runtime.to_string()));
    }

    // Best-effort pass-through; the upstream is the source of truth for
    // keyword matching
    if let Some(keywords) = filters.keywords.as_ref().filter(|k| !k.is_empty()) {
        params.push(("with_keywords".to_string(), keywords.join(",")));
    }

    let sort = filters
        .sort_by
        .clone()
        .unwrap_or_else(|| DEFAULT_SORT.to_string());
    params.push(("sort_by".to_string(), sort));

    params
}

/// Normalizes the upstream payload into ResultMovie rows.
///
/// A payload missing the expected `results` array is an empty result, not an
/// error; rows that fail to deserialize are skipped.
fn parse_results(payload: &Value) -> Vec<ResultMovie> {
    let Some(rows) = payload["results"].as_array() else {
        tracing::warn!("Discovery payload missing results array, treating as empty");
        return Vec::new();
    };

    rows.iter()
        .filter_map(|row| serde_json::from_value::<ResultMovie>(row.clone()).ok())
        .collect()
}

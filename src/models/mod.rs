use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub mod genres;

/// TMDB image CDN base path (w500 rendition)
pub const IMAGE_BASE_URL: &str = "https://image.tmdb.org/t/p/w500";

/// Served in place of a missing poster path
pub const PLACEHOLDER_POSTER: &str = "/placeholder-movie.jpg";

/// How long a saved session stays valid
pub const SESSION_TTL_MINUTES: i64 = 30;

/// Remaining-quota watermark below which the rate limit is considered low
pub const RATE_LIMIT_LOW_WATERMARK: u32 = 5;

/// Structured search constraints derived from a free-text prompt.
///
/// Every field is optional; an absent field imposes no constraint. A
/// FilterObject is produced once per prompt submission and never mutated,
/// only superseded by the next submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct FilterObject {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genres: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_rating: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year_from: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year_to: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_runtime: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<String>,
}

impl FilterObject {
    /// True when no field carries a constraint
    pub fn is_unconstrained(&self) -> bool {
        self.genres.as_ref().map_or(true, |g| g.is_empty())
            && self.min_rating.is_none()
            && self.year_from.is_none()
            && self.year_to.is_none()
            && self.max_runtime.is_none()
            && self.keywords.as_ref().map_or(true, |k| k.is_empty())
            && self.sort_by.is_none()
    }

    /// Human-readable "recommended because" lines, one per active constraint
    pub fn describe(&self) -> Vec<String> {
        let mut reasons = Vec::new();

        if let Some(genres) = self.genres.as_ref().filter(|g| !g.is_empty()) {
            reasons.push(format!("Genres: {}", genres.join(", ")));
        }
        if let Some(rating) = self.min_rating {
            reasons.push(format!("Rating above {}", rating));
        }
        if self.year_from.is_some() || self.year_to.is_some() {
            let from = self
                .year_from
                .map_or_else(|| "any".to_string(), |y| y.to_string());
            let to = self
                .year_to
                .map_or_else(|| "any".to_string(), |y| y.to_string());
            reasons.push(format!("Release period {} - {}", from, to));
        }
        if let Some(runtime) = self.max_runtime {
            reasons.push(format!("Runtime under {} minutes", runtime));
        }
        if let Some(keywords) = self.keywords.as_ref().filter(|k| !k.is_empty()) {
            reasons.push(format!("Keywords: {}", keywords.join(", ")));
        }
        if let Some(sort) = self.sort_by.as_ref() {
            reasons.push(format!("Sorted by {}", sort));
        }

        reasons
    }
}

/// A single movie row as returned by the discovery upstream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultMovie {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub vote_average: f64,
    #[serde(default)]
    pub release_date: Option<String>,
}

impl ResultMovie {
    /// Full poster URL, falling back to the bundled placeholder
    pub fn poster_url(&self) -> String {
        match &self.poster_path {
            Some(path) => format!("{}{}", IMAGE_BASE_URL, path),
            None => PLACEHOLDER_POSTER.to_string(),
        }
    }
}

/// The single-slot session snapshot persisted between visits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedSession {
    pub prompt: String,
    pub filters: Option<FilterObject>,
    pub movies: Vec<ResultMovie>,
    /// Unix epoch milliseconds at write time
    pub timestamp: i64,
}

impl SavedSession {
    pub fn new(
        prompt: String,
        filters: Option<FilterObject>,
        movies: Vec<ResultMovie>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            prompt,
            filters,
            movies,
            timestamp: now.timestamp_millis(),
        }
    }

    /// A session is valid only while less than 30 minutes old
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now.timestamp_millis() - self.timestamp
            >= Duration::minutes(SESSION_TTL_MINUTES).num_milliseconds()
    }
}

/// Client-visible rate-limit view, derived from the most recent upstream
/// response headers. Held in memory only; never persisted across restarts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateLimitState {
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl Default for RateLimitState {
    fn default() -> Self {
        Self {
            limit: 20,
            remaining: 20,
            reset_at: None,
            retry_after: None,
        }
    }
}

impl RateLimitState {
    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }

    pub fn is_low(&self) -> bool {
        self.remaining > 0 && self.remaining <= RATE_LIMIT_LOW_WATERMARK
    }

    /// Renders the wait until reset as "N minute(s)" under an hour,
    /// otherwise "N hour(s)", rounding up
    pub fn format_reset_time(&self, now: DateTime<Utc>) -> Option<String> {
        let reset_at = self.reset_at?;
        let diff_ms = (reset_at - now).num_milliseconds().max(0);

        let minutes = (diff_ms + 59_999) / 60_000;
        if minutes < 60 {
            Some(format!(
                "{} minute{}",
                minutes,
                if minutes != 1 { "s" } else { "" }
            ))
        } else {
            let hours = (diff_ms + 3_599_999) / 3_600_000;
            Some(format!("{} hour{}", hours, if hours != 1 { "s" } else { "" }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_filter_object_all_fields_optional() {
        let filters: FilterObject = serde_json::from_str("{}").unwrap();
        assert!(filters.is_unconstrained());
        assert!(filters.describe().is_empty());
    }

    #[test]
    fn test_filter_object_ignores_unknown_fields() {
        let filters: FilterObject =
            serde_json::from_str(r#"{"min_rating": 7.5, "mood": "dark"}"#).unwrap();
        assert_eq!(filters.min_rating, Some(7.5));
        assert!(!filters.is_unconstrained());
    }

    #[test]
    fn test_filter_object_serializes_without_absent_fields() {
        let filters = FilterObject {
            min_rating: Some(7.0),
            ..Default::default()
        };
        let json = serde_json::to_string(&filters).unwrap();
        assert_eq!(json, r#"{"min_rating":7.0}"#);
    }

    #[test]
    fn test_describe_release_period_open_ended() {
        let filters = FilterObject {
            year_from: Some(2018),
            ..Default::default()
        };
        assert_eq!(filters.describe(), vec!["Release period 2018 - any"]);
    }

    #[test]
    fn test_poster_url_with_path() {
        let movie = ResultMovie {
            id: 78,
            title: "Blade Runner".to_string(),
            poster_path: Some("/63N9uy8nd9j7Eog2axPQ8lbr3Wj.jpg".to_string()),
            vote_average: 7.9,
            release_date: Some("1982-06-25".to_string()),
        };
        assert_eq!(
            movie.poster_url(),
            "https://image.tmdb.org/t/p/w500/63N9uy8nd9j7Eog2axPQ8lbr3Wj.jpg"
        );
    }

    #[test]
    fn test_poster_url_placeholder() {
        let movie = ResultMovie {
            id: 1,
            title: "Obscure".to_string(),
            poster_path: None,
            vote_average: 0.0,
            release_date: None,
        };
        assert_eq!(movie.poster_url(), PLACEHOLDER_POSTER);
    }

    #[test]
    fn test_session_not_expired_before_cutoff() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let session = SavedSession::new("heist movies".to_string(), None, vec![], now);
        let later = now + Duration::minutes(29);
        assert!(!session.is_expired(later));
    }

    #[test]
    fn test_session_expired_at_cutoff() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let session = SavedSession::new("heist movies".to_string(), None, vec![], now);
        assert!(session.is_expired(now + Duration::minutes(30)));
        assert!(session.is_expired(now + Duration::hours(2)));
    }

    #[test]
    fn test_rate_limit_exhausted() {
        let state = RateLimitState {
            limit: 20,
            remaining: 0,
            reset_at: None,
            retry_after: None,
        };
        assert!(state.is_exhausted());
        assert!(!state.is_low());
    }

    #[test]
    fn test_rate_limit_low() {
        let state = RateLimitState {
            limit: 20,
            remaining: 3,
            reset_at: None,
            retry_after: None,
        };
        assert!(state.is_low());
        assert!(!state.is_exhausted());
    }

    #[test]
    fn test_rate_limit_healthy() {
        let state = RateLimitState {
            limit: 20,
            remaining: 10,
            reset_at: None,
            retry_after: None,
        };
        assert!(!state.is_low());
        assert!(!state.is_exhausted());
    }

    #[test]
    fn test_format_reset_time_minutes() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let state = RateLimitState {
            reset_at: Some(now + Duration::minutes(25)),
            ..Default::default()
        };
        assert_eq!(state.format_reset_time(now), Some("25 minutes".to_string()));
    }

    #[test]
    fn test_format_reset_time_single_hour() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let state = RateLimitState {
            reset_at: Some(now + Duration::seconds(3600)),
            ..Default::default()
        };
        assert_eq!(state.format_reset_time(now), Some("1 hour".to_string()));
    }

    #[test]
    fn test_format_reset_time_rounds_up_to_hours() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let state = RateLimitState {
            reset_at: Some(now + Duration::minutes(90)),
            ..Default::default()
        };
        assert_eq!(state.format_reset_time(now), Some("2 hours".to_string()));
    }

    #[test]
    fn test_format_reset_time_absent() {
        let state = RateLimitState::default();
        assert_eq!(state.format_reset_time(Utc::now()), None);
    }
}

/// Intent extraction provider
///
/// Turns a free-text prompt into a structured FilterObject by issuing one
/// request to an OpenAI-compatible chat-completions endpoint with a system
/// instruction constraining the output shape. The completion is not trusted
/// to contain only JSON; the first balanced object span is extracted and
/// parsed.
use chrono::{DateTime, TimeZone, Utc};
use reqwest::{header::HeaderMap, Client as HttpClient, StatusCode};
use serde::Deserialize;
use serde_json::json;

use crate::{
    error::{AppError, AppResult},
    models::{FilterObject, RateLimitState},
    services::json_extract::extract_json_object,
};

const SYSTEM_PROMPT: &str = "You are a movie discovery assistant. Convert the user's request into \
search filters. Respond ONLY with a valid JSON object using these optional fields: genres (array \
of genre names), min_rating (number, 0-10), year_from (number), year_to (number), max_runtime \
(number, minutes), keywords (array of strings), sort_by (string such as \"popularity.desc\" or \
\"vote_average.desc\"). Omit every field the request does not constrain.";

const MAX_TOKENS: u32 = 250;
const TEMPERATURE: f64 = 0.7;

/// Result of one intent extraction call: the parsed filters plus whatever
/// rate-limit view the response headers carried
#[derive(Debug, Clone)]
pub struct IntentReply {
    pub filters: FilterObject,
    pub rate_limit: Option<RateLimitState>,
}

/// Trait for intent extraction backends
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait IntentExtractor: Send + Sync {
    /// Extract a FilterObject from a non-empty prompt.
    ///
    /// Issues exactly one upstream request; never retries. Callers must
    /// guarantee the prompt is non-empty after trimming.
    async fn extract(&self, prompt: &str) -> AppResult<IntentReply>;
}

#[derive(Clone)]
pub struct OpenAiIntentExtractor {
    http_client: HttpClient,
    api_key: String,
    api_url: String,
    model: String,
}

impl OpenAiIntentExtractor {
    pub fn new(api_key: String, api_url: String, model: String) -> Self {
        Self {
            http_client: HttpClient::new(),
            api_key,
            api_url,
            model,
        }
    }
}

#[async_trait::async_trait]
impl IntentExtractor for OpenAiIntentExtractor {
    async fn extract(&self, prompt: &str) -> AppResult<IntentReply> {
        let url = format!("{}/chat/completions", self.api_url);

        let body = json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "temperature": TEMPERATURE,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": prompt },
            ],
        });

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let rate_limit = parse_rate_limit_headers(response.headers());

        if status == StatusCode::TOO_MANY_REQUESTS {
            let body = response.text().await.unwrap_or_default();
            return Err(rate_limited_error(&body, rate_limit));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!(
                "Intent endpoint returned status {}: {}",
                status, body
            )));
        }

        let text = response.text().await?;
        let filters = filters_from_body(&text)?;

        tracing::info!(
            prompt_len = prompt.len(),
            unconstrained = filters.is_unconstrained(),
            "Intent extracted"
        );

        Ok(IntentReply {
            filters,
            rate_limit,
        })
    }
}

/// Parses a FilterObject out of a success body.
///
/// The body is either a chat-completion envelope whose message content holds
/// the object somewhere in free text, or the object itself. Both paths go
/// through the balanced-span extractor before serde.
pub fn filters_from_body(body: &str) -> AppResult<FilterObject> {
    #[derive(Deserialize)]
    struct ChatCompletion {
        choices: Vec<Choice>,
    }

    #[derive(Deserialize)]
    struct Choice {
        message: ChatMessage,
    }

    #[derive(Deserialize)]
    struct ChatMessage {
        content: Option<String>,
    }

    let content = match serde_json::from_str::<ChatCompletion>(body) {
        Ok(completion) => completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AppError::Parse("completion had no message content".to_string()))?,
        // Not an envelope; treat the body itself as the model output
        Err(_) => body.to_string(),
    };

    let span = extract_json_object(&content)?;
    serde_json::from_str(span).map_err(|e| AppError::Parse(format!("invalid filter JSON: {}", e)))
}

/// Builds a rate-limit view from `X-RateLimit-*` response headers.
///
/// Returns `None` when no header is present so the caller leaves its prior
/// state untouched. Missing limit/remaining fall back to the upstream's
/// documented quota of 20.
pub fn parse_rate_limit_headers(headers: &HeaderMap) -> Option<RateLimitState> {
    let limit = header_value(headers, "X-RateLimit-Limit");
    let remaining = header_value(headers, "X-RateLimit-Remaining");
    let reset_at = headers
        .get("X-RateLimit-Reset")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    if limit.is_none() && remaining.is_none() && reset_at.is_none() {
        return None;
    }

    Some(RateLimitState {
        limit: limit.unwrap_or(20),
        remaining: remaining.unwrap_or(20),
        reset_at: reset_at.as_deref().and_then(parse_reset_timestamp),
        retry_after: None,
    })
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<u32> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok())
}

/// Accepts RFC 3339 strings or unix epoch seconds
fn parse_reset_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    raw.parse::<i64>()
        .ok()
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
}

/// Maps a 429 body (`{message, limit, resetAt, retryAfter}`) onto the
/// rate-limited error, preferring header-derived metadata where both exist
fn rate_limited_error(body: &str, header_state: Option<RateLimitState>) -> AppError {
    #[derive(Deserialize, Default)]
    struct RateLimitBody {
        message: Option<String>,
        limit: Option<u32>,
        #[serde(rename = "resetAt")]
        reset_at: Option<String>,
        #[serde(rename = "retryAfter")]
        retry_after: Option<u64>,
    }

    let parsed: RateLimitBody = serde_json::from_str(body).unwrap_or_default();
    let header_state = header_state.unwrap_or_default();

    AppError::RateLimited {
        message: parsed
            .message
            .unwrap_or_else(|| "Rate limit exceeded".to_string()),
        limit: parsed.limit.unwrap_or(header_state.limit),
        reset_at: parsed
            .reset_at
            .as_deref()
            .and_then(parse_reset_timestamp)
            .or(header_state.reset_at),
        retry_after: parsed.retry_after,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_filters_from_envelope_body() {
        let body = r#"{
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": "Here you go:\n{\"genres\": [\"Science Fiction\"], \"min_rating\": 7}"
                }
            }]
        }"#;

        let filters = filters_from_body(body).unwrap();
        assert_eq!(filters.genres, Some(vec!["Science Fiction".to_string()]));
        assert_eq!(filters.min_rating, Some(7.0));
    }

    #[test]
    fn test_filters_from_raw_object_body() {
        let body = r#"{"year_from": 2018, "sort_by": "popularity.desc"}"#;
        let filters = filters_from_body(body).unwrap();
        assert_eq!(filters.year_from, Some(2018));
        assert_eq!(filters.sort_by, Some("popularity.desc".to_string()));
    }

    #[test]
    fn test_filters_from_body_no_json_is_parse_error() {
        let body = r#"{
            "choices": [{
                "message": { "role": "assistant", "content": "I cannot help with that." }
            }]
        }"#;

        let err = filters_from_body(body).unwrap_err();
        assert!(matches!(err, AppError::Parse(_)));
    }

    #[test]
    fn test_filters_from_body_invalid_filter_json_is_parse_error() {
        let body = r#"{
            "choices": [{
                "message": { "role": "assistant", "content": "{\"min_rating\": \"not-a-number\"}" }
            }]
        }"#;

        let err = filters_from_body(body).unwrap_err();
        assert!(matches!(err, AppError::Parse(_)));
    }

    #[test]
    fn test_parse_rate_limit_headers_all_present() {
        let mut headers = HeaderMap::new();
        headers.insert("X-RateLimit-Limit", HeaderValue::from_static("20"));
        headers.insert("X-RateLimit-Remaining", HeaderValue::from_static("12"));
        headers.insert(
            "X-RateLimit-Reset",
            HeaderValue::from_static("2024-01-01T00:00:00Z"),
        );

        let state = parse_rate_limit_headers(&headers).unwrap();
        assert_eq!(state.limit, 20);
        assert_eq!(state.remaining, 12);
        assert!(state.reset_at.is_some());
    }

    #[test]
    fn test_parse_rate_limit_headers_partial_defaults() {
        let mut headers = HeaderMap::new();
        headers.insert("X-RateLimit-Remaining", HeaderValue::from_static("3"));

        let state = parse_rate_limit_headers(&headers).unwrap();
        assert_eq!(state.limit, 20);
        assert_eq!(state.remaining, 3);
        assert_eq!(state.reset_at, None);
    }

    #[test]
    fn test_parse_rate_limit_headers_absent() {
        let headers = HeaderMap::new();
        assert!(parse_rate_limit_headers(&headers).is_none());
    }

    #[test]
    fn test_parse_reset_timestamp_epoch_seconds() {
        let parsed = parse_reset_timestamp("1704067200").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2024-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_rate_limited_error_from_body() {
        let body = r#"{
            "message": "Rate limit exceeded. Try again later.",
            "limit": 20,
            "resetAt": "2024-01-01T00:00:00Z",
            "retryAfter": 3600
        }"#;

        match rate_limited_error(body, None) {
            AppError::RateLimited {
                message,
                limit,
                reset_at,
                retry_after,
            } => {
                assert_eq!(message, "Rate limit exceeded. Try again later.");
                assert_eq!(limit, 20);
                assert_eq!(reset_at.unwrap().to_rfc3339(), "2024-01-01T00:00:00+00:00");
                assert_eq!(retry_after, Some(3600));
            }
            other => panic!("expected RateLimited, got {:?}", other),
        }
    }

    #[test]
    fn test_rate_limited_error_garbage_body_uses_defaults() {
        match rate_limited_error("<html>too many requests</html>", None) {
            AppError::RateLimited { message, limit, .. } => {
                assert_eq!(message, "Rate limit exceeded");
                assert_eq!(limit, 20);
            }
            other => panic!("expected RateLimited, got {:?}", other),
        }
    }
}

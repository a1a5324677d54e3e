/// Two-stage discovery pipeline and its state machine
///
/// User prompt → intent extraction → filter-to-query discovery → results.
/// The stages are strictly sequential: the discovery request is never issued
/// until intent extraction resolves, because its input is the first stage's
/// output.
///
/// State lives in an explicit struct updated through a single reducer, with
/// each external event as a discriminated action. Overlap is handled by a
/// single-flight guard plus a request sequence number: a submission is
/// ignored while one is outstanding, and a response is applied only if its
/// sequence number is the latest issued, so a slow response can never
/// overwrite newer state.
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;

use crate::{
    db::SessionStore,
    error::{AppError, AppResult},
    models::{FilterObject, RateLimitState, ResultMovie, SavedSession},
    services::{discovery::DiscoveryProvider, intent::IntentExtractor},
};

pub const NO_RESULTS_MESSAGE: &str =
    "No movies found matching your criteria. Try a different description.";

/// The discovery view state: last prompt, the filters derived from it, the
/// movies those filters matched, and the surfaced error, if any
#[derive(Debug, Clone, Default)]
pub struct DiscoverState {
    pub prompt: String,
    pub filters: Option<FilterObject>,
    pub movies: Vec<ResultMovie>,
    pub error: Option<String>,
    in_flight: Option<u64>,
    last_seq: u64,
}

/// External events driving the reducer
#[derive(Debug)]
pub enum Action {
    FiltersReceived {
        seq: u64,
        filters: FilterObject,
    },
    ResultsReceived {
        seq: u64,
        movies: Vec<ResultMovie>,
    },
    Failed {
        seq: u64,
        message: String,
    },
    Restored {
        session: SavedSession,
    },
    Cleared,
}

impl DiscoverState {
    /// Single-flight guard. Returns `None` while a request is outstanding;
    /// otherwise issues the next sequence number and clears prior
    /// filters/results/error before the attempt, so a failed attempt can
    /// never show stale filters next to new results.
    pub fn try_begin(&mut self, prompt: &str) -> Option<u64> {
        if self.in_flight.is_some() {
            return None;
        }

        self.last_seq += 1;
        let seq = self.last_seq;
        self.in_flight = Some(seq);
        self.prompt = prompt.to_string();
        self.filters = None;
        self.movies.clear();
        self.error = None;
        Some(seq)
    }

    /// Applies one action. Sequence-carrying actions are dropped when their
    /// seq is not the latest issued.
    pub fn reduce(&mut self, action: Action) {
        match action {
            Action::FiltersReceived { seq, filters } => {
                if seq != self.last_seq {
                    tracing::debug!(seq, latest = self.last_seq, "Dropping stale filters");
                    return;
                }
                self.filters = Some(filters);
            }
            Action::ResultsReceived { seq, movies } => {
                if seq != self.last_seq {
                    tracing::debug!(seq, latest = self.last_seq, "Dropping stale results");
                    return;
                }
                self.error = if movies.is_empty() {
                    Some(NO_RESULTS_MESSAGE.to_string())
                } else {
                    None
                };
                self.movies = movies;
                self.in_flight = None;
            }
            Action::Failed { seq, message } => {
                if seq != self.last_seq {
                    tracing::debug!(seq, latest = self.last_seq, "Dropping stale failure");
                    return;
                }
                self.error = Some(message);
                self.in_flight = None;
            }
            Action::Restored { session } => {
                self.prompt = session.prompt;
                self.filters = session.filters;
                self.movies = session.movies;
                self.error = None;
            }
            Action::Cleared => {
                self.prompt.clear();
                self.filters = None;
                self.movies.clear();
                self.error = None;
                // Invalidate any in-flight response rather than wait for it
                self.last_seq += 1;
                self.in_flight = None;
            }
        }
    }
}

/// Outcome of a submission attempt
#[derive(Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Empty prompt or overlapping submission; nothing was dispatched
    Ignored,
    /// Both stages resolved and state was updated
    Completed,
}

/// Owns the pipeline state and its upstream collaborators
pub struct DiscoverPipeline {
    intent: Arc<dyn IntentExtractor>,
    discovery: Arc<dyn DiscoveryProvider>,
    sessions: Arc<dyn SessionStore>,
    state: RwLock<DiscoverState>,
    rate_limit: RwLock<RateLimitState>,
}

impl DiscoverPipeline {
    pub fn new(
        intent: Arc<dyn IntentExtractor>,
        discovery: Arc<dyn DiscoveryProvider>,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            intent,
            discovery,
            sessions,
            state: RwLock::new(DiscoverState::default()),
            rate_limit: RwLock::new(RateLimitState::default()),
        }
    }

    /// Restores the saved session into memory, if one is live
    pub async fn restore(&self) {
        if let Some(session) = self.sessions.load().await {
            tracing::info!(
                prompt = %session.prompt,
                movies = session.movies.len(),
                "Restored saved session"
            );
            self.state.write().await.reduce(Action::Restored { session });
        }
    }

    /// Current view state and rate-limit view
    pub async fn snapshot(&self) -> (DiscoverState, RateLimitState) {
        let state = self.state.read().await.clone();
        let rate_limit = self.rate_limit.read().await.clone();
        (state, rate_limit)
    }

    /// Clears the stored session and resets the in-memory state
    pub async fn clear(&self) {
        self.sessions.clear().await;
        self.state.write().await.reduce(Action::Cleared);
    }

    /// Runs the two-stage flow for one prompt submission.
    ///
    /// Empty prompts and overlapping submissions are silent no-ops. Stage
    /// two is never attempted when stage one fails.
    pub async fn submit(&self, prompt: &str) -> AppResult<SubmitOutcome> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Ok(SubmitOutcome::Ignored);
        }

        // Quota already exhausted with a reset still ahead: fail fast
        // without spending the upstream call
        {
            let rate_limit = self.rate_limit.read().await;
            if rate_limit.is_exhausted() {
                if let Some(reset_at) = rate_limit.reset_at.filter(|t| *t > Utc::now()) {
                    return Err(AppError::RateLimited {
                        message: rate_limited_message(
                            "Rate limit exceeded.".to_string(),
                            &rate_limit,
                        ),
                        limit: rate_limit.limit,
                        reset_at: Some(reset_at),
                        retry_after: rate_limit.retry_after,
                    });
                }
            }
        }

        let Some(seq) = self.state.write().await.try_begin(prompt) else {
            tracing::debug!("Submission ignored, request already in flight");
            return Ok(SubmitOutcome::Ignored);
        };

        // Stage one: prompt → filters
        let filters = match self.intent.extract(prompt).await {
            Ok(reply) => {
                if let Some(snapshot) = reply.rate_limit {
                    *self.rate_limit.write().await = snapshot;
                }
                self.state.write().await.reduce(Action::FiltersReceived {
                    seq,
                    filters: reply.filters.clone(),
                });
                reply.filters
            }
            Err(e) => return Err(self.fail(seq, e).await),
        };

        // Stage two: filters → movies
        let movies = match self.discovery.discover(&filters).await {
            Ok(movies) => movies,
            Err(e) => return Err(self.fail(seq, e).await),
        };

        tracing::info!(results = movies.len(), "Discovery pipeline completed");
        self.state
            .write()
            .await
            .reduce(Action::ResultsReceived { seq, movies });

        self.persist(seq).await;
        Ok(SubmitOutcome::Completed)
    }

    /// Records a stage failure and maps rate-limit metadata into the
    /// tracked quota view and the surfaced message
    async fn fail(&self, seq: u64, error: AppError) -> AppError {
        let error = match error {
            AppError::RateLimited {
                message,
                limit,
                reset_at,
                retry_after,
            } => {
                let snapshot = RateLimitState {
                    limit,
                    remaining: 0,
                    reset_at,
                    retry_after,
                };
                let message = rate_limited_message(message, &snapshot);
                *self.rate_limit.write().await = snapshot;
                AppError::RateLimited {
                    message,
                    limit,
                    reset_at,
                    retry_after,
                }
            }
            other => other,
        };

        self.state.write().await.reduce(Action::Failed {
            seq,
            message: error.to_string(),
        });
        error
    }

    /// Writes the current tuple to the session slot, unless a newer
    /// submission has superseded this one
    async fn persist(&self, seq: u64) {
        let state = self.state.read().await;
        if state.last_seq != seq {
            return;
        }

        let session = SavedSession::new(
            state.prompt.clone(),
            state.filters.clone(),
            state.movies.clone(),
            Utc::now(),
        );
        self.sessions.save_in_background(&session);
    }
}

fn rate_limited_message(message: String, state: &RateLimitState) -> String {
    match state.format_reset_time(Utc::now()) {
        Some(wait) => format!("{} Try again in {}.", message.trim_end(), wait),
        None => message,
    }
}

use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use redis::Client;
use tokio::sync::mpsc;

use crate::models::{SavedSession, SESSION_TTL_MINUTES};

/// Fixed storage key for the single-slot session cache
const SESSION_KEY: &str = "ai:discover:session";

const SESSION_TTL_SECONDS: u64 = SESSION_TTL_MINUTES as u64 * 60;

/// Creates a Redis client for the session store
pub fn create_redis_client(redis_url: &str) -> anyhow::Result<Client> {
    let client = Client::open(redis_url)?;
    Ok(client)
}

/// Single-slot session persistence.
///
/// Storage is strictly best-effort: every failure (connection, corrupt JSON)
/// is logged and mapped to "no saved state" or a dropped write. Storage
/// problems never surface to callers.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    /// Loads the saved session, treating expired or unreadable entries as
    /// absent. Expired entries are removed.
    async fn load(&self) -> Option<SavedSession>;

    /// Overwrites the session slot without blocking the caller
    fn save_in_background(&self, session: &SavedSession);

    /// Removes the session slot
    async fn clear(&self);
}

/// Message for asynchronous session writes
struct SessionWriteMessage {
    value: String,
}

/// Redis-backed session store with a write-behind worker
#[derive(Clone)]
pub struct RedisSessionStore {
    redis_client: Client,
    write_tx: mpsc::UnboundedSender<SessionWriteMessage>,
}

/// Handle for gracefully shutting down the session writer
pub struct SessionWriterHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl SessionWriterHandle {
    /// Signals the writer task to flush pending writes and stop
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        tracing::info!("Session writer shutdown signal sent");
    }
}

impl RedisSessionStore {
    /// Creates the store and spawns the background writer task.
    ///
    /// Writes go through a channel so saving a session never blocks the
    /// request path on Redis.
    pub fn new(redis_client: Client) -> (Self, SessionWriterHandle) {
        let (write_tx, write_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let client = redis_client.clone();
        tokio::spawn(async move {
            Self::session_writer_task(client, write_rx, shutdown_rx).await;
        });

        let store = Self {
            redis_client,
            write_tx,
        };

        (store, SessionWriterHandle { shutdown_tx })
    }

    /// Background task that drains session write messages
    async fn session_writer_task(
        client: Client,
        mut write_rx: mpsc::UnboundedReceiver<SessionWriteMessage>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        tracing::info!("Session writer task started");

        loop {
            tokio::select! {
                Some(msg) = write_rx.recv() => {
                    if let Err(e) = Self::write_to_redis(&client, msg).await {
                        tracing::warn!(error = %e, "Failed to write session to Redis");
                    }
                }
                _ = shutdown_rx.recv() => {
                    // Flush whatever is still queued before exiting
                    while let Ok(msg) = write_rx.try_recv() {
                        if let Err(e) = Self::write_to_redis(&client, msg).await {
                            tracing::warn!(error = %e, "Failed to flush session write during shutdown");
                        }
                    }

                    tracing::info!("Session writer task stopped");
                    break;
                }
            }
        }
    }

    async fn write_to_redis(client: &Client, msg: SessionWriteMessage) -> redis::RedisResult<()> {
        let mut conn = client.get_multiplexed_async_connection().await?;
        let _: () = conn.set_ex(SESSION_KEY, msg.value, SESSION_TTL_SECONDS).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl SessionStore for RedisSessionStore {
    async fn load(&self) -> Option<SavedSession> {
        let mut conn = match self.redis_client.get_multiplexed_async_connection().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!(error = %e, "Session store unavailable, treating as empty");
                return None;
            }
        };

        let cached: Option<String> = match conn.get(SESSION_KEY).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read session, treating as empty");
                return None;
            }
        };

        let json = cached?;
        match decode_session(&json, Utc::now()) {
            Some(session) => Some(session),
            None => {
                // Expired or corrupt; drop the entry rather than return stale data
                let _: Result<(), _> = conn.del(SESSION_KEY).await;
                None
            }
        }
    }

    fn save_in_background(&self, session: &SavedSession) {
        let value = match serde_json::to_string(session) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(error = %e, "Session serialization error, dropping write");
                return;
            }
        };

        if self.write_tx.send(SessionWriteMessage { value }).is_err() {
            tracing::warn!("Session writer unavailable, dropping write");
        }
    }

    async fn clear(&self) {
        let mut conn = match self.redis_client.get_multiplexed_async_connection().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!(error = %e, "Session store unavailable, nothing to clear");
                return;
            }
        };

        if let Err(e) = conn.del::<_, ()>(SESSION_KEY).await {
            tracing::warn!(error = %e, "Failed to clear session");
        }
    }
}

/// Parses a stored session, rejecting corrupt JSON and entries at or past the
/// 30-minute expiry
fn decode_session(json: &str, now: DateTime<Utc>) -> Option<SavedSession> {
    let session: SavedSession = match serde_json::from_str(json) {
        Ok(session) => session,
        Err(e) => {
            tracing::warn!(error = %e, "Corrupt saved session, treating as empty");
            return None;
        }
    };

    if session.is_expired(now) {
        tracing::debug!("Saved session expired, discarding");
        return None;
    }

    Some(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FilterObject;
    use chrono::{Duration, TimeZone};

    fn sample_session(now: DateTime<Utc>) -> SavedSession {
        SavedSession::new(
            "dark sci-fi".to_string(),
            Some(FilterObject {
                genres: Some(vec!["Science Fiction".to_string()]),
                min_rating: Some(7.0),
                ..Default::default()
            }),
            vec![],
            now,
        )
    }

    #[test]
    fn test_decode_session_round_trip() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let session = sample_session(now);
        let json = serde_json::to_string(&session).unwrap();

        let restored = decode_session(&json, now + Duration::minutes(5)).unwrap();
        assert_eq!(restored, session);
    }

    #[test]
    fn test_decode_session_expired_is_absent() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let session = sample_session(now);
        let json = serde_json::to_string(&session).unwrap();

        assert!(decode_session(&json, now + Duration::minutes(30)).is_none());
    }

    #[test]
    fn test_decode_session_corrupt_json_is_absent() {
        assert!(decode_session("{not json", Utc::now()).is_none());
    }

    #[test]
    fn test_decode_session_wrong_shape_is_absent() {
        assert!(decode_session(r#"{"unexpected": true}"#, Utc::now()).is_none());
    }
}

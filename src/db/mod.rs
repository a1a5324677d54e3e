pub mod session;

pub use session::{create_redis_client, RedisSessionStore, SessionStore, SessionWriterHandle};

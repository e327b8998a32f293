use async_trait::async_trait;
use journey_core::{CacheBackend, CasOutcome, StoreError, StoreResult, repository::DEFAULT_LOCK_TTL};
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::time::Duration;
use tracing::info;

const CAS_SCRIPT: &str = r#"
    if redis.call("GET", KEYS[1]) == ARGV[1] then
        redis.call("SET", KEYS[1], ARGV[2])
        return 1
    else
        return 0
    end
"#;

const UNLOCK_SCRIPT: &str = r#"
    if redis.call("GET", KEYS[1]) == ARGV[1] then
        return redis.call("DEL", KEYS[1])
    else
        return 0
    end
"#;

fn unavailable(err: redis::RedisError) -> StoreError {
    StoreError::Unavailable(err.to_string())
}

#[derive(Clone)]
pub struct RedisCache {
    conn: MultiplexedConnection,
    cas_script: redis::Script,
    unlock_script: redis::Script,
    lock_ttl: Duration,
}

impl RedisCache {
    pub async fn new(connection_string: &str) -> StoreResult<Self> {
        Self::with_lock_ttl(connection_string, DEFAULT_LOCK_TTL).await
    }

    pub async fn with_lock_ttl(connection_string: &str, lock_ttl: Duration) -> StoreResult<Self> {
        let client = redis::Client::open(connection_string).map_err(unavailable)?;
        let mut conn = client.get_multiplexed_async_connection().await.map_err(unavailable)?;

        let pong: String = redis::cmd("PING").query_async(&mut conn).await.map_err(unavailable)?;
        info!("Redis connection established: {}", pong);

        Ok(Self {
            conn,
            cas_script: redis::Script::new(CAS_SCRIPT),
            unlock_script: redis::Script::new(UNLOCK_SCRIPT),
            lock_ttl,
        })
    }
}

#[async_trait]
impl CacheBackend for RedisCache {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(unavailable)
    }

    async fn set(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(key, value).await.map_err(unavailable)
    }

    async fn try_lock(&self, key: &str, token: &str, ttl: Duration) -> StoreResult<bool> {
        let mut conn = self.conn.clone();

        // SET NX: Only set if key does not exist
        let result: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(token)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;

        Ok(result.is_some())
    }

    async fn unlock(&self, key: &str, token: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: i64 = self
            .unlock_script
            .key(key)
            .arg(token)
            .invoke_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    fn lock_ttl(&self) -> Duration {
        self.lock_ttl
    }

    /// GET-compare-SET in one script, so Redis runs it atomically.
    async fn compare_and_set(&self, key: &str, expected: &[u8], value: &[u8]) -> StoreResult<CasOutcome> {
        let mut conn = self.conn.clone();
        let applied: i64 = self
            .cas_script
            .key(key)
            .arg(expected)
            .arg(value)
            .invoke_async(&mut conn)
            .await
            .map_err(unavailable)?;

        Ok(if applied == 1 { CasOutcome::Applied } else { CasOutcome::Mismatch })
    }
}

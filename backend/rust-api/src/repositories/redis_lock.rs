use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::time::Duration;
use uuid::Uuid;

use super::SubmissionLock;

// Deletes the key only if it still holds our token
const RELEASE_SCRIPT: &str = r#"
    if redis.call('GET', KEYS[1]) == ARGV[1] then
        return redis.call('DEL', KEYS[1])
    end
    return 0
"#;

#[derive(Clone)]
pub struct RedisSubmissionLock {
    redis: ConnectionManager,
}

impl RedisSubmissionLock {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl SubmissionLock for RedisSubmissionLock {
    async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<Option<String>> {
        let token = Uuid::new_v4().to_string();
        let mut conn = self.redis.clone();

        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(&token)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await
            .context("Failed to acquire submission lock")?;

        Ok(reply.map(|_| token))
    }

    async fn release(&self, key: &str, token: &str) -> Result<()> {
        let mut conn = self.redis.clone();

        let _: i32 = redis::Script::new(RELEASE_SCRIPT)
            .key(key)
            .arg(token)
            .invoke_async(&mut conn)
            .await
            .context("Failed to release submission lock")?;

        Ok(())
    }
}

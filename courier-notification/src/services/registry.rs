//! Connection registry: which live connection, if any, can reach a user.

use async_trait::async_trait;

use courier_shared::clients::redis::RedisClient;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("registry unavailable: {0}")]
    Unavailable(#[from] redis::RedisError),
}

#[async_trait]
pub trait ConnectionRegistry: Send + Sync {
    /// Record (or refresh) a live connection for a user.
    async fn register(&self, connection_id: &str, user_id: &str) -> Result<(), RegistryError>;

    async fn unregister(&self, connection_id: &str) -> Result<(), RegistryError>;

    /// Any one live connection for the user. Several may exist; which one is
    /// returned is unspecified.
    async fn lookup(&self, user_id: &str) -> Result<Option<String>, RegistryError>;

    async fn ping(&self) -> Result<(), RegistryError>;
}

/// Redis layout:
/// - `courier:conn:{connection_id}` -> user id, expiring after `ttl_secs`
/// - `courier:user_conns:{user_id}` -> set of connection ids
#[derive(Clone)]
pub struct RedisConnectionRegistry {
    redis: RedisClient,
    ttl_secs: u64,
}

impl RedisConnectionRegistry {
    pub fn new(redis: RedisClient, ttl_secs: u64) -> Self {
        Self { redis, ttl_secs }
    }

    fn connection_key(connection_id: &str) -> String {
        format!("courier:conn:{connection_id}")
    }

    fn user_key(user_id: &str) -> String {
        format!("courier:user_conns:{user_id}")
    }
}

#[async_trait]
impl ConnectionRegistry for RedisConnectionRegistry {
    async fn register(&self, connection_id: &str, user_id: &str) -> Result<(), RegistryError> {
        self.redis
            .set(&Self::connection_key(connection_id), user_id, self.ttl_secs)
            .await?;
        self.redis.sadd(&Self::user_key(user_id), connection_id).await?;
        Ok(())
    }

    async fn unregister(&self, connection_id: &str) -> Result<(), RegistryError> {
        let key = Self::connection_key(connection_id);
        if let Some(user_id) = self.redis.get(&key).await? {
            self.redis.srem(&Self::user_key(&user_id), connection_id).await?;
        }
        self.redis.del(&key).await?;
        Ok(())
    }

    async fn lookup(&self, user_id: &str) -> Result<Option<String>, RegistryError> {
        let user_key = Self::user_key(user_id);

        let mut candidates = Vec::new();
        for connection_id in self.redis.smembers(&user_key).await? {
            let owner = self.redis.get(&Self::connection_key(&connection_id)).await?;
            candidates.push((connection_id, owner));
        }

        let (live, stale) = split_live(user_id, candidates);
        for connection_id in &stale {
            // Heartbeat lapsed without a clean disconnect.
            tracing::debug!(
                user_id = %user_id,
                connection_id = %connection_id,
                "pruning expired connection"
            );
            self.redis.srem(&user_key, connection_id).await?;
        }

        Ok(live)
    }

    async fn ping(&self) -> Result<(), RegistryError> {
        self.redis.ping().await?;
        Ok(())
    }
}

/// Pick the first connection still owned by `user_id` and collect every
/// member whose connection key expired or moved to another user.
fn split_live(
    user_id: &str,
    candidates: Vec<(String, Option<String>)>,
) -> (Option<String>, Vec<String>) {
    let mut live = None;
    let mut stale = Vec::new();
    for (connection_id, owner) in candidates {
        if owner.as_deref() == Some(user_id) {
            live.get_or_insert(connection_id);
        } else {
            stale.push(connection_id);
        }
    }
    (live, stale)
}

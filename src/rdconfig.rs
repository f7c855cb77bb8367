// src/rdconfig.rs
use redis::{aio::MultiplexedConnection, Client};

/// Scoped connection acquisition: store and broker operations open their own
/// connection and drop it on every return path, so no handle can outlive a
/// failed publish. Client::open auto-handles rediss:// when the TLS feature
/// is enabled.
pub async fn get_redis_conn(redis_url: &str) -> redis::RedisResult<MultiplexedConnection> {
    let client = Client::open(redis_url)?;
    client.get_multiplexed_async_connection().await
}

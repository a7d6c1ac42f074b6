//! Redis-backed cache layer.
//!
//! Every entry is written with `SET key value EX ttl`; invalidation is a plain
//! `DEL`. The `ConnectionManager` reconnects on its own, so a Redis outage
//! shows up as `CacheError::Unavailable` per call rather than a dead handle.

use std::time::Duration;

use ::redis::aio::ConnectionManager;
use async_trait::async_trait;
use tracing::instrument;

use goods_core::{Good, GoodId, ProjectId};

use super::{
    CacheError, Counter, DEFAULT_TTL, GoodsCache, REMOVED_COUNT_KEY, TOTAL_COUNT_KEY,
    decode_counter, decode_good, encode_good, good_key,
};

#[derive(Clone)]
pub struct RedisGoodsCache {
    conn: ConnectionManager,
    ttl: Duration,
}

impl core::fmt::Debug for RedisGoodsCache {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RedisGoodsCache")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl RedisGoodsCache {
    pub async fn connect(redis_url: &str, ttl: Option<Duration>) -> Result<Self, CacheError> {
        let client = ::redis::Client::open(redis_url).map_err(unavailable)?;
        let conn = ConnectionManager::new(client).await.map_err(unavailable)?;
        Ok(Self {
            conn,
            ttl: ttl.unwrap_or(DEFAULT_TTL),
        })
    }

    async fn get_raw(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = ::redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(raw)
    }

    async fn set_raw(&self, key: &str, raw: String) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _: () = ::redis::cmd("SET")
            .arg(key)
            .arg(raw)
            .arg("EX")
            .arg(self.ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn del(&self, keys: &[&str]) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _: i64 = ::redis::cmd("DEL")
            .arg(keys)
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(())
    }
}

fn unavailable(err: ::redis::RedisError) -> CacheError {
    CacheError::Unavailable(err.to_string())
}

#[async_trait]
impl GoodsCache for RedisGoodsCache {
    #[instrument(skip(self), fields(good_id = id.get(), project_id = project_id.get()), err)]
    async fn get_good(&self, id: GoodId, project_id: ProjectId) -> Result<Option<Good>, CacheError> {
        let key = good_key(project_id, id);
        self.get_raw(&key)
            .await?
            .map(|raw| decode_good(&key, &raw))
            .transpose()
    }

    async fn set_good(&self, good: &Good) -> Result<(), CacheError> {
        let raw = encode_good(good)?;
        self.set_raw(&good_key(good.project_id, good.id), raw).await
    }

    async fn invalidate_good(&self, id: GoodId, project_id: ProjectId) -> Result<(), CacheError> {
        self.del(&[good_key(project_id, id).as_str()]).await
    }

    async fn get_counter(&self, counter: Counter) -> Result<Option<u64>, CacheError> {
        let key = counter.key();
        self.get_raw(key)
            .await?
            .map(|raw| decode_counter(key, &raw))
            .transpose()
    }

    async fn set_counter(&self, counter: Counter, value: u64) -> Result<(), CacheError> {
        self.set_raw(counter.key(), value.to_string()).await
    }

    async fn invalidate_counters(&self) -> Result<(), CacheError> {
        self.del(&[TOTAL_COUNT_KEY, REMOVED_COUNT_KEY]).await
    }
}

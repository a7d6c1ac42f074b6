use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use goods_core::{Good, GoodId, ProjectId};

use super::{
    CacheError, Counter, DEFAULT_TTL, GoodsCache, REMOVED_COUNT_KEY, TOTAL_COUNT_KEY,
    decode_counter, decode_good, encode_good, good_key,
};

#[derive(Debug)]
struct Entry {
    raw: String,
    expires_at: Instant,
}

/// In-memory cache with TTL expiry and fault injection.
///
/// Stores the same serialized text a Redis cache would, so decoding paths are
/// exercised in tests too. Reads, writes and deletes can be switched to fail
/// independently.
#[derive(Debug)]
pub struct InMemoryGoodsCache {
    entries: Mutex<HashMap<String, Entry>>,
    ttl: Duration,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    fail_deletes: AtomicBool,
}

impl Default for InMemoryGoodsCache {
    fn default() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }
}

impl InMemoryGoodsCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
        }
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Whether a live entry exists under `key` (tests).
    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .lock()
            .map(|m| m.get(key).is_some_and(|e| e.expires_at > Instant::now()))
            .unwrap_or(false)
    }

    /// Store raw text under `key`, bypassing encoding (tests).
    pub fn put_raw(&self, key: &str, raw: &str) {
        if let Ok(mut m) = self.entries.lock() {
            m.insert(
                key.to_string(),
                Entry {
                    raw: raw.to_string(),
                    expires_at: Instant::now() + self.ttl,
                },
            );
        }
    }

    fn check(flag: &AtomicBool, what: &str) -> Result<(), CacheError> {
        if flag.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable(format!("injected {what} failure")));
        }
        Ok(())
    }

    fn read(&self, key: &str) -> Result<Option<String>, CacheError> {
        Self::check(&self.fail_reads, "read")?;
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| CacheError::Unavailable("lock poisoned".to_string()))?;
        let now = Instant::now();
        match entries.get(key).map(|e| (e.expires_at > now, e.raw.clone())) {
            Some((true, raw)) => Ok(Some(raw)),
            Some((false, _)) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn write(&self, key: &str, raw: String) -> Result<(), CacheError> {
        Self::check(&self.fail_writes, "write")?;
        self.entries
            .lock()
            .map_err(|_| CacheError::Unavailable("lock poisoned".to_string()))?
            .insert(
                key.to_string(),
                Entry {
                    raw,
                    expires_at: Instant::now() + self.ttl,
                },
            );
        Ok(())
    }

    fn delete(&self, keys: &[&str]) -> Result<(), CacheError> {
        Self::check(&self.fail_deletes, "delete")?;
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| CacheError::Unavailable("lock poisoned".to_string()))?;
        for key in keys {
            entries.remove(*key);
        }
        Ok(())
    }
}

#[async_trait]
impl GoodsCache for InMemoryGoodsCache {
    async fn get_good(&self, id: GoodId, project_id: ProjectId) -> Result<Option<Good>, CacheError> {
        let key = good_key(project_id, id);
        self.read(&key)?
            .map(|raw| decode_good(&key, &raw))
            .transpose()
    }

    async fn set_good(&self, good: &Good) -> Result<(), CacheError> {
        let raw = encode_good(good)?;
        self.write(&good_key(good.project_id, good.id), raw)
    }

    async fn invalidate_good(&self, id: GoodId, project_id: ProjectId) -> Result<(), CacheError> {
        self.delete(&[good_key(project_id, id).as_str()])
    }

    async fn get_counter(&self, counter: Counter) -> Result<Option<u64>, CacheError> {
        let key = counter.key();
        self.read(key)?.map(|raw| decode_counter(key, &raw)).transpose()
    }

    async fn set_counter(&self, counter: Counter, value: u64) -> Result<(), CacheError> {
        self.write(counter.key(), value.to_string())
    }

    async fn invalidate_counters(&self) -> Result<(), CacheError> {
        self.delete(&[TOTAL_COUNT_KEY, REMOVED_COUNT_KEY])
    }
}

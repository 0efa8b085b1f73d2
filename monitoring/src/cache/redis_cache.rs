//! Redis-backed sample cache
//!
//! Multi-key updates run as Lua scripts so Redis applies them atomically:
//! a sample value, its index entry and the marker update either all land or
//! none do, and index pruning happens in the same step as enumeration.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::{Client, Script};
use std::time::Duration;
use tracing::{debug, warn};

use super::{CachedSample, SampleCache, SampleKey, WriteMode};
use crate::{MonitoringError, Result};

/// KEYS: sample, index, marker.
/// ARGV: payload, ttl ms, score, if-absent flag, success micros or "".
const WRITE_SAMPLE_SCRIPT: &str = r#"
if ARGV[4] == '1' and redis.call('EXISTS', KEYS[1]) == 1 then
    return 0
end
redis.call('SET', KEYS[1], ARGV[1], 'PX', ARGV[2])
redis.call('ZADD', KEYS[2], ARGV[3], ARGV[3])
if ARGV[5] ~= '' then
    local current = redis.call('GET', KEYS[3])
    if not current or tonumber(current) < tonumber(ARGV[5]) then
        redis.call('SET', KEYS[3], ARGV[5])
    end
end
return 1
"#;

/// KEYS: index. ARGV: window start micros.
const LIVE_INDEX_SCRIPT: &str = r#"
redis.call('ZREMRANGEBYSCORE', KEYS[1], '-inf', '(' .. ARGV[1])
return redis.call('ZRANGEBYSCORE', KEYS[1], ARGV[1], '+inf')
"#;

/// KEYS: marker. ARGV: micros.
const ADVANCE_MARKER_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[1])
if not current or tonumber(current) < tonumber(ARGV[1]) then
    redis.call('SET', KEYS[1], ARGV[1])
    return 1
end
return 0
"#;

/// Redis [`SampleCache`]
///
/// `ConnectionManager` multiplexes commands over one connection and
/// reconnects on failure, so clones of this cache share the connection.
#[derive(Clone)]
pub struct RedisSampleCache {
    conn: ConnectionManager,
    key_prefix: String,
    write_script: Script,
    live_script: Script,
    marker_script: Script,
}

impl RedisSampleCache {
    /// Connect to the cache server
    pub async fn connect(url: &str, key_prefix: impl Into<String>) -> Result<Self> {
        let client = Client::open(url)
            .map_err(|e| MonitoringError::invalid_config(format!("Invalid cache URL: {}", e)))?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self::with_connection(conn, key_prefix))
    }

    pub fn with_connection(conn: ConnectionManager, key_prefix: impl Into<String>) -> Self {
        Self {
            conn,
            key_prefix: key_prefix.into(),
            write_script: Script::new(WRITE_SAMPLE_SCRIPT),
            live_script: Script::new(LIVE_INDEX_SCRIPT),
            marker_script: Script::new(ADVANCE_MARKER_SCRIPT),
        }
    }

    fn sample_key(&self, key: &SampleKey) -> String {
        format!(
            "{}sample:{}:{}",
            self.key_prefix, key.instance, key.timestamp_micros
        )
    }

    fn index_key(&self, instance: &str) -> String {
        format!("{}index:{}", self.key_prefix, instance)
    }

    fn marker_key(&self, instance: &str) -> String {
        format!("{}last_alive:{}", self.key_prefix, instance)
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl SampleCache for RedisSampleCache {
    async fn write_sample(&self, entry: &CachedSample, ttl: Duration, mode: WriteMode) -> Result<bool> {
        let key = entry.key();
        let payload = serde_json::to_string(entry)?;
        let success_micros = if entry.sample.is_success() {
            key.timestamp_micros.to_string()
        } else {
            String::new()
        };
        let if_absent = if mode == WriteMode::IfAbsent { "1" } else { "0" };

        let mut invocation = self.write_script.prepare_invoke();
        invocation
            .key(self.sample_key(&key))
            .key(self.index_key(&key.instance))
            .key(self.marker_key(&key.instance))
            .arg(payload)
            .arg(ttl_millis(ttl))
            .arg(key.timestamp_micros)
            .arg(if_absent)
            .arg(success_micros);

        let mut conn = self.conn.clone();
        let applied: i64 = invocation.invoke_async(&mut conn).await?;
        Ok(applied == 1)
    }

    async fn live_index(&self, instance: &str, window_start: DateTime<Utc>) -> Result<Vec<SampleKey>> {
        let mut invocation = self.live_script.prepare_invoke();
        invocation
            .key(self.index_key(instance))
            .arg(window_start.timestamp_micros());

        let mut conn = self.conn.clone();
        let members: Vec<String> = invocation.invoke_async(&mut conn).await?;

        let mut keys = Vec::with_capacity(members.len());
        for member in members {
            match member.parse::<i64>() {
                Ok(timestamp_micros) => keys.push(SampleKey {
                    instance: instance.to_string(),
                    timestamp_micros,
                }),
                Err(_) => warn!(instance, member = %member, "Ignoring malformed index member"),
            }
        }
        Ok(keys)
    }

    async fn fetch_samples(&self, keys: &[SampleKey]) -> Result<Vec<CachedSample>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let redis_keys: Vec<String> = keys.iter().map(|k| self.sample_key(k)).collect();
        let mut conn = self.conn.clone();
        let values: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&redis_keys)
            .query_async(&mut conn)
            .await?;

        let mut samples = Vec::with_capacity(values.len());
        for (key, value) in redis_keys.iter().zip(values) {
            let Some(json) = value else {
                debug!(key = key.as_str(), "Sample expired before fetch");
                continue;
            };
            samples.push(serde_json::from_str(&json)?);
        }
        Ok(samples)
    }

    async fn last_success(&self, instance: &str) -> Result<Option<DateTime<Utc>>> {
        let mut conn = self.conn.clone();
        let raw: Option<i64> = redis::cmd("GET")
            .arg(self.marker_key(instance))
            .query_async(&mut conn)
            .await?;

        raw.map(|micros| {
            DateTime::<Utc>::from_timestamp_micros(micros).ok_or_else(|| {
                MonitoringError::cache(format!("Invalid last-success marker for {}: {}", instance, micros))
            })
        })
        .transpose()
    }

    async fn restore_last_success(&self, instance: &str, timestamp: DateTime<Utc>) -> Result<()> {
        let mut invocation = self.marker_script.prepare_invoke();
        invocation
            .key(self.marker_key(instance))
            .arg(timestamp.timestamp_micros());

        let mut conn = self.conn.clone();
        let _: i64 = invocation.invoke_async(&mut conn).await?;
        Ok(())
    }
}

impl std::fmt::Debug for RedisSampleCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisSampleCache")
            .field("key_prefix", &self.key_prefix)
            .finish()
    }
}

//! Redis-backed bucket
//!
//! Each document is a Redis hash with two fields: `v` holds the value bytes
//! and `c` the CAS version. Conditional writes and counters run as Lua
//! scripts so the existence and version checks are atomic with the write.
//! CAS versions come from the server clock in microseconds and never go
//! backwards for a key.

use crate::errors::StoreFault;
use crate::expiry::Expiry;
use crate::store::{BatchEntry, BatchResult, Cas, Document, KvStore, StoreConnector};
use async_trait::async_trait;
use config::ResourceConfig;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, ConnectionAddr, ConnectionInfo, RedisConnectionInfo, Script};
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

/// Oldest server major version with the commands the scripts rely on
pub const MIN_SERVER_MAJOR: u32 = 5;

const VALUE_FIELD: &str = "v";
const CAS_FIELD: &str = "c";

const MISSING: i64 = -1;
const CAS_CONFLICT: i64 = -2;

const LUA_HELPERS: &str = r#"
local function next_cas(key)
  local now = redis.call('TIME')
  local cas = tonumber(now[1]) * 1000000 + tonumber(now[2])
  local prev = tonumber(redis.call('HGET', key, 'c') or '0')
  if cas <= prev then cas = prev + 1 end
  return cas
end

local function write(key, value, mode, seconds)
  local cas = next_cas(key)
  redis.call('HSET', key, 'v', value, 'c', string.format('%.0f', cas))
  if mode == 'persist' then
    redis.call('PERSIST', key)
  elseif mode == 'expire' then
    redis.call('EXPIRE', key, seconds)
  else
    redis.call('EXPIREAT', key, seconds)
  end
  return cas
end
"#;

// ARGV: value, mode, seconds
const UPSERT_LUA: &str = r#"
return write(KEYS[1], ARGV[1], ARGV[2], ARGV[3])
"#;

const INSERT_LUA: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then return -1 end
return write(KEYS[1], ARGV[1], ARGV[2], ARGV[3])
"#;

// ARGV: value, mode, seconds, expected cas or ''
const REPLACE_LUA: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then return -1 end
if ARGV[4] ~= '' and tonumber(redis.call('HGET', KEYS[1], 'c')) ~= tonumber(ARGV[4]) then
  return -2
end
return write(KEYS[1], ARGV[1], ARGV[2], ARGV[3])
"#;

// ARGV: mode, seconds
const TOUCH_LUA: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then return -1 end
if ARGV[1] == 'persist' then
  redis.call('PERSIST', KEYS[1])
elseif ARGV[1] == 'expire' then
  redis.call('EXPIRE', KEYS[1], ARGV[2])
else
  redis.call('EXPIREAT', KEYS[1], ARGV[2])
end
return 1
"#;

// ARGV: delta, initial or '', mode, seconds
const COUNTER_LUA: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
  if ARGV[2] == '' then return {0, 0} end
  write(KEYS[1], ARGV[2], ARGV[3], ARGV[4])
  return {1, tonumber(ARGV[2])}
end
local value = redis.call('HINCRBY', KEYS[1], 'v', ARGV[1])
redis.call('HSET', KEYS[1], 'c', string.format('%.0f', next_cas(KEYS[1])))
return {1, value}
"#;

struct Scripts {
    upsert: Script,
    insert: Script,
    replace: Script,
    touch: Script,
    counter: Script,
}

impl Scripts {
    fn new() -> Self {
        let with_helpers = |body: &str| Script::new(&format!("{LUA_HELPERS}{body}"));
        Self {
            upsert: with_helpers(UPSERT_LUA),
            insert: with_helpers(INSERT_LUA),
            replace: with_helpers(REPLACE_LUA),
            touch: Script::new(TOUCH_LUA),
            counter: with_helpers(COUNTER_LUA),
        }
    }
}

/// Script arguments for a store expiry value
fn expiry_args(expiry: u64) -> (&'static str, u64) {
    match Expiry::from_store_value(expiry) {
        Expiry::Never => ("persist", 0),
        Expiry::After(seconds) => ("expire", seconds),
        Expiry::At(timestamp) => ("expireat", timestamp),
    }
}

fn write_status(key: &str, status: i64) -> Result<Cas, StoreFault> {
    match status {
        MISSING => Err(StoreFault::NotFound),
        CAS_CONFLICT => Err(StoreFault::CasMismatch),
        cas if cas > 0 => Ok(Cas(cas as u64)),
        other => Err(StoreFault::Malformed(format!(
            "unexpected write status {} for '{}'",
            other, key
        ))),
    }
}

fn insert_status(key: &str, status: i64) -> Result<Cas, StoreFault> {
    match status {
        MISSING => Err(StoreFault::AlreadyExists),
        status => write_status(key, status),
    }
}

/// Pair each item's key with the outcome its status maps to
fn write_entries(
    items: &[(String, Vec<u8>)],
    statuses: Vec<i64>,
    classify: fn(&str, i64) -> Result<Cas, StoreFault>,
) -> BatchResult<Cas> {
    items
        .iter()
        .zip(statuses)
        .map(|((key, _), status)| (key.clone(), BatchEntry::from_result(classify(key, status))))
        .collect()
}

fn document(key: &str, row: (Option<Vec<u8>>, Option<u64>)) -> Result<Document, StoreFault> {
    match row {
        (Some(value), Some(cas)) => Ok(Document {
            value,
            cas: Cas(cas),
        }),
        (None, _) => Err(StoreFault::NotFound),
        (Some(_), None) => Err(StoreFault::Malformed(format!(
            "document '{}' has no CAS version",
            key
        ))),
    }
}

/// Connection settings for the first configured server
pub fn connection_info(config: &ResourceConfig) -> Result<ConnectionInfo, StoreFault> {
    let server = config
        .servers
        .first()
        .ok_or_else(|| StoreFault::Unsupported("no server configured".to_string()))?;
    let db = config
        .database_index()
        .map_err(|e| StoreFault::Unsupported(e.to_string()))?;
    let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());

    Ok(ConnectionInfo {
        addr: ConnectionAddr::Tcp(server.host.clone(), server.port),
        redis: RedisConnectionInfo {
            db,
            username: non_empty(&config.username),
            password: non_empty(&config.password),
            ..Default::default()
        },
    })
}

/// Major version from the `INFO server` section
fn server_major_version(info: &str) -> Option<u32> {
    info.lines()
        .find_map(|line| line.trim().strip_prefix("redis_version:"))
        .and_then(|version| version.split('.').next())
        .and_then(|major| major.parse().ok())
}

/// Redis-backed bucket store
#[derive(Clone)]
pub struct RedisStore {
    connection: MultiplexedConnection,
    scripts: Arc<Scripts>,
}

impl Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Connect to the first server of `config` and check the server version
    pub async fn connect(config: &ResourceConfig) -> Result<Self, StoreFault> {
        let info = connection_info(config)?;
        let target = config
            .servers
            .first()
            .map(ToString::to_string)
            .unwrap_or_default();
        let client = Client::open(info)?;

        let timeout = Duration::from_millis(config.connect_timeout_ms);
        let mut connection =
            tokio::time::timeout(timeout, client.get_multiplexed_async_connection())
                .await
                .map_err(|_| {
                    StoreFault::Transport(format!("connection to {} timed out", target))
                })??;

        let info: String = redis::cmd("INFO")
            .arg("server")
            .query_async(&mut connection)
            .await?;
        match server_major_version(&info) {
            Some(major) if major >= MIN_SERVER_MAJOR => {}
            Some(major) => {
                return Err(StoreFault::Unsupported(format!(
                    "server version {} at {} is older than {}.0",
                    major, target, MIN_SERVER_MAJOR
                )));
            }
            None => {
                return Err(StoreFault::Unsupported(format!(
                    "could not read server version of {}",
                    target
                )));
            }
        }

        tracing::debug!("Connected to Redis bucket at {}", target);

        Ok(Self {
            connection,
            scripts: Arc::new(Scripts::new()),
        })
    }

    /// Run a write script once per item in one pipeline
    ///
    /// The script is loaded at the head of the pipeline since pipelined
    /// invocations are not retried after `NOSCRIPT`.
    async fn write_pipelined(
        &self,
        script: &Script,
        items: &[(String, Vec<u8>)],
        expiry: u64,
    ) -> Result<Vec<i64>, StoreFault> {
        let (mode, seconds) = expiry_args(expiry);
        let mut pipe = redis::pipe();
        pipe.load_script(script).ignore();
        for (key, value) in items {
            pipe.invoke_script(script.key(key).arg(value.as_slice()).arg(mode).arg(seconds));
        }
        trace_log!("Pipelining {} script writes", items.len());

        let mut conn = self.connection.clone();
        let statuses: Vec<i64> = pipe.query_async(&mut conn).await?;
        if statuses.len() != items.len() {
            return Err(StoreFault::Malformed(format!(
                "expected {} replies, got {}",
                items.len(),
                statuses.len()
            )));
        }
        Ok(statuses)
    }
}

#[async_trait]
impl KvStore for RedisStore {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Document, StoreFault> {
        let mut conn = self.connection.clone();
        let row: (Option<Vec<u8>>, Option<u64>) = redis::cmd("HMGET")
            .arg(key)
            .arg(VALUE_FIELD)
            .arg(CAS_FIELD)
            .query_async(&mut conn)
            .await?;
        document(key, row)
    }

    async fn get_multi(&self, keys: &[String]) -> Result<BatchResult<Document>, StoreFault> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }

        let mut pipe = redis::pipe();
        for key in keys {
            pipe.cmd("HMGET").arg(key).arg(VALUE_FIELD).arg(CAS_FIELD);
        }

        let mut conn = self.connection.clone();
        let rows: Vec<(Option<Vec<u8>>, Option<u64>)> = pipe.query_async(&mut conn).await?;
        if rows.len() != keys.len() {
            return Err(StoreFault::Malformed(format!(
                "expected {} replies, got {}",
                keys.len(),
                rows.len()
            )));
        }

        Ok(keys
            .iter()
            .zip(rows)
            .map(|(key, row)| (key.clone(), BatchEntry::from_result(document(key, row))))
            .collect())
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreFault> {
        let mut conn = self.connection.clone();
        let exists: bool = conn.exists(key).await?;
        Ok(exists)
    }

    async fn upsert(&self, key: &str, value: &[u8], expiry: u64) -> Result<Cas, StoreFault> {
        let (mode, seconds) = expiry_args(expiry);
        let mut conn = self.connection.clone();
        let status: i64 = self
            .scripts
            .upsert
            .key(key)
            .arg(value)
            .arg(mode)
            .arg(seconds)
            .invoke_async(&mut conn)
            .await?;
        write_status(key, status)
    }

    async fn upsert_multi(
        &self,
        items: &[(String, Vec<u8>)],
        expiry: u64,
    ) -> Result<BatchResult<Cas>, StoreFault> {
        if items.is_empty() {
            return Ok(HashMap::new());
        }
        let statuses = self
            .write_pipelined(&self.scripts.upsert, items, expiry)
            .await?;
        Ok(write_entries(items, statuses, write_status))
    }

    async fn insert(&self, key: &str, value: &[u8], expiry: u64) -> Result<Cas, StoreFault> {
        let (mode, seconds) = expiry_args(expiry);
        let mut conn = self.connection.clone();
        let status: i64 = self
            .scripts
            .insert
            .key(key)
            .arg(value)
            .arg(mode)
            .arg(seconds)
            .invoke_async(&mut conn)
            .await?;
        insert_status(key, status)
    }

    async fn insert_multi(
        &self,
        items: &[(String, Vec<u8>)],
        expiry: u64,
    ) -> Result<BatchResult<Cas>, StoreFault> {
        if items.is_empty() {
            return Ok(HashMap::new());
        }
        let statuses = self
            .write_pipelined(&self.scripts.insert, items, expiry)
            .await?;
        Ok(write_entries(items, statuses, insert_status))
    }

    async fn replace(
        &self,
        key: &str,
        value: &[u8],
        expiry: u64,
        cas: Option<Cas>,
    ) -> Result<Cas, StoreFault> {
        let (mode, seconds) = expiry_args(expiry);
        let expected = cas.map(|c| c.0.to_string()).unwrap_or_default();
        let mut conn = self.connection.clone();
        let status: i64 = self
            .scripts
            .replace
            .key(key)
            .arg(value)
            .arg(mode)
            .arg(seconds)
            .arg(expected)
            .invoke_async(&mut conn)
            .await?;
        write_status(key, status)
    }

    async fn remove(&self, key: &str) -> Result<(), StoreFault> {
        let mut conn = self.connection.clone();
        let removed: i64 = conn.del(key).await?;
        if removed > 0 {
            Ok(())
        } else {
            Err(StoreFault::NotFound)
        }
    }

    async fn remove_multi(&self, keys: &[String]) -> Result<BatchResult<()>, StoreFault> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }

        let mut pipe = redis::pipe();
        for key in keys {
            pipe.del(key);
        }

        let mut conn = self.connection.clone();
        let removed: Vec<i64> = pipe.query_async(&mut conn).await?;
        if removed.len() != keys.len() {
            return Err(StoreFault::Malformed(format!(
                "expected {} replies, got {}",
                keys.len(),
                removed.len()
            )));
        }

        Ok(keys
            .iter()
            .zip(removed)
            .map(|(key, count)| {
                let entry = if count > 0 {
                    BatchEntry::Found(())
                } else {
                    BatchEntry::Absent
                };
                (key.clone(), entry)
            })
            .collect())
    }

    async fn touch(&self, key: &str, expiry: u64) -> Result<(), StoreFault> {
        let (mode, seconds) = expiry_args(expiry);
        let mut conn = self.connection.clone();
        let status: i64 = self
            .scripts
            .touch
            .key(key)
            .arg(mode)
            .arg(seconds)
            .invoke_async(&mut conn)
            .await?;
        match status {
            MISSING => Err(StoreFault::NotFound),
            _ => Ok(()),
        }
    }

    async fn counter(
        &self,
        key: &str,
        delta: i64,
        initial: Option<i64>,
        expiry: u64,
    ) -> Result<i64, StoreFault> {
        let (mode, seconds) = expiry_args(expiry);
        let initial = initial.map(|i| i.to_string()).unwrap_or_default();
        let mut conn = self.connection.clone();
        let (found, value): (i64, i64) = self
            .scripts
            .counter
            .key(key)
            .arg(delta)
            .arg(initial)
            .arg(mode)
            .arg(seconds)
            .invoke_async(&mut conn)
            .await?;
        if found == 0 {
            return Err(StoreFault::NotFound);
        }
        Ok(value)
    }

    async fn flush_all(&self) -> Result<(), StoreFault> {
        let mut conn = self.connection.clone();
        let _: () = redis::cmd("FLUSHDB").query_async(&mut conn).await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreFault> {
        let mut conn = self.connection.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

/// Connects resources to Redis
#[derive(Debug, Default, Clone, Copy)]
pub struct RedisConnector;

#[async_trait]
impl StoreConnector for RedisConnector {
    async fn connect(&self, config: &ResourceConfig) -> Result<Arc<dyn KvStore>, StoreFault> {
        Ok(Arc::new(RedisStore::connect(config).await?))
    }
}

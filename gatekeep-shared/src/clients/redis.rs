use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};

/// Deletes `KEYS[1]` only if its JSON value has `ARGV[1] == ARGV[2]`.
const DEL_IF_FIELD_EQ: &str = r#"
local raw = redis.call('GET', KEYS[1])
if not raw then
    return 0
end
local ok, value = pcall(cjson.decode, raw)
if ok and type(value) == 'table' and value[ARGV[1]] == ARGV[2] then
    return redis.call('DEL', KEYS[1])
end
return 0
"#;

#[derive(Clone)]
pub struct RedisClient {
    conn: ConnectionManager,
}

impl RedisClient {
    pub async fn connect(url: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        tracing::info!(url = %url, "connected to Redis");
        Ok(Self { conn })
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, redis::RedisError> {
        let mut conn = self.conn.clone();
        conn.get(key).await
    }

    /// `SET key value EX ttl_secs`, replacing any previous value.
    pub async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), redis::RedisError> {
        let mut conn = self.conn.clone();
        conn.set_ex(key, value, ttl_secs).await
    }

    /// Atomic compare-and-delete on one field of a JSON value. Returns
    /// whether this call removed the key.
    pub async fn del_if_field_eq(&self, key: &str, field: &str, expected: &str) -> Result<bool, redis::RedisError> {
        let mut conn = self.conn.clone();
        let removed: i64 = Script::new(DEL_IF_FIELD_EQ)
            .key(key)
            .arg(field)
            .arg(expected)
            .invoke_async(&mut conn)
            .await?;
        Ok(removed == 1)
    }

    pub async fn ping(&self) -> Result<(), redis::RedisError> {
        let mut conn = self.conn.clone();
        redis::cmd("PING").query_async::<_, String>(&mut conn).await?;
        Ok(())
    }
}

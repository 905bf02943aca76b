use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use gatekeep_shared::clients::redis::RedisClient;
use gatekeep_shared::errors::AppResult;

use crate::models::{CodeKind, VerificationRecord};

use super::VerificationStore;

/// Pending codes in Redis under `verify:{user_id}:{kind}`, expired by Redis.
#[derive(Clone)]
pub struct RedisVerificationStore {
    redis: RedisClient,
}

#[derive(Serialize, Deserialize)]
struct StoredCode {
    code: String,
    expires_at: DateTime<Utc>,
}

fn key(user_id: Uuid, kind: CodeKind) -> String {
    format!("verify:{user_id}:{kind}")
}

impl RedisVerificationStore {
    pub fn new(redis: RedisClient) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl VerificationStore for RedisVerificationStore {
    async fn put(&self, record: &VerificationRecord) -> AppResult<()> {
        let ttl = (record.expires_at - Utc::now()).num_seconds().max(1) as u64;
        let value = serde_json::to_string(&StoredCode {
            code: record.code.clone(),
            expires_at: record.expires_at,
        })
        .context("encoding verification record")?;

        self.redis
            .set(&key(record.user_id, record.kind), &value, ttl)
            .await
            .context("storing verification record")?;
        Ok(())
    }

    async fn get(&self, user_id: Uuid, kind: CodeKind) -> AppResult<Option<VerificationRecord>> {
        let raw = self
            .redis
            .get(&key(user_id, kind))
            .await
            .context("reading verification record")?;

        let Some(raw) = raw else { return Ok(None) };
        let stored: StoredCode = serde_json::from_str(&raw).context("decoding verification record")?;
        Ok(Some(VerificationRecord {
            user_id,
            kind,
            code: stored.code,
            expires_at: stored.expires_at,
        }))
    }

    async fn delete_if_matches(&self, user_id: Uuid, kind: CodeKind, code: &str) -> AppResult<bool> {
        let removed = self
            .redis
            .del_if_field_eq(&key(user_id, kind), "code", code)
            .await
            .context("deleting verification record")?;
        Ok(removed)
    }

    async fn ping(&self) -> AppResult<()> {
        self.redis.ping().await.context("pinging Redis")?;
        Ok(())
    }
}

//! Key-value store trait and the typed status view over it.

use async_trait::async_trait;
use std::sync::Arc;

use crate::{BuildResult, Result, StatusKey};

/// String get/set store. Last writer wins per key.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Backend name reported by readiness checks.
    fn backend(&self) -> &'static str;
}

/// Typed access to build results and cached push payloads.
#[derive(Clone)]
pub struct StatusStore {
    inner: Arc<dyn KeyValueStore>,
}

impl StatusStore {
    pub fn new(inner: Arc<dyn KeyValueStore>) -> Self {
        Self { inner }
    }

    pub fn backend(&self) -> &'static str {
        self.inner.backend()
    }

    pub async fn result(&self, key: &StatusKey) -> Result<Option<BuildResult>> {
        match self.inner.get(&key.status()).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn put_result(&self, key: &StatusKey, result: &BuildResult) -> Result<()> {
        let raw = serde_json::to_string(result)?;
        self.inner.set(&key.status(), &raw).await
    }

    /// The raw push payload last seen for `key`.
    pub async fn payload(&self, key: &StatusKey) -> Result<Option<serde_json::Value>> {
        match self.inner.get(&key.payload()).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn put_payload(&self, key: &StatusKey, payload: &serde_json::Value) -> Result<()> {
        let raw = serde_json::to_string(payload)?;
        self.inner.set(&key.payload(), &raw).await
    }
}

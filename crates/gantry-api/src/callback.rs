//! Rendezvous between a waiting build step and an out-of-band event.
//!
//! A step reads `CALLBACK` from its environment, hands the URL to some
//! external system and blocks on `GET {CALLBACK}`. When that system
//! `POST`s to the same URL the body is handed to the waiter.

use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WaitError {
    #[error("callback {0} already has a waiter")]
    AlreadyWaiting(String),

    #[error("callback {0} timed out")]
    TimedOut(String),
}

struct Waiter {
    ticket: u64,
    tx: oneshot::Sender<Bytes>,
}

/// Pending callback waiters keyed by id.
pub struct WaitRegistry {
    waiters: Mutex<HashMap<String, Waiter>>,
    next_ticket: AtomicU64,
    timeout: Duration,
}

impl WaitRegistry {
    pub fn new(timeout: Duration) -> Self {
        Self {
            waiters: Mutex::new(HashMap::new()),
            next_ticket: AtomicU64::new(0),
            timeout,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Waiter>> {
        self.waiters.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Wait for a delivery on `id`.
    ///
    /// The entry is removed however this returns, including when the
    /// future is dropped because the client went away.
    pub async fn wait(&self, id: &str) -> Result<Bytes, WaitError> {
        let (tx, rx) = oneshot::channel();
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        {
            let mut waiters = self.lock();
            if waiters.contains_key(id) {
                return Err(WaitError::AlreadyWaiting(id.to_string()));
            }
            waiters.insert(id.to_string(), Waiter { ticket, tx });
        }
        let _guard = WaitGuard {
            registry: self,
            id,
            ticket,
        };

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(body)) => Ok(body),
            _ => Err(WaitError::TimedOut(id.to_string())),
        }
    }

    /// Hand `body` to the waiter on `id`. Returns false when nobody waits.
    pub fn deliver(&self, id: &str, body: Bytes) -> bool {
        let waiter = self.lock().remove(id);
        match waiter {
            Some(waiter) => waiter.tx.send(body).is_ok(),
            None => false,
        }
    }

    pub fn pending(&self) -> usize {
        self.lock().len()
    }
}

struct WaitGuard<'a> {
    registry: &'a WaitRegistry,
    id: &'a str,
    ticket: u64,
}

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        let mut waiters = self.registry.lock();
        // A later waiter may have taken the id after a delivery.
        if waiters.get(self.id).is_some_and(|w| w.ticket == self.ticket) {
            waiters.remove(self.id);
        }
    }
}

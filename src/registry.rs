use crate::error::CallError;
use crate::provider::ParticipantLeg;
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::select;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub const MAX_LIVE_CALLS: usize = 50_000;
pub const CALL_CODE_MIN: u32 = 10_000;
pub const CALL_CODE_MAX: u32 = 99_999;
const RECORD_TTL_MINUTES: i64 = 30;
const EVICT_INTERVAL_SECS: u64 = 60;

/// Time source for the registry, injectable so tests can advance a manual
/// clock past the eviction ceiling.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// One registered call, held only in process memory. Destroyed by the
/// provider's conference-end event or by the age evictor, never elsewhere.
#[derive(Debug, Clone)]
pub struct CallRecord {
    pub credential: String,
    pub call_code: u32,
    pub target_number: String,
    pub message_id: String,
    pub message_audio: Bytes,
    pub source_number: Option<String>,
    pub stored_at: DateTime<Utc>,
    pub provider_legs: Option<Vec<ParticipantLeg>>,
}

#[derive(Default)]
struct RegistryInner {
    by_code: HashMap<u32, CallRecord>,
    by_message_id: HashMap<String, u32>,
}

pub struct CallRegistry {
    inner: Mutex<RegistryInner>,
    clock: Arc<dyn Clock>,
    capacity: usize,
}

impl CallRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_capacity(clock, MAX_LIVE_CALLS)
    }

    pub fn with_capacity(clock: Arc<dyn Clock>, capacity: usize) -> Self {
        Self {
            inner: Mutex::new(RegistryInner::default()),
            clock,
            capacity,
        }
    }

    /// Registers a call and mints its code. The whole check-and-insert runs
    /// under one lock acquisition with no suspension points, so two
    /// concurrent creates can neither mint the same code nor race on the
    /// same message id.
    pub async fn create(
        &self,
        credential: String,
        target_number: String,
        message_id: String,
        message_audio: Bytes,
    ) -> Result<CallRecord, CallError> {
        let mut inner = self.inner.lock().await;
        if inner.by_code.len() >= self.capacity {
            return Err(CallError::CapacityExceeded);
        }

        if let Some(&code) = inner.by_message_id.get(&message_id) {
            if let Some(existing) = inner.by_code.get(&code) {
                if existing.credential != credential {
                    return Err(CallError::MessageCollision(message_id));
                }
                // Same credential is a client retry: hand back the original
                // record untouched.
                return Ok(existing.clone());
            }
        }

        let mut rng = rand::rng();
        let mut code = rng.random_range(CALL_CODE_MIN..=CALL_CODE_MAX);
        while inner.by_code.contains_key(&code) {
            code = rng.random_range(CALL_CODE_MIN..=CALL_CODE_MAX);
        }

        let record = CallRecord {
            credential,
            call_code: code,
            target_number,
            message_id: message_id.clone(),
            message_audio,
            source_number: None,
            stored_at: self.clock.now(),
            provider_legs: None,
        };
        inner.by_code.insert(code, record.clone());
        inner.by_message_id.insert(message_id, code);
        Ok(record)
    }

    pub async fn lookup(&self, code: u32) -> Option<CallRecord> {
        self.inner.lock().await.by_code.get(&code).cloned()
    }

    /// Idempotent; removing an unknown code is a no-op.
    pub async fn destroy(&self, code: u32) {
        let mut inner = self.inner.lock().await;
        if let Some(record) = inner.by_code.remove(&code) {
            inner.by_message_id.remove(&record.message_id);
            info!(code, "call record destroyed");
        }
    }

    /// Sweeps every record past the age ceiling out of both indices. Age is
    /// the only criterion; a long-running bridged call can be swept too.
    pub async fn evict_expired(&self) {
        let cutoff = self.clock.now() - Duration::minutes(RECORD_TTL_MINUTES);
        let mut inner = self.inner.lock().await;
        let expired: Vec<u32> = inner
            .by_code
            .values()
            .filter(|r| r.stored_at <= cutoff)
            .map(|r| r.call_code)
            .collect();
        for code in expired {
            if let Some(record) = inner.by_code.remove(&code) {
                inner.by_message_id.remove(&record.message_id);
                info!(code, "evicted expired call record");
            }
        }
    }

    /// True while any caller has dialed in and been bridged; graceful
    /// shutdown delays exit on this.
    pub async fn has_live_calls(&self) -> bool {
        self.inner
            .lock()
            .await
            .by_code
            .values()
            .any(|r| r.source_number.is_some())
    }

    pub async fn set_source_number(&self, code: u32, number: String) -> Result<(), CallError> {
        let mut inner = self.inner.lock().await;
        match inner.by_code.get_mut(&code) {
            Some(record) => {
                record.source_number = Some(number);
                Ok(())
            }
            None => Err(CallError::RecordNotFound(code)),
        }
    }

    pub async fn set_provider_legs(
        &self,
        code: u32,
        legs: Vec<ParticipantLeg>,
    ) -> Result<(), CallError> {
        let mut inner = self.inner.lock().await;
        match inner.by_code.get_mut(&code) {
            Some(record) => {
                record.provider_legs = Some(legs);
                Ok(())
            }
            None => Err(CallError::RecordNotFound(code)),
        }
    }

    pub async fn live_count(&self) -> usize {
        self.inner.lock().await.by_code.len()
    }

    /// Runs the age evictor until the token is cancelled. Owned by the app
    /// lifecycle; process shutdown is the only way to stop it.
    pub fn spawn_evictor(self: &Arc<Self>, token: CancellationToken) {
        let registry = self.clone();
        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(std::time::Duration::from_secs(EVICT_INTERVAL_SECS));
            ticker.tick().await;
            loop {
                select! {
                    _ = token.cancelled() => {
                        debug!("evictor stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        registry.evict_expired().await;
                    }
                }
            }
        });
    }
}

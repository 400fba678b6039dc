//! High-water marks of processed lifecycle events.
//!
//! For every workload instance the cache remembers the UID of the most recent
//! event seen on the last pass, so the next pass only reports transitions whose
//! events arrived since. Entries expire after the cluster's event retention
//! window plus a buffer; an expired entry reads exactly like a missing one.
//!
//! ## Limitations
//!
//! - **Memory only**: the cache starts cold after a restart and every event is
//!   treated as new on the first pass for each instance.
//! - **Single-process only**: marks are not shared between replicas.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Duration, Utc};

use crate::error::{Error, Result};

/// Default entry lifetime: one hour of event retention plus 15 minutes.
pub const DEFAULT_TTL_MINUTES: i64 = 75;

/// Default maximum number of tracked instances.
pub const DEFAULT_CAPACITY: usize = 10_000;

#[derive(Debug, Clone)]
struct Mark {
    uid: String,
    expires_at: DateTime<Utc>,
}

/// Bounded, expiring map from instance name to last processed event UID.
///
/// Thread-safe; share it behind an `Arc` between reconcile passes.
#[derive(Debug)]
pub struct HighWaterMarkCache {
    marks: RwLock<HashMap<String, Mark>>,
    ttl: Duration,
    capacity: usize,
}

impl Default for HighWaterMarkCache {
    fn default() -> Self {
        Self::new(Duration::minutes(DEFAULT_TTL_MINUTES), DEFAULT_CAPACITY)
    }
}

fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::storage("high-water mark cache lock poisoned")
}

impl HighWaterMarkCache {
    /// Creates a cache whose entries live for `ttl` and which tracks at most
    /// `capacity` instances.
    #[must_use]
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            marks: RwLock::new(HashMap::new()),
            ttl,
            capacity: capacity.max(1),
        }
    }

    /// The configured entry lifetime.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the last recorded UID for `instance`, if it has not expired.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn get(&self, instance: &str, now: DateTime<Utc>) -> Result<Option<String>> {
        let expired = {
            let marks = self.marks.read().map_err(poison_err)?;
            match marks.get(instance) {
                None => return Ok(None),
                Some(mark) if mark.expires_at > now => return Ok(Some(mark.uid.clone())),
                Some(_) => true,
            }
        };

        if expired {
            let mut marks = self.marks.write().map_err(poison_err)?;
            if marks.get(instance).is_some_and(|m| m.expires_at <= now) {
                marks.remove(instance);
            }
        }
        Ok(None)
    }

    /// Records `uid` as the high-water mark for `instance`, renewing its TTL.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn record(&self, instance: &str, uid: &str, now: DateTime<Utc>) -> Result<()> {
        let mut marks = self.marks.write().map_err(poison_err)?;

        if !marks.contains_key(instance) && marks.len() >= self.capacity {
            marks.retain(|_, mark| mark.expires_at > now);
            if marks.len() >= self.capacity {
                let soonest = marks
                    .iter()
                    .min_by_key(|(_, mark)| mark.expires_at)
                    .map(|(name, _)| name.clone());
                if let Some(name) = soonest {
                    tracing::debug!(instance = %name, "evicting high-water mark at capacity");
                    marks.remove(&name);
                }
            }
        }

        marks.insert(
            instance.to_string(),
            Mark {
                uid: uid.to_string(),
                expires_at: now + self.ttl,
            },
        );
        drop(marks);
        Ok(())
    }

    /// Number of entries held, including ones that expired but were not yet
    /// purged.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn len(&self) -> Result<usize> {
        let len = self.marks.read().map_err(poison_err)?.len();
        Ok(len)
    }

    /// True when no entries are held.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

//! Back-reference cache: published message id → the records it contains.
//!
//! Consumed by the original-file retrieval path when a channel post is
//! forwarded into the discussion group. Bounded by capacity and TTL so the
//! map cannot grow for the life of the process; entries are single-use. Lost
//! on crash, which is acceptable: originals stay re-derivable through the
//! manual replay path.

use crate::models::ArtworkRecord;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Default capacity; a channel posting a few dozen artworks a day stays far
/// below this between restarts.
pub const DEFAULT_CAPACITY: usize = 256;

/// Default entry lifetime
pub const DEFAULT_TTL: Duration = Duration::from_secs(48 * 3600);

struct Entry {
    records: Vec<ArtworkRecord>,
    inserted: Instant,
}

struct Inner {
    map: HashMap<i64, Entry>,
    /// Insertion order for capacity eviction
    order: VecDeque<i64>,
}

pub struct BackrefCache {
    inner: Mutex<Inner>,
    capacity: usize,
    ttl: Duration,
}

impl BackrefCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                map: HashMap::new(),
                order: VecDeque::new(),
            }),
            capacity,
            ttl,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_TTL)
    }

    /// Store the records behind a published message id, evicting expired
    /// entries and, if still over capacity, the oldest one.
    pub async fn insert(&self, message_id: i64, records: Vec<ArtworkRecord>) {
        let mut guard = self.inner.lock().await;
        let Inner { map, order } = &mut *guard;

        map.retain(|_, entry| entry.inserted.elapsed() < self.ttl);
        order.retain(|id| map.contains_key(id));

        while order.len() >= self.capacity {
            if let Some(oldest) = order.pop_front() {
                map.remove(&oldest);
            }
        }

        let entry = Entry {
            records,
            inserted: Instant::now(),
        };
        if map.insert(message_id, entry).is_none() {
            order.push_back(message_id);
        }
    }

    /// Single-use lookup: the entry is removed whether or not it expired.
    pub async fn take(&self, message_id: i64) -> Option<Vec<ArtworkRecord>> {
        let mut inner = self.inner.lock().await;
        inner.order.retain(|id| *id != message_id);
        let entry = inner.map.remove(&message_id)?;
        (entry.inserted.elapsed() < self.ttl).then_some(entry.records)
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.map.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

//! Session-scoped memoization with request coalescing.
//!
//! [`MemoCache`] stores one computed value per key. Concurrent callers asking
//! for the same uncached key share a single in-flight computation rather than
//! racing duplicates against the store; everyone gets the same result. Failed
//! computations are never cached, so the next caller retries.
//!
//! Entries carry their computation timestamp; staleness is decided by the
//! caller at read time rather than by a background sweeper.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::OnceCell;

use crate::model::{CourseRecord, StudentMetrics, StudentRecord};

struct Cached<V> {
    value: V,
    stored_at: DateTime<Utc>,
}

/// One slot per key. The `OnceCell` is what provides coalescing: its
/// `get_or_try_init` runs at most one initializer at a time and leaves the
/// cell empty on failure.
struct Slot<V> {
    cell: OnceCell<Cached<V>>,
}

impl<V> Slot<V> {
    fn new() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }
}

/// A keyed memoization cache for fallible async computations.
pub struct MemoCache<K, V> {
    slots: Mutex<HashMap<K, Arc<Slot<V>>>>,
}

impl<K, V> Default for MemoCache<K, V> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, V> fmt::Debug for MemoCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let len = self.slots.lock().map(|m| m.len()).unwrap_or(0);
        f.debug_struct("MemoCache").field("entries", &len).finish()
    }
}

impl<K, V> MemoCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached value for `key`, computing it via `compute` if
    /// absent. Concurrent calls for the same key coalesce onto one
    /// computation. An `Err` from `compute` is returned to every waiter and
    /// leaves the key uncached.
    pub async fn get_or_compute<F, Fut, E>(&self, key: K, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let slot = {
            let mut slots = self.slots.lock().expect("cache lock poisoned");
            Arc::clone(slots.entry(key).or_insert_with(|| Arc::new(Slot::new())))
        };

        let cached = slot
            .cell
            .get_or_try_init(|| async {
                let value = compute().await?;
                Ok(Cached {
                    value,
                    stored_at: Utc::now(),
                })
            })
            .await?;
        Ok(cached.value.clone())
    }

    /// Return the cached value without computing, if present.
    pub fn peek(&self, key: &K) -> Option<V> {
        let slots = self.slots.lock().expect("cache lock poisoned");
        slots
            .get(key)
            .and_then(|slot| slot.cell.get())
            .map(|cached| cached.value.clone())
    }

    /// When the value for `key` was computed, if cached.
    pub fn stored_at(&self, key: &K) -> Option<DateTime<Utc>> {
        let slots = self.slots.lock().expect("cache lock poisoned");
        slots
            .get(key)
            .and_then(|slot| slot.cell.get())
            .map(|cached| cached.stored_at)
    }

    /// Drop the entry for `key`, forcing the next call to recompute.
    pub fn invalidate(&self, key: &K) {
        self.slots.lock().expect("cache lock poisoned").remove(key);
    }

    /// Drop the entry for `key` if it was computed more than `max_age` ago.
    /// Returns whether an entry was evicted. In-flight computations are left
    /// alone.
    pub fn invalidate_if_stale(&self, key: &K, max_age: Duration) -> bool {
        let mut slots = self.slots.lock().expect("cache lock poisoned");
        let stale = slots
            .get(key)
            .and_then(|slot| slot.cell.get())
            .map(|cached| {
                (Utc::now() - cached.stored_at)
                    .to_std()
                    .map_or(false, |age| age >= max_age)
            })
            .unwrap_or(false);
        if stale {
            slots.remove(key);
        }
        stale
    }

    /// Drop every entry whose key matches the predicate.
    pub fn invalidate_where(&self, pred: impl Fn(&K) -> bool) {
        let mut slots = self.slots.lock().expect("cache lock poisoned");
        slots.retain(|key, _| !pred(key));
    }

    /// Drop everything.
    pub fn clear(&self) {
        self.slots.lock().expect("cache lock poisoned").clear();
    }

    pub fn len(&self) -> usize {
        self.slots.lock().expect("cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The typed caches one dashboard session carries. Keys are teacher or
/// student ids.
#[derive(Debug, Default)]
pub struct SessionCache {
    pub teacher_courses: MemoCache<String, Vec<CourseRecord>>,
    pub teacher_roster: MemoCache<String, Vec<StudentRecord>>,
    pub student_metrics: MemoCache<String, StudentMetrics>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything cached for one teacher's views.
    pub fn invalidate_teacher(&self, teacher_id: &str) {
        self.teacher_courses.invalidate(&teacher_id.to_string());
        self.teacher_roster.invalidate(&teacher_id.to_string());
    }

    /// Forget one student's aggregated metrics.
    pub fn invalidate_student(&self, student_id: &str) {
        self.student_metrics.invalidate(&student_id.to_string());
    }

    /// Evict entries older than `max_age` for the given teacher and every
    /// student id supplied. Called by the engine at view-build time.
    pub fn evict_stale(&self, teacher_id: &str, student_ids: &[String], max_age: Duration) {
        let key = teacher_id.to_string();
        self.teacher_courses.invalidate_if_stale(&key, max_age);
        self.teacher_roster.invalidate_if_stale(&key, max_age);
        for student_id in student_ids {
            self.student_metrics.invalidate_if_stale(student_id, max_age);
        }
    }

    pub fn clear(&self) {
        self.teacher_courses.clear();
        self.teacher_roster.clear();
        self.student_metrics.clear();
    }
}

//! Allocation coordinator: the single synchronization point between writers.
//!
//! Identifier pool, capacity counter and the in-flight set live behind one
//! `parking_lot::Mutex`. Every operation here holds the lock only for
//! bookkeeping and, when eviction is enabled, for the directory scan and
//! unlink that must be atomic with it. Network and ingestion file I/O happen
//! outside.

#![allow(missing_docs)]

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::config::StorageConfig;
use crate::core::errors::{PasteError, Result};
use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle};
use crate::storage::capacity::CapacityTracker;
use crate::storage::eviction::{EvictedItem, evict_oldest};
use crate::storage::id_pool::IdPool;
use crate::storage::inventory::scan_backing_dir;

// ──────────────────── state ────────────────────

#[derive(Debug)]
struct AllocState {
    pool: IdPool,
    capacity: CapacityTracker,
    /// Acquired identifiers whose ingestion has neither committed nor rolled back.
    in_flight: HashSet<String>,
}

/// Point-in-time view of the allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocatorStats {
    pub free_ids: usize,
    pub in_flight: usize,
    pub current_bytes: u64,
    pub max_bytes: u64,
    pub gc_enabled: bool,
}

/// A successful acquisition and the items evicted to make room for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acquisition {
    pub id: String,
    pub evicted: Vec<EvictedItem>,
}

/// Guards the identifier pool and capacity state of one backing directory.
pub struct Allocator {
    directory: PathBuf,
    gc: bool,
    state: Mutex<AllocState>,
    logger: Option<ActivityLoggerHandle>,
}

impl Allocator {
    /// Create the backing directory if needed, scan it, and build the pool.
    pub fn open(config: &StorageConfig, logger: Option<ActivityLoggerHandle>) -> Result<Self> {
        fs::create_dir_all(&config.directory).map_err(|e| PasteError::io(&config.directory, e))?;
        let inventory = scan_backing_dir(&config.directory)?;
        let pool = IdPool::generate(config.id_length, &inventory.used);

        Ok(Self {
            directory: config.directory.clone(),
            gc: config.gc,
            state: Mutex::new(AllocState {
                pool,
                capacity: CapacityTracker::new(inventory.total_bytes, config.max_dir_size),
                in_flight: HashSet::new(),
            }),
            logger,
        })
    }

    /// Reserve an identifier and the right to grow the directory.
    ///
    /// At or over capacity, or with an empty pool, this fails unless eviction
    /// is enabled, in which case the oldest items are removed until both
    /// constraints hold again.
    pub fn acquire(&self) -> Result<Acquisition> {
        let mut state = self.state.lock();
        let mut evicted = Vec::new();

        if state.capacity.is_full() {
            if !self.gc {
                return Err(PasteError::StorageFull);
            }
            while state.capacity.is_full() {
                let item = self.evict_one(&mut state, "size")?;
                evicted.push(item);
            }
        }

        if state.pool.is_empty() {
            if !self.gc {
                return Err(PasteError::PoolEmpty);
            }
            while state.pool.is_empty() {
                let item = self.evict_one(&mut state, "IDs")?;
                evicted.push(item);
            }
        }

        let id = state.pool.take().ok_or(PasteError::PoolEmpty)?;
        state.in_flight.insert(id.clone());
        Ok(Acquisition { id, evicted })
    }

    /// Acquire an identifier wrapped in a lease that releases it on drop.
    pub fn lease(self: &Arc<Self>) -> Result<IdLease> {
        let acquisition = self.acquire()?;
        Ok(IdLease {
            allocator: Arc::clone(self),
            id: Some(acquisition.id),
            evicted: acquisition.evicted,
        })
    }

    /// Return an identifier whose ingestion was abandoned.
    pub fn release(&self, id: String) {
        let mut state = self.state.lock();
        state.in_flight.remove(&id);
        state.pool.put(id);
    }

    /// Record the size of a successfully ingested item.
    pub fn commit(&self, id: &str, bytes: u64) {
        let mut state = self.state.lock();
        state.in_flight.remove(id);
        state.capacity.commit(bytes);
    }

    /// Whether `id` is acquired and neither committed nor released yet.
    #[must_use]
    pub fn is_in_flight(&self, id: &str) -> bool {
        self.state.lock().in_flight.contains(id)
    }

    #[must_use]
    pub fn stats(&self) -> AllocatorStats {
        let state = self.state.lock();
        AllocatorStats {
            free_ids: state.pool.len(),
            in_flight: state.in_flight.len(),
            current_bytes: state.capacity.current(),
            max_bytes: state.capacity.max(),
            gc_enabled: self.gc,
        }
    }

    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Path of the backing file for `id`.
    #[must_use]
    pub fn item_path(&self, id: &str) -> PathBuf {
        self.directory.join(id)
    }

    fn evict_one(&self, state: &mut AllocState, trigger: &'static str) -> Result<EvictedItem> {
        let item = evict_oldest(&self.directory, &state.in_flight)
            .map_err(|_| PasteError::GcFailed { trigger })?;

        state.capacity.release(item.size);
        let reusable = state.pool.is_valid_id(&item.id);
        if reusable {
            state.pool.put(item.id.clone());
        }

        if let Some(logger) = &self.logger {
            logger.send(ActivityEvent::ItemEvicted {
                id: item.id.clone(),
                size_bytes: item.size,
                reusable,
            });
        }
        Ok(item)
    }
}

// ──────────────────── lease ────────────────────

/// An acquired identifier. Dropping the lease without committing returns the
/// identifier to the pool.
pub struct IdLease {
    allocator: Arc<Allocator>,
    id: Option<String>,
    evicted: Vec<EvictedItem>,
}

impl IdLease {
    #[must_use]
    pub fn id(&self) -> &str {
        self.id.as_deref().unwrap_or_default()
    }

    /// Items evicted to make room for this acquisition.
    #[must_use]
    pub fn evicted(&self) -> &[EvictedItem] {
        &self.evicted
    }

    /// Commit `bytes` for this identifier and consume the lease.
    pub fn commit(mut self, bytes: u64) -> String {
        let id = self.id.take().unwrap_or_default();
        self.allocator.commit(&id, bytes);
        id
    }

    /// Return the identifier to the pool now.
    pub fn release(mut self) {
        if let Some(id) = self.id.take() {
            self.allocator.release(id);
        }
    }
}

impl Drop for IdLease {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            self.allocator.release(id);
        }
    }
}

impl std::fmt::Debug for IdLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdLease")
            .field("id", &self.id)
            .field("evicted", &self.evicted.len())
            .finish_non_exhaustive()
    }
}

// ──────────────────── tests ────────────────────

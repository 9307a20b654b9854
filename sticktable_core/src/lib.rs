//! Bounded in-memory sticky-session table.
//!
//! Maps a client-derived key (source IP, integer, or string) to the backend
//! server previously chosen for it, so repeated requests route consistently.
//! Entries live in a fixed-capacity slot arena and are indexed twice: by key
//! for exact lookup, and by 32-bit wrapping expiration tick for oldest-first
//! eviction and the periodic expiration sweep.

pub mod arena;
pub mod constants;
pub mod errors;
pub mod scheduler;
pub mod telemetry;
pub mod ticks;
pub mod types;

pub use errors::Error;
pub use scheduler::{NullScheduler, SweepScheduler};
pub use ticks::Tick;
pub use types::{
    ipv4_key, integer_key, parse_table_type, EntryView, KeyKind, ServerId, SessionEntry,
    StoreOutcome, TableConfig,
};

use crate::arena::{EntryArena, SlotId};
use crate::constants::{EVICT_BATCH_MIN, EVICT_BATCH_SHIFT};
use log::{debug, info, trace};
use metrics::{counter, gauge};
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound::{Excluded, Unbounded};
use std::sync::Arc;

/// Everything mutated by table operations, guarded as one unit.
struct TableInner {
    arena: EntryArena,
    /// Key Index: normalized key bytes to slot handle.
    keys: BTreeMap<Box<[u8]>, SlotId>,
    /// Expiration Index: `(tick, slot)` pairs in raw tick order; the slot
    /// breaks ties between entries sharing a deadline.
    exps: BTreeSet<(Tick, SlotId)>,
    /// Next time the sweep should run; `ETERNITY` when nothing is pending.
    exp_next: Tick,
}

/// One sticky-session table.
///
/// All operations are synchronous and bounded by index depth; Lookup takes
/// the shared lock, everything else the exclusive one. Tables are fully
/// independent of each other.
pub struct StickTable {
    config: TableConfig,
    scheduler: Option<Arc<dyn SweepScheduler>>,
    inner: RwLock<TableInner>,
}

impl StickTable {
    // ---- logging bootstraper -------------------------------------------------
    fn ensure_logging() {
        static INIT: OnceCell<()> = OnceCell::new();
        INIT.get_or_init(|| {
            let _ = env_logger::builder()
                .format_timestamp(None)
                .is_test(std::env::var("RUST_TEST_THREADS").is_ok())
                .try_init();
        });
    }

    /// Create a table. A zero-capacity table is inert: construction
    /// succeeds, lookups miss, stores fail with [`Error::TableDisabled`].
    pub fn new(config: TableConfig) -> Result<Self, Error> {
        Self::build(config, None)
    }

    /// Create a table wired to the host's sweep scheduler. The scheduler is
    /// only consulted when the table has a finite ttl; it should invoke
    /// [`StickTable::run_expiry_sweep`] at or after each requested deadline.
    pub fn with_scheduler(
        config: TableConfig,
        scheduler: Arc<dyn SweepScheduler>,
    ) -> Result<Self, Error> {
        Self::build(config, Some(scheduler))
    }

    fn build(config: TableConfig, scheduler: Option<Arc<dyn SweepScheduler>>) -> Result<Self, Error> {
        Self::ensure_logging();
        telemetry::init();
        if config.kind == KeyKind::String && config.key_size < 2 {
            return Err(Error::InvalidKeySize);
        }
        let arena = EntryArena::with_capacity(config.capacity)?;
        let scheduler = if config.ttl_ms != 0 { scheduler } else { None };
        info!(
            "[INIT] kind={:?} key_size={} capacity={} ttl_ms={} no_purge={}",
            config.kind, config.key_size, config.capacity, config.ttl_ms, config.no_purge
        );
        Ok(StickTable {
            config,
            scheduler,
            inner: RwLock::new(TableInner {
                arena,
                keys: BTreeMap::new(),
                exps: BTreeSet::new(),
                exp_next: Tick::ETERNITY,
            }),
        })
    }

    pub fn config(&self) -> &TableConfig {
        &self.config
    }

    /// Prepare an unattached entry with its key normalized for this table.
    /// Ownership stays with the caller until [`StickTable::store`] accepts it.
    pub fn make_entry(&self, raw_key: &[u8]) -> SessionEntry {
        SessionEntry::new(&self.config, raw_key)
    }

    /// Exact-key lookup. Read-only; safe alongside other lookups.
    pub fn lookup(&self, raw_key: &[u8]) -> Option<EntryView> {
        let key = self.config.normalize_key(raw_key);
        let inner = self.inner.read();
        let slot = *inner.keys.get(&key)?;
        let entry = inner.arena.get(slot)?;
        Some(EntryView {
            server_id: entry.server_id,
            expire_at: entry.expire,
        })
    }

    /// Insert-or-update at `now`.
    ///
    /// A new key moves `entry` into the table and stamps it with `sid` and,
    /// for finite-ttl tables, a deadline of `now + ttl`. An existing key
    /// has its server id updated in place and `entry` comes back in
    /// [`StoreOutcome::Duplicate`] for the caller to drop. A full table
    /// first trashes an oldest-entry batch unless `no_purge` is set.
    pub fn store(
        &self,
        mut entry: SessionEntry,
        sid: ServerId,
        now: Tick,
    ) -> Result<StoreOutcome, Error> {
        if self.config.capacity == 0 {
            return Err(Error::TableDisabled);
        }
        let mut inner = self.inner.write();

        if let Some(&slot) = inner.keys.get(&entry.key) {
            if let Some(existing) = inner.arena.get_mut(slot) {
                if existing.server_id != sid {
                    existing.server_id = sid;
                    counter!(telemetry::UPDATES).increment(1);
                }
                debug!("[STORE] duplicate key, sid now {}", sid);
                return Ok(StoreOutcome::Duplicate(entry));
            }
        }

        if inner.arena.len() >= self.config.capacity {
            if self.config.no_purge {
                return Err(Error::TableFull);
            }
            let batch = (self.config.capacity >> EVICT_BATCH_SHIFT).max(EVICT_BATCH_MIN);
            if Self::trash_oldest(&mut inner, now, batch) == 0 {
                return Err(Error::TableFull);
            }
        }

        entry.server_id = sid;
        if self.config.ttl_ms != 0 {
            entry.expire = now.add_ms(self.config.ttl_ms);
        } else {
            entry.expire = Tick::ETERNITY;
        }
        entry.index_key = entry.expire;
        let expire = entry.expire;
        let key = entry.key.clone();

        let slot = inner.arena.insert(entry)?;
        inner.keys.insert(key, slot);
        debug!("[STORE] inserted sid={} expire={:?}", sid, expire);
        counter!(telemetry::INSERTS).increment(1);

        let mut wakeup = None;
        if expire.is_set() {
            inner.exps.insert((expire, slot));
            inner.exp_next = expire.first(inner.exp_next);
            wakeup = Some(inner.exp_next);
        }
        drop(inner);
        if let (Some(deadline), Some(scheduler)) = (wakeup, &self.scheduler) {
            scheduler.request_wakeup(deadline);
        }
        Ok(StoreOutcome::Inserted)
    }

    /// Extend an entry's deadline to `now + ttl` without re-indexing; the
    /// next scan that reaches its old position re-stamps it. Returns
    /// whether the key was present.
    pub fn touch(&self, raw_key: &[u8], now: Tick) -> bool {
        let key = self.config.normalize_key(raw_key);
        let mut inner = self.inner.write();
        let slot = match inner.keys.get(&key) {
            Some(&s) => s,
            None => return false,
        };
        let ttl = self.config.ttl_ms;
        match inner.arena.get_mut(slot) {
            Some(entry) => {
                if ttl != 0 {
                    entry.expire = now.add_ms(ttl);
                }
                true
            }
            None => false,
        }
    }

    /// Disable expiry for one entry. It stays reachable through the Key
    /// Index; the next scan drops its Expiration Index node. Returns
    /// whether the key was present.
    pub fn persist(&self, raw_key: &[u8]) -> bool {
        let key = self.config.normalize_key(raw_key);
        let mut inner = self.inner.write();
        let slot = match inner.keys.get(&key) {
            Some(&s) => s,
            None => return false,
        };
        match inner.arena.get_mut(slot) {
            Some(entry) => {
                entry.expire = Tick::ETERNITY;
                true
            }
            None => false,
        }
    }

    /// Run the expiration sweep at `now`: drain every entry whose deadline
    /// has elapsed, re-stamp entries whose deadline moved, and return the
    /// next deadline for the scheduler (`ETERNITY` when nothing is pending).
    pub fn run_expiry_sweep(&self, now: Tick) -> Tick {
        let mut inner = self.inner.write();
        let next = Self::trash_expired(&mut inner, now);
        debug!("[SWEEP] next deadline {:?}", next);
        next
    }

    /// Live entry count.
    pub fn occupancy(&self) -> usize {
        self.inner.read().arena.len()
    }

    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// Returns the number of available slots (capacity - used + recycled).
    pub fn available_capacity(&self) -> usize {
        self.inner.read().arena.available()
    }

    /// Next time the sweep should run; `ETERNITY` when no finite deadline
    /// is pending.
    pub fn sweep_deadline(&self) -> Tick {
        self.inner.read().exp_next
    }

    /// Emit gauges periodically (caller decides cadence).
    pub fn report_capacity_metrics(&self) {
        let free = self.available_capacity() as f64;
        gauge!(telemetry::FREE_SLOTS).set(free);
    }

    // ---- expiration-index scanning ------------------------------------------

    /// First node at or after `anchor` in raw tick order.
    fn lookup_ge(exps: &BTreeSet<(Tick, SlotId)>, anchor: Tick) -> Option<(Tick, SlotId)> {
        exps.range((anchor, SlotId::ZERO)..).next().copied()
    }

    /// Natural successor of `cur`, before `cur` is detached.
    fn next_after(exps: &BTreeSet<(Tick, SlotId)>, cur: (Tick, SlotId)) -> Option<(Tick, SlotId)> {
        exps.range((Excluded(cur), Unbounded)).next().copied()
    }

    /// Detach the entry from the Key Index and release its slot. The
    /// caller has already detached its Expiration Index node.
    fn release(inner: &mut TableInner, slot: SlotId) {
        if let Some(entry) = inner.arena.remove(slot) {
            inner.keys.remove(&entry.key);
        }
    }

    /// Trash up to `to_batch` oldest entries. Returns how many were
    /// trashed.
    ///
    /// The scan anchors at `now - lookback` so recently-expired keys are
    /// found even when the tick space has wrapped; running off the end of
    /// the index wraps to its first node. Nodes whose stored key no longer
    /// matches the entry's live deadline are re-stamped instead of
    /// trashed, and the cursor continues from whichever sorts first, the
    /// natural successor or the re-stamped node.
    fn trash_oldest(inner: &mut TableInner, now: Tick, to_batch: usize) -> usize {
        let mut batched = 0;
        let mut cursor = Self::lookup_ge(&inner.exps, now.look_back());
        // two full passes with no victim means nothing is evictable
        let mut budget = 2 * inner.exps.len() + 2;

        while batched < to_batch {
            let cur = match cursor.take() {
                Some(c) => c,
                None => {
                    // we might have run off the end of the index while now
                    // sits in the lower half of the wrapped tick space;
                    // loop back to the first node
                    match inner.exps.iter().next().copied() {
                        Some(c) => c,
                        None => break,
                    }
                }
            };
            if budget == 0 {
                break;
            }
            budget -= 1;

            let (node_key, slot) = cur;
            let next = Self::next_after(&inner.exps, cur);
            inner.exps.remove(&cur);

            let (expire, index_key) = match inner.arena.get(slot) {
                Some(entry) => (entry.expire, entry.index_key),
                None => {
                    cursor = next;
                    continue;
                }
            };
            debug_assert_eq!(index_key, node_key);

            if expire != index_key {
                if !expire.is_set() {
                    // expiry was disabled for this entry: it leaves the
                    // queue but stays live in the Key Index
                    cursor = next;
                    continue;
                }
                if let Some(entry) = inner.arena.get_mut(slot) {
                    entry.index_key = expire;
                }
                inner.exps.insert((expire, slot));
                cursor = match next {
                    Some(n) if n.0 <= expire => Some(n),
                    _ => Some((expire, slot)),
                };
                continue;
            }

            // oldest live entry, trash it
            trace!("[EVICT] trashing node at {:?}", node_key);
            Self::release(inner, slot);
            counter!(telemetry::EVICTIONS).increment(1);
            batched += 1;
            cursor = next;
        }
        batched
    }

    /// Drain every expired entry and compute the next sweep deadline.
    fn trash_expired(inner: &mut TableInner, now: Tick) -> Tick {
        let mut cursor = Self::lookup_ge(&inner.exps, now.look_back());
        let mut budget = 2 * inner.exps.len() + 2;

        loop {
            let cur = match cursor.take() {
                Some(c) => c,
                None => match inner.exps.iter().next().copied() {
                    Some(c) => c,
                    None => break,
                },
            };
            if budget == 0 {
                // conservative: come back at the earliest indexed tick
                let fallback = inner
                    .exps
                    .iter()
                    .next()
                    .map(|&(k, _)| k)
                    .unwrap_or(Tick::ETERNITY);
                inner.exp_next = fallback;
                return fallback;
            }
            budget -= 1;

            let (node_key, slot) = cur;
            if now.is_lt(node_key) {
                // timer not expired yet, revisit it later
                inner.exp_next = node_key;
                return node_key;
            }

            let next = Self::next_after(&inner.exps, cur);
            inner.exps.remove(&cur);

            let (expire, index_key) = match inner.arena.get(slot) {
                Some(entry) => (entry.expire, entry.index_key),
                None => {
                    cursor = next;
                    continue;
                }
            };
            debug_assert_eq!(index_key, node_key);

            if !expire.is_expired(now) {
                if !expire.is_set() {
                    cursor = next;
                    continue;
                }
                if let Some(entry) = inner.arena.get_mut(slot) {
                    entry.index_key = expire;
                }
                inner.exps.insert((expire, slot));
                cursor = match next {
                    Some(n) if n.0 <= expire => Some(n),
                    _ => Some((expire, slot)),
                };
                continue;
            }

            // session expired, trash it
            trace!("[SWEEP] trashing node at {:?}", node_key);
            Self::release(inner, slot);
            counter!(telemetry::EXPIRATIONS).increment(1);
            cursor = next;
        }

        // found nothing left to expire in the index
        inner.exp_next = Tick::ETERNITY;
        Tick::ETERNITY
    }
}

//! Constants and tuning knobs for the sticky-session table

/// How far behind "now" the expiry scans anchor themselves. Must exceed the
/// largest plausible gap between two sweep invocations, in ticks; half the
/// 32-bit tick space keeps the anchor unambiguous under wraparound.
pub const TIMER_LOOK_BACK: u32 = 1 << 31;

/// Fixed key width for the `ip` and `integer` table kinds.
pub const FIXED_KEY_SIZE: usize = 4;
/// Default stored width for `string` keys, terminator included.
pub const STRING_DEFAULT_KEY_SIZE: usize = 32;

/// Eviction batch is `capacity >> EVICT_BATCH_SHIFT`, never less than
/// `EVICT_BATCH_MIN` (integer division alone yields 0 for small tables).
pub const EVICT_BATCH_SHIFT: u32 = 8;
pub const EVICT_BATCH_MIN: usize = 1;

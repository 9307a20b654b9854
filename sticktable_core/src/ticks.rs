//! 32-bit wrapping millisecond clock.
//!
//! Deadlines live in a 32-bit tick space that wraps roughly every 49.7 days,
//! so "is t1 before t2" is a signed-distance question, never a plain `<`.
//! The value 0 is reserved as the "never" sentinel ([`Tick::ETERNITY`]);
//! arithmetic skips over it.

use crate::constants::TIMER_LOOK_BACK;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// An absolute point on the wrapping millisecond clock.
///
/// `Ord` is the *raw* byte order, which is what the Expiration Index sorts
/// by; use [`Tick::is_lt`] for "happens before" in wrapped time.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tick(u32);

impl Tick {
    /// The "never" sentinel. An entry whose deadline is `ETERNITY` does not
    /// expire.
    pub const ETERNITY: Tick = Tick(0);

    #[inline]
    pub const fn from_raw(raw: u32) -> Tick {
        Tick(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// A finite (non-sentinel) deadline?
    #[inline]
    pub const fn is_set(self) -> bool {
        self.0 != 0
    }

    /// `self + ms` on the wrapping clock, stepping over the sentinel value.
    #[inline]
    pub fn add_ms(self, ms: u32) -> Tick {
        let v = self.0.wrapping_add(ms);
        Tick(if v == 0 { 1 } else { v })
    }

    /// Wraparound-safe "self strictly before other". Only meaningful when
    /// the two ticks are within half the clock range of each other.
    #[inline]
    pub fn is_lt(self, other: Tick) -> bool {
        self.0.wrapping_sub(other.0) & 0x8000_0000 != 0
    }

    /// A set deadline that `now` has reached or passed.
    #[inline]
    pub fn is_expired(self, now: Tick) -> bool {
        self.is_set() && !now.is_lt(self)
    }

    /// The earlier of two deadlines, treating `ETERNITY` as "no deadline".
    #[inline]
    pub fn first(self, other: Tick) -> Tick {
        if !self.is_set() {
            other
        } else if !other.is_set() || self.is_lt(other) {
            self
        } else {
            other
        }
    }

    /// The scan anchor: `self - TIMER_LOOK_BACK` on the wrapping clock.
    #[inline]
    pub fn look_back(self) -> Tick {
        Tick(self.0.wrapping_sub(TIMER_LOOK_BACK))
    }
}

impl fmt::Debug for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_set() {
            write!(f, "Tick({})", self.0)
        } else {
            f.write_str("Tick(eternity)")
        }
    }
}

/// Current wall-clock time folded onto the tick space.
pub fn now_ms() -> Tick {
    let ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u32)
        .unwrap_or(1);
    Tick(if ms == 0 { 1 } else { ms })
}

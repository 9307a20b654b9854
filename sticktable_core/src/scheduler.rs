//! External sweep-scheduler collaborator interface.
//!
//! The table never owns a timer. It asks the surrounding system to invoke
//! [`crate::StickTable::run_expiry_sweep`] at or after a deadline, and the
//! sweep hands the next deadline back so the scheduler can re-arm itself.

use crate::ticks::Tick;

/// Implemented by the host's periodic-task machinery.
pub trait SweepScheduler: Send + Sync {
    /// Ask for the sweep to run no later than `deadline`. `Tick::ETERNITY`
    /// means nothing is pending; do not re-arm until asked again.
    fn request_wakeup(&self, deadline: Tick);
}

/// Scheduler that drops every request. For tables whose caller drives the
/// sweep by hand.
pub struct NullScheduler;

impl SweepScheduler for NullScheduler {
    fn request_wakeup(&self, _deadline: Tick) {}
}

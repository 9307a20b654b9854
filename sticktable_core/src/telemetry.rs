//! Minimal run-time metrics sink.
//!
//! No exporter is bundled; the host process installs whatever `metrics`
//! recorder it wants. The instruments are described exactly once so any
//! recorder present can label them.

use metrics::{describe_counter, describe_gauge, Unit};

pub const INSERTS: &str = "sticktable_inserts_total";
pub const UPDATES: &str = "sticktable_updates_total";
pub const EVICTIONS: &str = "sticktable_evictions_total";
pub const EXPIRATIONS: &str = "sticktable_expirations_total";
pub const FREE_SLOTS: &str = "sticktable_free_slots";

/// Describe instruments exactly **once** – called from table bootstrap.
pub fn init() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        describe_counter!(INSERTS, Unit::Count, "Sticky sessions inserted");
        describe_counter!(UPDATES, Unit::Count, "Duplicate stores that updated a server id");
        describe_counter!(EVICTIONS, Unit::Count, "Entries trashed by oldest-first eviction");
        describe_counter!(EXPIRATIONS, Unit::Count, "Entries trashed by the expiration sweep");
        describe_gauge!(FREE_SLOTS, Unit::Count, "Entry slots still available");
    });
}

//! Prometheus Metrics
//!
//! Counters live in the default registry and are exposed by the `/metrics`
//! endpoint of the server binary. Labels keep cardinality low: group name
//! plus a small fixed outcome/source set.

use once_cell::sync::Lazy;
use prometheus::{register_int_counter_vec, IntCounterVec};

/// Get requests by group and outcome (`hit` | `miss`).
pub static GETS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "meshcache_gets_total",
        "Cache get requests by group and outcome",
        &["group", "outcome"]
    )
    .expect("register meshcache_gets_total")
});

/// Completed loads by group and source (`peer` | `local`).
pub static LOADS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "meshcache_loads_total",
        "Completed loads by group and source",
        &["group", "source"]
    )
    .expect("register meshcache_loads_total")
});

/// Peer fetches that failed and fell back to the local loader.
pub static PEER_FETCH_ERRORS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "meshcache_peer_fetch_errors_total",
        "Peer fetches that failed and fell back to the local loader",
        &["group"]
    )
    .expect("register meshcache_peer_fetch_errors_total")
});

/// Entries evicted from local caches.
pub static EVICTIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "meshcache_evictions_total",
        "Entries evicted from local caches",
        &["group"]
    )
    .expect("register meshcache_evictions_total")
});

/// Force registration of every metric family so `/metrics` exposes them
/// before their first increment.
pub fn register() {
    Lazy::force(&GETS);
    Lazy::force(&LOADS);
    Lazy::force(&PEER_FETCH_ERRORS);
    Lazy::force(&EVICTIONS);
}

//! Request and cache metrics.

use metrics::{counter, gauge, histogram};
use std::time::Duration;

use rezoning_engine::reader::CacheStats;

use crate::error::ApiResult;

/// Record one request of `endpoint` with its outcome.
pub fn record_request<T>(endpoint: &'static str, elapsed: Duration, result: &ApiResult<T>) {
    match endpoint {
        "filter" => counter!("rezoning_filter_requests_total").increment(1),
        "zone" => counter!("rezoning_zone_requests_total").increment(1),
        _ => {}
    }
    histogram!("rezoning_request_duration_seconds", "endpoint" => endpoint)
        .record(elapsed.as_secs_f64());

    if let Err(e) = result {
        counter!(
            "rezoning_request_errors_total",
            "endpoint" => endpoint,
            "kind" => e.kind()
        )
        .increment(1);
    }
}

/// Publish reader cache statistics as gauges.
pub fn record_cache_stats(cache: &'static str, stats: &CacheStats) {
    gauge!("rezoning_cache_entries", "cache" => cache).set(stats.entries as f64);
    gauge!("rezoning_cache_bytes", "cache" => cache).set(stats.memory_bytes as f64);
    gauge!("rezoning_cache_hit_rate", "cache" => cache).set(stats.hit_rate());
    gauge!("rezoning_cache_evictions", "cache" => cache).set(stats.evictions as f64);
}

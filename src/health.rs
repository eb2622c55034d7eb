//! Process health and usage metrics.
//!
//! Provides:
//! - [`UsageMetrics`] for lock-free per-request counters
//! - [`get_rss_bytes`] / [`ProcessSnapshot`] for process diagnostics
//! - [`Recommendation`] entries returned by the performance endpoints

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;
use serde_json::Value;
use tracing::info;

// ============================================================================
// Platform RSS helper
// ============================================================================

/// Return the current process RSS in bytes, or `None` on unsupported
/// platforms.
///
/// - **Linux**: `/proc/self/statm` resident pages times `sysconf(_SC_PAGESIZE)`.
/// - **macOS**: peak resident size from `getrusage(RUSAGE_SELF)`.
pub fn get_rss_bytes() -> Option<u64> {
    #[cfg(target_os = "linux")]
    {
        // Format: size resident shared text lib data dt (pages)
        let content = std::fs::read_to_string("/proc/self/statm").ok()?;
        let resident_pages: u64 = content.split_whitespace().nth(1)?.parse().ok()?;

        let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if page_size <= 0 {
            return None;
        }
        Some(resident_pages * (page_size as u64))
    }

    #[cfg(target_os = "macos")]
    {
        let mut usage = std::mem::MaybeUninit::<libc::rusage>::zeroed();
        let ret = unsafe { libc::getrusage(libc::RUSAGE_SELF, usage.as_mut_ptr()) };
        if ret != 0 {
            return None;
        }
        // ru_maxrss is bytes on macOS.
        let usage = unsafe { usage.assume_init() };
        u64::try_from(usage.ru_maxrss).ok()
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        None
    }
}

/// Thread count of the current process (Linux only).
fn thread_count() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    status
        .lines()
        .find_map(|line| line.strip_prefix("Threads:"))
        .and_then(|n| n.trim().parse().ok())
}

/// Point-in-time process information for `/performance/metrics`.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessSnapshot {
    pub pid: u32,
    pub memory_rss: Option<u64>,
    pub num_threads: Option<u64>,
    pub cpu_count: usize,
    pub uptime_secs: u64,
}

impl ProcessSnapshot {
    pub fn capture(metrics: &UsageMetrics) -> Self {
        Self {
            pid: std::process::id(),
            memory_rss: get_rss_bytes(),
            num_threads: thread_count(),
            cpu_count: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            uptime_secs: metrics.uptime_secs(),
        }
    }
}

// ============================================================================
// Recommendations
// ============================================================================

/// Operator hint attached to pool and cache diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub message: &'static str,
    pub metric: &'static str,
    pub value: Value,
}

impl Recommendation {
    pub fn warning(message: &'static str, metric: &'static str, value: Value) -> Self {
        Self {
            kind: "warning",
            message,
            metric,
            value,
        }
    }

    pub fn info(message: &'static str, metric: &'static str, value: Value) -> Self {
        Self {
            kind: "info",
            message,
            metric,
            value,
        }
    }
}

// ============================================================================
// UsageMetrics
// ============================================================================

/// Lock-free counters for gateway usage tracking.
#[derive(Debug)]
pub struct UsageMetrics {
    /// Prompt and conversation requests handled.
    pub requests: AtomicU64,
    /// Calls that reached an LLM provider.
    pub provider_calls: AtomicU64,
    pub input_tokens: AtomicU64,
    pub output_tokens: AtomicU64,
    /// Requests that ended in a processing error.
    pub errors: AtomicU64,
    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,
    started_at: Instant,
}

/// Serializable copy of [`UsageMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UsageSnapshot {
    pub requests: u64,
    pub provider_calls: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub errors: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub uptime_secs: u64,
}

impl UsageMetrics {
    pub fn new() -> Self {
        Self {
            requests: AtomicU64::new(0),
            provider_calls: AtomicU64::new(0),
            input_tokens: AtomicU64::new(0),
            output_tokens: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_provider_call(&self) {
        self.provider_calls.fetch_add(1, Ordering::Relaxed);
    }

    /// Record token usage from an LLM response.
    pub fn record_tokens(&self, input: u64, output: u64) {
        self.input_tokens.fetch_add(input, Ordering::Relaxed);
        self.output_tokens.fetch_add(output, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache(&self, hit: bool) {
        let counter = if hit {
            &self.cache_hits
        } else {
            &self.cache_misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn snapshot(&self) -> UsageSnapshot {
        UsageSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            provider_calls: self.provider_calls.load(Ordering::Relaxed),
            input_tokens: self.input_tokens.load(Ordering::Relaxed),
            output_tokens: self.output_tokens.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            uptime_secs: self.uptime_secs(),
        }
    }

    /// Emit current counters as a structured log line.
    pub fn emit_usage(&self, reason: &str) {
        let snap = self.snapshot();
        info!(
            event = "usage_summary",
            reason = reason,
            requests = snap.requests,
            provider_calls = snap.provider_calls,
            input_tokens = snap.input_tokens,
            output_tokens = snap.output_tokens,
            errors = snap.errors,
            cache_hits = snap.cache_hits,
            cache_misses = snap.cache_misses,
            uptime_secs = snap.uptime_secs,
            "Usage metrics"
        );
    }
}

impl Default for UsageMetrics {
    fn default() -> Self {
        Self::new()
    }
}
